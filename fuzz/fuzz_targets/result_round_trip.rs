#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use result_courier::{codec, TaskId, TaskResult};

#[derive(Debug, Arbitrary)]
struct Input {
    id: [u8; 16],
    contents: Vec<u8>,
    success: bool,
}

fuzz_target!(|input: Input| {
    let Ok(result) = TaskResult::try_new(TaskId::from_bytes(input.id), input.contents, input.success)
    else {
        return;
    };
    let decoded = codec::decode(&codec::encode(&result)).expect("encoded result must decode");
    assert_eq!(decoded, result);
});
