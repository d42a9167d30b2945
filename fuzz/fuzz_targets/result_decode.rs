#![no_main]

use libfuzzer_sys::fuzz_target;
use result_courier::codec;

fuzz_target!(|data: &[u8]| {
    // Must never panic, whatever arrives.
    if let Ok(results) = codec::decode_batch(data) {
        let body = codec::encode_batch(&results);
        assert_eq!(codec::decode_batch(&body).ok(), Some(results));
    }
    let _ = codec::decode(data);
});
