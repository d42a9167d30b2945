//! The result record reported for every finished task.

use bytes::Bytes;

use crate::constants::MAX_CONTENTS_LEN;
use crate::error::ResultError;
use crate::types::TaskId;

/// Final outcome of one task: its identifier, output contents and whether
/// it succeeded.
///
/// A `TaskResult` is a value: fields are set once at construction and only
/// exposed through accessors. It never describes a partial or in-progress
/// task. Cloning is cheap because the contents are reference-counted.
///
/// # Examples
///
/// ```
/// use result_courier::{TaskId, TaskResult};
///
/// let id = TaskId::new_v4();
/// let result = TaskResult::new(id, "ok", true);
/// assert_eq!(result.id(), id);
/// assert_eq!(result.contents(), b"ok");
/// assert!(result.success());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    id: TaskId,
    contents: Bytes,
    success: bool,
}

impl TaskResult {
    /// Creates a result, rejecting contents larger than
    /// [`MAX_CONTENTS_LEN`].
    pub fn try_new(
        id: TaskId,
        contents: impl Into<Bytes>,
        success: bool,
    ) -> Result<Self, ResultError> {
        let contents = contents.into();
        if contents.len() > MAX_CONTENTS_LEN {
            return Err(ResultError::ContentsTooLarge {
                limit: MAX_CONTENTS_LEN,
                actual: contents.len(),
            });
        }
        Ok(Self {
            id,
            contents,
            success,
        })
    }

    /// Creates a result.
    ///
    /// # Panics
    ///
    /// Panics if `contents` is larger than [`MAX_CONTENTS_LEN`]. Callers
    /// handling untrusted sizes should use [`TaskResult::try_new`].
    pub fn new(id: TaskId, contents: impl Into<Bytes>, success: bool) -> Self {
        match Self::try_new(id, contents, success) {
            Ok(result) => result,
            Err(err) => panic!("invalid task result: {err}"),
        }
    }

    /// The identifier of the task that produced this result.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Raw output of the task.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Shared handle to the contents.
    pub fn contents_bytes(&self) -> Bytes {
        self.contents.clone()
    }

    /// Whether the task succeeded.
    pub fn success(&self) -> bool {
        self.success
    }
}
