use parking_lot::Mutex;

use crate::error::{ComponentError, MultiError};

/// Append-only error accumulator of one component.
///
/// Errors are never overwritten; reading returns every recorded error in order.
#[derive(Debug, Default)]
pub struct ErrorStore {
    errors: Mutex<MultiError>,
}

impl ErrorStore {
    /// Appends an error.
    pub fn append(&self, err: ComponentError) {
        self.errors.lock().push(err);
    }

    /// Returns the recorded errors, or `None` when nothing was recorded.
    pub fn get(&self) -> Option<MultiError> {
        self.errors.lock().clone().into_option()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}
