use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StreamError;

/// First-error-wins slot shared between a pump and its consumer.
#[derive(Clone, Debug, Default)]
pub struct StickyError {
    slot: Arc<Mutex<Option<StreamError>>>,
}

impl StickyError {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `err` unless an error is already stored. Returns `true` if it was stored.
    pub fn set(&self, err: StreamError) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(err);
        true
    }

    /// Returns a copy of the stored error.
    pub fn get(&self) -> Option<StreamError> {
        self.slot.lock().clone()
    }

    /// Returns `true` once an error was stored.
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_wins() {
        let s = StickyError::new();
        assert!(s.set(StreamError::Stopped));
        assert!(!s.set(StreamError::Closed));
        assert!(matches!(s.clone().get(), Some(StreamError::Stopped)));
    }
}
