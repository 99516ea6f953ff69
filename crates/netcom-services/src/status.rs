//! Last error reported by the service, readable by whoever started it.

use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle to the most recent error message.
///
/// Every part of the service that swallows a failure instead of
/// propagating it records the failure here.
#[derive(Debug, Clone, Default)]
pub struct LastError(Arc<Mutex<String>>);

impl LastError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, message: impl Into<String>) {
        *self.lock() = message.into();
    }

    pub fn get(&self) -> String {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
