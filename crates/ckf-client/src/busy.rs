//! Loading-flag guard shared by the orchestrator and trading session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Marks an operation in flight for the guard's lifetime.
///
/// The flag clears on every exit path, including early returns through `?`.
pub(crate) struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    pub(crate) fn new(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag: Arc::clone(flag) }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_clears_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));
        {
            let _guard = BusyGuard::new(&flag);
            assert!(flag.load(Ordering::SeqCst));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
