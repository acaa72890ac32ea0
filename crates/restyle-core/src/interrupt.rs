use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Resettable cooperative cancellation flag.
///
/// One token lives for the whole worker; it is reset before each generation
/// and polled by the generation loop at every token boundary. Clones share
/// the same flag.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    flag: Arc<AtomicBool>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear a previous interrupt so the next generation can run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Ask the running generation to stop. Safe to call at any time.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
