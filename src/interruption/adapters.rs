use super::InterruptionProbe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Never asks the job to stop. Used for inline execution and tests, and as the
/// fallback for unregistered adapter names.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInterrupt;

impl InterruptionProbe for NeverInterrupt {
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Shared stop flag, typically set from a signal handler or a worker's
/// graceful-shutdown path.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Set the flag when the process receives Ctrl-C.
    pub fn install_ctrl_c_handler(&self) -> tokio::task::JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.request_shutdown();
            }
        })
    }
}

impl InterruptionProbe for ShutdownFlag {
    fn should_interrupt(&self) -> bool {
        self.is_requested()
    }
}
