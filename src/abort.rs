use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Cooperative cancellation flag for long-running stages.
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Cancels `token` on the first Ctrl-C and exits the process on the second.
/// The signal is awaited on a single-threaded runtime in a background thread.
pub fn cancel_on_ctrl_c(token: &CancelToken) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let token = token.clone();
    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::warn!("Ctrl-C handler unavailable: {}", e);
                        return;
                    }
                    if token.is_cancelled() {
                        log::warn!("Interrupted twice, exiting");
                        std::process::exit(130);
                    }
                    log::warn!("Interrupted, stopping after the current iteration");
                    token.cancel();
                }
            });
        })?;
    Ok(())
}
