use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use tracing::{error, warn};

use crate::error::EXIT_INPUT;

/// Shared stop request, checked by the pipeline between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Listens for Ctrl+C on a background thread. The first press sets `flag` so
/// the run stops once the current file's transaction has resolved; a second
/// press exits immediately.
pub fn install_ctrl_c_handler(flag: CancelFlag) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("interrupt received, stopping after the current file");
                flag.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    error!("cancelled by user (Ctrl+C), exiting without waiting for the current file");
                    std::process::exit(i32::from(EXIT_INPUT));
                }
            });
        })
        .context("failed to spawn signal listener thread")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_flag() {
        let flag = CancelFlag::new();
        let listener = flag.clone();
        assert!(!listener.is_cancelled());

        flag.cancel();
        assert!(listener.is_cancelled());
    }
}
