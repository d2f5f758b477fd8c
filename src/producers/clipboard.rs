use std::time::Duration;

use tokio::sync::mpsc;

use crate::orchestrator::RelayHandle;

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(#[from] arboard::Error),
    #[error("Clipboard reader stopped: {0}")]
    ReaderStopped(#[from] tokio::task::JoinError),
}

/// Decides which clipboard readings are worth sending.
#[derive(Debug, Default)]
pub struct ClipboardWatcher {
    last: Option<String>,
}

impl ClipboardWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first reading only sets the baseline, so whatever was on the
    /// clipboard before the session started is not sent.
    pub fn observe(&mut self, current: &str) -> Option<String> {
        let Some(last) = &self.last else {
            self.last = Some(current.to_owned());
            return None;
        };
        if last == current {
            return None;
        }
        self.last = Some(current.to_owned());
        if current.trim().is_empty() {
            return None;
        }
        Some(current.to_owned())
    }
}

/// Polls the system clipboard every `poll_interval` and broadcasts each
/// change until the orchestrator stops.
pub async fn watch_clipboard(
    handle: RelayHandle,
    poll_interval: Duration,
) -> Result<(), ClipboardError> {
    let (tx, mut rx) = mpsc::channel::<String>(8);
    // arboard handles are blocking and not Send everywhere; one lives on its own thread.
    let reader = tokio::task::spawn_blocking(move || read_clipboard(tx, poll_interval));

    let mut watcher = ClipboardWatcher::new();
    while let Some(text) = rx.recv().await {
        let Some(changed) = watcher.observe(&text) else {
            continue;
        };
        tracing::info!("Clipboard changed ({} chars)", changed.chars().count());
        if !handle.broadcast(changed) {
            break;
        }
    }

    drop(rx);
    reader.await?
}

fn read_clipboard(tx: mpsc::Sender<String>, poll_interval: Duration) -> Result<(), ClipboardError> {
    let mut clipboard = arboard::Clipboard::new()?;
    tracing::info!("Watching the clipboard every {:?}", poll_interval);
    loop {
        match clipboard.get_text() {
            Ok(text) => {
                if tx.blocking_send(text).is_err() {
                    return Ok(());
                }
            }
            Err(arboard::Error::ContentNotAvailable) => {}
            Err(e) => tracing::debug!("Clipboard read failed: {}", e),
        }
        std::thread::sleep(poll_interval);
    }
}
