use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::orchestrator::RelayHandle;

const EXIT: &str = "exit";
const WRITING: &str = "Writing...";

/// Sends each non-empty line as a message, followed by a "Writing..." typing
/// status for the next one. A line reading `exit` shuts the session down.
/// Returns how many lines were sent.
pub async fn forward_lines<R>(reader: R, handle: &RelayHandle) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim_end();
        if text.trim().is_empty() {
            continue;
        }
        if text.trim() == EXIT {
            tracing::info!("Exit requested");
            handle.shutdown();
            break;
        }
        if !handle.broadcast(text) || !handle.typing(WRITING) {
            break;
        }
        sent += 1;
    }

    Ok(sent)
}
