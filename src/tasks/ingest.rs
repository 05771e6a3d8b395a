use crate::chat::ChatSource;
use crate::voting::MessageBuffer;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Pulls chat into the buffer until told to stop.
///
/// The stop flag is checked on every pass and raced against the poll that is
/// in flight, so a stop is seen within one poll interval. Whatever made it
/// into the buffer stays there for the tally tick.
pub async fn run_ingestion(
    chat: Arc<dyn ChatSource>,
    buffer: Arc<MessageBuffer>,
    poll_interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    info!("Starting chat ingestion...");
    let mut reported_offline = false;

    loop {
        if *stop.borrow() {
            break;
        }

        if !chat.is_live() {
            if !reported_offline {
                warn!("Chat source is not live, waiting for it to come back");
                reported_offline = true;
            }
            if wait_or_stop(&mut stop, poll_interval).await {
                break;
            }
            continue;
        }
        reported_offline = false;

        tokio::select! {
            _ = stop.changed() => break,
            result = chat.poll() => match result {
                Ok(batch) => {
                    if !batch.is_empty() {
                        debug!("Buffered {} chat message(s)", batch.len());
                        buffer.append_batch(batch);
                    }
                }
                Err(e) => {
                    warn!("Chat poll failed: {}", e);
                    if wait_or_stop(&mut stop, poll_interval).await {
                        break;
                    }
                }
            },
        }
    }

    info!("Chat ingestion stopped");
}

/// Sleeps for `period` unless a stop arrives first. Returns true on stop.
async fn wait_or_stop(stop: &mut watch::Receiver<bool>, period: Duration) -> bool {
    tokio::select! {
        _ = stop.changed() => true,
        _ = tokio::time::sleep(period) => false,
    }
}
