use crate::models::ChatMessage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("chat transport error: {0}")]
    Transport(String),
}

/// A live chat feed. `poll` may wait for messages but has to come back
/// eventually, and must be safe to drop mid-wait.
#[async_trait]
pub trait ChatSource: Send + Sync {
    fn is_live(&self) -> bool;

    async fn poll(&self) -> Result<Vec<ChatMessage>, ChatError>;

    /// Throws away anything queued before a round opens and returns how many
    /// messages went. Sources without a queue have nothing to drop.
    async fn discard_backlog(&self) -> usize {
        0
    }
}

/// Chat fed through an mpsc channel. Goes offline once every sender is gone.
pub struct ChannelChat {
    rx: Mutex<mpsc::UnboundedReceiver<ChatMessage>>,
    wait: Duration,
    closed: AtomicBool,
}

impl ChannelChat {
    pub fn new(wait: Duration) -> (mpsc::UnboundedSender<ChatMessage>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let chat = Self {
            rx: Mutex::new(rx),
            wait,
            closed: AtomicBool::new(false),
        };
        (tx, chat)
    }
}

#[async_trait]
impl ChatSource for ChannelChat {
    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn poll(&self) -> Result<Vec<ChatMessage>, ChatError> {
        let mut rx = self.rx.lock().await;
        let first = match tokio::time::timeout(self.wait, rx.recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(None) => {
                self.closed.store(true, Ordering::Release);
                return Err(ChatError::Transport("chat feed closed".to_string()));
            }
            Ok(Some(msg)) => msg,
        };

        // grab whatever else is already queued without waiting again
        let mut batch = vec![first];
        while let Ok(msg) = rx.try_recv() {
            batch.push(msg);
        }
        Ok(batch)
    }

    async fn discard_backlog(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}
