pub mod ingest;
pub mod tally_tick;

use crate::chat::ChatSource;
use crate::render::{RenderSink, TallySnapshot};
use crate::voting::{MessageBuffer, VoteState};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use ingest::run_ingestion;
use tally_tick::{TallyContext, run_tally_ticks};

/// The two background tasks of one voting round.
pub struct VotingSession {
    round_id: Uuid,
    buffer: Arc<MessageBuffer>,
    ingest_stop: watch::Sender<bool>,
    tally_stop: watch::Sender<bool>,
    ingest: JoinHandle<()>,
    tally: JoinHandle<VoteState>,
}

impl VotingSession {
    /// Spawns ingestion and tally ticking for a fresh round. The returned
    /// receiver always holds the latest published totals, and keeps the last
    /// ones after the session is gone.
    pub fn spawn(
        round_id: Uuid,
        options: Vec<String>,
        chat: Arc<dyn ChatSource>,
        sink: Arc<dyn RenderSink>,
        tick_interval: Duration,
        chat_poll_interval: Duration,
    ) -> (Self, watch::Receiver<TallySnapshot>) {
        let buffer = Arc::new(MessageBuffer::new());
        let (publish, latest) = watch::channel(TallySnapshot::new(round_id, VoteState::new(&options)));
        let (ingest_stop, ingest_stop_rx) = watch::channel(false);
        let (tally_stop, tally_stop_rx) = watch::channel(false);

        let ingest = tokio::spawn(run_ingestion(chat, Arc::clone(&buffer), chat_poll_interval, ingest_stop_rx));

        let ctx = TallyContext {
            round_id,
            options,
            buffer: Arc::clone(&buffer),
            sink,
            publish,
        };
        let tally = tokio::spawn(run_tally_ticks(ctx, tick_interval, tally_stop_rx));

        let session = Self {
            round_id,
            buffer,
            ingest_stop,
            tally_stop,
            ingest,
            tally,
        };
        (session, latest)
    }

    pub fn round_id(&self) -> Uuid {
        self.round_id
    }

    /// The round's buffer. It outlives the session, so the chat history can
    /// still be read after the round is halted.
    pub fn buffer(&self) -> Arc<MessageBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Stops ingestion first, then lets the tally loop flush what is left and
    /// finish its current tick. Returns the final totals if the tally task
    /// ended cleanly.
    pub async fn halt(self) -> Option<VoteState> {
        info!("Halting voting session for round {}", self.round_id);

        if self.ingest_stop.send(true).is_err() {
            debug!("Chat ingestion for round {} had already exited", self.round_id);
        }
        if let Err(e) = self.ingest.await {
            error!("Chat ingestion task for round {} failed: {}", self.round_id, e);
        }

        if self.tally_stop.send(true).is_err() {
            debug!("Tally task for round {} had already exited", self.round_id);
        }
        match self.tally.await {
            Ok(state) => Some(state),
            Err(e) => {
                error!("Tally task for round {} failed: {}", self.round_id, e);
                None
            }
        }
    }
}
