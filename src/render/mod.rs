use crate::voting::VoteState;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use uuid::Uuid;

/// Headroom above the leading bar so the chart doesn't rescale every vote
const CHART_HEADROOM: u64 = 10;

/// What a render sink receives after every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallySnapshot {
    pub round_id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub votes: VoteState,
}

impl TallySnapshot {
    pub fn new(round_id: Uuid, votes: VoteState) -> Self {
        Self {
            round_id,
            updated_at: Utc::now(),
            votes,
        }
    }
}

/// Receives tally updates. Called from the tally tick, so implementations
/// must return quickly.
pub trait RenderSink: Send + Sync {
    fn on_tally_updated(&self, snapshot: &TallySnapshot);

    /// Removes anything the sink persisted for the round.
    fn clear(&self) {}
}

/// Fans one update out to several sinks.
pub struct MultiSink {
    sinks: Vec<Box<dyn RenderSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn RenderSink>>) -> Self {
        Self { sinks }
    }
}

impl RenderSink for MultiSink {
    fn on_tally_updated(&self, snapshot: &TallySnapshot) {
        for sink in &self.sinks {
            sink.on_tally_updated(snapshot);
        }
    }

    fn clear(&self) {
        for sink in &self.sinks {
            sink.clear();
        }
    }
}

/// Logs a text bar chart, but only when the totals actually moved.
#[derive(Default)]
pub struct ConsoleChart {
    last_total: parking_lot::Mutex<Option<u64>>,
}

impl ConsoleChart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(votes: &VoteState) -> String {
        let width = votes.options().map(str::len).max().unwrap_or(0);
        let mut out = String::new();
        for count in votes.counts() {
            let bar = "#".repeat(count.votes.min(60) as usize);
            out.push_str(&format!("{:>width$} | {:<4} {}\n", count.option, count.votes, bar, width = width));
        }
        match votes.winner() {
            Some(leader) => out.push_str(&format!("leader: {}", leader)),
            None => out.push_str("no votes yet"),
        }
        out
    }
}

impl RenderSink for ConsoleChart {
    fn on_tally_updated(&self, snapshot: &TallySnapshot) {
        let total = snapshot.votes.total_votes();
        let mut last = self.last_total.lock();
        if *last == Some(total) {
            return;
        }
        *last = Some(total);
        info!("Case selection ({} votes)\n{}", total, Self::render(&snapshot.votes));
    }

    fn clear(&self) {
        *self.last_total.lock() = None;
    }
}

#[derive(Debug, Serialize)]
struct ChartArtifact<'a> {
    title: &'static str,
    y_max: u64,
    #[serde(flatten)]
    snapshot: &'a TallySnapshot,
}

/// Keeps the latest chart on disk as JSON for the stream overlay to pick up.
pub struct ChartFile {
    path: PathBuf,
}

impl ChartFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(test)]
impl ChartFile {
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl RenderSink for ChartFile {
    fn on_tally_updated(&self, snapshot: &TallySnapshot) {
        let artifact = ChartArtifact {
            title: "Case Selection",
            y_max: snapshot.votes.max_votes() + CHART_HEADROOM,
            snapshot,
        };
        let body = match serde_json::to_vec_pretty(&artifact) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to serialize chart for round {}: {}", snapshot.round_id, e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, body) {
            warn!("Failed to write chart to {}: {}", self.path.display(), e);
        }
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!("Removed chart {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove chart {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Remembers every snapshot it was handed.
    #[derive(Default)]
    pub struct RecordingSink {
        pub snapshots: parking_lot::Mutex<Vec<TallySnapshot>>,
        pub clears: AtomicUsize,
    }

    impl RecordingSink {
        pub fn last(&self) -> Option<TallySnapshot> {
            self.snapshots.lock().last().cloned()
        }

        pub fn clear_count(&self) -> usize {
            self.clears.load(Ordering::SeqCst)
        }
    }

    impl RenderSink for RecordingSink {
        fn on_tally_updated(&self, snapshot: &TallySnapshot) {
            self.snapshots.lock().push(snapshot.clone());
        }

        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }
}
