use crate::render::{RenderSink, TallySnapshot};
use crate::voting::{MessageBuffer, VoteState, tally};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use uuid::Uuid;

/// Everything one round's tally loop works with.
pub struct TallyContext {
    pub round_id: Uuid,
    pub options: Vec<String>,
    pub buffer: Arc<MessageBuffer>,
    pub sink: Arc<dyn RenderSink>,
    pub publish: watch::Sender<TallySnapshot>,
}

/// One tick: drain, count, add to the totals, publish, render.
pub fn tally_tick(ctx: &TallyContext, state: &mut VoteState) {
    let messages = ctx.buffer.drain();
    if !messages.is_empty() {
        let delta = tally(&messages, &ctx.options);
        debug!(
            "Round {}: {} message(s) -> {} vote(s)",
            ctx.round_id,
            messages.len(),
            delta.values().sum::<u64>()
        );
        state.apply(&delta);
    }

    let snapshot = TallySnapshot::new(ctx.round_id, state.clone());
    ctx.publish.send_replace(snapshot.clone());
    ctx.sink.on_tally_updated(&snapshot);
}

/// Ticks until stopped, then runs one last tick so nothing left in the
/// buffer goes uncounted. Returns the final totals.
///
/// This task is the only writer of the round's totals.
pub async fn run_tally_ticks(ctx: TallyContext, period: Duration, mut stop: watch::Receiver<bool>) -> VoteState {
    info!("Starting tally ticks for round {} every {:?}", ctx.round_id, period);
    let mut state = VoteState::new(&ctx.options);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => tally_tick(&ctx, &mut state),
            _ = stop.changed() => break,
        }
    }

    tally_tick(&ctx, &mut state);
    info!("Tally stopped for round {} with {} vote(s)", ctx.round_id, state.total_votes());
    state
}
