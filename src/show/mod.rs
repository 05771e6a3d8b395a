//! Round lifecycle.
//!
//! ```text
//! Idle --start--> Voting --stage_winner--> WinnerStaged --open_case--> CaseOpened
//!  ^                |  ^                     |  (re-stage)                |
//!  |               stop +--------------------+                            |
//!  +--------------------------- reset_to_selection -----------------------+
//! ```
//!
//! Commands from the wrong state, or without what they need (no votes to
//! stage, nothing staged to open), change nothing and come back as a
//! [`ShowError`]. Scene-control failures never undo a transition; they are
//! logged and listed in the [`CommandReport`] so the operator can re-issue
//! the command.

use crate::broadcast::{BroadcastController, BroadcastError};
use crate::chat::ChatSource;
use crate::config::ShowConfig;
use crate::models::{ChatMessage, RoundState, ShowCommand};
use crate::render::{RenderSink, TallySnapshot};
use crate::tasks::VotingSession;
use crate::voting::{MessageBuffer, VoteState};
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShowError {
    #[error("cannot {command} while {state}")]
    IllegalTransition { command: ShowCommand, state: RoundState },
    #[error("no votes have been counted yet, there is no winner to stage")]
    NoWinner,
    #[error("no case is staged, stage a winner first")]
    NoStagedCase,
    #[error("unknown case {0}")]
    UnknownCase(String),
}

/// Result of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub from: RoundState,
    pub to: RoundState,
    pub failures: Vec<BroadcastError>,
}

impl CommandReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CaseFlag {
    case: String,
    active: bool,
}

pub struct ShowStateMachine {
    config: ShowConfig,
    broadcast: BroadcastController,
    chat: Arc<dyn ChatSource>,
    sink: Arc<dyn RenderSink>,
    state: RoundState,
    cases: Vec<CaseFlag>,
    session: Option<VotingSession>,
    latest: Option<watch::Receiver<TallySnapshot>>,
    round_chat: Option<Arc<MessageBuffer>>,
    staged: Option<String>,
}

impl ShowStateMachine {
    pub fn new(
        config: ShowConfig,
        broadcast: BroadcastController,
        chat: Arc<dyn ChatSource>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        let cases = config
            .cases
            .iter()
            .map(|case| CaseFlag {
                case: case.clone(),
                active: true,
            })
            .collect();
        Self {
            config,
            broadcast,
            chat,
            sink,
            state: RoundState::Idle,
            cases,
            session: None,
            latest: None,
            round_chat: None,
            staged: None,
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn staged_case(&self) -> Option<&str> {
        self.staged.as_deref()
    }

    /// Cases that will be on the ballot at the next `start`, in configured order.
    pub fn active_cases(&self) -> Vec<String> {
        self.cases.iter().filter(|c| c.active).map(|c| c.case.clone()).collect()
    }

    pub fn round_id(&self) -> Option<Uuid> {
        self.latest.as_ref().map(|rx| rx.borrow().round_id)
    }

    /// Latest published totals. May trail the tally loop by up to one tick.
    pub fn votes(&self) -> Option<VoteState> {
        self.latest.as_ref().map(|rx| rx.borrow().votes.clone())
    }

    pub fn current_winner(&self) -> Option<String> {
        self.latest
            .as_ref()
            .and_then(|rx| rx.borrow().votes.winner().map(str::to_string))
    }

    /// Chat seen by the current or most recent round. Kept after voting
    /// closes and replaced at the next `start`.
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.round_chat.as_ref().map(|b| b.history()).unwrap_or_default()
    }

    pub async fn start(&mut self) -> Result<CommandReport, ShowError> {
        self.require(ShowCommand::Start, &[RoundState::Idle])?;

        let options = self.active_cases();
        if options.is_empty() {
            warn!("Starting a round with no active cases, nobody can win it");
        }
        let round_id = Uuid::new_v4();
        info!("Starting round {} with cases [{}]", round_id, options.join(", "));

        let dropped = self.chat.discard_backlog().await;
        if dropped > 0 {
            info!("Dropped {} chat message(s) sent before voting opened", dropped);
        }

        let (session, latest) = VotingSession::spawn(
            round_id,
            options,
            Arc::clone(&self.chat),
            Arc::clone(&self.sink),
            self.config.tick_interval,
            self.config.chat_poll_interval,
        );
        self.round_chat = Some(session.buffer());
        self.session = Some(session);
        self.latest = Some(latest);
        self.staged = None;

        Ok(self.transition(RoundState::Voting, Vec::new()))
    }

    pub async fn stop(&mut self) -> Result<CommandReport, ShowError> {
        self.require(ShowCommand::Stop, &[RoundState::Voting])?;

        self.halt_session().await;
        self.sink.clear();

        Ok(self.transition(RoundState::Idle, Vec::new()))
    }

    pub async fn stage_winner(&mut self) -> Result<CommandReport, ShowError> {
        self.require(ShowCommand::StageWinner, &[RoundState::Voting, RoundState::WinnerStaged])?;
        let winner = self.current_winner().ok_or_else(|| {
            warn!("Cannot stage a winner: no votes counted yet");
            ShowError::NoWinner
        })?;
        let votes = self.votes().unwrap_or_default();
        info!(
            "Staging case {} with {} of {} vote(s)",
            winner,
            votes.get(&winner).unwrap_or(0),
            votes.total_votes()
        );

        let names = &self.config.scenes;
        let mut failures = Vec::new();
        record(&mut failures, self.broadcast.disable_all_sources(&names.opening_scene).await);
        record(
            &mut failures,
            self.broadcast
                .set_source_enabled(&names.opening_scene, &names.opening_background, true)
                .await,
        );
        record(
            &mut failures,
            self.broadcast
                .set_source_enabled(&names.opening_scene, &names.staged_source_for(&winner), true)
                .await,
        );
        record(&mut failures, self.broadcast.switch_active_scene(&names.opening_scene).await);

        self.staged = Some(winner);
        Ok(self.transition(RoundState::WinnerStaged, failures))
    }

    pub async fn open_case(&mut self) -> Result<CommandReport, ShowError> {
        match self.state {
            RoundState::WinnerStaged => {}
            RoundState::CaseOpened => {
                return Err(self.reject(ShowError::IllegalTransition {
                    command: ShowCommand::OpenCase,
                    state: self.state,
                }));
            }
            RoundState::Idle | RoundState::Voting => return Err(self.reject(ShowError::NoStagedCase)),
        }
        let Some(case) = self.staged.clone() else {
            return Err(self.reject(ShowError::NoStagedCase));
        };
        info!("Opening case {}", case);

        // the vote is settled once the case is open
        self.halt_session().await;

        let names = &self.config.scenes;
        let mut failures = Vec::new();
        record(
            &mut failures,
            self.broadcast
                .set_source_enabled(&names.opening_scene, &names.staged_source_for(&case), false)
                .await,
        );
        record(
            &mut failures,
            self.broadcast
                .set_source_enabled(&names.opening_scene, &names.open_source_for(&case), true)
                .await,
        );

        Ok(self.transition(RoundState::CaseOpened, failures))
    }

    /// Back to the selection board. The opened case leaves the board and the
    /// ballot; the last round's totals stay readable until the next `start`.
    pub async fn reset_to_selection(&mut self) -> Result<CommandReport, ShowError> {
        self.require(
            ShowCommand::ResetToSelection,
            &[RoundState::CaseOpened, RoundState::WinnerStaged],
        )?;

        self.halt_session().await;

        let names = &self.config.scenes;
        let mut failures = Vec::new();
        if let Some(case) = self.staged.take() {
            info!("Retiring case {} from the selection board", case);
            record(
                &mut failures,
                self.broadcast
                    .set_source_enabled(&names.selection_scene, &names.selection_source_for(&case), false)
                    .await,
            );
            if let Some(flag) = self.cases.iter_mut().find(|c| c.case == case) {
                flag.active = false;
            }
        }
        record(&mut failures, self.broadcast.switch_active_scene(&names.selection_scene).await);

        Ok(self.transition(RoundState::Idle, failures))
    }

    /// Puts a case on or takes it off the selection board. Takes effect on the
    /// ballot at the next `start`.
    pub async fn toggle_case(&mut self, case: &str, active: bool) -> Result<CommandReport, ShowError> {
        let Some(idx) = self.cases.iter().position(|c| c.case == case) else {
            return Err(self.reject(ShowError::UnknownCase(case.to_string())));
        };
        self.cases[idx].active = active;
        info!("Case {} is now {}", case, if active { "active" } else { "inactive" });

        let names = &self.config.scenes;
        let mut failures = Vec::new();
        record(
            &mut failures,
            self.broadcast
                .set_source_enabled(&names.selection_scene, &names.selection_source_for(case), active)
                .await,
        );
        Ok(CommandReport {
            from: self.state,
            to: self.state,
            failures,
        })
    }

    /// Stops any running round tasks. Used when the controller exits.
    pub async fn shutdown(&mut self) {
        self.halt_session().await;
    }

    async fn halt_session(&mut self) {
        if let Some(session) = self.session.take() {
            let round_id = session.round_id();
            match session.halt().await {
                Some(final_votes) => info!(
                    "Round {} closed with {} vote(s), leader {}",
                    round_id,
                    final_votes.total_votes(),
                    final_votes.winner().unwrap_or("none")
                ),
                None => error!("Round {} closed without final totals", round_id),
            }
        }
    }

    fn require(&self, command: ShowCommand, allowed: &[RoundState]) -> Result<(), ShowError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.reject(ShowError::IllegalTransition {
                command,
                state: self.state,
            }))
        }
    }

    fn reject(&self, err: ShowError) -> ShowError {
        warn!("Ignoring command: {}", err);
        err
    }

    fn transition(&mut self, to: RoundState, failures: Vec<BroadcastError>) -> CommandReport {
        let from = self.state;
        self.state = to;
        if failures.is_empty() {
            info!("Round state {} -> {}", from, to);
        } else {
            warn!(
                "Round state {} -> {} with {} scene command(s) failed",
                from,
                to,
                failures.len()
            );
        }
        CommandReport { from, to, failures }
    }
}

fn record(failures: &mut Vec<BroadcastError>, result: Result<(), BroadcastError>) {
    if let Err(e) = result {
        error!("Scene command failed: {}", e);
        failures.push(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::SceneBoard;
    use crate::chat::ChannelChat;
    use crate::chat::testing::ScriptedChat;
    use crate::config::test_config;
    use crate::render::testing::RecordingSink;
    use std::time::Duration;

    const SELECTION: &str = "Case Selection";
    const OPENING: &str = "Case Opening";

    struct Rig {
        machine: ShowStateMachine,
        board: Arc<SceneBoard>,
        chat: Arc<ScriptedChat>,
        sink: Arc<RecordingSink>,
    }

    fn rig(cases: &[&str]) -> Rig {
        let config = test_config(cases);
        let board = Arc::new(SceneBoard::from_config(&config));
        let chat = Arc::new(ScriptedChat::new(Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let machine = ShowStateMachine::new(
            config,
            BroadcastController::new(board.clone()),
            chat.clone(),
            sink.clone(),
        );
        Rig {
            machine,
            board,
            chat,
            sink,
        }
    }

    async fn wait_for_votes(machine: &ShowStateMachine, total: u64) {
        for _ in 0..400 {
            if machine.votes().is_some_and(|v| v.total_votes() >= total) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("votes never reached {}", total);
    }

    #[tokio::test]
    async fn stage_from_idle_is_ignored() {
        let mut rig = rig(&["a", "b"]);
        let err = rig.machine.stage_winner().await.unwrap_err();
        assert_eq!(
            err,
            ShowError::IllegalTransition {
                command: ShowCommand::StageWinner,
                state: RoundState::Idle
            }
        );
        assert_eq!(rig.machine.state(), RoundState::Idle);
        assert!(rig.board.commands().is_empty());
    }

    #[tokio::test]
    async fn open_before_stage_is_ignored() {
        let mut rig = rig(&["a", "b"]);
        assert_eq!(rig.machine.open_case().await, Err(ShowError::NoStagedCase));

        rig.machine.start().await.unwrap();
        assert_eq!(rig.machine.open_case().await, Err(ShowError::NoStagedCase));
        assert_eq!(rig.machine.state(), RoundState::Voting);
        assert!(rig.board.commands().is_empty());
        rig.machine.shutdown().await;
    }

    #[tokio::test]
    async fn stage_without_votes_is_ignored() {
        let mut rig = rig(&["a", "b"]);
        rig.machine.start().await.unwrap();
        assert_eq!(rig.machine.stage_winner().await, Err(ShowError::NoWinner));
        assert_eq!(rig.machine.state(), RoundState::Voting);
        assert_eq!(rig.machine.staged_case(), None);
        rig.machine.shutdown().await;
    }

    #[tokio::test]
    async fn start_and_stop_are_state_checked() {
        let mut rig = rig(&["a"]);
        assert!(matches!(
            rig.machine.stop().await,
            Err(ShowError::IllegalTransition { command: ShowCommand::Stop, .. })
        ));

        let report = rig.machine.start().await.unwrap();
        assert_eq!((report.from, report.to), (RoundState::Idle, RoundState::Voting));
        assert!(matches!(
            rig.machine.start().await,
            Err(ShowError::IllegalTransition { command: ShowCommand::Start, .. })
        ));

        let report = rig.machine.stop().await.unwrap();
        assert_eq!(report.to, RoundState::Idle);
        assert_eq!(rig.sink.clear_count(), 1);
        assert!(rig.machine.votes().is_some());
    }

    #[tokio::test]
    async fn full_round_drives_the_board() {
        let mut rig = rig(&["a", "b", "c"]);
        rig.machine.start().await.unwrap();
        let first_round = rig.machine.round_id();
        assert_eq!(rig.machine.votes().map(|v| v.total_votes()), Some(0));

        rig.chat.push(&["vote a", "go b!", "a all the way"]);
        wait_for_votes(&rig.machine, 3).await;
        assert_eq!(rig.machine.current_winner().as_deref(), Some("a"));
        assert!(!rig.machine.chat_history().is_empty());

        let report = rig.machine.stage_winner().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(rig.machine.state(), RoundState::WinnerStaged);
        assert_eq!(rig.machine.staged_case(), Some("a"));
        assert_eq!(rig.board.enabled_sources(OPENING), vec!["Background", "a Staged"]);
        assert_eq!(rig.board.active_scene().as_deref(), Some(OPENING));

        let report = rig.machine.open_case().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(rig.machine.state(), RoundState::CaseOpened);
        assert_eq!(rig.board.enabled_sources(OPENING), vec!["Background", "a Open"]);

        let report = rig.machine.reset_to_selection().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(rig.machine.state(), RoundState::Idle);
        assert_eq!(rig.machine.staged_case(), None);
        assert_eq!(rig.board.active_scene().as_deref(), Some(SELECTION));
        assert_eq!(rig.board.enabled_sources(SELECTION), vec!["b", "c"]);
        assert_eq!(rig.machine.active_cases(), vec!["b", "c"]);

        // totals survive the reset until the next round starts
        let kept = rig.machine.votes().unwrap();
        assert_eq!(kept.get("a"), Some(2));
        assert_eq!(kept.get("b"), Some(1));

        rig.machine.start().await.unwrap();
        assert_ne!(rig.machine.round_id(), first_round);
        let fresh = rig.machine.votes().unwrap();
        assert_eq!(fresh.options().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(fresh.total_votes(), 0);
        rig.machine.shutdown().await;
    }

    #[tokio::test]
    async fn restaging_follows_the_new_leader() {
        let mut rig = rig(&["a", "b"]);
        rig.machine.start().await.unwrap();
        rig.chat.push(&["a"]);
        wait_for_votes(&rig.machine, 1).await;
        rig.machine.stage_winner().await.unwrap();
        assert_eq!(rig.machine.staged_case(), Some("a"));

        rig.chat.push(&["b", "b!", "bb"]);
        wait_for_votes(&rig.machine, 4).await;
        rig.machine.stage_winner().await.unwrap();
        assert_eq!(rig.machine.staged_case(), Some("b"));
        assert_eq!(rig.board.enabled_sources(OPENING), vec!["Background", "b Staged"]);
        rig.machine.shutdown().await;
    }

    #[tokio::test]
    async fn scene_failures_do_not_block_transitions() {
        let mut rig = rig(&["a", "b"]);
        rig.machine.start().await.unwrap();
        rig.chat.push(&["b wins"]);
        wait_for_votes(&rig.machine, 1).await;

        rig.board.set_online(false);
        let report = rig.machine.stage_winner().await.unwrap();
        assert_eq!(report.to, RoundState::WinnerStaged);
        assert_eq!(report.failures.len(), 4);
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f, BroadcastError::Unreachable(_))));

        // operator retries once the switcher is back
        rig.board.set_online(true);
        let report = rig.machine.stage_winner().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(rig.board.enabled_sources(OPENING), vec!["Background", "b Staged"]);
        rig.machine.shutdown().await;
    }

    #[tokio::test]
    async fn chat_sent_while_idle_is_not_counted() {
        let config = test_config(&["a", "b"]);
        let board = Arc::new(SceneBoard::from_config(&config));
        let (tx, chat) = ChannelChat::new(config.chat_poll_interval);
        let mut machine = ShowStateMachine::new(
            config,
            BroadcastController::new(board),
            Arc::new(chat),
            Arc::new(RecordingSink::default()),
        );

        for _ in 0..5 {
            tx.send(ChatMessage::new("early", "a")).unwrap();
        }
        machine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(machine.votes().and_then(|v| v.get("a")), Some(0));
        assert!(machine.chat_history().is_empty());

        tx.send(ChatMessage::new("fan", "b")).unwrap();
        wait_for_votes(&machine, 1).await;
        assert_eq!(machine.current_winner().as_deref(), Some("b"));
        machine.shutdown().await;
    }

    #[tokio::test]
    async fn chat_history_outlives_the_round() {
        let mut rig = rig(&["a", "b"]);
        rig.machine.start().await.unwrap();
        rig.chat.push(&["a please", "b"]);
        wait_for_votes(&rig.machine, 2).await;

        rig.machine.stop().await.unwrap();
        let texts: Vec<String> = rig.machine.chat_history().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["a please", "b"]);

        rig.machine.start().await.unwrap();
        assert!(rig.machine.chat_history().is_empty());
        rig.chat.push(&["a"]);
        wait_for_votes(&rig.machine, 1).await;
        rig.machine.stage_winner().await.unwrap();
        rig.machine.reset_to_selection().await.unwrap();
        assert_eq!(rig.machine.chat_history().len(), 1);
    }

    #[tokio::test]
    async fn toggled_cases_leave_the_ballot() {
        let mut rig = rig(&["a", "b", "c"]);
        assert_eq!(
            rig.machine.toggle_case("z", false).await,
            Err(ShowError::UnknownCase("z".to_string()))
        );

        let report = rig.machine.toggle_case("b", false).await.unwrap();
        assert_eq!((report.from, report.to), (RoundState::Idle, RoundState::Idle));
        assert_eq!(rig.board.is_enabled(SELECTION, "b"), Some(false));
        assert_eq!(rig.machine.active_cases(), vec!["a", "c"]);

        rig.machine.start().await.unwrap();
        rig.chat.push(&["b b b", "c"]);
        wait_for_votes(&rig.machine, 1).await;
        let votes = rig.machine.votes().unwrap();
        assert_eq!(votes.get("b"), None);
        assert_eq!(rig.machine.current_winner().as_deref(), Some("c"));
        rig.machine.shutdown().await;
    }
}
