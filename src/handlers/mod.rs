use crate::commands::{HELP, OperatorCommand, parse_command};
use crate::models::{ChatMessage, ShowCommand};
use crate::render::ConsoleChart;
use crate::show::{CommandReport, ShowError, ShowStateMachine};
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedSender;

const HISTORY_LINES: usize = 20;

/// What the console loop should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue(Option<String>),
    Quit,
}

// Handle one line typed into the console: operator command or chat
pub async fn handle_line(machine: &mut ShowStateMachine, chat: &UnboundedSender<ChatMessage>, line: &str) -> Flow {
    let line = line.trim();
    if line.is_empty() {
        return Flow::Continue(None);
    }

    if line.starts_with('/') {
        return match parse_command(line) {
            Ok(OperatorCommand::Quit) => Flow::Quit,
            Ok(command) => Flow::Continue(Some(handle_command(machine, command).await)),
            Err(e) => Flow::Continue(Some(e.to_string())),
        };
    }

    let msg = parse_chat_line(line);
    debug!("Chat {}", msg.format());
    if chat.send(msg).is_err() {
        warn!("Chat feed is closed, dropping message");
        return Flow::Continue(Some("chat feed is closed".to_string()));
    }
    Flow::Continue(None)
}

pub async fn handle_command(machine: &mut ShowStateMachine, command: OperatorCommand) -> String {
    info!("Received operator command: {:?}", command);
    let result = match command {
        OperatorCommand::Show(ShowCommand::Start) => machine.start().await,
        OperatorCommand::Show(ShowCommand::Stop) => machine.stop().await,
        OperatorCommand::Show(ShowCommand::StageWinner) => machine.stage_winner().await,
        OperatorCommand::Show(ShowCommand::OpenCase) => machine.open_case().await,
        OperatorCommand::Show(ShowCommand::ResetToSelection) => machine.reset_to_selection().await,
        OperatorCommand::Toggle { case, active } => machine.toggle_case(&case, active).await,
        OperatorCommand::Status => return status(machine),
        OperatorCommand::History => return history(machine),
        OperatorCommand::Help => return HELP.to_string(),
        OperatorCommand::Quit => return "bye".to_string(),
    };
    describe(machine, result)
}

fn describe(machine: &ShowStateMachine, result: Result<CommandReport, ShowError>) -> String {
    let report = match result {
        Ok(report) => report,
        Err(e) => return format!("ignored: {}", e),
    };

    let mut out = if report.from == report.to {
        format!("ok ({})", report.to)
    } else {
        format!("{} -> {}", report.from, report.to)
    };
    if let Some(case) = machine.staged_case() {
        out.push_str(&format!(", staged case {}", case));
    }
    if !report.is_clean() {
        out.push_str("\nscene commands failed, re-run the command to retry:");
        for failure in &report.failures {
            out.push_str(&format!("\n  - {}", failure));
        }
    }
    out
}

fn status(machine: &ShowStateMachine) -> String {
    let mut out = format!(
        "state: {}\nactive cases: {}",
        machine.state(),
        machine.active_cases().join(", ")
    );
    if let Some(case) = machine.staged_case() {
        out.push_str(&format!("\nstaged: {}", case));
    }
    if let (Some(round_id), Some(votes)) = (machine.round_id(), machine.votes()) {
        out.push_str(&format!("\nround {}:\n{}", round_id, ConsoleChart::render(&votes)));
    }
    out
}

fn history(machine: &ShowStateMachine) -> String {
    let messages = machine.chat_history();
    if messages.is_empty() {
        return "no chat this round".to_string();
    }
    let skip = messages.len().saturating_sub(HISTORY_LINES);
    messages[skip..].iter().map(|m| m.format()).collect::<Vec<_>>().join("\n")
}

// "author: text", or just text from an anonymous viewer
fn parse_chat_line(line: &str) -> ChatMessage {
    match line.split_once(':') {
        Some((author, text)) if !author.trim().is_empty() && !author.contains(' ') => {
            ChatMessage::new(author.trim(), text.trim())
        }
        _ => ChatMessage::new("anonymous", line),
    }
}
