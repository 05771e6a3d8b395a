use crate::models::ShowCommand;
use thiserror::Error;

pub const HELP: &str = "\
Operator commands:
  /start                 open voting for the active cases
  /stop                  close voting and clear the chart
  /stage                 stage the current leader in the opening scene
  /open                  open the staged case
  /reset                 retire the opened case and return to selection
  /toggle <case> on|off  put a case on or take it off the board
  /status                show round state and current totals
  /history               show the latest chat messages of this round
  /help                  show this help
  /quit                  exit
Any other line is treated as chat, written as `author: message`.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Show(ShowCommand),
    Toggle { case: String, active: bool },
    Status,
    History,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command /{0}, try /help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parses an operator line such as `/toggle 7 off`. The leading slash is
/// optional.
pub fn parse_command(line: &str) -> Result<OperatorCommand, CommandError> {
    let line = line.trim().trim_start_matches('/');
    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();

    let command = match name.as_str() {
        "start" => OperatorCommand::Show(ShowCommand::Start),
        "stop" => OperatorCommand::Show(ShowCommand::Stop),
        "stage" => OperatorCommand::Show(ShowCommand::StageWinner),
        "open" => OperatorCommand::Show(ShowCommand::OpenCase),
        "reset" => OperatorCommand::Show(ShowCommand::ResetToSelection),
        "status" => OperatorCommand::Status,
        "history" => OperatorCommand::History,
        "help" => OperatorCommand::Help,
        "quit" | "exit" => OperatorCommand::Quit,
        "toggle" => {
            const USAGE: &str = "/toggle <case> on|off";
            let case = parts.next().ok_or(CommandError::Usage(USAGE))?;
            let active = match parts.next().map(str::to_lowercase).as_deref() {
                Some("on") => true,
                Some("off") => false,
                _ => return Err(CommandError::Usage(USAGE)),
            };
            OperatorCommand::Toggle {
                case: case.to_string(),
                active,
            }
        }
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}
