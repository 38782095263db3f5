//! Line-based operator console
//!
//! Commands arrive one line at a time from a stdin reader thread. Deleting a
//! slot and resetting the session ask for a `y` confirmation first.

use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::warn;

use crate::preferences::PreferenceKey;

pub(crate) const HELP: &str = "\
Commands:
  c, capture          capture the live frame into the next empty slot
  d N, delete N       clear slot N (asks for confirmation)
  r, reset            abandon the session and scan for a new unit (asks for confirmation)
  e, export           generate the report for the current session now
  s, status           show the capture grid
  i CODE, id CODE     identify the unit by hand instead of scanning
  set KEY [VALUE]     set or clear inspector, model, email, storage or profile
  h, help             show this help
  q, quit             exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Capture,
    /// 0-based slot index
    Delete(usize),
    Reset,
    Export,
    Status,
    Identify(String),
    Set(PreferenceKey, Option<String>),
    Help,
    Quit,
}

/// Result of feeding one line to the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Input {
    Run(Command),
    /// Awaiting confirmation; show the prompt
    Confirm(String),
    Cancelled,
    Invalid(String),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Delete(usize),
    Reset,
}

#[derive(Debug, Default)]
pub(crate) struct ConsoleParser {
    pending: Option<Pending>,
}

impl ConsoleParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> Input {
        let line = line.trim();

        if let Some(pending) = self.pending.take() {
            return if matches!(line.to_ascii_lowercase().as_str(), "y" | "yes") {
                Input::Run(match pending {
                    Pending::Delete(index) => Command::Delete(index),
                    Pending::Reset => Command::Reset,
                })
            } else {
                Input::Cancelled
            };
        }

        if line.is_empty() {
            return Input::Empty;
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "c" | "capture" => Input::Run(Command::Capture),
            "e" | "export" => Input::Run(Command::Export),
            "s" | "status" => Input::Run(Command::Status),
            "h" | "help" | "?" => Input::Run(Command::Help),
            "q" | "quit" | "exit" => Input::Run(Command::Quit),
            "r" | "reset" => {
                self.pending = Some(Pending::Reset);
                Input::Confirm("Start a new session? Captured images stay on disk. [y/N]".into())
            }
            "d" | "delete" => match rest.parse::<usize>() {
                Ok(0) | Err(_) => Input::Invalid("Usage: delete N (slot numbers start at 1)".into()),
                Ok(number) => {
                    self.pending = Some(Pending::Delete(number - 1));
                    Input::Confirm(format!("Delete slot {}? [y/N]", number))
                }
            },
            "i" | "id" => {
                if rest.is_empty() {
                    Input::Invalid("Usage: id CODE".into())
                } else {
                    Input::Run(Command::Identify(rest.to_string()))
                }
            }
            "set" => {
                let (key, value) = match rest.split_once(char::is_whitespace) {
                    Some((key, value)) => (key, Some(value.trim().to_string())),
                    None => (rest, None),
                };
                match key.parse::<PreferenceKey>() {
                    Ok(key) => Input::Run(Command::Set(key, value)),
                    Err(e) => Input::Invalid(e.to_string()),
                }
            }
            other => Input::Invalid(format!("Unknown command '{}' (type 'help')", other)),
        }
    }
}

/// Forward stdin lines to the controller task.
///
/// Runs on a detached thread since reads block; it ends when stdin closes or
/// the receiver is dropped.
pub(crate) fn spawn_stdin_reader(tx: mpsc::Sender<String>) {
    let spawned = std::thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        });

    if let Err(e) = spawned {
        warn!("Console input unavailable: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        let mut parser = ConsoleParser::new();
        assert_eq!(parser.feed("c"), Input::Run(Command::Capture));
        assert_eq!(parser.feed("  CAPTURE "), Input::Run(Command::Capture));
        assert_eq!(parser.feed("s"), Input::Run(Command::Status));
        assert_eq!(parser.feed("export"), Input::Run(Command::Export));
        assert_eq!(parser.feed("q"), Input::Run(Command::Quit));
        assert_eq!(parser.feed(""), Input::Empty);
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let mut parser = ConsoleParser::new();
        assert!(matches!(parser.feed("d 3"), Input::Confirm(_)));
        assert_eq!(parser.feed("y"), Input::Run(Command::Delete(2)));
        assert!(matches!(parser.feed("y"), Input::Invalid(_)));
    }

    #[test]
    fn test_anything_but_yes_cancels() {
        let mut parser = ConsoleParser::new();
        assert!(matches!(parser.feed("delete 1"), Input::Confirm(_)));
        assert_eq!(parser.feed("c"), Input::Cancelled);
        // The cancelled answer is not run as a command
        assert_eq!(parser.feed("s"), Input::Run(Command::Status));

        assert!(matches!(parser.feed("r"), Input::Confirm(_)));
        assert_eq!(parser.feed(""), Input::Cancelled);
        assert!(matches!(parser.feed("reset"), Input::Confirm(_)));
        assert_eq!(parser.feed("YES"), Input::Run(Command::Reset));
    }

    #[test]
    fn test_delete_validation() {
        let mut parser = ConsoleParser::new();
        assert!(matches!(parser.feed("d"), Input::Invalid(_)));
        assert!(matches!(parser.feed("d 0"), Input::Invalid(_)));
        assert!(matches!(parser.feed("d two"), Input::Invalid(_)));
        assert_eq!(parser.feed("s"), Input::Run(Command::Status));
    }

    #[test]
    fn test_identify_and_set() {
        let mut parser = ConsoleParser::new();
        assert_eq!(
            parser.feed("id SK 0042"),
            Input::Run(Command::Identify("SK 0042".into()))
        );
        assert!(matches!(parser.feed("i"), Input::Invalid(_)));
        assert_eq!(
            parser.feed("set inspector Nguyen Van A"),
            Input::Run(Command::Set(
                PreferenceKey::Inspector,
                Some("Nguyen Van A".into())
            ))
        );
        assert_eq!(
            parser.feed("set email"),
            Input::Run(Command::Set(PreferenceKey::Email, None))
        );
        assert!(matches!(parser.feed("set colour red"), Input::Invalid(_)));
    }

    #[test]
    fn test_unknown_command() {
        let mut parser = ConsoleParser::new();
        assert!(matches!(parser.feed("zoom"), Input::Invalid(msg) if msg.contains("zoom")));
    }
}
