use std::io::BufRead;

use clb_core::{CallId, Command, RadioState, TelephonyController};
use log::{debug, info, warn};
use telephony_host::{HostEngine, HostRadio};
use thiserror::Error;

use crate::messages::{DispatchEvent, DispatchSender, ShutdownSender};
use crate::tasks::task::{AppTask, TaskMeta};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("`{command}` needs a {arg}")]
    MissingArgument {
        command: &'static str,
        arg: &'static str,
    },
    #[error("invalid call id `{0}`")]
    InvalidCallId(String),
    #[error("invalid radio state `{0}` (idle, ringing, offhook)")]
    InvalidRadioState(String),
}

/// One line typed on the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    Incoming { peer: String },
    Transfer { replaces: CallId, peer: String },
    Answer(CallId),
    EarlyMedia(CallId),
    Pause(CallId),
    Resume(CallId),
    RemoteUpdate(CallId),
    RemoteEnd(CallId),
    Fail { call: CallId, reason: String },
    Radio(RadioState),
    Bridge(Command),
    Login,
    List,
    Report,
    Quit,
}

pub fn parse_line(line: &str) -> Result<Option<ConsoleAction>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };

    let action = match command {
        "incoming" => ConsoleAction::Incoming {
            peer: required(words.next(), "incoming", "peer address")?.to_string(),
        },
        "transfer" => {
            let replaces = call_id(words.next(), "transfer")?;
            let peer = required(words.next(), "transfer", "peer address")?.to_string();
            ConsoleAction::Transfer { replaces, peer }
        }
        "answer" => ConsoleAction::Answer(call_id(words.next(), "answer")?),
        "early" => ConsoleAction::EarlyMedia(call_id(words.next(), "early")?),
        "pause" => ConsoleAction::Pause(call_id(words.next(), "pause")?),
        "resume" => ConsoleAction::Resume(call_id(words.next(), "resume")?),
        "update" => ConsoleAction::RemoteUpdate(call_id(words.next(), "update")?),
        "end" => ConsoleAction::RemoteEnd(call_id(words.next(), "end")?),
        "fail" => {
            let call = call_id(words.next(), "fail")?;
            let reason = words.collect::<Vec<_>>().join(" ");
            ConsoleAction::Fail {
                call,
                reason: if reason.is_empty() {
                    "Call failed".to_string()
                } else {
                    reason
                },
            }
        }
        "cell" => {
            let state = required(words.next(), "cell", "radio state")?;
            ConsoleAction::Radio(match state {
                "idle" => RadioState::Idle,
                "ringing" => RadioState::Ringing,
                "offhook" => RadioState::OffHook,
                other => return Err(ParseError::InvalidRadioState(other.to_string())),
            })
        }
        "dial" => ConsoleAction::Bridge(Command::Dial {
            uri: required(words.next(), "dial", "uri")?.to_string(),
        }),
        "seturi" => ConsoleAction::Bridge(Command::SetCallUri {
            uri: required(words.next(), "seturi", "uri")?.to_string(),
        }),
        "hangup" => ConsoleAction::Bridge(Command::Hangup {
            uri: words.next().map(str::to_string),
        }),
        "logout" => ConsoleAction::Bridge(Command::Logout),
        "login" => ConsoleAction::Login,
        "list" => ConsoleAction::List,
        "status" => ConsoleAction::Report,
        "quit" | "exit" => ConsoleAction::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(action))
}

fn required<'a>(
    word: Option<&'a str>,
    command: &'static str,
    arg: &'static str,
) -> Result<&'a str, ParseError> {
    word.ok_or(ParseError::MissingArgument { command, arg })
}

fn call_id(word: Option<&str>, command: &'static str) -> Result<CallId, ParseError> {
    let word = required(word, command, "call id")?;
    word.trim_start_matches('#')
        .parse()
        .map(CallId)
        .map_err(|_| ParseError::InvalidCallId(word.to_string()))
}

/// Drives the simulated engine and radio from stdin and forwards bridge
/// commands to the dispatch task.
pub struct ConsoleTask {
    engine: HostEngine,
    radio: HostRadio,
    dispatch_tx: DispatchSender,
    shutdown_tx: ShutdownSender,
}

impl AppTask for ConsoleTask {
    fn into_runner(mut self: Box<Self>) -> Box<dyn FnOnce() + Send + 'static> {
        Box::new(move || {
            self.run();
        })
    }

    fn meta(&self) -> TaskMeta {
        TaskMeta {
            name: "console",
            stack_bytes: None,
        }
    }
}

impl ConsoleTask {
    pub fn new(
        engine: HostEngine,
        radio: HostRadio,
        dispatch_tx: DispatchSender,
        shutdown_tx: ShutdownSender,
    ) -> Self {
        Self {
            engine,
            radio,
            dispatch_tx,
            shutdown_tx,
        }
    }

    fn run(&mut self) {
        info!("console_task: ready, type `quit` to exit");
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("console_task: stdin read failed: {}", e);
                    break;
                }
            };

            match parse_line(&line) {
                Ok(Some(ConsoleAction::Quit)) => break,
                Ok(Some(action)) => self.apply(action),
                Ok(None) => {}
                Err(e) => warn!("console_task: {}", e),
            }
        }

        info!("console_task: input closed; shutting down");
        let _ = self.shutdown_tx.send(());
    }

    fn apply(&mut self, action: ConsoleAction) {
        debug!("console_task: {:?}", action);
        let result = match action {
            ConsoleAction::Incoming { peer } => self.engine.incoming(&peer).map(|_| ()),
            ConsoleAction::Transfer { replaces, peer } => {
                self.engine.incoming_replacing(replaces, &peer).map(|_| ())
            }
            ConsoleAction::Answer(id) => self.engine.answer(id),
            ConsoleAction::EarlyMedia(id) => self.engine.early_media(id),
            ConsoleAction::Pause(id) => self.engine.pause(id),
            ConsoleAction::Resume(id) => self.engine.resume(id),
            ConsoleAction::RemoteUpdate(id) => self.engine.remote_update(id),
            ConsoleAction::RemoteEnd(id) => self.engine.remote_end(id),
            ConsoleAction::Fail { call, reason } => self.engine.fail(call, &reason),
            ConsoleAction::Radio(state) => {
                self.radio.set_state(state);
                Ok(())
            }
            ConsoleAction::Bridge(cmd) => {
                self.send(DispatchEvent::Command(cmd));
                Ok(())
            }
            ConsoleAction::Login => {
                self.send(DispatchEvent::Resubscribe);
                Ok(())
            }
            ConsoleAction::List => self.list(),
            ConsoleAction::Report => {
                self.send(DispatchEvent::Report);
                Ok(())
            }
            ConsoleAction::Quit => Ok(()),
        };

        if let Err(e) = result {
            warn!("console_task: {}", e);
        }
    }

    fn list(&self) -> clb_core::Result<()> {
        let current = self.engine.current_call()?.map(|c| c.id);
        for call in self.engine.calls()? {
            let marker = if Some(call.id) == current { "*" } else { " " };
            info!(
                "console_task: {}{} {:?} {:?} {}",
                marker, call.id, call.direction, call.state, call.peer_address
            );
        }
        Ok(())
    }

    fn send(&self, event: DispatchEvent) {
        if self.dispatch_tx.send(event).is_err() {
            warn!("console_task: dispatch channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn parses_engine_actions() {
        assert_eq!(
            parse_line("incoming sip:alice@pbx"),
            Ok(Some(ConsoleAction::Incoming {
                peer: "sip:alice@pbx".into()
            }))
        );
        assert_eq!(parse_line("answer #3"), Ok(Some(ConsoleAction::Answer(CallId(3)))));
        assert_eq!(
            parse_line("transfer 2 sip:carol@pbx"),
            Ok(Some(ConsoleAction::Transfer {
                replaces: CallId(2),
                peer: "sip:carol@pbx".into()
            }))
        );
        assert_eq!(
            parse_line("fail 4 Busy here"),
            Ok(Some(ConsoleAction::Fail {
                call: CallId(4),
                reason: "Busy here".into()
            }))
        );
    }

    #[test]
    fn parses_bridge_commands() {
        assert_eq!(
            parse_line("hangup"),
            Ok(Some(ConsoleAction::Bridge(Command::Hangup { uri: None })))
        );
        assert_eq!(
            parse_line("hangup clbsessionid9@pbx"),
            Ok(Some(ConsoleAction::Bridge(Command::Hangup {
                uri: Some("clbsessionid9@pbx".into())
            })))
        );
        assert_eq!(
            parse_line("cell offhook"),
            Ok(Some(ConsoleAction::Radio(RadioState::OffHook)))
        );
        assert_eq!(parse_line("login"), Ok(Some(ConsoleAction::Login)));
        assert_eq!(parse_line("status"), Ok(Some(ConsoleAction::Report)));
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(
            parse_line("frobnicate"),
            Err(ParseError::UnknownCommand("frobnicate".into()))
        );
        assert_eq!(
            parse_line("answer"),
            Err(ParseError::MissingArgument {
                command: "answer",
                arg: "call id"
            })
        );
        assert_eq!(
            parse_line("pause abc"),
            Err(ParseError::InvalidCallId("abc".into()))
        );
        assert_eq!(
            parse_line("cell busy"),
            Err(ParseError::InvalidRadioState("busy".into()))
        );
    }
}
