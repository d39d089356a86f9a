//! Console command parsing and submission
//!
//! Lines read from stdin are parsed into [`Command`]s and queued on a
//! [`CommandQueue`]. The session's dispatch task drains the queue in
//! submission order, between inbound messages.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use echat_net::{ConnectionHandle, NetError, ScheduleKind};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::session::ClientSession;

/// Parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `login <name>`
    Login(String),
    /// `enter <channel>`
    Enter(String),
    /// `chat <words...>`
    Chat(String),
    /// `leave`
    Leave,
    /// `quit`
    Quit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login(_) => "login",
            Command::Enter(_) => "enter",
            Command::Chat(_) => "chat",
            Command::Leave => "leave",
            Command::Quit => "quit",
        }
    }
}

/// Error parsing a console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    Unknown(String),
    MissingArgument(&'static str),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty command"),
            ParseError::Unknown(cmd) => write!(f, "unknown command: {}", cmd),
            ParseError::MissingArgument(cmd) => write!(f, "{} needs an argument", cmd),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse one console line
///
/// The first word selects the command. `chat` keeps the rest of the line
/// verbatim; `login` and `enter` take a single word.
pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };

    match name.to_lowercase().as_str() {
        "login" => first_word(rest, "login").map(Command::Login),
        "enter" => first_word(rest, "enter").map(Command::Enter),
        "chat" => {
            if rest.is_empty() {
                Err(ParseError::MissingArgument("chat"))
            } else {
                Ok(Command::Chat(rest.to_string()))
            }
        }
        "leave" => Ok(Command::Leave),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

fn first_word(args: &str, command: &'static str) -> Result<String, ParseError> {
    args.split_whitespace()
        .next()
        .map(String::from)
        .ok_or(ParseError::MissingArgument(command))
}

/// FIFO of console commands shared by the console and its session
///
/// Scheduler entries may fire in any order, so each entry only wakes the
/// session, which then drains every queued command in order.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Arc<Mutex<VecDeque<Command>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `command` and wake the session's dispatch task
    pub fn submit(
        &self,
        connection: &ConnectionHandle<ClientSession>,
        command: Command,
    ) -> Result<u64, NetError> {
        self.push(command);
        connection.schedule_task(
            Duration::ZERO,
            ScheduleKind::Once,
            Arc::new(|session: &mut ClientSession, _period: Duration, _at: Instant| {
                session.run_pending_commands();
            }),
        )
    }

    pub(crate) fn push(&self, command: Command) {
        self.pending.lock().push_back(command);
    }

    pub(crate) fn pop(&self) -> Option<Command> {
        self.pending.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
