//! Events surfaced to the console

use std::fmt;

use echat_protocol::{ChatContent, ResultCode};

/// Something the user should see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    LoggedIn {
        username: String,
    },
    LoginFailed(ResultCode),
    EnteredChannel {
        channel: String,
        users: Vec<String>,
        history: Vec<ChatContent>,
    },
    EnterFailed(ResultCode),
    Chat {
        username: String,
        message: String,
    },
    LeftChannel,
    UserEntered(String),
    UserLeft(String),
    /// A command that the current state does not accept
    Rejected {
        command: &'static str,
        state: &'static str,
    },
    Disconnected,
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientEvent::LoggedIn { username } => write!(f, "logged in as {}", username),
            ClientEvent::LoginFailed(code) => write!(f, "login failed: {:?}", code),
            ClientEvent::EnteredChannel {
                channel,
                users,
                history,
            } => {
                write!(f, "entered #{} ({})", channel, users.join(", "))?;
                for line in history {
                    write!(f, "\n  {}: {}", line.user, line.words)?;
                }
                Ok(())
            }
            ClientEvent::EnterFailed(code) => write!(f, "enter failed: {:?}", code),
            ClientEvent::Chat { username, message } => write!(f, "{}: {}", username, message),
            ClientEvent::LeftChannel => write!(f, "left channel"),
            ClientEvent::UserEntered(name) => write!(f, "* {} entered", name),
            ClientEvent::UserLeft(name) => write!(f, "* {} left", name),
            ClientEvent::Rejected { command, state } => {
                write!(f, "'{}' is not available in {}", command, state)
            }
            ClientEvent::Disconnected => write!(f, "disconnected"),
        }
    }
}
