//! Shared user and channel registries

use std::collections::HashMap;
use std::sync::Arc;

use echat_net::ConnectionHandle;
use echat_protocol::{
    ChatResponse, EnterChannelResponse, LeaveChannelResponse, Payload, ResultCode, UserAction,
    UserActionNotify,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::channel::Channel;
use super::session::ServerSession;

/// World shared by every session; never lock it across an await
pub type SharedWorld = Arc<Mutex<ChatWorld>>;

/// A logged-in user
#[derive(Debug)]
pub struct User {
    name: String,
    connection: ConnectionHandle<ServerSession>,
    channel: Option<String>,
}

impl User {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection_id(&self) -> u32 {
        self.connection.id()
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn is_in_channel(&self) -> bool {
        self.channel.is_some()
    }
}

/// Users by name and channels by name
#[derive(Debug, Default)]
pub struct ChatWorld {
    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
}

impl ChatWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedWorld {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// Register a user name for a connection
    pub fn create_user(
        &mut self,
        name: &str,
        connection: ConnectionHandle<ServerSession>,
    ) -> ResultCode {
        if name.is_empty() {
            return ResultCode::Error;
        }
        if self.users.contains_key(name) {
            return ResultCode::DuplicatedName;
        }

        info!(username = name, connection_id = connection.id(), "user logged in");
        self.users.insert(
            name.to_string(),
            User {
                name: name.to_string(),
                connection,
                channel: None,
            },
        );
        ResultCode::Success
    }

    /// Drop a user, leaving their channel first
    pub fn remove_user(&mut self, name: &str) -> bool {
        self.leave_channel(name);
        let removed = self.users.remove(name).is_some();
        if removed {
            info!(username = name, "user logged out");
        }
        removed
    }

    /// Join `channel_name`, creating it on first use
    ///
    /// Existing members are notified before the newcomer is added; the
    /// newcomer then receives the member list and recent history.
    pub fn enter_channel(&mut self, name: &str, channel_name: &str) -> ResultCode {
        let ChatWorld { users, channels } = self;

        let Some(user) = users.get(name) else {
            return ResultCode::NotFoundUser;
        };
        if user.is_in_channel() {
            return ResultCode::AlreadyInChannel;
        }
        if channel_name.is_empty() {
            return ResultCode::Error;
        }

        let channel = channels.entry(channel_name.to_string()).or_insert_with(|| {
            info!(channel = channel_name, "channel created");
            Channel::new(channel_name)
        });
        if channel.is_member(name) {
            return ResultCode::Success;
        }

        broadcast(
            users,
            channel.members(),
            &UserActionNotify {
                action: UserAction::EnterChannel,
                username: name.to_string(),
            },
        );
        channel.add_member(name);

        let response = EnterChannelResponse {
            result: ResultCode::Success,
            channel_name: channel_name.to_string(),
            users: channel.members().map(String::from).collect(),
            contents: channel.history(),
        };
        if let Some(user) = users.get_mut(name) {
            user.channel = Some(channel_name.to_string());
            user.connection.send_message(&response);
        }

        debug!(username = name, channel = channel_name, members = channel.member_count(), "entered channel");
        ResultCode::Success
    }

    /// Leave the current channel, if any
    ///
    /// The leaver gets a response; remaining members get a notification.
    pub fn leave_channel(&mut self, name: &str) -> bool {
        let ChatWorld { users, channels } = self;

        let Some(user) = users.get_mut(name) else {
            return false;
        };
        let Some(channel_name) = user.channel.take() else {
            return false;
        };
        let Some(channel) = channels.get_mut(&channel_name) else {
            return false;
        };
        if !channel.remove_member(name) {
            return false;
        }

        user.connection.send_message(&LeaveChannelResponse {
            result: ResultCode::Success,
        });
        broadcast(
            users,
            channel.members(),
            &UserActionNotify {
                action: UserAction::LeaveChannel,
                username: name.to_string(),
            },
        );

        debug!(username = name, channel = %channel_name, "left channel");
        true
    }

    /// Record a line in the user's channel and send it to every member
    ///
    /// Returns false if the user is not in a channel.
    pub fn chat(&mut self, name: &str, words: &str) -> bool {
        let ChatWorld { users, channels } = self;

        let Some(channel_name) = users.get(name).and_then(|u| u.channel.as_deref()) else {
            return false;
        };
        let Some(channel) = channels.get_mut(channel_name) else {
            return false;
        };
        if !channel.is_member(name) {
            return false;
        }

        channel.record(name, words);
        broadcast(
            users,
            channel.members(),
            &ChatResponse {
                username: name.to_string(),
                message: words.to_string(),
            },
        );
        true
    }
}

/// Encode once and queue on every member's connection
fn broadcast<'a, P: Payload>(
    users: &HashMap<String, User>,
    members: impl Iterator<Item = &'a str>,
    payload: &P,
) {
    let data = match payload.to_envelope().and_then(|envelope| envelope.pack()) {
        Ok(data) => data,
        Err(e) => {
            warn!(message_id = P::ID.as_u32(), error = %e, "failed to encode broadcast");
            return;
        }
    };

    for member in members {
        if let Some(user) = users.get(member) {
            user.connection.send(data.clone());
        }
    }
}
