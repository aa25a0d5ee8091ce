/// Server state — the user and channel tables plus delivery helpers.
///
/// Handlers never touch a socket. Delivering a message means appending
/// its wire form to the target user's write buffer; the connection layer
/// drains those buffers and manages write interest. That keeps every
/// handler a pure state transition, testable without a network.
use std::os::fd::RawFd;

use tracing::{debug, info};

use super::channels::ChannelTable;
use super::message::Message;
use super::replies;
use super::users::{fold, UserTable};

/// Default reason attached to a QUIT broadcast when the client gave none.
pub const DEFAULT_QUIT_REASON: &str = "Client quit";

/// All server-side state, owned by the single server thread.
#[derive(Debug)]
pub struct ServerState {
    pub users: UserTable,
    pub channels: ChannelTable,
    pub password: String,
}

impl ServerState {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            users: UserTable::new(),
            channels: ChannelTable::new(),
            password: password.into(),
        }
    }

    /// Queue one message for delivery to `fd`.
    pub fn send(&mut self, fd: RawFd, msg: &Message) {
        self.send_line(fd, &msg.to_wire());
    }

    /// Queue a raw line (without terminator) for delivery to `fd`.
    pub fn send_line(&mut self, fd: RawFd, line: &str) {
        if let Some(user) = self.users.get_mut(fd) {
            user.write_buf.extend_from_slice(line.as_bytes());
            user.write_buf.extend_from_slice(b"\r\n");
        }
    }

    /// Queue one message for every descriptor in `fds`.
    pub fn broadcast(&mut self, fds: &[RawFd], msg: &Message) {
        let line = msg.to_wire();
        for &fd in fds {
            self.send_line(fd, &line);
        }
    }

    /// Current member descriptors of `channel`, or empty if it is gone.
    pub fn member_fds(&self, channel: &str) -> Vec<RawFd> {
        self.channels
            .get(channel)
            .map(|c| c.members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The numeric-reply target for `fd` (`*` until a nickname is set).
    pub fn reply_target(&self, fd: RawFd) -> String {
        self.users
            .get(fd)
            .map(|u| u.reply_target().to_owned())
            .unwrap_or_else(|| "*".into())
    }

    /// Queue a numeric for `fd`, filling in its reply target.
    pub fn reply(&mut self, fd: RawFd, build: impl FnOnce(&str) -> Message) {
        let target = self.reply_target(fd);
        let msg = build(&target);
        self.send(fd, &msg);
    }

    /// Tear a user out of every channel it joined, broadcasting one QUIT
    /// to each distinct peer first. Channels left empty are destroyed.
    /// Idempotent: a second call finds no memberships and does nothing.
    pub fn purge_user(&mut self, fd: RawFd, reason: &str) {
        let Some(user) = self.users.get(fd) else {
            return;
        };
        let channels: Vec<String> = user.joined_channels.iter().cloned().collect();
        if channels.is_empty() {
            return;
        }
        let quit = replies::echo(&user.prefix(), "QUIT", vec![reason.to_owned()]);

        // One QUIT per peer, no matter how many channels are shared.
        let mut peers: Vec<RawFd> = Vec::new();
        for name in &channels {
            for member in self.member_fds(name) {
                if member != fd && !peers.contains(&member) {
                    peers.push(member);
                }
            }
        }
        self.broadcast(&peers, &quit);

        for name in &channels {
            self.remove_from_channel(fd, name);
        }
        if let Some(user) = self.users.get_mut(fd) {
            user.joined_channels.clear();
        }
        info!(target: "connection", "quit: fd {fd} ({reason})");
    }

    /// Remove `fd` from one channel, destroying the channel if it empties.
    pub fn remove_from_channel(&mut self, fd: RawFd, channel: &str) {
        let folded = fold(channel);
        let mut destroy = false;
        if let Some(chan) = self.channels.get_mut(&folded) {
            chan.remove_member(fd);
            destroy = chan.members.is_empty();
        }
        if destroy {
            self.channels.remove(&folded);
            debug!(target: "channel", "destroyed empty channel {folded}");
        }
        if let Some(user) = self.users.get_mut(fd) {
            user.joined_channels.remove(&folded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_users(nicks: &[(RawFd, &str)]) -> ServerState {
        let mut state = ServerState::new("letmein42");
        for &(fd, nick) in nicks {
            state.users.add(fd, "127.0.0.1".into());
            state.users.set_nickname(fd, nick);
            let user = state.users.get_mut(fd).unwrap();
            user.username = nick.to_owned();
            user.authenticated = true;
            user.registered = true;
        }
        state
    }

    fn join(state: &mut ServerState, fd: RawFd, channel: &str) {
        let (chan, created) = state.channels.get_or_create(channel);
        chan.add_member(fd);
        if created {
            chan.operators.insert(fd);
        }
        state
            .users
            .get_mut(fd)
            .unwrap()
            .joined_channels
            .insert(fold(channel));
    }

    fn buffered(state: &ServerState, fd: RawFd) -> String {
        String::from_utf8(state.users.get(fd).unwrap().write_buf.to_vec()).unwrap()
    }

    #[test]
    fn send_appends_crlf_terminated_line() {
        let mut state = state_with_users(&[(4, "alice")]);
        state.send(4, &Message::new("PING", vec!["x".into()]));
        assert_eq!(buffered(&state, 4), "PING x\r\n");
    }

    #[test]
    fn broadcast_reaches_every_target() {
        let mut state = state_with_users(&[(4, "alice"), (5, "bob")]);
        state.broadcast(&[4, 5], &Message::new("PING", vec!["x".into()]));
        assert_eq!(buffered(&state, 4), "PING x\r\n");
        assert_eq!(buffered(&state, 5), "PING x\r\n");
    }

    #[test]
    fn purge_sends_one_quit_per_peer_across_shared_channels() {
        let mut state = state_with_users(&[(4, "alice"), (5, "bob")]);
        join(&mut state, 4, "#a");
        join(&mut state, 4, "#b");
        join(&mut state, 5, "#a");
        join(&mut state, 5, "#b");

        state.purge_user(4, "later");

        let bob = buffered(&state, 5);
        assert_eq!(
            bob.matches("QUIT").count(),
            1,
            "bob should get exactly one QUIT, got: {bob}"
        );
        assert!(bob.contains(":alice!alice@127.0.0.1 QUIT :later"));
        // Nothing is echoed back to the quitting user.
        assert!(!buffered(&state, 4).contains("QUIT"));
    }

    #[test]
    fn purge_destroys_emptied_channels_and_keeps_shared_ones() {
        let mut state = state_with_users(&[(4, "alice"), (5, "bob")]);
        join(&mut state, 4, "#solo");
        join(&mut state, 4, "#shared");
        join(&mut state, 5, "#shared");

        state.purge_user(4, "later");

        assert!(!state.channels.exists("#solo"));
        assert!(state.channels.exists("#shared"));
        assert!(state
            .users
            .get(4)
            .unwrap()
            .joined_channels
            .is_empty());
    }

    #[test]
    fn purge_is_idempotent() {
        let mut state = state_with_users(&[(4, "alice"), (5, "bob")]);
        join(&mut state, 4, "#a");
        join(&mut state, 5, "#a");

        state.purge_user(4, "later");
        let after_first = buffered(&state, 5);
        state.purge_user(4, "later");
        assert_eq!(buffered(&state, 5), after_first);
    }

    #[test]
    fn remove_from_channel_keeps_membership_mutual() {
        let mut state = state_with_users(&[(4, "alice"), (5, "bob")]);
        join(&mut state, 4, "#a");
        join(&mut state, 5, "#a");

        state.remove_from_channel(4, "#a");

        let chan = state.channels.get("#a").unwrap();
        assert!(!chan.is_member(4));
        assert!(!chan.is_operator(4));
        assert!(!state
            .users
            .get(4)
            .unwrap()
            .joined_channels
            .contains("#a"));
        assert!(chan.is_member(5));
    }
}
