/// Command dispatch and the registration state machine.
///
/// Every parsed message lands here. Unregistered connections may only
/// speak PASS, NICK, USER, CAP, PING and QUIT; anything else from them is
/// dropped without a reply. Registration completes once PASS has been
/// accepted and both a nickname and a username are set, at which point the
/// welcome burst (001–004) goes out.
use std::os::fd::RawFd;

use tracing::{debug, info, warn};

use super::message::Message;
use super::ops;
use super::replies;
use super::state::ServerState;
use super::users::is_valid_nickname;

/// What the connection layer should do after a message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Keep the connection open.
    Continue,
    /// Close the connection; the user already left every channel.
    Disconnect(String),
}

/// Commands an unregistered connection is allowed to send.
fn allowed_before_registration(command: &str) -> bool {
    matches!(command, "PASS" | "NICK" | "USER" | "CAP" | "PING" | "QUIT")
}

/// Route one parsed message for the user behind `fd`.
pub fn dispatch(state: &mut ServerState, fd: RawFd, msg: &Message) -> Outcome {
    let Some(user) = state.users.get(fd) else {
        warn!(target: "command", "message for unknown descriptor {fd}");
        return Outcome::Continue;
    };

    debug!(target: "command", "{}: {}", user.ip, msg.command);

    if !user.registered && !allowed_before_registration(&msg.command) {
        debug!(target: "command", "dropping {} from unregistered fd {fd}", msg.command);
        return Outcome::Continue;
    }

    match msg.command.as_str() {
        "PASS" => handle_pass(state, fd, msg),
        "NICK" => handle_nick(state, fd, msg),
        "USER" => handle_user(state, fd, msg),
        "CAP" => {
            // Compatibility shim: modern clients open with CAP LS; staying
            // silent lets them fall through to the normal handshake.
            debug!(target: "command", "ignoring CAP from fd {fd}");
        }
        "PING" => handle_ping(state, fd, msg),
        "JOIN" => ops::handle_join(state, fd, msg),
        "PART" => ops::handle_part(state, fd, msg),
        "PRIVMSG" => ops::handle_privmsg(state, fd, msg),
        "TOPIC" => ops::handle_topic(state, fd, msg),
        "INVITE" => ops::handle_invite(state, fd, msg),
        "KICK" => ops::handle_kick(state, fd, msg),
        "MODE" => ops::handle_mode(state, fd, msg),
        "QUIT" => return ops::handle_quit(state, fd, msg),
        other => {
            warn!(target: "command", "unknown command from fd {fd}: {other}");
            state.reply(fd, |t| replies::err_unknown_command(t, other));
        }
    }

    Outcome::Continue
}

fn handle_pass(state: &mut ServerState, fd: RawFd, msg: &Message) {
    let Some(user) = state.users.get(fd) else {
        return;
    };
    let (registered, ip) = (user.registered, user.ip.clone());
    if registered {
        state.reply(fd, replies::err_already_registered);
        return;
    }
    let Some(supplied) = msg.params.first() else {
        state.reply(fd, |t| replies::err_need_more_params(t, "PASS"));
        return;
    };

    if *supplied != state.password {
        warn!(target: "auth", "authentication failed for {ip}: incorrect password");
        state.reply(fd, replies::err_passwd_mismatch);
        return;
    }

    if let Some(user) = state.users.get_mut(fd) {
        user.authenticated = true;
    }
    info!(target: "auth", "authentication successful for {ip}");
}

fn handle_nick(state: &mut ServerState, fd: RawFd, msg: &Message) {
    let Some(nick) = msg.params.first() else {
        state.reply(fd, |t| replies::err_need_more_params(t, "NICK"));
        return;
    };

    if !is_valid_nickname(nick) {
        let nick = nick.clone();
        state.reply(fd, |t| replies::err_erroneous_nickname(t, &nick));
        return;
    }

    // In-use check and insertion are one logical step: dispatch is serial.
    if state.users.is_nickname_in_use(nick) && state.users.fd_by_nick(nick) != Some(fd) {
        let nick = nick.clone();
        state.reply(fd, |t| replies::err_nickname_in_use(t, &nick));
        return;
    }

    let nick = nick.clone();
    state.users.set_nickname(fd, &nick);
    let ip = state.users.get(fd).map(|u| u.ip.clone()).unwrap_or_default();
    info!(target: "command", "nickname set: {ip} -> {nick}");

    try_complete_registration(state, fd);
}

fn handle_user(state: &mut ServerState, fd: RawFd, msg: &Message) {
    let Some(user) = state.users.get(fd) else {
        return;
    };
    if user.registered {
        state.reply(fd, replies::err_already_registered);
        return;
    }
    if msg.params.len() < 4 {
        state.reply(fd, |t| replies::err_need_more_params(t, "USER"));
        return;
    }

    let username = msg.params[0].clone();
    let realname = msg.params[3].clone();
    let Some(user) = state.users.get_mut(fd) else {
        return;
    };
    user.username = username.clone();
    user.realname = realname;
    let ip = user.ip.clone();
    info!(target: "command", "user info set: {ip} (username: {username})");

    try_complete_registration(state, fd);
}

/// Complete registration and emit the welcome burst once PASS, NICK and
/// USER have all landed.
fn try_complete_registration(state: &mut ServerState, fd: RawFd) {
    let Some(user) = state.users.get_mut(fd) else {
        return;
    };
    if user.registered
        || !user.authenticated
        || user.nickname.is_empty()
        || user.username.is_empty()
    {
        return;
    }

    user.registered = true;
    let prefix = user.prefix();
    let target = user.nickname.clone();

    state.send(fd, &replies::rpl_welcome(&target, &prefix));
    state.send(fd, &replies::rpl_your_host(&target));
    state.send(fd, &replies::rpl_created(&target));
    state.send(fd, &replies::rpl_my_info(&target));

    info!(target: "auth", "registration complete: {prefix}");
}

fn handle_ping(state: &mut ServerState, fd: RawFd, msg: &Message) {
    let Some(token) = msg.params.first() else {
        state.reply(fd, |t| replies::err_need_more_params(t, "PING"));
        return;
    };
    let pong = replies::pong(token);
    state.send(fd, &pong);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Feed one raw client line through parse + dispatch.
    pub fn feed(state: &mut ServerState, fd: RawFd, line: &str) -> Outcome {
        let msg = Message::parse(line).expect("test line should parse");
        dispatch(state, fd, &msg)
    }

    /// Take and clear everything queued for `fd`.
    pub fn drain(state: &mut ServerState, fd: RawFd) -> String {
        let user = state.users.get_mut(fd).expect("user exists");
        let bytes = user.write_buf.split().to_vec();
        String::from_utf8(bytes).expect("server output is UTF-8")
    }

    /// A connected, fully registered user.
    pub fn register(state: &mut ServerState, fd: RawFd, nick: &str) {
        state.users.add(fd, "127.0.0.1".into());
        feed(state, fd, "PASS letmein42");
        feed(state, fd, &format!("NICK {nick}"));
        feed(state, fd, &format!("USER {nick} 0 * :{nick}"));
        drain(state, fd);
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{drain, feed, register};
    use super::*;

    fn fresh_state() -> ServerState {
        ServerState::new("letmein42")
    }

    // ── Registration state machine ───────────────────────────────

    #[test]
    fn full_handshake_emits_welcome_burst_in_order() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());

        feed(&mut state, 4, "PASS letmein42");
        feed(&mut state, 4, "NICK alice");
        assert_eq!(drain(&mut state, 4), "");

        feed(&mut state, 4, "USER alice 0 * :Alice");
        let out = drain(&mut state, 4);
        let lines: Vec<&str> = out.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with(":ft_irc 001 alice :Welcome"));
        assert!(lines[1].starts_with(":ft_irc 002 alice"));
        assert!(lines[2].starts_with(":ft_irc 003 alice"));
        assert!(lines[3].starts_with(":ft_irc 004 alice"));
        assert!(state.users.get(4).unwrap().registered);
    }

    #[test]
    fn user_then_nick_also_completes() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());

        feed(&mut state, 4, "PASS letmein42");
        feed(&mut state, 4, "USER alice 0 * :Alice");
        assert_eq!(drain(&mut state, 4), "");

        feed(&mut state, 4, "NICK alice");
        assert!(drain(&mut state, 4).contains(" 001 alice "));
    }

    #[test]
    fn wrong_password_yields_464_and_keeps_connection() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());

        let outcome = feed(&mut state, 4, "PASS nope1234");
        assert_eq!(outcome, Outcome::Continue);
        assert!(drain(&mut state, 4).contains(":ft_irc 464 * :Password incorrect"));
        assert!(!state.users.get(4).unwrap().authenticated);
    }

    #[test]
    fn nick_and_user_without_pass_never_register() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());

        feed(&mut state, 4, "NICK alice");
        feed(&mut state, 4, "USER alice 0 * :Alice");
        let out = drain(&mut state, 4);
        assert!(!out.contains("001"));
        assert!(!state.users.get(4).unwrap().registered);
    }

    #[test]
    fn pass_after_registration_is_rejected() {
        let mut state = fresh_state();
        register(&mut state, 4, "alice");

        feed(&mut state, 4, "PASS letmein42");
        assert!(drain(&mut state, 4).contains(" 462 alice :You may not reregister"));
    }

    #[test]
    fn user_after_registration_is_rejected() {
        let mut state = fresh_state();
        register(&mut state, 4, "alice");

        feed(&mut state, 4, "USER other 0 * :Other");
        assert!(drain(&mut state, 4).contains(" 462 "));
        assert_eq!(state.users.get(4).unwrap().username, "alice");
    }

    #[test]
    fn pass_without_param_yields_461() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());
        feed(&mut state, 4, "PASS");
        assert!(drain(&mut state, 4).contains(" 461 * PASS :Not enough parameters"));
    }

    #[test]
    fn user_needs_four_params() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());
        feed(&mut state, 4, "PASS letmein42");
        feed(&mut state, 4, "USER alice 0 *");
        assert!(drain(&mut state, 4).contains(" 461 * USER "));
    }

    // ── NICK validation and collisions ───────────────────────────

    #[test]
    fn invalid_nickname_yields_432() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());
        feed(&mut state, 4, "NICK 0bad");
        assert!(drain(&mut state, 4).contains(" 432 * 0bad :Erroneous nickname"));
    }

    #[test]
    fn nickname_collision_yields_433() {
        let mut state = fresh_state();
        register(&mut state, 4, "alice");
        state.users.add(5, "127.0.0.1".into());

        feed(&mut state, 5, "NICK ALICE");
        assert!(drain(&mut state, 5).contains(" 433 * ALICE :Nickname is already in use"));
    }

    #[test]
    fn user_may_recase_own_nickname() {
        let mut state = fresh_state();
        register(&mut state, 4, "alice");

        feed(&mut state, 4, "NICK Alice");
        let out = drain(&mut state, 4);
        assert!(!out.contains("433"), "own nick recase rejected: {out}");
        assert_eq!(state.users.get(4).unwrap().nickname, "Alice");
    }

    // ── Gating, PING, CAP, unknown commands ──────────────────────

    #[test]
    fn unregistered_channel_commands_are_dropped_silently() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());

        feed(&mut state, 4, "JOIN #team");
        feed(&mut state, 4, "PRIVMSG #team :hi");
        assert_eq!(drain(&mut state, 4), "");
        assert!(!state.channels.exists("#team"));
    }

    #[test]
    fn ping_works_in_any_state() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());
        feed(&mut state, 4, "PING tok");
        assert!(drain(&mut state, 4).contains(":ft_irc PONG ft_irc tok"));

        register(&mut state, 4, "alice");
        feed(&mut state, 4, "PING tok2");
        assert!(drain(&mut state, 4).contains("PONG ft_irc tok2"));
    }

    #[test]
    fn cap_is_silently_ignored() {
        let mut state = fresh_state();
        state.users.add(4, "127.0.0.1".into());
        let outcome = feed(&mut state, 4, "CAP LS 302");
        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(drain(&mut state, 4), "");
    }

    #[test]
    fn unknown_command_yields_exactly_one_421() {
        let mut state = fresh_state();
        register(&mut state, 4, "alice");

        feed(&mut state, 4, "WIBBLE a b");
        let out = drain(&mut state, 4);
        let lines: Vec<&str> = out.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec![":ft_irc 421 alice WIBBLE :Unknown command"]);
        assert!(state.channels.is_empty());
    }
}
