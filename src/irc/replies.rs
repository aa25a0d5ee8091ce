/// Reply construction — server numerics and command echoes.
///
/// Numerics carry the server prefix and the receiver's nickname (or `*`
/// before one is chosen) as the first parameter. Command echoes carry the
/// acting user's `nick!user@ip` prefix. The trailing texts follow the
/// classic reply strings.
use super::message::Message;

/// Prefix of every server-originated line.
pub const SERVER_NAME: &str = "ft_irc";

/// Server version advertised in 002/004.
pub const SERVER_VERSION: &str = "1.0";

fn numeric(code: &str, target: &str, rest: Vec<String>) -> Message {
    let mut params = Vec::with_capacity(rest.len() + 1);
    params.push(target.to_owned());
    params.extend(rest);
    Message::with_prefix(SERVER_NAME, code, params)
}

/// An echo of a user command, e.g. `:nick!user@ip JOIN #team`.
pub fn echo(user_prefix: &str, command: &str, params: Vec<String>) -> Message {
    Message::with_prefix(user_prefix, command, params)
}

/// The one line a freshly connected client receives before anything else.
pub fn notice_auth_required() -> Message {
    Message::with_prefix(
        SERVER_NAME,
        "NOTICE",
        vec!["*".into(), "Please authenticate with PASS command".into()],
    )
}

/// The raw line sent when a client's message fails to parse.
pub fn invalid_format_line() -> &'static str {
    "ERROR :Invalid message format"
}

// ── Welcome burst (001–004) ──────────────────────────────────────

pub fn rpl_welcome(target: &str, user_prefix: &str) -> Message {
    numeric(
        "001",
        target,
        vec![format!("Welcome to the {SERVER_NAME} Network {user_prefix}")],
    )
}

pub fn rpl_your_host(target: &str) -> Message {
    numeric(
        "002",
        target,
        vec![format!(
            "Your host is {SERVER_NAME}, running version {SERVER_VERSION}"
        )],
    )
}

pub fn rpl_created(target: &str) -> Message {
    numeric("003", target, vec!["This server was created 2025".into()])
}

pub fn rpl_my_info(target: &str) -> Message {
    numeric(
        "004",
        target,
        vec![
            SERVER_NAME.into(),
            SERVER_VERSION.into(),
            "io".into(),
            "itkol".into(),
        ],
    )
}

// ── Command responses ────────────────────────────────────────────

pub fn pong(token: &str) -> Message {
    Message::with_prefix(
        SERVER_NAME,
        "PONG",
        vec![SERVER_NAME.into(), token.to_owned()],
    )
}

pub fn rpl_channel_mode_is(target: &str, channel: &str, flags: &str, args: Vec<String>) -> Message {
    let mut rest = vec![channel.to_owned(), flags.to_owned()];
    rest.extend(args);
    numeric("324", target, rest)
}

pub fn rpl_no_topic(target: &str, channel: &str) -> Message {
    numeric(
        "331",
        target,
        vec![channel.to_owned(), "No topic is set".into()],
    )
}

pub fn rpl_topic(target: &str, channel: &str, topic: &str) -> Message {
    numeric("332", target, vec![channel.to_owned(), topic.to_owned()])
}

pub fn rpl_inviting(target: &str, nick: &str, channel: &str) -> Message {
    numeric("341", target, vec![nick.to_owned(), channel.to_owned()])
}

// ── Error responses ──────────────────────────────────────────────

pub fn err_no_such_nick(target: &str, nick: &str) -> Message {
    numeric(
        "401",
        target,
        vec![nick.to_owned(), "No such nick/channel".into()],
    )
}

pub fn err_no_such_channel(target: &str, channel: &str) -> Message {
    numeric(
        "403",
        target,
        vec![channel.to_owned(), "No such channel".into()],
    )
}

pub fn err_cannot_send_to_chan(target: &str, channel: &str) -> Message {
    numeric(
        "404",
        target,
        vec![channel.to_owned(), "Cannot send to channel".into()],
    )
}

pub fn err_unknown_command(target: &str, command: &str) -> Message {
    numeric(
        "421",
        target,
        vec![command.to_owned(), "Unknown command".into()],
    )
}

pub fn err_erroneous_nickname(target: &str, nick: &str) -> Message {
    numeric(
        "432",
        target,
        vec![nick.to_owned(), "Erroneous nickname".into()],
    )
}

pub fn err_nickname_in_use(target: &str, nick: &str) -> Message {
    numeric(
        "433",
        target,
        vec![nick.to_owned(), "Nickname is already in use".into()],
    )
}

pub fn err_user_not_in_channel(target: &str, nick: &str, channel: &str) -> Message {
    numeric(
        "441",
        target,
        vec![
            nick.to_owned(),
            channel.to_owned(),
            "They aren't on that channel".into(),
        ],
    )
}

pub fn err_not_on_channel(target: &str, channel: &str) -> Message {
    numeric(
        "442",
        target,
        vec![channel.to_owned(), "You're not on that channel".into()],
    )
}

pub fn err_user_on_channel(target: &str, nick: &str, channel: &str) -> Message {
    numeric(
        "443",
        target,
        vec![
            nick.to_owned(),
            channel.to_owned(),
            "is already on channel".into(),
        ],
    )
}

pub fn err_need_more_params(target: &str, command: &str) -> Message {
    numeric(
        "461",
        target,
        vec![command.to_owned(), "Not enough parameters".into()],
    )
}

pub fn err_already_registered(target: &str) -> Message {
    numeric("462", target, vec!["You may not reregister".into()])
}

pub fn err_passwd_mismatch(target: &str) -> Message {
    numeric("464", target, vec!["Password incorrect".into()])
}

pub fn err_channel_is_full(target: &str, channel: &str) -> Message {
    numeric(
        "471",
        target,
        vec![channel.to_owned(), "Cannot join channel (+l)".into()],
    )
}

pub fn err_unknown_mode(target: &str, letter: char) -> Message {
    numeric(
        "472",
        target,
        vec![letter.to_string(), "is unknown mode char to me".into()],
    )
}

pub fn err_invite_only_chan(target: &str, channel: &str) -> Message {
    numeric(
        "473",
        target,
        vec![channel.to_owned(), "Cannot join channel (+i)".into()],
    )
}

pub fn err_bad_channel_key(target: &str, channel: &str) -> Message {
    numeric(
        "475",
        target,
        vec![channel.to_owned(), "Cannot join channel (+k)".into()],
    )
}

pub fn err_chanop_privs_needed(target: &str, channel: &str) -> Message {
    numeric(
        "482",
        target,
        vec![channel.to_owned(), "You're not channel operator".into()],
    )
}

/// Vendor-style rejection for a `+k`/`+l` argument that fails validation.
pub fn err_invalid_mode_param(
    target: &str,
    channel: &str,
    letter: char,
    param: &str,
    reason: &str,
) -> Message {
    numeric(
        "696",
        target,
        vec![
            channel.to_owned(),
            letter.to_string(),
            param.to_owned(),
            reason.to_owned(),
        ],
    )
}
