/// Channel operations — JOIN, PART, PRIVMSG, TOPIC, INVITE, KICK, MODE
/// and QUIT.
///
/// Every mutation observers care about is broadcast to the channel's
/// current members by queueing the formatted line into each member's
/// write buffer. Handlers run to completion before the next message from
/// any client is considered, so a PRIVMSG seen by a member is always
/// sequenced after the JOIN that made the sender a member.
use std::os::fd::RawFd;

use tracing::{info, warn};

use super::channels::is_valid_channel_name;
use super::dispatch::Outcome;
use super::message::Message;
use super::modes::{self, ModeChange};
use super::replies;
use super::state::{ServerState, DEFAULT_QUIT_REASON};
use super::users::fold;

fn is_channel_target(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

fn user_prefix(state: &ServerState, fd: RawFd) -> Option<String> {
    state.users.get(fd).map(|u| u.prefix())
}

pub fn handle_join(state: &mut ServerState, fd: RawFd, msg: &Message) {
    let Some(name) = msg.params.first().cloned() else {
        state.reply(fd, |t| replies::err_need_more_params(t, "JOIN"));
        return;
    };
    let key_arg = msg.params.get(1).cloned();

    if !is_valid_channel_name(&name) {
        state.reply(fd, |t| replies::err_no_such_channel(t, &name));
        return;
    }

    if let Some(chan) = state.channels.get(&name) {
        if chan.is_member(fd) {
            return;
        }
        if chan.invite_only && !chan.is_invited(fd) {
            warn!(target: "permission", "join to invite-only {name} refused for fd {fd}");
            state.reply(fd, |t| replies::err_invite_only_chan(t, &name));
            return;
        }
        if chan.user_limit.is_some_and(|limit| chan.members.len() >= limit) {
            state.reply(fd, |t| replies::err_channel_is_full(t, &name));
            return;
        }
        if let Some(ref key) = chan.key {
            if key_arg.as_deref() != Some(key.as_str()) {
                warn!(target: "permission", "join to keyed {name} refused for fd {fd}");
                state.reply(fd, |t| replies::err_bad_channel_key(t, &name));
                return;
            }
        }
    }

    let Some(prefix) = user_prefix(state, fd) else {
        return;
    };

    let (chan, created) = state.channels.get_or_create(&name);
    let chan_name = chan.name.clone();
    chan.add_member(fd);
    if created {
        // The creator runs the channel.
        chan.operators.insert(fd);
        info!(target: "channel", "channel created: {chan_name}");
    }
    if let Some(user) = state.users.get_mut(fd) {
        user.joined_channels.insert(fold(&name));
    }

    let members = state.member_fds(&name);
    let join = replies::echo(&prefix, "JOIN", vec![chan_name.clone()]);
    state.broadcast(&members, &join);
    info!(target: "channel", "{prefix} joined {chan_name}");
}

pub fn handle_part(state: &mut ServerState, fd: RawFd, msg: &Message) {
    let Some(name) = msg.params.first().cloned() else {
        state.reply(fd, |t| replies::err_need_more_params(t, "PART"));
        return;
    };
    let reason = msg.params.get(1).cloned();

    let Some(chan) = state.channels.get(&name) else {
        state.reply(fd, |t| replies::err_no_such_channel(t, &name));
        return;
    };
    if !chan.is_member(fd) {
        state.reply(fd, |t| replies::err_not_on_channel(t, &name));
        return;
    }
    let chan_name = chan.name.clone();

    let Some(prefix) = user_prefix(state, fd) else {
        return;
    };

    // Everyone, the leaver included, sees the PART before the removal.
    let mut params = vec![chan_name.clone()];
    if let Some(reason) = reason {
        params.push(reason);
    }
    let part = replies::echo(&prefix, "PART", params);
    let members = state.member_fds(&name);
    state.broadcast(&members, &part);

    state.remove_from_channel(fd, &name);
    info!(target: "channel", "{prefix} left {chan_name}");
}

pub fn handle_privmsg(state: &mut ServerState, fd: RawFd, msg: &Message) {
    if msg.params.len() < 2 {
        state.reply(fd, |t| replies::err_need_more_params(t, "PRIVMSG"));
        return;
    }
    let target = msg.params[0].clone();
    let text = msg.params[1].clone();

    let Some(prefix) = user_prefix(state, fd) else {
        return;
    };
    let echo = replies::echo(&prefix, "PRIVMSG", vec![target.clone(), text]);

    if is_channel_target(&target) {
        let Some(chan) = state.channels.get(&target) else {
            state.reply(fd, |t| replies::err_no_such_channel(t, &target));
            return;
        };
        if !chan.is_member(fd) {
            state.reply(fd, |t| replies::err_cannot_send_to_chan(t, &target));
            return;
        }
        let others: Vec<RawFd> = chan.members.iter().copied().filter(|&m| m != fd).collect();
        state.broadcast(&others, &echo);
    } else {
        let Some(target_fd) = state.users.fd_by_nick(&target) else {
            state.reply(fd, |t| replies::err_no_such_nick(t, &target));
            return;
        };
        state.send(target_fd, &echo);
    }
}

pub fn handle_topic(state: &mut ServerState, fd: RawFd, msg: &Message) {
    let Some(name) = msg.params.first().cloned() else {
        state.reply(fd, |t| replies::err_need_more_params(t, "TOPIC"));
        return;
    };

    let Some(chan) = state.channels.get(&name) else {
        state.reply(fd, |t| replies::err_no_such_channel(t, &name));
        return;
    };
    if !chan.is_member(fd) {
        state.reply(fd, |t| replies::err_not_on_channel(t, &name));
        return;
    }
    let chan_name = chan.name.clone();

    // Query form: report the current topic to the asker only.
    if msg.params.len() < 2 {
        let topic = chan.topic.clone();
        if topic.is_empty() {
            state.reply(fd, |t| replies::rpl_no_topic(t, &chan_name));
        } else {
            state.reply(fd, |t| replies::rpl_topic(t, &chan_name, &topic));
        }
        return;
    }

    if chan.topic_restricted && !chan.is_operator(fd) {
        warn!(target: "permission", "topic change on {chan_name} refused for fd {fd}");
        state.reply(fd, |t| replies::err_chanop_privs_needed(t, &chan_name));
        return;
    }

    let topic = msg.params[1].clone();
    if let Some(chan) = state.channels.get_mut(&name) {
        chan.topic = topic.clone();
    }

    let Some(prefix) = user_prefix(state, fd) else {
        return;
    };
    let members = state.member_fds(&name);
    let echo = replies::echo(&prefix, "TOPIC", vec![chan_name.clone(), topic]);
    state.broadcast(&members, &echo);
    info!(target: "channel", "topic on {chan_name} set by {prefix}");
}

pub fn handle_invite(state: &mut ServerState, fd: RawFd, msg: &Message) {
    if msg.params.len() < 2 {
        state.reply(fd, |t| replies::err_need_more_params(t, "INVITE"));
        return;
    }
    let nick = msg.params[0].clone();
    let name = msg.params[1].clone();

    let Some(target_fd) = state.users.fd_by_nick(&nick) else {
        state.reply(fd, |t| replies::err_no_such_nick(t, &nick));
        return;
    };
    let Some(chan) = state.channels.get(&name) else {
        state.reply(fd, |t| replies::err_no_such_channel(t, &name));
        return;
    };
    if !chan.is_member(fd) {
        state.reply(fd, |t| replies::err_not_on_channel(t, &name));
        return;
    }
    let chan_name = chan.name.clone();
    if chan.is_member(target_fd) {
        state.reply(fd, |t| replies::err_user_on_channel(t, &nick, &chan_name));
        return;
    }
    if chan.invite_only && !chan.is_operator(fd) {
        warn!(target: "permission", "invite to +i {chan_name} refused for fd {fd}");
        state.reply(fd, |t| replies::err_chanop_privs_needed(t, &chan_name));
        return;
    }

    if let Some(chan) = state.channels.get_mut(&name) {
        chan.invited.insert(target_fd);
    }

    let target_nick = state
        .users
        .get(target_fd)
        .map(|u| u.nickname.clone())
        .unwrap_or(nick);
    state.reply(fd, |t| replies::rpl_inviting(t, &target_nick, &chan_name));

    let Some(prefix) = user_prefix(state, fd) else {
        return;
    };
    let invite = replies::echo(&prefix, "INVITE", vec![target_nick.clone(), chan_name.clone()]);
    state.send(target_fd, &invite);
    info!(target: "channel", "{prefix} invited {target_nick} to {chan_name}");
}

pub fn handle_kick(state: &mut ServerState, fd: RawFd, msg: &Message) {
    if msg.params.len() < 2 {
        state.reply(fd, |t| replies::err_need_more_params(t, "KICK"));
        return;
    }
    let name = msg.params[0].clone();
    let nick = msg.params[1].clone();
    let reason = msg.params.get(2).cloned();

    let Some(chan) = state.channels.get(&name) else {
        state.reply(fd, |t| replies::err_no_such_channel(t, &name));
        return;
    };
    if !chan.is_member(fd) {
        state.reply(fd, |t| replies::err_not_on_channel(t, &name));
        return;
    }
    let chan_name = chan.name.clone();
    if !chan.is_operator(fd) {
        warn!(target: "permission", "kick on {chan_name} refused for non-operator fd {fd}");
        state.reply(fd, |t| replies::err_chanop_privs_needed(t, &chan_name));
        return;
    }
    let Some(target_fd) = state.users.fd_by_nick(&nick) else {
        state.reply(fd, |t| replies::err_no_such_nick(t, &nick));
        return;
    };
    if !state
        .channels
        .get(&name)
        .is_some_and(|c| c.is_member(target_fd))
    {
        state.reply(fd, |t| replies::err_user_not_in_channel(t, &nick, &chan_name));
        return;
    }

    let target_nick = state
        .users
        .get(target_fd)
        .map(|u| u.nickname.clone())
        .unwrap_or(nick);
    let Some(prefix) = user_prefix(state, fd) else {
        return;
    };

    // The target hears its own KICK before it is removed.
    let mut params = vec![chan_name.clone(), target_nick.clone()];
    if let Some(reason) = reason {
        params.push(reason);
    }
    let kick = replies::echo(&prefix, "KICK", params);
    let members = state.member_fds(&name);
    state.broadcast(&members, &kick);

    state.remove_from_channel(target_fd, &name);
    info!(target: "channel", "{prefix} kicked {target_nick} from {chan_name}");
}

pub fn handle_mode(state: &mut ServerState, fd: RawFd, msg: &Message) {
    let Some(name) = msg.params.first().cloned() else {
        state.reply(fd, |t| replies::err_need_more_params(t, "MODE"));
        return;
    };

    let Some(chan) = state.channels.get(&name) else {
        state.reply(fd, |t| replies::err_no_such_channel(t, &name));
        return;
    };
    let chan_name = chan.name.clone();

    // Query form: report the current mode string.
    if msg.params.len() < 2 {
        let (flags, args) = chan.mode_string();
        state.reply(fd, |t| replies::rpl_channel_mode_is(t, &chan_name, &flags, args));
        return;
    }

    if !chan.is_operator(fd) {
        warn!(target: "permission", "mode change on {chan_name} refused for fd {fd}");
        state.reply(fd, |t| replies::err_chanop_privs_needed(t, &chan_name));
        return;
    }

    let changes = modes::parse_mode_string(&msg.params[1], &msg.params[2..]);
    let mut applied: Vec<ModeChange> = Vec::new();

    for change in changes {
        match change.letter {
            'i' => {
                if let Some(chan) = state.channels.get_mut(&name) {
                    chan.invite_only = change.adding;
                }
                applied.push(change);
            }
            't' => {
                if let Some(chan) = state.channels.get_mut(&name) {
                    chan.topic_restricted = change.adding;
                }
                applied.push(change);
            }
            'k' if change.adding => {
                let Some(key) = change.arg.clone() else {
                    state.reply(fd, |t| {
                        replies::err_invalid_mode_param(
                            t,
                            &chan_name,
                            'k',
                            "*",
                            "You must specify a parameter for the key mode",
                        )
                    });
                    continue;
                };
                if !modes::is_valid_key(&key) {
                    state.reply(fd, |t| {
                        replies::err_invalid_mode_param(t, &chan_name, 'k', &key, "Invalid key")
                    });
                    continue;
                }
                if let Some(chan) = state.channels.get_mut(&name) {
                    chan.key = Some(key);
                }
                applied.push(change);
            }
            'k' => {
                if let Some(chan) = state.channels.get_mut(&name) {
                    chan.key = None;
                }
                applied.push(change);
            }
            'l' if change.adding => {
                let Some(arg) = change.arg.clone() else {
                    state.reply(fd, |t| {
                        replies::err_invalid_mode_param(
                            t,
                            &chan_name,
                            'l',
                            "*",
                            "You must specify a parameter for the limit mode",
                        )
                    });
                    continue;
                };
                let Some(limit) = modes::parse_limit(&arg) else {
                    state.reply(fd, |t| {
                        replies::err_invalid_mode_param(t, &chan_name, 'l', &arg, "Invalid limit")
                    });
                    continue;
                };
                if limit == 0 {
                    continue;
                }
                if let Some(chan) = state.channels.get_mut(&name) {
                    chan.user_limit = Some(limit);
                }
                applied.push(change);
            }
            'l' => {
                if let Some(chan) = state.channels.get_mut(&name) {
                    chan.user_limit = None;
                }
                applied.push(change);
            }
            'o' => {
                let Some(nick) = change.arg.clone() else {
                    state.reply(fd, |t| replies::err_need_more_params(t, "MODE"));
                    continue;
                };
                let Some(target_fd) = state.users.fd_by_nick(&nick) else {
                    state.reply(fd, |t| replies::err_no_such_nick(t, &nick));
                    continue;
                };
                let is_member = state
                    .channels
                    .get(&name)
                    .is_some_and(|c| c.is_member(target_fd));
                if !is_member {
                    state.reply(fd, |t| replies::err_user_not_in_channel(t, &nick, &chan_name));
                    continue;
                }
                if change.adding {
                    if let Some(chan) = state.channels.get_mut(&name) {
                        chan.operators.insert(target_fd);
                    }
                    applied.push(change);
                } else {
                    let sole_operator = state
                        .channels
                        .get(&name)
                        .is_some_and(|c| c.operators.len() == 1 && c.is_operator(target_fd));
                    if target_fd == fd && sole_operator {
                        // Deopping yourself as the last operator would
                        // orphan the channel.
                        warn!(target: "permission", "sole operator deop on {chan_name} refused");
                        state.reply(fd, |t| replies::err_chanop_privs_needed(t, &chan_name));
                        continue;
                    }
                    if let Some(chan) = state.channels.get_mut(&name) {
                        chan.operators.remove(&target_fd);
                    }
                    applied.push(change);
                }
            }
            other => {
                state.reply(fd, |t| replies::err_unknown_mode(t, other));
            }
        }
    }

    if applied.is_empty() {
        return;
    }

    let (flags, args) = modes::render_applied(&applied);
    let Some(prefix) = user_prefix(state, fd) else {
        return;
    };
    let mut params = vec![chan_name.clone(), flags.clone()];
    params.extend(args);
    let echo = replies::echo(&prefix, "MODE", params);
    let members = state.member_fds(&name);
    state.broadcast(&members, &echo);
    info!(target: "channel", "{prefix} set mode {flags} on {chan_name}");
}

pub fn handle_quit(state: &mut ServerState, fd: RawFd, msg: &Message) -> Outcome {
    let reason = msg
        .params
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_QUIT_REASON.to_owned());
    state.purge_user(fd, &reason);
    Outcome::Disconnect(reason)
}
