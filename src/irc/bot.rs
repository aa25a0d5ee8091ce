/// The companion bot — an ordinary IRC client speaking the same wire
/// format as the server.
///
/// It authenticates with PASS/NICK/USER, joins one configured channel,
/// and answers messages that start with `!`. Channel messages are
/// answered in the channel; direct messages are answered to the sender.
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

use chrono::Local;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::message::Message;
use super::users::fold;

const HELP_TEXT: &str = "Available commands: !help, !time, !ping, !about, !rps <rock|paper|scissors>";
const ABOUT_TEXT: &str = "I am an IRC bot built for ft_irc";
const RPS_USAGE: &str = "Usage: !rps <rock|paper|scissors>";

/// Connection parameters, straight from the command line.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub nickname: String,
    pub channel: String,
}

/// A rock-paper-scissors move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpsMove {
    Rock,
    Paper,
    Scissors,
}

impl RpsMove {
    const ALL: [RpsMove; 3] = [RpsMove::Rock, RpsMove::Paper, RpsMove::Scissors];

    pub fn parse(input: &str) -> Option<Self> {
        match input.to_ascii_lowercase().as_str() {
            "rock" => Some(Self::Rock),
            "paper" => Some(Self::Paper),
            "scissors" => Some(Self::Scissors),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rock => "rock",
            Self::Paper => "paper",
            Self::Scissors => "scissors",
        }
    }

    pub fn beats(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Rock, Self::Scissors)
                | (Self::Paper, Self::Rock)
                | (Self::Scissors, Self::Paper)
        )
    }
}

/// The verdict line for one round against the bot.
pub fn rps_reply(player: RpsMove, bot: RpsMove) -> String {
    let verdict = if player == bot {
        "It's a draw!"
    } else if player.beats(bot) {
        "You win!"
    } else {
        "I win!"
    };
    format!(
        "You chose {}, I chose {}. {verdict}",
        player.name(),
        bot.name()
    )
}

/// Pick the reply for one `!`-command, or `None` to stay quiet.
/// `bot_move` supplies the bot's play when the command is a round of
/// rock-paper-scissors.
pub fn command_reply(text: &str, bot_move: impl FnOnce() -> RpsMove) -> Option<String> {
    let lowered = text.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "!help" => return Some(HELP_TEXT.to_owned()),
        "!time" => {
            return Some(format!(
                "Current time: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            ))
        }
        "!ping" => return Some("Pong!".to_owned()),
        "!about" => return Some(ABOUT_TEXT.to_owned()),
        _ => {}
    }

    let mut tokens = lowered.split_whitespace();
    if tokens.next() == Some("!rps") {
        let reply = match (tokens.next().and_then(RpsMove::parse), tokens.next()) {
            (Some(player), None) => rps_reply(player, bot_move()),
            _ => RPS_USAGE.to_owned(),
        };
        return Some(reply);
    }

    None
}

/// Where to send the reply: back to the channel, or to the sender when
/// the message was addressed to the bot directly.
pub fn reply_target<'a>(target: &'a str, sender: &'a str, own_nick: &str) -> &'a str {
    if fold(target) == fold(own_nick) {
        sender
    } else {
        target
    }
}

/// The nick portion of a `nick!user@host` prefix.
pub fn nick_of(prefix: &str) -> &str {
    prefix.split('!').next().unwrap_or(prefix)
}

pub struct Bot {
    config: BotConfig,
    stream: TcpStream,
    joined: bool,
}

impl Bot {
    /// Connect to the server. Registration happens in [`Bot::run`].
    pub fn connect(config: BotConfig) -> io::Result<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))?;
        info!(target: "network", "connected to {}:{}", config.host, config.port);
        Ok(Self {
            config,
            stream,
            joined: false,
        })
    }

    /// Register, join, and answer commands until the server goes away.
    pub fn run(&mut self) -> io::Result<()> {
        self.send_line(&format!("PASS {}", self.config.password))?;
        self.send_line(&format!("NICK {}", self.config.nickname))?;
        self.send_line(&format!(
            "USER {nick} 0 * :{nick}",
            nick = self.config.nickname
        ))?;

        let mut reader = BufReader::new(self.stream.try_clone()?);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                info!(target: "connection", "server closed the connection");
                return Ok(());
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            debug!(target: "network", "<< {trimmed}");

            let msg = match Message::parse(trimmed) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(target: "network", "unparseable server line: {e}");
                    continue;
                }
            };
            self.handle_message(&msg)?;
        }
    }

    fn handle_message(&mut self, msg: &Message) -> io::Result<()> {
        match msg.command.as_str() {
            "PING" => {
                let token = msg.params.first().cloned().unwrap_or_default();
                self.send_line(&format!("PONG :{token}"))?;
            }
            // Welcome or end-of-MOTD (or no MOTD): safe to join now.
            "001" | "376" | "422" => self.join_if_needed()?,
            "PRIVMSG" => self.handle_privmsg(msg)?,
            _ => {}
        }
        Ok(())
    }

    fn join_if_needed(&mut self) -> io::Result<()> {
        if !self.joined {
            self.send_line(&format!("JOIN {}", self.config.channel))?;
            self.joined = true;
            info!(target: "connection", "joined {}", self.config.channel);
        }
        Ok(())
    }

    fn handle_privmsg(&mut self, msg: &Message) -> io::Result<()> {
        let (Some(target), Some(text)) = (msg.params.first(), msg.params.get(1)) else {
            return Ok(());
        };
        if !text.starts_with('!') {
            return Ok(());
        }
        let sender = msg.prefix.as_deref().map(nick_of).unwrap_or("*");
        let to = reply_target(target, sender, &self.config.nickname).to_owned();

        let Some(reply) = command_reply(text, random_move) else {
            return Ok(());
        };
        info!(target: "command", "answering {text:?} from {sender}");
        self.send_line(&format!("PRIVMSG {to} :{reply}"))
    }

    fn send_line(&mut self, line: &str) -> io::Result<()> {
        debug!(target: "network", ">> {line}");
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\r\n")
    }
}

fn random_move() -> RpsMove {
    let mut rng = rand::thread_rng();
    *RpsMove::ALL.choose(&mut rng).unwrap_or(&RpsMove::Rock)
}
