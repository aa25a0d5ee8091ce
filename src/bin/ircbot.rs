use std::process::ExitCode;

use tracing::error;

use ftirc::irc::bot::{Bot, BotConfig};

fn usage() -> ExitCode {
    eprintln!("Usage: ircbot <host> <port> <password> <nickname> <channel>");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [host, port, password, nickname, channel] = args.as_slice() else {
        return usage();
    };
    let Ok(port) = port.parse::<u16>() else {
        return usage();
    };

    let config = BotConfig {
        host: host.clone(),
        port,
        password: password.clone(),
        nickname: nickname.clone(),
        channel: channel.clone(),
    };

    let mut bot = match Bot::connect(config) {
        Ok(bot) => bot,
        Err(e) => {
            error!(target: "network", "failed to connect: {e}");
            return ExitCode::FAILURE;
        }
    };
    match bot.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: "network", "bot terminated: {e}");
            ExitCode::FAILURE
        }
    }
}
