/// Command-line validation for `ircserv <port> <password>`.
///
/// The port must be exactly four decimal digits in the IRC range
/// 6665-6669; the password must be 8-64 bytes of printable non-space
/// characters. Anything else is refused before a socket is opened.
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid arguments: Usage: ircserv <port> <password>")]
    Usage,
    #[error("Invalid port: must be exactly 4 digits (6665-6669)")]
    PortLength,
    #[error("Invalid port: contains non-digit characters")]
    PortNotNumeric,
    #[error("Invalid port: allowed range is 6665-6669")]
    PortRange,
    #[error("Invalid password: must be at least 8 characters")]
    PasswordTooShort,
    #[error("Invalid password: must be at most 64 characters")]
    PasswordTooLong,
    #[error("Invalid password: contains non-printable or space characters")]
    PasswordBadByte,
}

/// Validated server parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub password: String,
}

impl ServerConfig {
    /// Parse `<port> <password>` from the program arguments (without the
    /// program name).
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let [port, password] = args else {
            return Err(ConfigError::Usage);
        };
        Ok(Self {
            port: validate_port(port)?,
            password: validate_password(password)?.to_owned(),
        })
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}", self.port)
    }
}

/// Exactly four decimal digits, value in 6665-6669. No sign, no spaces.
fn validate_port(input: &str) -> Result<u16, ConfigError> {
    if input.len() != 4 {
        return Err(ConfigError::PortLength);
    }
    if !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::PortNotNumeric);
    }
    let port: u16 = input.parse().map_err(|_| ConfigError::PortNotNumeric)?;
    if !(6665..=6669).contains(&port) {
        return Err(ConfigError::PortRange);
    }
    Ok(port)
}

/// 8-64 bytes, every byte printable and not a space.
fn validate_password(input: &str) -> Result<&str, ConfigError> {
    if input.len() < 8 {
        return Err(ConfigError::PasswordTooShort);
    }
    if input.len() > 64 {
        return Err(ConfigError::PasswordTooLong);
    }
    if !input.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(ConfigError::PasswordBadByte);
    }
    Ok(input)
}
