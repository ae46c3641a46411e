use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadAddress(String),
    BadPortsRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadAddress(e) => write!(f, "Bind address error: {}", e),
            ConfigError::BadPortsRange(e) => write!(f, "Port range error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Reasons a query payload did not become a record. All of these are
/// recoverable: the listener drops the packet and keeps serving.
#[derive(Debug)]
pub enum PacketError {
    Empty,
    BadEncoding(base64::DecodeError),
    WrongLength(usize),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Empty => write!(f, "Payload empty or absent"),
            PacketError::BadEncoding(e) => write!(f, "Payload is not valid base64url: {}", e),
            PacketError::WrongLength(n) => {
                write!(f, "Payload decoded to {} byte(s), expected a full packet", n)
            }
        }
    }
}

impl std::error::Error for PacketError {}

impl From<base64::DecodeError> for PacketError {
    fn from(err: base64::DecodeError) -> Self {
        PacketError::BadEncoding(err)
    }
}

#[derive(Debug)]
pub enum ListenerError {
    SockError(std::io::Error),
    BindError(std::io::Error),
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerError::SockError(e) => write!(f, "Socket error: {}", e),
            ListenerError::BindError(e) => write!(f, "Bind error: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "Export write failed: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err)
    }
}
