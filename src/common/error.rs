use std::error::Error;
use std::num::ParseIntError;
use std::result;
use std::fmt;

pub type Result<T> = result::Result<T, WebdeskError>;

#[derive(Debug)]
pub enum WebdeskError {
    SystemError(String),
    SetupError(String),
    PortError(String),
    ArtifactError(String),
    DisplayError(String),
    AudioError(String),
    GatewayError(String),
    Interrupted,
    IoError(std::io::Error),
    ConfigError(config::ConfigError),
}

impl WebdeskError {
    /// Returns the process exit code associated with the error.
    pub fn exit_code(&self) -> i32 {
        match self {
            WebdeskError::Interrupted => 130,
            _ => 1,
        }
    }
}

impl Error for WebdeskError {}

impl fmt::Display for WebdeskError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WebdeskError::SystemError(message) => write!(formatter, "SystemError: {}", message),
            WebdeskError::SetupError(message) => write!(formatter, "SetupError: {}", message),
            WebdeskError::PortError(message) => write!(formatter, "PortError: {}", message),
            WebdeskError::ArtifactError(message) => write!(formatter, "ArtifactError: {}", message),
            WebdeskError::DisplayError(message) => write!(formatter, "DisplayError: {}", message),
            WebdeskError::AudioError(message) => write!(formatter, "AudioError: {}", message),
            WebdeskError::GatewayError(message) => write!(formatter, "GatewayError: {}", message),
            WebdeskError::Interrupted => write!(formatter, "Interrupted"),
            WebdeskError::IoError(err) => write!(formatter, "IoError: {}", err),
            WebdeskError::ConfigError(err) => write!(formatter, "ConfigError: {}", err),
        }
    }
}

impl From<std::io::Error> for WebdeskError {
    fn from(err: std::io::Error) -> Self {
        WebdeskError::IoError(err)
    }
}

impl From<config::ConfigError> for WebdeskError {
    fn from(err: config::ConfigError) -> Self {
        WebdeskError::ConfigError(err)
    }
}

impl From<reqwest::Error> for WebdeskError {
    fn from(err: reqwest::Error) -> Self {
        WebdeskError::GatewayError(err.to_string())
    }
}

impl From<nix::Error> for WebdeskError {
    fn from(err: nix::Error) -> Self {
        WebdeskError::SystemError(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for WebdeskError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        WebdeskError::SystemError(err.to_string())
    }
}

impl From<ParseIntError> for WebdeskError {
    fn from(err: ParseIntError) -> Self {
        WebdeskError::SystemError(err.to_string())
    }
}
