use std::fmt;
use std::io;

use bb_engine::asl::AslError;
use bb_engine::TimerError;

/// Errors from the control-side API.
#[derive(Debug)]
pub enum ControlError {
    InvalidChannel(usize),
    HostRunning,
    HostStopped,
    Asl(AslError),
    Timer(TimerError),
    Io(io::Error),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::InvalidChannel(ch) => write!(f, "no such channel: {}", ch),
            ControlError::HostRunning => write!(f, "host thread already running"),
            ControlError::HostStopped => write!(f, "host thread is not running"),
            ControlError::Asl(e) => write!(f, "asl: {}", e),
            ControlError::Timer(e) => write!(f, "timer: {}", e),
            ControlError::Io(e) => write!(f, "io: {}", e),
        }
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlError::Asl(e) => Some(e),
            ControlError::Timer(e) => Some(e),
            ControlError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AslError> for ControlError {
    fn from(e: AslError) -> Self {
        ControlError::Asl(e)
    }
}

impl From<TimerError> for ControlError {
    fn from(e: TimerError) -> Self {
        ControlError::Timer(e)
    }
}

impl From<io::Error> for ControlError {
    fn from(e: io::Error) -> Self {
        ControlError::Io(e)
    }
}
