use std::fmt;

use crate::common::{Result, WebdeskError};

/// Progress of the service startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartupState {
    NotStarted,
    DisplayUp,
    AudioUp,
    GatewayStarting,
    Ready,
    Failed,
}

impl StartupState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StartupState::Ready | StartupState::Failed)
    }

    /// Moves to the next state. Services start strictly in order; any non-terminal state may fail.
    pub fn advance(self, next: StartupState) -> Result<StartupState> {
        let allowed = matches!(
            (self, next),
            (StartupState::NotStarted, StartupState::DisplayUp)
                | (StartupState::DisplayUp, StartupState::AudioUp)
                | (StartupState::AudioUp, StartupState::GatewayStarting)
                | (StartupState::GatewayStarting, StartupState::Ready)
        ) || (next == StartupState::Failed && !self.is_terminal());

        if !allowed {
            return Err(WebdeskError::SystemError(format!("Invalid startup transition {} -> {}", self, next)));
        }

        debug!("Startup state {} -> {}", self, next);
        Ok(next)
    }
}

impl fmt::Display for StartupState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StartupState::NotStarted => "NOT_STARTED",
            StartupState::DisplayUp => "DISPLAY_UP",
            StartupState::AudioUp => "AUDIO_UP",
            StartupState::GatewayStarting => "GATEWAY_STARTING",
            StartupState::Ready => "READY",
            StartupState::Failed => "FAILED",
        };
        write!(formatter, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_startup_order() {
        let state = StartupState::NotStarted
            .advance(StartupState::DisplayUp)
            .and_then(|state| state.advance(StartupState::AudioUp))
            .and_then(|state| state.advance(StartupState::GatewayStarting))
            .and_then(|state| state.advance(StartupState::Ready))
            .unwrap();

        assert_eq!(state, StartupState::Ready);
    }

    #[test]
    fn rejects_skipped_and_terminal_transitions() {
        assert!(StartupState::NotStarted.advance(StartupState::AudioUp).is_err());
        assert!(StartupState::DisplayUp.advance(StartupState::GatewayStarting).is_err());
        assert!(StartupState::Ready.advance(StartupState::Failed).is_err());
        assert!(StartupState::Failed.advance(StartupState::DisplayUp).is_err());
    }

    #[test]
    fn any_running_state_can_fail() {
        for state in [StartupState::NotStarted, StartupState::DisplayUp, StartupState::AudioUp, StartupState::GatewayStarting] {
            assert_eq!(state.advance(StartupState::Failed).unwrap(), StartupState::Failed);
        }
    }
}
