//! Narration-related type definitions
//!
//! Supporting types for the narration session lifecycle.

use serde::{Deserialize, Serialize};

/// Narration session state
///
/// Lifecycle: `Idle -> Buffering -> Playing -> (Buffering <-> Playing)* -> Done`.
/// `Aborted` is reachable from any running state, `Failed` from Buffering or
/// Playing. `Done`, `Failed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum NarrationState {
    /// No session has run yet
    Idle,
    /// Waiting for the next decoded buffer
    Buffering,
    /// A buffer is scheduled on the output
    Playing,
    /// Every segment was played or skipped, at least one was audible
    Done,
    /// The session could not make audible progress
    Failed,
    /// Stopped by the user or replaced by a newer session
    Aborted,
}

impl NarrationState {
    /// Terminal states never change again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NarrationState::Done | NarrationState::Failed | NarrationState::Aborted
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: NarrationState) -> bool {
        use NarrationState::*;
        match (self, next) {
            (Idle, Buffering) => true,
            (Buffering, Playing) | (Playing, Buffering) => true,
            (Buffering, Done) | (Playing, Done) => true,
            (Buffering, Failed) | (Playing, Failed) => true,
            (Idle, Aborted) => false,
            (from, Aborted) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for NarrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NarrationState::Idle => write!(f, "IDLE"),
            NarrationState::Buffering => write!(f, "BUFFERING"),
            NarrationState::Playing => write!(f, "PLAYING"),
            NarrationState::Done => write!(f, "DONE"),
            NarrationState::Failed => write!(f, "FAILED"),
            NarrationState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// How the text of a session is cut into segments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NarrationMode {
    /// Sentence-by-sentence narration of a longer text
    #[default]
    Continuous,
    /// The whole text spoken as one on-demand utterance
    Utterance,
}

impl std::fmt::Display for NarrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NarrationMode::Continuous => write!(f, "continuous"),
            NarrationMode::Utterance => write!(f, "utterance"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(NarrationState::Done.is_terminal());
        assert!(NarrationState::Failed.is_terminal());
        assert!(NarrationState::Aborted.is_terminal());
        assert!(!NarrationState::Idle.is_terminal());
        assert!(!NarrationState::Buffering.is_terminal());
        assert!(!NarrationState::Playing.is_terminal());
    }

    #[test]
    fn test_lifecycle_transitions() {
        use NarrationState::*;
        assert!(Idle.can_transition_to(Buffering));
        assert!(Buffering.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Buffering));
        assert!(Playing.can_transition_to(Done));
        assert!(Buffering.can_transition_to(Aborted));
        assert!(Playing.can_transition_to(Failed));

        assert!(!Idle.can_transition_to(Playing));
        assert!(!Idle.can_transition_to(Aborted));
        assert!(!Done.can_transition_to(Aborted));
        assert!(!Aborted.can_transition_to(Buffering));
        assert!(!Failed.can_transition_to(Done));
    }

    #[test]
    fn test_state_serializes_uppercase() {
        let json = serde_json::to_string(&NarrationState::Buffering).unwrap();
        assert_eq!(json, "\"BUFFERING\"");
        assert_eq!(NarrationState::Failed.to_string(), "FAILED");
    }

    #[test]
    fn test_mode_parses_lowercase() {
        let mode: NarrationMode = serde_json::from_str("\"utterance\"").unwrap();
        assert_eq!(mode, NarrationMode::Utterance);
        assert_eq!(NarrationMode::default(), NarrationMode::Continuous);
    }
}
