use std::collections::HashMap;
use std::sync::Mutex;

/// Where a user is in the private-key reveal conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingConfirmation,
    Done,
}

/// How a reply to the reveal prompt was understood
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealAnswer {
    Reveal,
    Decline,
    Invalid,
}

impl RevealAnswer {
    pub fn classify(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "yes" | "y" => RevealAnswer::Reveal,
            "no" | "n" => RevealAnswer::Decline,
            _ => RevealAnswer::Invalid,
        }
    }
}

/// Per-user reveal sessions
#[derive(Default)]
pub struct Sessions {
    states: Mutex<HashMap<String, SessionState>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a reveal conversation
    pub fn begin(&self, user_id: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(user_id.to_string(), SessionState::AwaitingConfirmation);
        }
    }

    pub fn state(&self, user_id: &str) -> Option<SessionState> {
        self.states.lock().ok()?.get(user_id).copied()
    }

    pub fn is_awaiting(&self, user_id: &str) -> bool {
        self.state(user_id) == Some(SessionState::AwaitingConfirmation)
    }

    /// Feed a reply into the conversation. `None` if the user wasn't being asked.
    /// A yes or no finishes the session, anything else keeps it open.
    pub fn answer(&self, user_id: &str, text: &str) -> Option<RevealAnswer> {
        let mut states = self.states.lock().ok()?;
        let state = states.get_mut(user_id)?;
        if *state != SessionState::AwaitingConfirmation {
            return None;
        }
        let answer = RevealAnswer::classify(text);
        if answer != RevealAnswer::Invalid {
            *state = SessionState::Done;
        }
        Some(answer)
    }

    /// End any open conversation. Returns whether one was open.
    pub fn cancel(&self, user_id: &str) -> bool {
        match self.states.lock() {
            Ok(mut states) => {
                states.insert(user_id.to_string(), SessionState::Done)
                    == Some(SessionState::AwaitingConfirmation)
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(RevealAnswer::classify(" YES "), RevealAnswer::Reveal);
        assert_eq!(RevealAnswer::classify("y"), RevealAnswer::Reveal);
        assert_eq!(RevealAnswer::classify("No"), RevealAnswer::Decline);
        assert_eq!(RevealAnswer::classify("maybe"), RevealAnswer::Invalid);
    }

    #[test]
    fn test_invalid_answer_keeps_waiting() {
        let sessions = Sessions::new();
        sessions.begin("1");
        assert_eq!(sessions.answer("1", "what?"), Some(RevealAnswer::Invalid));
        assert!(sessions.is_awaiting("1"));
        assert_eq!(sessions.answer("1", "yes"), Some(RevealAnswer::Reveal));
        assert_eq!(sessions.state("1"), Some(SessionState::Done));
        // Once done, further text is not treated as an answer
        assert_eq!(sessions.answer("1", "yes"), None);
    }

    #[test]
    fn test_cancel_and_unknown_users() {
        let sessions = Sessions::new();
        assert_eq!(sessions.answer("2", "yes"), None);
        assert!(!sessions.cancel("2"));
        sessions.begin("2");
        assert!(sessions.cancel("2"));
        assert!(!sessions.is_awaiting("2"));
    }
}
