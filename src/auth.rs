use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::info;

use crate::model::CommandType;

/// Proof that the PIN was just supplied for `action`. Only the gate mints it
/// and issuing a command consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Authorization {
    action: CommandType,
}

impl Authorization {
    pub fn action(&self) -> CommandType {
        self.action
    }

    #[cfg(test)]
    pub(crate) fn for_test(action: CommandType) -> Self {
        Self { action }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    Authorized(Authorization),
    Denied,
    NoPendingAction,
}

struct Challenge {
    action: CommandType,
    issued_at: Instant,
}

/// PIN challenge state per operator session. A session is either idle (no
/// entry) or awaiting the PIN for exactly one action. A challenge older than
/// `ttl` counts as idle.
pub struct AuthorizationGate {
    secret: String,
    ttl: Duration,
    awaiting: Mutex<HashMap<String, Challenge>>,
}

impl AuthorizationGate {
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
            awaiting: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Challenge>> {
        self.awaiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes the session's challenge and returns its action if it has not
    /// expired.
    fn take_live(&self, session: &str) -> Option<CommandType> {
        let challenge = self.sessions().remove(session)?;
        if challenge.issued_at.elapsed() < self.ttl {
            Some(challenge.action)
        } else {
            info!("PIN prompt for {} expired in session {session}", challenge.action);
            None
        }
    }

    /// Replaces any challenge already open for the session.
    pub fn begin(&self, session: &str, action: CommandType) {
        let challenge = Challenge {
            action,
            issued_at: Instant::now(),
        };
        self.sessions().insert(session.to_string(), challenge);
    }

    pub fn awaiting(&self, session: &str) -> Option<CommandType> {
        let mut sessions = self.sessions();
        let live = sessions
            .get(session)
            .map(|c| (c.action, c.issued_at.elapsed() < self.ttl));
        match live {
            Some((action, true)) => Some(action),
            Some((_, false)) => {
                sessions.remove(session);
                None
            }
            None => None,
        }
    }

    /// Consumes the pending challenge whatever the outcome.
    pub fn resolve(&self, session: &str, supplied: &str) -> Resolution {
        let Some(action) = self.take_live(session) else {
            return Resolution::NoPendingAction;
        };

        if constant_time_eq(supplied.trim().as_bytes(), self.secret.as_bytes()) {
            info!("PIN accepted for {action} in session {session}");
            Resolution::Authorized(Authorization { action })
        } else {
            info!("wrong PIN for {action} in session {session}");
            Resolution::Denied
        }
    }

    /// Drops the pending challenge. Returns the action that was waiting, if any.
    pub fn cancel(&self, session: &str) -> Option<CommandType> {
        self.take_live(session)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new("8748", Duration::from_secs(120))
    }

    #[test]
    fn test_correct_pin_authorizes_pending_action() {
        let gate = gate();
        gate.begin("chat-1", CommandType::StartIgnition);

        match gate.resolve("chat-1", "8748") {
            Resolution::Authorized(grant) => assert_eq!(grant.action(), CommandType::StartIgnition),
            other => panic!("expected authorization, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_pin_is_denied() {
        let gate = gate();
        gate.begin("chat-1", CommandType::StartStarter);
        assert_eq!(gate.resolve("chat-1", "0000"), Resolution::Denied);
        assert_eq!(gate.resolve("chat-1", "87481"), Resolution::NoPendingAction);
    }

    #[test]
    fn test_challenge_is_single_use() {
        for pin in ["8748", "1234", ""] {
            let gate = gate();
            gate.begin("chat-1", CommandType::ResetCounters);
            gate.resolve("chat-1", pin);
            assert_eq!(gate.resolve("chat-1", "8748"), Resolution::NoPendingAction);
            assert_eq!(gate.awaiting("chat-1"), None);
        }
    }

    #[test]
    fn test_begin_overwrites_previous_action() {
        let gate = gate();
        gate.begin("chat-1", CommandType::StartIgnition);
        gate.begin("chat-1", CommandType::PowerSaveOn);

        assert_eq!(gate.awaiting("chat-1"), Some(CommandType::PowerSaveOn));
        match gate.resolve("chat-1", "8748") {
            Resolution::Authorized(grant) => assert_eq!(grant.action(), CommandType::PowerSaveOn),
            other => panic!("expected authorization, got {other:?}"),
        }
    }

    #[test]
    fn test_sessions_are_independent() {
        let gate = gate();
        gate.begin("chat-1", CommandType::StartIgnition);

        assert_eq!(gate.resolve("chat-2", "8748"), Resolution::NoPendingAction);
        assert_eq!(gate.awaiting("chat-1"), Some(CommandType::StartIgnition));
    }

    #[test]
    fn test_cancel_clears() {
        let gate = gate();
        gate.begin("chat-1", CommandType::StartStarter);

        assert_eq!(gate.cancel("chat-1"), Some(CommandType::StartStarter));
        assert_eq!(gate.cancel("chat-1"), None);
        assert_eq!(gate.resolve("chat-1", "8748"), Resolution::NoPendingAction);
    }

    #[test]
    fn test_abandoned_challenge_expires() {
        let gate = AuthorizationGate::new("8748", Duration::from_millis(20));
        gate.begin("chat-1", CommandType::StartIgnition);
        assert_eq!(gate.awaiting("chat-1"), Some(CommandType::StartIgnition));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(gate.awaiting("chat-1"), None);
        assert_eq!(gate.resolve("chat-1", "8748"), Resolution::NoPendingAction);
    }

    #[test]
    fn test_expired_challenge_cannot_be_resolved() {
        let gate = AuthorizationGate::new("8748", Duration::ZERO);
        gate.begin("chat-1", CommandType::PowerSaveOn);
        assert_eq!(gate.resolve("chat-1", "8748"), Resolution::NoPendingAction);
        assert_eq!(gate.cancel("chat-1"), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"8748", b"8748"));
        assert!(!constant_time_eq(b"8748", b"8749"));
        assert!(!constant_time_eq(b"874", b"8748"));
    }
}
