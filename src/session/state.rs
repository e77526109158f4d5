use serde::Serialize;
use std::fmt;

/// Coarse phase of a session.
///
/// `Idle` and `Listening` together form the "available" state: neither
/// speaking nor working on a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl Phase {
    pub fn is_available(self) -> bool {
        matches!(self, Phase::Idle | Phase::Listening)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Listening => "listening",
            Phase::Processing => "processing",
            Phase::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_phases() {
        assert!(Phase::Idle.is_available());
        assert!(Phase::Listening.is_available());
        assert!(!Phase::Processing.is_available());
        assert!(!Phase::Speaking.is_available());
        assert_eq!(Phase::default(), Phase::Idle);
        assert_eq!(Phase::Speaking.to_string(), "speaking");
    }
}
