use serde::{Deserialize, Serialize};

use crate::types::RateLimitedMetadata;

/// Lifecycle state of a stream as tracked by the pipeline.
///
/// `Pending`, `Complete` and `Incomplete` are sticky: once a stream reaches one of
/// them it never leaves it for the remainder of the attempt. `Running` and
/// `RateLimited` are volatile and accept any transition, including back to
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Running,
    RateLimited,
    Complete,
    Incomplete,
}

/// Everything the pipeline knows about a single stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStatusValue {
    pub run_state: Option<RunState>,
    /// Highest checkpoint id observed for this stream, from either side.
    pub latest_state_id: Option<u64>,
    /// Whether the source has emitted a terminal COMPLETE status for this stream.
    pub source_complete: bool,
    /// Whether no record has been seen for this stream yet.
    pub stream_empty: bool,
    /// Rate-limit metadata, present while the stream is known to be throttled.
    pub metadata: Option<RateLimitedMetadata>,
}

impl Default for StreamStatusValue {
    fn default() -> Self {
        Self {
            run_state: None,
            latest_state_id: None,
            source_complete: false,
            stream_empty: true,
            metadata: None,
        }
    }
}

/// Decides which run state wins when a new value arrives for a stream.
///
/// The transition table is deliberately explicit: a missing current state accepts
/// anything, volatile states accept anything, sticky states always re-assert
/// themselves (which also permits the no-op self transition).
pub fn resolve_run_state(current: Option<RunState>, incoming: RunState) -> RunState {
    match (current, incoming) {
        (None, incoming) => incoming,
        (Some(RunState::Running), incoming) | (Some(RunState::RateLimited), incoming) => incoming,
        (Some(current @ RunState::Pending), _)
        | (Some(current @ RunState::Complete), _)
        | (Some(current @ RunState::Incomplete), _) => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RunState; 5] = [
        RunState::Pending,
        RunState::Running,
        RunState::RateLimited,
        RunState::Complete,
        RunState::Incomplete,
    ];

    #[test]
    fn test_missing_current_accepts_any_incoming() {
        for incoming in ALL {
            assert_eq!(resolve_run_state(None, incoming), incoming);
        }
    }

    #[test]
    fn test_volatile_states_accept_any_incoming() {
        for current in [RunState::Running, RunState::RateLimited] {
            for incoming in ALL {
                assert_eq!(resolve_run_state(Some(current), incoming), incoming);
            }
        }
    }

    #[test]
    fn test_sticky_states_never_change() {
        for current in [RunState::Pending, RunState::Complete, RunState::Incomplete] {
            for incoming in ALL {
                assert_eq!(resolve_run_state(Some(current), incoming), current);
            }
        }
    }

    #[test]
    fn test_self_transitions_are_stable() {
        for state in ALL {
            assert_eq!(resolve_run_state(Some(state), state), state);
        }
    }

    #[test]
    fn test_default_value_starts_empty() {
        let value = StreamStatusValue::default();

        assert_eq!(value.run_state, None);
        assert_eq!(value.latest_state_id, None);
        assert!(!value.source_complete);
        assert!(value.stream_empty);
        assert_eq!(value.metadata, None);
    }
}
