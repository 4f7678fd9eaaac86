//! Lifecycle of one paid query, as a state machine.
//!
//! ```text
//! Idle --Submit--> Connecting --Connected--> Paying --Completed--> Success
//!  |                   |                        |
//!  |                   +--------Failed----------+--> Error --Submit--> Connecting
//!  +--PreconditionFailed-----------------------------> Error
//! ```
//!
//! [`PaymentState::transition`] is total over [`PaymentEvent`]: a pair not drawn
//! above is a [`TransitionError`] and leaves the state untouched.

use serde_json::Value;

/// Why a query ended in [`PaymentState::Error`].
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentFailure {
    pub message: String,
    /// The server said retrying may succeed.
    pub retryable: bool,
    /// Full response body, when there was one.
    pub response: Option<Value>,
    /// Where the user can top up the wallet, when the server offered it.
    pub fund_wallet_link: Option<String>,
}

impl PaymentFailure {
    /// A failure detected before any request was sent.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            response: None,
            fund_wallet_link: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum PaymentState {
    #[default]
    Idle,
    Connecting,
    Paying,
    Success { response: Value },
    Error(PaymentFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    /// The user asked for the resource (or retried).
    Submit,
    /// The query can not start, e.g. no wallet is connected.
    PreconditionFailed { message: String },
    Connected,
    Completed { response: Value },
    Failed(PaymentFailure),
    /// Back to `Idle` after a finished query.
    Reset,
}

impl PaymentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentEvent::Submit => "submit",
            PaymentEvent::PreconditionFailed { .. } => "precondition_failed",
            PaymentEvent::Connected => "connected",
            PaymentEvent::Completed { .. } => "completed",
            PaymentEvent::Failed(_) => "failed",
            PaymentEvent::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Event {event} is not allowed in state {state}")]
pub struct TransitionError {
    pub state: &'static str,
    pub event: &'static str,
}

impl PaymentState {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentState::Idle => "idle",
            PaymentState::Connecting => "connecting",
            PaymentState::Paying => "paying",
            PaymentState::Success { .. } => "success",
            PaymentState::Error(_) => "error",
        }
    }

    /// A new query may start. False while one is in flight.
    pub fn can_submit(&self) -> bool {
        matches!(self, PaymentState::Idle | PaymentState::Error(_))
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, PaymentState::Connecting | PaymentState::Paying)
    }

    pub fn transition(&self, event: PaymentEvent) -> Result<PaymentState, TransitionError> {
        use PaymentEvent as E;
        use PaymentState as S;

        let next = match (self, event) {
            (S::Idle | S::Error(_), E::Submit) => S::Connecting,
            (S::Connecting, E::Connected) => S::Paying,
            (S::Idle | S::Error(_), E::PreconditionFailed { message }) => {
                S::Error(PaymentFailure::precondition(message))
            }
            (S::Connecting | S::Paying, E::Failed(failure)) => S::Error(failure),
            (S::Paying, E::Completed { response }) => S::Success { response },
            (S::Idle | S::Success { .. } | S::Error(_), E::Reset) => S::Idle,
            (state, event) => {
                return Err(TransitionError {
                    state: state.name(),
                    event: event.name(),
                });
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failure() -> PaymentFailure {
        PaymentFailure {
            message: "Payment settlement timeout".into(),
            retryable: true,
            response: Some(json!({ "retryable": true })),
            fund_wallet_link: None,
        }
    }

    #[test]
    fn test_happy_path() {
        let state = PaymentState::Idle
            .transition(PaymentEvent::Submit)
            .and_then(|s| s.transition(PaymentEvent::Connected))
            .and_then(|s| {
                s.transition(PaymentEvent::Completed {
                    response: json!({ "message": "paid" }),
                })
            })
            .unwrap();
        assert_eq!(
            state,
            PaymentState::Success {
                response: json!({ "message": "paid" })
            }
        );
    }

    #[test]
    fn test_error_can_be_retried() {
        let state = PaymentState::Paying
            .transition(PaymentEvent::Failed(failure()))
            .unwrap();
        assert!(state.can_submit());
        assert_eq!(
            state.transition(PaymentEvent::Submit),
            Ok(PaymentState::Connecting)
        );
    }

    #[test]
    fn test_precondition_failure_is_not_retryable() {
        let state = PaymentState::Idle
            .transition(PaymentEvent::PreconditionFailed {
                message: "connect first".into(),
            })
            .unwrap();
        let PaymentState::Error(failure) = state else {
            panic!("expected error state");
        };
        assert_eq!(failure.message, "connect first");
        assert!(!failure.retryable);
        assert_eq!(failure.response, None);
    }

    #[test]
    fn test_precondition_only_before_a_query_starts() {
        for state in [PaymentState::Connecting, PaymentState::Paying] {
            assert!(
                state
                    .transition(PaymentEvent::PreconditionFailed {
                        message: "connect first".into(),
                    })
                    .is_err()
            );
        }
    }

    #[test]
    fn test_no_double_submit() {
        for state in [PaymentState::Connecting, PaymentState::Paying] {
            assert!(!state.can_submit());
            assert!(state.is_in_flight());
            assert_eq!(
                state.transition(PaymentEvent::Submit),
                Err(TransitionError {
                    state: state.name(),
                    event: "submit"
                })
            );
        }
    }

    #[test]
    fn test_success_needs_reset_before_next_query() {
        let success = PaymentState::Success { response: json!({}) };
        assert!(!success.can_submit());
        assert!(success.transition(PaymentEvent::Submit).is_err());
        assert_eq!(success.transition(PaymentEvent::Reset), Ok(PaymentState::Idle));
    }

    #[test]
    fn test_completed_only_while_paying() {
        assert!(
            PaymentState::Idle
                .transition(PaymentEvent::Completed { response: json!({}) })
                .is_err()
        );
        assert!(PaymentState::Idle.transition(PaymentEvent::Connected).is_err());
    }
}
