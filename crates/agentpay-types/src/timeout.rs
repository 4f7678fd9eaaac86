//! Retryable-timeout classification for failed settlements.
//!
//! The facilitator reports failures as free text. A failure whose text carries
//! one of [`TIMEOUT_MARKERS`] is a [`SettlementFault::TimedOut`]: the client is
//! told to retry (HTTP 408). Anything else is [`SettlementFault::Rejected`] and
//! relayed unchanged.
//!
//! The marker list mirrors the wording of gateway and socket errors (`524`,
//! `504`, `ECONNRESET`, ...). It silently misclassifies if that wording changes.

use serde_json::Value;

/// Substrings that mark an error text as a timeout.
pub const TIMEOUT_MARKERS: &[&str] = &[
    "524",
    "504",
    "timeout",
    "Timeout",
    "A timeout occurred",
    "ECONNRESET",
    "ETIMEDOUT",
];

/// Structured verdict on a failed settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementFault {
    /// The attempt ran out of time somewhere upstream; retrying may succeed.
    TimedOut,
    /// The payment was refused or failed for another reason.
    Rejected,
}

impl SettlementFault {
    pub fn classify(text: &str) -> Self {
        if is_timeout(text) {
            SettlementFault::TimedOut
        } else {
            SettlementFault::Rejected
        }
    }

    /// Classifies an unsettled facilitator body by its error text.
    pub fn classify_body(body: &Value) -> Self {
        Self::classify(&error_text(body))
    }
}

pub fn is_timeout(text: &str) -> bool {
    TIMEOUT_MARKERS.iter().any(|marker| text.contains(marker))
}

/// The error text of a facilitator body: `errorMessage`, else `error`, else empty.
///
/// The body as a whole is not inspected: `accepts` entries contain the field
/// name `maxTimeoutSeconds`, which would always match.
pub fn error_text(body: &Value) -> String {
    ["errorMessage", "error"]
        .iter()
        .find_map(|field| match body.get(field) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_marker_is_a_timeout() {
        for marker in TIMEOUT_MARKERS {
            let text = format!("settle failed: {marker} while waiting");
            assert_eq!(SettlementFault::classify(&text), SettlementFault::TimedOut, "{text}");
        }
    }

    #[test]
    fn test_other_text_is_rejected() {
        assert_eq!(
            SettlementFault::classify("insufficient_funds"),
            SettlementFault::Rejected
        );
        assert_eq!(SettlementFault::classify(""), SettlementFault::Rejected);
    }

    #[test]
    fn test_body_error_message_wins() {
        let body = json!({ "error": "settle_failed", "errorMessage": "Gateway 504" });
        assert_eq!(SettlementFault::classify_body(&body), SettlementFault::TimedOut);

        let body = json!({ "error": "A timeout occurred" });
        assert_eq!(SettlementFault::classify_body(&body), SettlementFault::TimedOut);
    }

    #[test]
    fn test_accepts_do_not_trigger_timeout() {
        let body = json!({
            "x402Version": 1,
            "error": "X-PAYMENT header is required",
            "accepts": [{ "maxTimeoutSeconds": 300 }]
        });
        assert_eq!(SettlementFault::classify_body(&body), SettlementFault::Rejected);
    }
}
