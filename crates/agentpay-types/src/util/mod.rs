//! Helper types shared across agentpay crates.

pub mod b64;
pub mod money_amount;

pub use b64::*;
pub use money_amount::*;
