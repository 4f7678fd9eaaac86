#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for agentpay.
//!
//! agentpay puts a pay-per-request gate in front of a few HTTP endpoints. A client
//! presents an x402 payment token, the server hands it to an external facilitator
//! for settlement, and only a settled payment unlocks the response.
//!
//! This crate holds everything both sides of that exchange agree on:
//!
//! - [`network`] - Network modes (`dev`/`main`) and their Monad chain deployments
//! - [`proto`] - Wire types: payment requirements, 402 bodies and response envelopes
//! - [`settlement`] - The [`Settler`](settlement::Settler) seam, settlement requests and outcomes
//! - [`timeout`] - Classification of settlement failures into retryable timeouts
//! - [`util`] - Helper types (base64, money amounts)

pub mod network;
pub mod proto;
pub mod settlement;
pub mod timeout;
pub mod util;
