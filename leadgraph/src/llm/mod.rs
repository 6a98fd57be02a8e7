//! The LLM client (C7): a `rig-core`-backed completion client wrapped by
//! `vantage_guard`'s injection-detection pipeline, plus the per-model price
//! table both this module and the analysis pipeline's cost accounting rely
//! on.

pub mod client;
pub mod pricing;
pub mod sanitize;

pub use client::{LlmClient, LlmResponse, ResponseSchema};
pub use pricing::{price_for, ModelPrice};
pub use sanitize::{Sanitized, Sanitizer};
