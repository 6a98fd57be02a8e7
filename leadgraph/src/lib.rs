//! Progressive lead enrichment and multi-stage analysis.
//!
//! Two engines, each a [`vantage::graphs::GraphBuilder`] app: the
//! progressive enrichment engine ([`enrichment`], C1-C5+C9+C10) turns a
//! website URL into a scored, attributed field set over three time-boxed
//! layers of [`sources`]; the analysis pipeline ([`pipeline`], C6-C8) turns
//! a completed enrichment session plus a submitted challenge statement into
//! a six-stage strategy report. [`http`] exposes both over a small axum
//! surface; [`persistence`] and [`cache`] hold the four durable relations
//! and the two content-addressed caches that connect them.

pub mod breaker;
pub mod cache;
pub mod config;
pub mod domain;
pub mod enrichment;
pub mod errors;
pub mod events;
pub mod http;
pub mod llm;
pub mod normalize;
pub mod persistence;
pub mod pipeline;
pub mod session_loader;
pub mod sources;
pub mod translator;
