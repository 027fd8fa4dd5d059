//! HTTP handlers.
//!
//! Handlers are thin: transport concerns (origin, body limits, response
//! framing) live here, every decision lives in `aigate_core::Gateway`.

pub mod ai;
