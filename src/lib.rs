//! mineops: review and record-keeping client for the mining back-office API.
//!
//! Re-exports modules needed by integration tests in `tests/`.

pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod view;
pub mod workflow;
