//! LubeLogger module
//!
//! HTTP client for the LubeLogger instance that stores vehicles, documents
//! and gas records.

mod client;

pub use client::{GasRecord, LubeLoggerClient, UpstreamError};
