//! API module
//!
//! HTTP client for the gas receipt API, used by the command line form.

mod client;

pub use client::{BackendClient, ClientError, FormSession, SubmissionStatus};
