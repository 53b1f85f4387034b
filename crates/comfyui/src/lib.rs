//! ComfyUI REST client and job orchestration.
//!
//! Provides the HTTP API wrapper, the [`backend::ExecutionBackend`] seam,
//! startup readiness checks, submit-and-poll execution, failure
//! diagnostics and unified job status resolution.

pub mod api;
pub mod backend;
pub mod diagnostics;
pub mod executor;
pub mod history;
pub mod metadata;
pub mod readiness;
pub mod resolver;

#[cfg(test)]
pub(crate) mod fake;
