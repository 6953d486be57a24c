//! Shared error types and observability helpers for the Viralwatch workspace.
//!
//! Every other crate depends on this one, so it stays small: the
//! [`ViralwatchError`] enum with its [`Result`] alias, and the
//! [`observability`] module that installs the process-wide `tracing`
//! subscriber.
//!
//! # Examples
//!
//! ```rust
//! use viralwatch_common::{Result, ViralwatchError};
//!
//! fn require_key(key: &str) -> Result<&str> {
//!     if key.is_empty() {
//!         return Err(ViralwatchError::Config("missing API key".into()));
//!     }
//!     Ok(key)
//! }
//!
//! assert!(require_key("").is_err());
//! ```

pub mod display;
pub mod observability;

/// Error types used across the Viralwatch crates.
///
/// The virality and fact-checking core never surfaces these for expected
/// misses (no data, bad model output); they are reserved for startup wiring
/// and for the generative-text clients, whose callers downgrade them.
#[derive(thiserror::Error, Debug)]
pub enum ViralwatchError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generative-text provider failed or returned something unusable.
    #[error("LLM error: {0}")]
    Llm(String),

    /// An external data source could not be reached or initialised.
    #[error("Source error: {0}")]
    Source(String),

    /// The persistence layer reported an error.
    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    /// Operation exceeded the configured timeout.
    #[error("Timeout occurred")]
    Timeout,
}

/// Convenient alias for results that use [`ViralwatchError`].
pub type Result<T> = std::result::Result<T, ViralwatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_their_context() {
        let err = ViralwatchError::Llm("empty completion".into());
        assert_eq!(err.to_string(), "LLM error: empty completion");

        let err: ViralwatchError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "Store error: disk full");
    }
}
