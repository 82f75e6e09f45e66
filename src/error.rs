use std::error::Error;
use std::time::Duration;

/// Error reported by a credential resolver, passed on unchanged
pub type ResolveError = Box<dyn Error + Send + Sync>;

/// Cause carried by an error verdict
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    /// The credential resolver failed
    #[error("Credential resolution failed: {0}")]
    Resolution(#[source] ResolveError),
    /// The credential resolver did not answer within the configured timeout
    #[error("Credential resolution timed out after {0:?}")]
    Timeout(Duration),
    /// The TOTP verifier could not reach a verdict
    #[error("TOTP verifier failed: {0}")]
    Verifier(#[source] Box<dyn Error + Send + Sync>),
}

impl AuthenticationError {
    /// The resolver's own error, if resolution is what failed
    pub fn resolution_cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            AuthenticationError::Resolution(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// Invalid strategy configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A verify option would override a value the strategy supplies itself
    #[error("Verify option `{0}` is reserved and cannot be configured")]
    ReservedVerifyOption(&'static str),
    /// The drift window exceeds [MAX_VERIFY_WINDOW](crate::options::MAX_VERIFY_WINDOW)
    #[error("Verify window {0} exceeds the maximum of {max}", max = crate::options::MAX_VERIFY_WINDOW)]
    WindowTooLarge(u64),
    /// The time step is zero
    #[error("TOTP time step must be greater than zero")]
    ZeroStep,
    /// The code length is outside of `1..=9`
    #[error("Unsupported TOTP code length: {0}")]
    UnsupportedDigits(u32),
    /// The resolve timeout is zero
    #[error("Resolve timeout must be greater than zero")]
    ZeroTimeout,
}

/// The credential resolver released its completion handle without answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Credential resolver dropped its completion handle without answering")]
pub struct CompletionDropped;
