#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc = include_str!("../README.md")]

/// Error types shared across the crate
pub mod error;

/// Field path parsing and lookup in request containers
pub mod field;

/// Strategy and verifier configuration
pub mod options;

/// Credential resolvers
pub mod resolver;

/// HOTP (HMAC-based One-Time Password) generation and verification
pub mod hotp;

/// TOTP (Time-based One-Time Password) generation and verification
pub mod totp;

/// The TOTP authentication strategy
pub mod strategy;

pub use error::{AuthenticationError, ConfigError, ResolveError};
pub use options::{StrategyOptions, VerifyOptions};
pub use resolver::{CallbackResolver, Completion, CredentialResolver, ResolvedCredential};
pub use strategy::{AuthStrategy, AuthenticationContext, TotpStrategy, Verdict, VerdictSink};
pub use totp::{RfcTotpVerifier, TotpVerifier, VerifyRequest};
