use crate::error::{AuthenticationError, ConfigError};
use crate::field::{self, FieldPath};
use crate::options::{StrategyOptions, VerifyOptions};
use crate::resolver::{CredentialResolver, ResolvedCredential};
use crate::totp::{RfcTotpVerifier, SecretEncoding, TotpVerifier, VerifyRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Name under which the TOTP strategy is registered with a host
pub const TOTP_STRATEGY_NAME: &str = "totp";

/// Request data of one authentication attempt
#[derive(Debug, Clone)]
pub struct AuthenticationContext<I> {
    /// Identity the host already attached to the request
    pub identity: Option<I>,
    /// Parsed request body
    pub body: Option<Value>,
    /// Parsed query string
    pub query: Option<Value>,
}

impl<I> Default for AuthenticationContext<I> {
    fn default() -> Self {
        Self {
            identity: None,
            body: None,
            query: None,
        }
    }
}

impl<I> AuthenticationContext<I> {
    /// An anonymous context without body or query
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the caller identity
    pub fn with_identity(mut self, identity: I) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Attach the request body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach the query container
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }
}

/// Terminal outcome of an authentication attempt
#[derive(Debug)]
pub enum Verdict<I> {
    /// The token was valid; carries the identity from the request unchanged
    Success(Option<I>),
    /// The token was absent or wrong
    Fail,
    /// Something other than the token went wrong
    Error(AuthenticationError),
}

impl<I> Verdict<I> {
    /// Whether this is [Verdict::Success]
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success(_))
    }

    /// Whether this is [Verdict::Fail]
    pub fn is_fail(&self) -> bool {
        matches!(self, Verdict::Fail)
    }

    /// Whether this is [Verdict::Error]
    pub fn is_error(&self) -> bool {
        matches!(self, Verdict::Error(_))
    }

    /// Deliver the verdict to the host, making exactly one call on `sink`
    pub fn report<S>(self, sink: &mut S)
    where
        S: VerdictSink<I> + ?Sized,
    {
        match self {
            Verdict::Success(identity) => sink.success(identity),
            Verdict::Fail => sink.fail(),
            Verdict::Error(cause) => sink.error(cause),
        }
    }
}

/// The host side of a verdict
pub trait VerdictSink<I> {
    /// Authentication succeeded for `identity`
    fn success(&mut self, identity: Option<I>);

    /// Authentication failed
    fn fail(&mut self);

    /// Authentication could not be completed
    fn error(&mut self, cause: AuthenticationError);
}

/// An authentication strategy a host can dispatch requests to
#[async_trait]
pub trait AuthStrategy<I: Send + Sync + 'static>: Send + Sync {
    /// Name of the strategy
    fn name(&self) -> &str;

    /// Run one authentication attempt
    async fn authenticate(&self, context: AuthenticationContext<I>) -> Verdict<I>;
}

/// Authenticates requests by the TOTP code they carry
///
/// The strategy keeps no state between attempts and can be shared freely.
pub struct TotpStrategy<R, V = RfcTotpVerifier> {
    field: FieldPath,
    verify_options: VerifyOptions,
    resolve_timeout: Option<Duration>,
    resolver: R,
    verifier: V,
}

impl<R> TotpStrategy<R> {
    /// Create a strategy with default options and the RFC 6238 verifier
    pub fn new(resolver: R) -> Self {
        let options = StrategyOptions::default();
        Self {
            field: FieldPath::parse(options.effective_field_name()),
            verify_options: options.verify_options,
            resolve_timeout: options.resolve_timeout,
            resolver,
            verifier: RfcTotpVerifier,
        }
    }

    /// Create a strategy from `options` and the RFC 6238 verifier
    pub fn with_options(options: StrategyOptions, resolver: R) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            field: FieldPath::parse(options.effective_field_name()),
            verify_options: options.verify_options,
            resolve_timeout: options.resolve_timeout,
            resolver,
            verifier: RfcTotpVerifier,
        })
    }
}

impl<R, V> TotpStrategy<R, V> {
    /// Replace the TOTP verifier
    pub fn with_verifier<W>(self, verifier: W) -> TotpStrategy<R, W> {
        TotpStrategy {
            field: self.field,
            verify_options: self.verify_options,
            resolve_timeout: self.resolve_timeout,
            resolver: self.resolver,
            verifier,
        }
    }

    /// Where the token is looked up
    pub fn field_path(&self) -> &FieldPath {
        &self.field
    }

    /// Options handed to the verifier
    pub fn verify_options(&self) -> &VerifyOptions {
        &self.verify_options
    }

    async fn resolve<I>(&self, identity: Option<&I>) -> Result<ResolvedCredential, AuthenticationError>
    where
        I: Sync + 'static,
        R: CredentialResolver<I>,
    {
        let resolution = self.resolver.resolve(identity);
        match self.resolve_timeout {
            Some(limit) => tokio::time::timeout(limit, resolution)
                .await
                .map_err(|_| AuthenticationError::Timeout(limit))?
                .map_err(AuthenticationError::Resolution),
            None => resolution.await.map_err(AuthenticationError::Resolution),
        }
    }
}

#[async_trait]
impl<I, R, V> AuthStrategy<I> for TotpStrategy<R, V>
where
    I: Send + Sync + 'static,
    R: CredentialResolver<I>,
    V: TotpVerifier,
{
    fn name(&self) -> &str {
        TOTP_STRATEGY_NAME
    }

    async fn authenticate(&self, context: AuthenticationContext<I>) -> Verdict<I> {
        let AuthenticationContext {
            identity,
            body,
            query,
        } = context;

        let token = field::lookup_token(body.as_ref(), query.as_ref(), &self.field);
        tracing::debug!(
            field = %self.field,
            token_present = token.is_some(),
            anonymous = identity.is_none(),
            "Extracted TOTP token"
        );

        let credential = match self.resolve(identity.as_ref()).await {
            Ok(credential) => credential,
            Err(error) => {
                tracing::warn!(%error, "Credential resolution failed");
                return Verdict::Error(error);
            }
        };

        let request = VerifyRequest {
            secret: &credential.secret,
            encoding: SecretEncoding::Base32,
            token: token.as_deref(),
            period: credential.period,
            options: &self.verify_options,
        };
        match self.verifier.verify(&request) {
            Ok(true) => {
                tracing::debug!("TOTP token accepted");
                Verdict::Success(identity)
            }
            Ok(false) => {
                tracing::debug!(token_present = token.is_some(), "TOTP token rejected");
                Verdict::Fail
            }
            Err(error) => {
                tracing::warn!(%error, "TOTP verifier failed");
                Verdict::Error(AuthenticationError::Verifier(Box::new(error)))
            }
        }
    }
}
