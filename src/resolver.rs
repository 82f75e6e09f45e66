use crate::error::{CompletionDropped, ResolveError};
use async_trait::async_trait;
use compact_str::CompactString;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Secret and time step resolved for one authentication attempt
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    /// Base32 encoded TOTP secret
    pub secret: CompactString,
    /// Time step in seconds, if the credential store knows one
    pub period: Option<u64>,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("secret", &"<redacted>")
            .field("period", &self.period)
            .finish()
    }
}

impl ResolvedCredential {
    /// Create a credential without a period
    pub fn new(secret: impl Into<CompactString>) -> Self {
        Self {
            secret: secret.into(),
            period: None,
        }
    }

    /// Attach the time step in seconds
    pub fn with_period(mut self, period: u64) -> Self {
        self.period = Some(period);
        self
    }
}

/// Looks up the TOTP secret of a caller
///
/// `identity` is whatever the host attached to the request, and is `None` for
/// anonymous requests. Errors are reported to the host unchanged.
#[async_trait]
pub trait CredentialResolver<I: Sync + 'static>: Send + Sync {
    /// Resolve the credential of `identity`
    async fn resolve(&self, identity: Option<&I>) -> Result<ResolvedCredential, ResolveError>;
}

#[async_trait]
impl<I, R> CredentialResolver<I> for Arc<R>
where
    I: Sync + 'static,
    R: CredentialResolver<I> + ?Sized,
{
    async fn resolve(&self, identity: Option<&I>) -> Result<ResolvedCredential, ResolveError> {
        (**self).resolve(identity).await
    }
}

/// Single-use handle through which a [CallbackResolver] answers
///
/// Answering consumes the handle, so a callback can answer at most once.
/// Dropping it unanswered fails the attempt with [CompletionDropped].
#[derive(Debug)]
pub struct Completion {
    sender: oneshot::Sender<Result<ResolvedCredential, ResolveError>>,
}

impl Completion {
    /// Answer with a secret and an optional period
    pub fn resolve(self, secret: impl Into<CompactString>, period: Option<u64>) {
        self.complete(Ok(ResolvedCredential {
            secret: secret.into(),
            period,
        }));
    }

    /// Answer with an error
    pub fn reject(self, error: impl Into<ResolveError>) {
        self.complete(Err(error.into()));
    }

    /// Answer with a ready result
    pub fn complete(self, result: Result<ResolvedCredential, ResolveError>) {
        if self.sender.send(result).is_err() {
            tracing::debug!("authentication attempt ended before the credential resolver answered");
        }
    }
}

/// Adapts a `(identity, completion)` callback into a [CredentialResolver]
///
/// The callback may answer synchronously, or move the [Completion] into a task
/// and answer later.
pub struct CallbackResolver<F> {
    setup: F,
}

impl<F> CallbackResolver<F> {
    /// Wrap a callback
    pub fn new(setup: F) -> Self {
        Self { setup }
    }
}

#[async_trait]
impl<I, F> CredentialResolver<I> for CallbackResolver<F>
where
    I: Sync + 'static,
    F: Fn(Option<&I>, Completion) + Send + Sync,
{
    async fn resolve(&self, identity: Option<&I>) -> Result<ResolvedCredential, ResolveError> {
        let (sender, receiver) = oneshot::channel();
        (self.setup)(identity, Completion { sender });
        receiver.await.map_err(|_| Box::new(CompletionDropped) as ResolveError)?
    }
}
