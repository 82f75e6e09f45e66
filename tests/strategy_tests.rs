use async_trait::async_trait;
use serde_json::json;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use totp_strategy::error::CompletionDropped;
use totp_strategy::totp::{TotpParams, TotpSecret};
use totp_strategy::{
    AuthStrategy, AuthenticationContext, AuthenticationError, CallbackResolver, Completion,
    ConfigError, CredentialResolver, ResolveError, ResolvedCredential, StrategyOptions, TotpStrategy,
    TotpVerifier, Verdict, VerdictSink, VerifyOptions, VerifyRequest,
};

const SECRET: &str = "JBSWY3DPEHPK3PXP";
const NOW: u64 = 1_700_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
struct User {
    id: u32,
    name: &'static str,
}

fn alice() -> User {
    User { id: 1, name: "alice" }
}

/// Resolver answering from a fixed result and recording who asked
#[derive(Default)]
struct StubResolver {
    fail_with: Option<&'static str>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Option<u32>>>,
}

impl StubResolver {
    fn failing(message: &'static str) -> Self {
        Self {
            fail_with: Some(message),
            ..Self::default()
        }
    }
}

#[async_trait]
impl CredentialResolver<User> for StubResolver {
    async fn resolve(&self, identity: Option<&User>) -> Result<ResolvedCredential, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(identity.map(|u| u.id));
        match self.fail_with {
            Some(message) => Err(message.into()),
            None => Ok(ResolvedCredential::new(SECRET).with_period(30)),
        }
    }
}

/// Resolver that never answers
struct HangingResolver;

#[async_trait]
impl CredentialResolver<User> for HangingResolver {
    async fn resolve(&self, _: Option<&User>) -> Result<ResolvedCredential, ResolveError> {
        std::future::pending().await
    }
}

/// Resolver returning a credential with no secret
struct BlankSecretResolver;

#[async_trait]
impl CredentialResolver<User> for BlankSecretResolver {
    async fn resolve(&self, _: Option<&User>) -> Result<ResolvedCredential, ResolveError> {
        Ok(ResolvedCredential::new(""))
    }
}

/// Verifier accepting one fixed token and recording what it was given
#[derive(Clone)]
struct ScriptedVerifier {
    accept: &'static str,
    calls: Arc<Mutex<Vec<(Option<String>, String, Option<u64>)>>>,
}

impl ScriptedVerifier {
    fn accepting(accept: &'static str) -> Self {
        Self {
            accept,
            calls: Arc::default(),
        }
    }

    fn tokens(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().iter().map(|c| c.0.clone()).collect()
    }
}

impl TotpVerifier for ScriptedVerifier {
    type Error = Infallible;

    fn verify(&self, request: &VerifyRequest<'_>) -> Result<bool, Infallible> {
        self.calls.lock().unwrap().push((
            request.token.map(str::to_owned),
            request.secret.to_owned(),
            request.period,
        ));
        Ok(request.token == Some(self.accept))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("hardware token module offline")]
struct OfflineError;

struct BrokenVerifier;

impl TotpVerifier for BrokenVerifier {
    type Error = OfflineError;

    fn verify(&self, _: &VerifyRequest<'_>) -> Result<bool, OfflineError> {
        Err(OfflineError)
    }
}

#[derive(Default)]
struct CountingSink {
    successes: Vec<Option<User>>,
    failures: usize,
    errors: Vec<String>,
}

impl CountingSink {
    fn total(&self) -> usize {
        self.successes.len() + self.failures + self.errors.len()
    }
}

impl VerdictSink<User> for CountingSink {
    fn success(&mut self, identity: Option<User>) {
        self.successes.push(identity);
    }

    fn fail(&mut self) {
        self.failures += 1;
    }

    fn error(&mut self, cause: AuthenticationError) {
        self.errors.push(cause.to_string());
    }
}

fn code_at(time: u64) -> String {
    TotpSecret::try_from_base32(SECRET)
        .unwrap()
        .generate(&TotpParams::default(), time)
        .unwrap()
}

fn fixed_time_options() -> StrategyOptions {
    StrategyOptions::default().verify_options(VerifyOptions::default().at_time(NOW))
}

#[tokio::test]
async fn valid_body_code_succeeds_with_request_identity() {
    let strategy = TotpStrategy::with_options(fixed_time_options(), StubResolver::default()).unwrap();
    let context = AuthenticationContext::new()
        .with_identity(alice())
        .with_body(json!({ "code": code_at(NOW) }));

    let verdict = strategy.authenticate(context).await;
    assert!(matches!(&verdict, Verdict::Success(Some(user)) if *user == alice()), "{verdict:?}");
}

#[tokio::test]
async fn rejected_query_code_fails() {
    let verifier = ScriptedVerifier::accepting("123456");
    let strategy = TotpStrategy::new(StubResolver::default()).with_verifier(verifier.clone());
    let context = AuthenticationContext::new()
        .with_identity(alice())
        .with_body(json!({}))
        .with_query(json!({ "code": "000000" }));

    assert!(strategy.authenticate(context).await.is_fail());
    assert_eq!(verifier.tokens(), [Some("000000".to_owned())]);
}

#[tokio::test]
async fn missing_code_reaches_verifier_as_absent_and_fails() {
    let verifier = ScriptedVerifier::accepting("123456");
    let resolver = Arc::new(StubResolver::default());
    let strategy = TotpStrategy::new(resolver.clone()).with_verifier(verifier.clone());
    let context = AuthenticationContext::new()
        .with_identity(alice())
        .with_body(json!({ "other": "123456" }))
        .with_query(json!({}));

    assert!(strategy.authenticate(context).await.is_fail());
    assert_eq!(verifier.tokens(), [None::<String>]);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resolver_error_is_reported_and_verifier_is_skipped() {
    let verifier = ScriptedVerifier::accepting("123456");
    let strategy = TotpStrategy::new(StubResolver::failing("secret store unreachable"))
        .with_verifier(verifier.clone());
    let context = AuthenticationContext::new()
        .with_identity(alice())
        .with_body(json!({ "code": "123456" }));

    match strategy.authenticate(context).await {
        Verdict::Error(cause) => {
            assert!(matches!(cause, AuthenticationError::Resolution(_)));
            assert_eq!(
                cause.resolution_cause().map(|c| c.to_string()).as_deref(),
                Some("secret store unreachable")
            );
        }
        other => unreachable!("expected an error verdict, got {other:?}"),
    }
    assert!(verifier.tokens().is_empty());
}

#[tokio::test]
async fn nested_field_path_is_followed() {
    let verifier = ScriptedVerifier::accepting("654321");
    let options = StrategyOptions::default().field_name("otp[value]");
    let strategy = TotpStrategy::with_options(options, StubResolver::default())
        .unwrap()
        .with_verifier(verifier.clone());

    let nested = AuthenticationContext::<User>::new().with_body(json!({ "otp": { "value": "654321" } }));
    assert!(strategy.authenticate(nested).await.is_success());

    let flat = AuthenticationContext::<User>::new().with_body(json!({ "otp": "654321" }));
    assert!(strategy.authenticate(flat).await.is_success());

    assert_eq!(
        verifier.tokens(),
        [Some("654321".to_owned()), Some("654321".to_owned())]
    );
}

#[tokio::test]
async fn body_code_wins_over_query_code() {
    let verifier = ScriptedVerifier::accepting("111111");
    let strategy = TotpStrategy::new(StubResolver::default()).with_verifier(verifier.clone());
    let context = AuthenticationContext::<User>::new()
        .with_body(json!({ "code": "111111" }))
        .with_query(json!({ "code": "222222" }));

    assert!(strategy.authenticate(context).await.is_success());
    assert_eq!(verifier.tokens(), [Some("111111".to_owned())]);
}

#[tokio::test]
async fn anonymous_request_is_resolved_without_identity() {
    let resolver = Arc::new(StubResolver::default());
    let strategy = TotpStrategy::with_options(fixed_time_options(), resolver.clone()).unwrap();
    let context = AuthenticationContext::<User>::new().with_body(json!({ "code": code_at(NOW) }));

    let verdict = strategy.authenticate(context).await;
    assert!(matches!(verdict, Verdict::Success(None)), "{verdict:?}");
    assert_eq!(*resolver.seen.lock().unwrap(), [None::<u32>]);
}

#[tokio::test]
async fn resolved_secret_and_period_reach_the_verifier() {
    let verifier = ScriptedVerifier::accepting("123456");
    let strategy = TotpStrategy::new(StubResolver::default()).with_verifier(verifier.clone());
    let context = AuthenticationContext::new()
        .with_identity(alice())
        .with_body(json!({ "code": "123456" }));

    assert!(strategy.authenticate(context).await.is_success());
    let calls = verifier.calls.lock().unwrap();
    assert_eq!(calls[0].1, SECRET);
    assert_eq!(calls[0].2, Some(30));
}

#[tokio::test]
async fn window_tolerates_clock_drift() {
    let previous_step = code_at(NOW - 30);
    let strict = TotpStrategy::with_options(fixed_time_options(), StubResolver::default()).unwrap();
    let lenient = TotpStrategy::with_options(
        StrategyOptions::default().verify_options(VerifyOptions::default().at_time(NOW).window(1)),
        StubResolver::default(),
    )
    .unwrap();

    let context = || AuthenticationContext::<User>::new().with_body(json!({ "code": previous_step }));
    assert!(strict.authenticate(context()).await.is_fail());
    assert!(lenient.authenticate(context()).await.is_success());
}

#[tokio::test]
async fn verifier_fault_is_an_error() {
    let strategy = TotpStrategy::new(StubResolver::default()).with_verifier(BrokenVerifier);
    let context = AuthenticationContext::new()
        .with_identity(alice())
        .with_body(json!({ "code": "123456" }));

    let verdict = strategy.authenticate(context).await;
    assert!(
        matches!(verdict, Verdict::Error(AuthenticationError::Verifier(_))),
        "{verdict:?}"
    );
}

#[tokio::test]
async fn hanging_resolver_times_out() {
    let options = fixed_time_options().resolve_timeout(Duration::from_millis(20));
    let strategy = TotpStrategy::with_options(options, HangingResolver).unwrap();
    let context = AuthenticationContext::new()
        .with_identity(alice())
        .with_body(json!({ "code": "123456" }));

    let verdict = strategy.authenticate(context).await;
    assert!(
        matches!(verdict, Verdict::Error(AuthenticationError::Timeout(limit)) if limit == Duration::from_millis(20)),
        "{verdict:?}"
    );
}

#[tokio::test]
async fn callback_resolver_drives_the_strategy() {
    let resolver = CallbackResolver::new(|user: Option<&User>, done: Completion| match user {
        Some(user) if user.name == "alice" => {
            tokio::spawn(async move { done.resolve(SECRET, Some(30)) });
        }
        Some(_) => done.reject("unknown user"),
        None => drop(done),
    });
    let strategy = TotpStrategy::with_options(fixed_time_options(), resolver).unwrap();

    let ok = AuthenticationContext::new()
        .with_identity(alice())
        .with_body(json!({ "code": code_at(NOW) }));
    assert!(strategy.authenticate(ok).await.is_success());

    let stranger = AuthenticationContext::new()
        .with_identity(User { id: 2, name: "mallory" })
        .with_body(json!({ "code": code_at(NOW) }));
    assert!(strategy.authenticate(stranger).await.is_error());

    let anonymous = AuthenticationContext::<User>::new().with_body(json!({ "code": code_at(NOW) }));
    match strategy.authenticate(anonymous).await {
        Verdict::Error(cause) => assert!(
            cause
                .resolution_cause()
                .is_some_and(|c| c.downcast_ref::<CompletionDropped>().is_some())
        ),
        other => unreachable!("expected an error verdict, got {other:?}"),
    }
}

#[tokio::test]
async fn every_attempt_reports_exactly_one_verdict() {
    let good = TotpStrategy::with_options(fixed_time_options(), StubResolver::default()).unwrap();
    let broken = TotpStrategy::new(StubResolver::failing("down"));
    let contexts = || {
        vec![
            AuthenticationContext::new()
                .with_identity(alice())
                .with_body(json!({ "code": code_at(NOW) })),
            AuthenticationContext::new().with_query(json!({ "code": "abc" })),
            AuthenticationContext::new(),
        ]
    };

    let mut sink = CountingSink::default();
    let mut attempts = 0;
    for context in contexts() {
        good.authenticate(context).await.report(&mut sink);
        attempts += 1;
        assert_eq!(sink.total(), attempts);
    }
    for context in contexts() {
        broken.authenticate(context).await.report(&mut sink);
        attempts += 1;
        assert_eq!(sink.total(), attempts);
    }
    assert_eq!(sink.successes, [Some(alice())]);
    assert_eq!(sink.failures, 2);
    assert_eq!(sink.errors.len(), 3);
}

#[tokio::test]
async fn identical_configuration_gives_identical_verdicts() {
    let first = TotpStrategy::with_options(fixed_time_options(), StubResolver::default()).unwrap();
    let second = TotpStrategy::with_options(fixed_time_options(), StubResolver::default()).unwrap();
    for code in [code_at(NOW), "000000".to_owned(), "12".to_owned()] {
        let context = || AuthenticationContext::<User>::new().with_body(json!({ "code": code }));
        let a = first.authenticate(context()).await;
        let b = second.authenticate(context()).await;
        assert_eq!(
            (a.is_success(), a.is_fail(), a.is_error()),
            (b.is_success(), b.is_fail(), b.is_error())
        );
        // A second run on the same strategy is unaffected by the first.
        assert_eq!(first.authenticate(context()).await.is_success(), a.is_success());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn strategy_is_shared_across_concurrent_attempts() {
    let strategy = Arc::new(
        TotpStrategy::with_options(fixed_time_options(), StubResolver::default()).unwrap(),
    );
    let valid = code_at(NOW);

    let handles: Vec<_> = (0..32u32)
        .map(|i| {
            let strategy = Arc::clone(&strategy);
            let code = if i % 2 == 0 { valid.clone() } else { "bad".to_owned() };
            tokio::spawn(async move {
                let context = AuthenticationContext::new()
                    .with_identity(User { id: i, name: "user" })
                    .with_body(json!({ "code": code }));
                (i, strategy.authenticate(context).await)
            })
        })
        .collect();

    for handle in handles {
        let (i, verdict) = handle.await.unwrap();
        if i % 2 == 0 {
            assert!(matches!(verdict, Verdict::Success(Some(ref user)) if user.id == i));
        } else {
            assert!(verdict.is_fail());
        }
    }
}

#[tokio::test]
async fn query_string_container_is_supported() {
    let verifier = ScriptedVerifier::accepting("654321");
    let options = StrategyOptions::default().field_name("otp[value]");
    let strategy = TotpStrategy::with_options(options, StubResolver::default())
        .unwrap()
        .with_verifier(verifier);
    let query = totp_strategy::field::container_from_urlencoded("otp[value]=654321").unwrap();
    let context = AuthenticationContext::<User>::new().with_query(query);

    assert!(strategy.authenticate(context).await.is_success());
}

#[tokio::test]
async fn blank_secret_is_an_error_not_a_success() {
    let strategy = TotpStrategy::with_options(fixed_time_options(), BlankSecretResolver).unwrap();
    let guessable = TotpSecret::new(b"")
        .generate(&TotpParams::default(), NOW)
        .unwrap();
    let context = AuthenticationContext::new()
        .with_identity(alice())
        .with_body(json!({ "code": guessable }));

    let verdict = strategy.authenticate(context).await;
    assert!(
        matches!(verdict, Verdict::Error(AuthenticationError::Verifier(_))),
        "{verdict:?}"
    );
}

#[test]
fn oversized_window_is_rejected_at_construction() {
    let options = StrategyOptions::default().verify_options(VerifyOptions::default().window(u64::MAX));
    assert!(matches!(
        TotpStrategy::with_options(options, StubResolver::default()),
        Err(ConfigError::WindowTooLarge(u64::MAX))
    ));
}
