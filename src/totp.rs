use super::hotp::{self, HmacAlgorithm};
use crate::options::{MAX_VERIFY_WINDOW, VerifyOptions};
use std::fmt;
use std::time::SystemTime;
use fast32::base32;

/// The default period of TOTP code in seconds
pub const RFC6238_TOTP_PERIOD: u64 = 30;

/// The default number of digits of a TOTP code
pub const RFC6238_TOTP_DIGITS: u32 = 6;

/// Errors raised by [RfcTotpVerifier] when it cannot reach a verdict on a token
#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    /// The secret is not valid base32
    #[error("Invalid base32 secret: {0}")]
    InvalidSecret(String),
    /// The secret is empty once whitespace and padding are removed
    #[error("TOTP secret is empty")]
    EmptySecret,
    /// The time step resolved to zero seconds
    #[error("TOTP time step must be greater than zero")]
    ZeroStep,
    /// The code length is outside of `1..=9`
    #[error("Unsupported TOTP code length: {0}")]
    UnsupportedDigits(u32),
    /// The verification time lies before the configured epoch
    #[error("Verification time is before the TOTP epoch")]
    ClockBeforeEpoch,
    /// The drift window is larger than [MAX_VERIFY_WINDOW]
    #[error("TOTP window {0} exceeds the maximum of {max}", max = MAX_VERIFY_WINDOW)]
    WindowTooLarge(u64),
}

/// TOTP secret
#[derive(Clone, PartialEq, Eq)]
pub struct TotpSecret(Box<[u8]>);

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TotpSecret").field(&"<redacted>").finish()
    }
}

impl AsRef<[u8]> for TotpSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Time-step parameters shared by code generation and verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotpParams {
    /// Length of one time step in seconds
    pub step: u64,
    /// Unix time at which counting starts (T0)
    pub epoch: u64,
    /// Number of digits of a code
    pub digits: u32,
    /// HMAC algorithm
    pub algorithm: HmacAlgorithm,
}

impl Default for TotpParams {
    fn default() -> Self {
        Self {
            step: RFC6238_TOTP_PERIOD,
            epoch: 0,
            digits: RFC6238_TOTP_DIGITS,
            algorithm: HmacAlgorithm::Sha1,
        }
    }
}

impl TotpParams {
    /// The counter of the time step containing `timestamp` (unix seconds)
    pub fn counter_at(&self, timestamp: u64) -> Result<u64, TotpError> {
        if self.step == 0 {
            return Err(TotpError::ZeroStep);
        }
        if self.digits == 0 || self.digits > hotp::MAX_HOTP_DIGITS {
            return Err(TotpError::UnsupportedDigits(self.digits));
        }
        let elapsed = timestamp
            .checked_sub(self.epoch)
            .ok_or(TotpError::ClockBeforeEpoch)?;
        Ok(elapsed / self.step)
    }
}

impl TotpSecret {
    /// Create a new TOTP secret from a byte array
    pub fn new(secret: &[u8]) -> Self {
        Self(secret.into())
    }

    /// Create a new TOTP secret from a base32 encoded string
    ///
    /// Whitespace and `=` padding are ignored and lowercase letters are accepted,
    /// matching how authenticator apps display secrets. An empty secret is rejected,
    /// since codes for a zero-length key can be computed by anyone.
    pub fn try_from_base32(secret: impl AsRef<str>) -> Result<Self, TotpError> {
        let normalized: String = secret
            .as_ref()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if normalized.is_empty() {
            return Err(TotpError::EmptySecret);
        }
        let secret = base32::RFC4648_NOPAD
            .decode_str(&normalized)
            .map_err(|e| TotpError::InvalidSecret(format!("{e:?}")))?
            .into_boxed_slice();
        Ok(Self(secret))
    }

    /// Generate the TOTP code at the given unix timestamp
    pub fn generate(&self, params: &TotpParams, timestamp: u64) -> Result<String, TotpError> {
        let counter = params.counter_at(timestamp)?;
        Ok(hotp::HotpSecret::new(&self.0).generate_string(counter, params.algorithm, params.digits))
    }

    /// Verify a TOTP code at the given unix timestamp
    ///
    /// - `code`: the code to be verified
    /// - `params`: step, epoch, length and algorithm of the code
    /// - `timestamp`: the time of verification in unix seconds
    /// - `window`: will try counters from `timestamp/step - window` to `timestamp/step + window`
    pub fn verify(
        &self,
        code: &str,
        params: &TotpParams,
        timestamp: u64,
        window: u64,
    ) -> Result<bool, TotpError> {
        let counter = params.counter_at(timestamp)?;
        let secret = hotp::HotpSecret::new(&self.0);
        let first = counter.saturating_sub(window);
        let last = counter.saturating_add(window);
        Ok((first..=last).any(|c| secret.verify(code, c, params.algorithm, params.digits)))
    }
}

/// Encoding of the secret handed to a [TotpVerifier]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SecretEncoding {
    /// RFC 4648 base32
    Base32,
}

/// Everything a [TotpVerifier] is given to check one submitted token
#[derive(Debug, Clone, Copy)]
pub struct VerifyRequest<'a> {
    /// The resolved secret, encoded as `encoding`
    pub secret: &'a str,
    /// Encoding of `secret`
    pub encoding: SecretEncoding,
    /// The submitted token, absent when the request carried none
    pub token: Option<&'a str>,
    /// Time step reported by the credential resolver, if any
    pub period: Option<u64>,
    /// Tolerance options configured on the strategy
    pub options: &'a VerifyOptions,
}

/// A TOTP verification algorithm
///
/// `Ok(false)` covers every way a token can be wrong. `Err` is reserved for faults
/// that prevent a verdict, such as an undecodable secret.
pub trait TotpVerifier: Send + Sync {
    /// Error type for verifier faults
    type Error: std::error::Error + Send + Sync + 'static;

    /// Checks the token in `request`
    fn verify(&self, request: &VerifyRequest<'_>) -> Result<bool, Self::Error>;
}

/// RFC 6238 verifier backed by `ring` HMAC
#[derive(Debug, Clone, Copy, Default)]
pub struct RfcTotpVerifier;

impl RfcTotpVerifier {
    fn params(request: &VerifyRequest<'_>) -> TotpParams {
        let options = request.options;
        TotpParams {
            step: options
                .step
                .or(request.period)
                .unwrap_or(RFC6238_TOTP_PERIOD),
            epoch: options.epoch,
            digits: options.code_digits(),
            algorithm: options.algorithm,
        }
    }
}

impl TotpVerifier for RfcTotpVerifier {
    type Error = TotpError;

    fn verify(&self, request: &VerifyRequest<'_>) -> Result<bool, Self::Error> {
        let Some(token) = request.token else {
            return Ok(false);
        };
        let params = Self::params(request);
        if token.len() != params.digits as usize || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }
        let window = request.options.window;
        if window > MAX_VERIFY_WINDOW {
            return Err(TotpError::WindowTooLarge(window));
        }
        if !request.options.extra.is_empty() {
            tracing::debug!(
                keys = ?request.options.extra.keys().collect::<Vec<_>>(),
                "Ignoring verify options unknown to the RFC 6238 verifier"
            );
        }
        let secret = match request.encoding {
            SecretEncoding::Base32 => TotpSecret::try_from_base32(request.secret)?,
        };
        let timestamp = match request.options.time {
            Some(time) => time,
            None => SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map_err(|_| TotpError::ClockBeforeEpoch)?
                .as_secs(),
        };
        secret.verify(token, &params, timestamp, window)
    }
}
