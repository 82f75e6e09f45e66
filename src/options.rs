use crate::error::ConfigError;
use crate::hotp::{HmacAlgorithm, MAX_HOTP_DIGITS};
use crate::totp::RFC6238_TOTP_DIGITS;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Where the submitted token is looked up when no field name is configured
pub const DEFAULT_FIELD_NAME: &str = "code";

/// Keys of a verification call that are always supplied by the strategy itself
pub const RESERVED_VERIFY_KEYS: [&str; 3] = ["secret", "encoding", "token"];

/// Largest drift window, in time steps on either side, that verification accepts
pub const MAX_VERIFY_WINDOW: u64 = 10;

/// Construction options of a [TotpStrategy](crate::strategy::TotpStrategy)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyOptions {
    /// Field path of the token in the request body or query, e.g. `otp[value]`
    pub field_name: CompactString,
    /// Options handed to the TOTP verifier
    pub verify_options: VerifyOptions,
    /// Upper bound on how long credential resolution may take
    #[serde(
        serialize_with = "serialize_timeout_millis",
        deserialize_with = "deserialize_timeout_millis"
    )]
    pub resolve_timeout: Option<Duration>,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            field_name: DEFAULT_FIELD_NAME.into(),
            verify_options: VerifyOptions::default(),
            resolve_timeout: None,
        }
    }
}

impl StrategyOptions {
    /// Set the field path of the token
    pub fn field_name(mut self, field_name: impl Into<CompactString>) -> Self {
        self.field_name = field_name.into();
        self
    }

    /// Set the verifier options
    pub fn verify_options(mut self, verify_options: VerifyOptions) -> Self {
        self.verify_options = verify_options;
        self
    }

    /// Bound the time spent waiting for the credential resolver
    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = Some(timeout);
        self
    }

    /// The configured field name, or [DEFAULT_FIELD_NAME] when it is empty
    pub fn effective_field_name(&self) -> &str {
        if self.field_name.is_empty() {
            DEFAULT_FIELD_NAME
        } else {
            &self.field_name
        }
    }

    /// Check the options before a strategy is built from them
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolve_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        self.verify_options.validate()
    }
}

/// Tolerance options for TOTP verification
///
/// Unknown keys are collected into `extra` and passed through to custom verifiers.
/// `secret`, `encoding` and `token` are not accepted there.
/// [RfcTotpVerifier](crate::totp::RfcTotpVerifier) ignores `extra`, so a misspelled
/// tolerance such as `windw` loads without effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyOptions {
    /// Number of time steps accepted on either side of the current one
    pub window: u64,
    /// Time step in seconds; falls back to the resolved period, then 30
    pub step: Option<u64>,
    /// Code length; 6 when unset
    pub digits: Option<u32>,
    /// HMAC algorithm
    pub algorithm: HmacAlgorithm,
    /// Fixed verification time in unix seconds instead of the system clock
    pub time: Option<u64>,
    /// Unix time at which step counting starts
    pub epoch: u64,
    /// Verifier-specific options; unused by the RFC 6238 verifier
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VerifyOptions {
    /// Accept codes up to `window` steps away from the current one
    pub fn window(mut self, window: u64) -> Self {
        self.window = window;
        self
    }

    /// Set the time step in seconds
    pub fn step(mut self, step: u64) -> Self {
        self.step = Some(step);
        self
    }

    /// Set the code length
    pub fn digits(mut self, digits: u32) -> Self {
        self.digits = Some(digits);
        self
    }

    /// Verify against a fixed unix time
    pub fn at_time(mut self, time: u64) -> Self {
        self.time = Some(time);
        self
    }

    /// The configured code length, or 6
    pub fn code_digits(&self) -> u32 {
        self.digits.unwrap_or(RFC6238_TOTP_DIGITS)
    }

    /// Check the options before they are used for verification
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = RESERVED_VERIFY_KEYS
            .into_iter()
            .find(|key| self.extra.contains_key(*key))
        {
            return Err(ConfigError::ReservedVerifyOption(key));
        }
        if self.window > MAX_VERIFY_WINDOW {
            return Err(ConfigError::WindowTooLarge(self.window));
        }
        if self.step == Some(0) {
            return Err(ConfigError::ZeroStep);
        }
        let digits = self.code_digits();
        if digits == 0 || digits > MAX_HOTP_DIGITS {
            return Err(ConfigError::UnsupportedDigits(digits));
        }
        Ok(())
    }
}

fn serialize_timeout_millis<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(timeout) => {
            let millis = u64::try_from(timeout.as_millis()).map_err(|_| {
                serde::ser::Error::custom("resolve timeout does not fit in u64 milliseconds")
            })?;
            serializer.serialize_some(&millis)
        }
        None => serializer.serialize_none(),
    }
}

fn deserialize_timeout_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}
