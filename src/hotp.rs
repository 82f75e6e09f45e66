use ring::hmac;
use serde::{Deserialize, Serialize};

/// The largest number of digits a HOTP code can carry in a `u32`
pub const MAX_HOTP_DIGITS: u32 = 9;

/// HMAC algorithm used to derive HOTP codes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmacAlgorithm {
    /// HMAC-SHA1, the algorithm authenticator apps assume
    #[default]
    Sha1,
    /// HMAC-SHA256
    Sha256,
    /// HMAC-SHA512
    Sha512,
}

impl HmacAlgorithm {
    fn ring_algorithm(self) -> hmac::Algorithm {
        match self {
            HmacAlgorithm::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            HmacAlgorithm::Sha256 => hmac::HMAC_SHA256,
            HmacAlgorithm::Sha512 => hmac::HMAC_SHA512,
        }
    }
}

/// HOTP secret
pub struct HotpSecret(Box<[u8]>);

impl AsRef<[u8]> for HotpSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl HotpSecret {
    /// Create a new HOTP secret from a byte array
    pub fn new(secret: &[u8]) -> Self {
        Self(secret.into())
    }

    /// Generate a HOTP code
    ///
    /// - `counter`: the counter value
    /// - `algorithm`: the HMAC algorithm
    /// - `digits`: the code length, capped at [MAX_HOTP_DIGITS]
    pub fn generate(&self, counter: u64, algorithm: HmacAlgorithm, digits: u32) -> u32 {
        let key = hmac::Key::new(algorithm.ring_algorithm(), &self.0);
        let wtr = counter.to_be_bytes();
        let signature = hmac::sign(&key, &wtr);
        let signature = signature.as_ref();
        let offset = (signature[signature.len() - 1] & 0x0f) as usize;
        let code = ((signature[offset] & 0x7f) as u32) << 24
            | (signature[offset + 1] as u32) << 16
            | (signature[offset + 2] as u32) << 8
            | signature[offset + 3] as u32;
        code % 10u32.pow(digits.min(MAX_HOTP_DIGITS))
    }

    /// Render the code for `counter` as a zero-padded string
    pub fn generate_string(&self, counter: u64, algorithm: HmacAlgorithm, digits: u32) -> String {
        let digits = digits.min(MAX_HOTP_DIGITS);
        format!(
            "{:0width$}",
            self.generate(counter, algorithm, digits),
            width = digits as usize
        )
    }

    /// Check a submitted code against the code for `counter`
    ///
    /// The comparison does not short-circuit on the first differing byte.
    pub fn verify(&self, code: &str, counter: u64, algorithm: HmacAlgorithm, digits: u32) -> bool {
        let expected = self.generate_string(counter, algorithm, digits);
        constant_time_eq(expected.as_bytes(), code.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
