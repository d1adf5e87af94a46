//! One-time-passcode primitives: the 6-digit code itself and the salted
//! keyed hash under which codes are stored.
//!
//! Plaintext codes only ever exist in memory on their way to the messaging
//! transports; the database sees the HMAC and the per-request salt.

pub mod code;

pub use code::{Code, CODE_LENGTH};

use hmac::{digest::Output, Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

pub type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of the per-request salt.
pub const SALT_LENGTH: usize = 16;

/// Generate a fresh random salt, hex-encoded for storage.
pub fn random_salt() -> String {
    let mut bytes = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    data_encoding::HEXLOWER.encode(&bytes)
}

/// The digest stored in place of a plaintext code: HMAC-SHA256 keyed by the
/// server secret over the per-request salt followed by the code digits.
pub fn code_hmac(code: &Code, salt: &str, secret: &[u8]) -> Output<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(salt.as_bytes());
    mac.update(code.as_digits().as_bytes());
    mac.finalize().into_bytes()
}

/// Constant-time check of a submitted code against a stored digest.
pub fn verify_code(code: &Code, salt: &str, secret: &[u8], expected: &Output<HmacSha256>) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(salt.as_bytes());
    mac.update(code.as_digits().as_bytes());
    mac.verify_slice(expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_digest() {
        let code = "123456".parse::<Code>().unwrap();
        let salt = random_salt();
        assert_eq!(
            code_hmac(&code, &salt, b"secret"),
            code_hmac(&code, &salt, b"secret"),
        );
    }

    #[test]
    fn digest_depends_on_code_salt_and_secret() {
        let code = "123456".parse::<Code>().unwrap();
        let other = "654321".parse::<Code>().unwrap();
        let salt = random_salt();
        let digest = code_hmac(&code, &salt, b"secret");

        assert_ne!(digest, code_hmac(&other, &salt, b"secret"));
        assert_ne!(digest, code_hmac(&code, &random_salt(), b"secret"));
        assert_ne!(digest, code_hmac(&code, &salt, b"other secret"));
    }

    #[test]
    fn salts_are_unique() {
        let salts: std::collections::HashSet<_> = (0..100).map(|_| random_salt()).collect();
        assert_eq!(salts.len(), 100);
    }

    #[test]
    fn verify_accepts_only_the_original_code() {
        let code = Code::random();
        let salt = random_salt();
        let digest = code_hmac(&code, &salt, b"secret");

        assert!(verify_code(&code, &salt, b"secret", &digest));
        let wrong = "000000".parse::<Code>().unwrap();
        if wrong != code {
            assert!(!verify_code(&wrong, &salt, b"secret", &digest));
        }
    }
}
