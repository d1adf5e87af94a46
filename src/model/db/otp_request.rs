use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use hmac::digest::Output;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::{
    model::{
        common::channel::DeliveryChannel,
        mongodb::Id,
        otp::{self, Code, HmacSha256},
    },
    Config,
};

/// Core OTP request data, as stored in the database.
///
/// One row per issuance attempt. Rows are immutable once written except for
/// the `attempts` increment and the `verified` flip; superseded rows stay
/// behind as the issuance audit trail.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct OtpRequestCore {
    /// The voter this code was issued to.
    pub voter_id: Id,
    /// Salted HMAC of the code. The plaintext is never stored.
    pub code_hmac: Output<HmacSha256>,
    /// Per-request salt, hex-encoded.
    pub salt: String,
    /// The channel(s) the code was dispatched over.
    pub channel: DeliveryChannel,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
    /// Verification attempts consumed so far.
    pub attempts: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Whether this request was successfully verified.
    pub verified: bool,
}

impl OtpRequestCore {
    /// Create a new unverified request for the given code, expiring
    /// `otp_ttl` from now.
    pub fn new(voter_id: Id, code: &Code, channel: DeliveryChannel, config: &Config) -> Self {
        let salt = otp::random_salt();
        let code_hmac = otp::code_hmac(code, &salt, config.hmac_secret());
        let created_at = Utc::now();
        Self {
            voter_id,
            code_hmac,
            salt,
            channel,
            created_at,
            expires_at: created_at + config.otp_ttl(),
            attempts: 0,
            max_attempts: config.otp_max_attempts(),
            verified: false,
        }
    }

    /// Does the submitted code match this request? Constant-time comparison.
    pub fn matches(&self, code: &Code, secret: &[u8]) -> bool {
        otp::verify_code(code, &self.salt, secret, &self.code_hmac)
    }

    /// Has this request expired at time `now`?
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Is the attempt budget already spent?
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Attempts left after the ones consumed so far.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}

/// An OTP request without an ID.
pub type NewOtpRequest = OtpRequestCore;

/// An OTP request from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct OtpRequest {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub request: OtpRequestCore,
}

impl Deref for OtpRequest {
    type Target = OtpRequestCore;

    fn deref(&self) -> &Self::Target {
        &self.request
    }
}

impl DerefMut for OtpRequest {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.request
    }
}
