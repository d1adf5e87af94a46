use serde::{Deserialize, Serialize};

use crate::model::{common::channel::DeliveryChannel, mongodb::Id, sms::Sms};

/// Request body for OTP issuance.
///
/// The voter ID is supplied (and vouched for) by the external identity
/// provider; contact addresses travel with the request rather than being
/// read back out of the voter record, so a voter can verify a
/// freshly-changed address.
#[derive(Debug, Serialize, Deserialize)]
pub struct OtpIssueRequest {
    pub voter_id: Id,
    pub channel: DeliveryChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Sms>,
}

/// Response body for OTP issuance: per-channel delivery outcomes.
/// A flag is `null` when that channel was not requested.
#[derive(Debug, Serialize, Deserialize)]
pub struct OtpIssueResponse {
    pub email_delivered: Option<bool>,
    pub sms_delivered: Option<bool>,
    /// The plaintext code. Test builds only: production code never returns
    /// the code anywhere but the messaging transports.
    #[cfg(test)]
    pub code: String,
}

/// Request body for OTP verification. The code stays a raw string here so
/// that format validation happens in the handler, before any storage access.
#[derive(Debug, Serialize, Deserialize)]
pub struct OtpVerifyRequest {
    pub voter_id: Id,
    pub code: String,
}

/// Response body for successful OTP verification.
#[derive(Debug, Serialize, Deserialize)]
pub struct OtpVerifyResponse {
    pub verified: bool,
}
