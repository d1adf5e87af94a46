//! Outbound message dispatch: SMS via Amazon SNS and email via an HTTP mail
//! API. Both transports are independently fallible; a failure (including a
//! timeout) is that channel's delivery failure, never a fatal error for the
//! request being served.

use aws_sdk_sns::Client as SnsClient;
use rocket::tokio::time::{timeout, Duration};
use serde::Serialize;
use thiserror::Error;

use crate::model::sms::Sms;

/// Ceiling on any single call to a messaging provider.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a channel failed to deliver.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("messaging provider timed out")]
    Timeout,
    #[error("messaging provider rejected the message: {0}")]
    Provider(String),
}

/// Send one SMS. The recipient number goes out in E.164 format.
pub async fn send_sms(sns: &SnsClient, to: &Sms, body: &str) -> Result<(), DeliveryError> {
    let publish = sns.publish().phone_number(to.to_e164()).message(body).send();
    match timeout(DISPATCH_TIMEOUT, publish).await {
        Err(_) => Err(DeliveryError::Timeout),
        Ok(Err(err)) => Err(DeliveryError::Provider(err.to_string())),
        Ok(Ok(_)) => Ok(()),
    }
}

/// A handle on the HTTP mail API, kept in managed state.
pub struct Mailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

/// The mail API's send payload.
#[derive(Serialize)]
struct MailMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl Mailer {
    pub fn new(api_url: String, api_key: String, from: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .expect("Failed to construct HTTP client");
        Self {
            http,
            api_url,
            api_key,
            from,
        }
    }

    /// Send one HTML email.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), DeliveryError> {
        let message = MailMessage {
            from: &self.from,
            to,
            subject,
            html,
        };
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Provider(err.to_string())
                }
            })?;

        match response.error_for_status() {
            Ok(_) => Ok(()),
            Err(err) => Err(DeliveryError::Provider(err.to_string())),
        }
    }
}
