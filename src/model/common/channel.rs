use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// The medium (or media) over which an OTP code is dispatched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Email,
    Sms,
    Both,
}

impl DeliveryChannel {
    /// Does this channel selection include email?
    pub fn wants_email(self) -> bool {
        matches!(self, Self::Email | Self::Both)
    }

    /// Does this channel selection include SMS?
    pub fn wants_sms(self) -> bool {
        matches!(self, Self::Sms | Self::Both)
    }
}

impl From<DeliveryChannel> for Bson {
    fn from(channel: DeliveryChannel) -> Self {
        to_bson(&channel).expect("Serialisation is infallible")
    }
}
