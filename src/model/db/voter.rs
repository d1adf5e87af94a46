use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::{mongodb::Id, sms::Sms};

/// Core voter data, as stored in the database.
///
/// Created at registration by the external identity provider; this core only
/// ever flips `verified` after a successful OTP check.
#[derive(Debug, Serialize, Deserialize)]
pub struct VoterCore {
    /// Contact email address.
    pub email: String,
    /// Contact phone number, if the voter registered one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms: Option<Sms>,
    /// Electoral roll number, if the voter registered one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    /// Whether the voter has completed OTP verification at least once.
    pub verified: bool,
}

impl VoterCore {
    /// Create a new unverified voter.
    pub fn new(email: String, sms: Option<Sms>, roll_number: Option<String>) -> Self {
        Self {
            email,
            sms,
            roll_number,
            verified: false,
        }
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with their unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}
