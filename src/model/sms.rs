use mongodb::bson::{to_bson, Bson};
use phonenumber::{Mode, PhoneNumber};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// A validated SMS-capable phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sms {
    #[serde(with = "phone_number")]
    inner: PhoneNumber,
}

impl Sms {
    /// The number in E.164 format, as required by the SMS transport.
    pub fn to_e164(&self) -> String {
        self.inner.format().mode(Mode::E164).to_string()
    }
}

mod phone_number {
    use phonenumber::PhoneNumber;
    use serde::{de::Visitor, Deserializer, Serializer};

    pub fn serialize<S>(phone_number: &PhoneNumber, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&phone_number.to_string())
    }

    struct StrVisitor;

    impl Visitor<'_> for StrVisitor {
        type Value = PhoneNumber;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "a valid phone number string")
        }

        fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            s.parse::<PhoneNumber>().map_err(|err| E::custom(err))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PhoneNumber, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(StrVisitor)
    }
}

impl Display for Sms {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        self.inner.fmt(formatter)
    }
}

impl FromStr for Sms {
    type Err = <PhoneNumber as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<PhoneNumber>().map(|inner| Sms { inner })
    }
}

impl From<Sms> for Bson {
    fn from(sms: Sms) -> Self {
        to_bson(&sms).unwrap() // Valid because `PhoneNumber` serialization doesn't fail
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Sms {
        pub fn example() -> Self {
            "+447700900123".parse().unwrap()
        }
    }
}
