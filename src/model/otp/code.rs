use std::convert::TryInto;
use std::fmt::Display;
use std::ops::Deref;
use std::str::FromStr;

use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_LENGTH: usize = 6;

/// A one-time-passcode: exactly six decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    #[serde(with = "serialize_code")]
    code: [u8; CODE_LENGTH],
}

impl Code {
    /// Generate a random code.
    ///
    /// `ThreadRng` is a CSPRNG, so codes are unguessable as well as uniform.
    pub fn random() -> Self {
        let mut code = [0; CODE_LENGTH];
        let digit_dist = Uniform::from(0..=9);
        let mut rng = rand::thread_rng();
        for digit in &mut code {
            *digit = digit_dist.sample(&mut rng);
        }
        Self { code }
    }

    /// The code as the exact digit characters sent to the voter.
    pub fn as_digits(&self) -> String {
        self.to_string()
    }
}

impl Deref for Code {
    type Target = [u8; CODE_LENGTH];

    fn deref(&self) -> &Self::Target {
        &self.code
    }
}

/// (De)serialisation for OTP codes as digit strings.
mod serialize_code {
    use serde::{
        de::{Error, Unexpected, Visitor},
        Deserializer, Serializer,
    };

    use super::CODE_LENGTH;

    pub fn serialize<S>(code: &[u8; CODE_LENGTH], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&code.iter().map(|n| (n + b'0') as char).collect::<String>())
    }

    struct StrVisitor;

    impl<'de> Visitor<'de> for StrVisitor {
        type Value = [u8; CODE_LENGTH];

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(formatter, "a string of {} digits", CODE_LENGTH)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: Error,
        {
            if v.len() != CODE_LENGTH {
                return Err(E::invalid_length(
                    v.len(),
                    &format!("a string of {} digit characters", CODE_LENGTH).as_str(),
                ));
            }

            v.chars()
                .map(|c| {
                    c.to_digit(10)
                        .map(|digit| digit as u8)
                        .ok_or_else(|| E::invalid_value(Unexpected::Char(c), &"a digit character"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(|digits| digits.try_into().unwrap()) // Valid because the input length has been checked
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; CODE_LENGTH], D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(StrVisitor)
    }
}

impl Display for Code {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            self.code
                .iter()
                .map(|digit| char::from_digit(*digit as u32, 10).unwrap())
                .collect::<String>()
        )
    }
}

impl FromStr for Code {
    type Err = ParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let len = string.chars().count();
        if len != CODE_LENGTH {
            return Err(Self::Err::InvalidLength(len));
        }
        let digits = string
            .chars()
            .map(|c| match c {
                '0'..='9' => Ok(c as u8 - b'0'),
                _ => Err(Self::Err::InvalidChar(c)),
            })
            .collect::<Result<Vec<u8>, Self::Err>>()?;
        Ok(Self {
            code: digits.try_into().unwrap(), // Valid because digits.len() == CODE_LENGTH
        })
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("code must contain exactly {CODE_LENGTH} characters, got {0}")]
    InvalidLength(usize),
    #[error("code must contain only digits, found '{0}'")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let code = Code::random();
        let reparsed = code.to_string().parse::<Code>().unwrap();
        assert_eq!(code, reparsed);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            "12345".parse::<Code>(),
            Err(ParseError::InvalidLength(5))
        ));
        assert!(matches!(
            "1234567".parse::<Code>(),
            Err(ParseError::InvalidLength(7))
        ));
        assert!(matches!(
            "12345a".parse::<Code>(),
            Err(ParseError::InvalidChar('a'))
        ));
        assert!("123456".parse::<Code>().is_ok());
    }
}
