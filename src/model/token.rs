use std::fmt::Display;
use std::str::FromStr;

use rand::distributions::{Distribution, Uniform};
use rocket::{
    form::{self, prelude::ErrorKind, FromFormField, ValueField},
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Query, UriDisplay},
    },
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed prefix marking a string as a ballot receipt token.
pub const TOKEN_PREFIX: &str = "VT-";

/// Number of random characters following the prefix.
pub const TOKEN_SUFFIX_LENGTH: usize = 12;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A vote receipt token: `VT-` followed by twelve characters of uppercase
/// alphanumerics, e.g. `VT-7Q2QSTD11GSB`.
///
/// Publicly disclosable; proves a vote was recorded without revealing the
/// candidate. Global uniqueness is enforced by the vote collection's token
/// index, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BallotToken(String);

impl BallotToken {
    /// Generate a random token.
    ///
    /// `ThreadRng` is a CSPRNG: 36^12 possibilities make tokens unguessable,
    /// and collisions are left to the storage-layer unique index.
    pub fn random() -> Self {
        let char_dist = Uniform::from(0..TOKEN_ALPHABET.len());
        let mut rng = rand::thread_rng();
        let suffix = (0..TOKEN_SUFFIX_LENGTH)
            .map(|_| TOKEN_ALPHABET[char_dist.sample(&mut rng)] as char)
            .collect::<String>();
        Self(format!("{TOKEN_PREFIX}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BallotToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for BallotToken {
    type Err = ParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let suffix = string
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(ParseError::MissingPrefix)?;
        if suffix.len() != TOKEN_SUFFIX_LENGTH {
            return Err(ParseError::InvalidLength(suffix.len()));
        }
        if let Some(c) = suffix
            .chars()
            .find(|c| !c.is_ascii_uppercase() && !c.is_ascii_digit())
        {
            return Err(ParseError::InvalidChar(c));
        }
        Ok(Self(string.to_string()))
    }
}

impl TryFrom<String> for BallotToken {
    type Error = ParseError;

    fn try_from(string: String) -> Result<Self, Self::Error> {
        string.parse()
    }
}

impl From<BallotToken> for String {
    fn from(token: BallotToken) -> Self {
        token.0
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("ballot tokens start with `{TOKEN_PREFIX}`")]
    MissingPrefix,
    #[error("ballot tokens have {TOKEN_SUFFIX_LENGTH} characters after the prefix, got {0}")]
    InvalidLength(usize),
    #[error("ballot tokens contain only uppercase letters and digits, found '{0}'")]
    InvalidChar(char),
}

#[rocket::async_trait]
impl<'r> FromFormField<'r> for BallotToken {
    fn from_value(field: ValueField<'r>) -> form::Result<'r, Self> {
        field
            .value
            .parse::<BallotToken>()
            .map_err(|err| ErrorKind::Custom(Box::new(err)).into())
    }
}

impl UriDisplay<Query> for BallotToken {
    fn fmt(
        &self,
        formatter: &mut rocket::http::uri::fmt::Formatter<'_, Query>,
    ) -> std::fmt::Result {
        formatter.write_value(&self.0)
    }
}

impl_from_uri_param_identity!([Query] BallotToken);

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn is_well_formed(token: &BallotToken) -> bool {
        token.as_str().parse::<BallotToken>().is_ok()
    }

    #[test]
    fn generated_tokens_match_the_documented_pattern() {
        for _ in 0..100 {
            let token = BallotToken::random();
            assert!(is_well_formed(&token), "malformed token {token}");
        }
    }

    #[test]
    fn ten_thousand_tokens_are_pairwise_distinct() {
        let tokens: HashSet<_> = (0..10_000).map(|_| BallotToken::random()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(matches!(
            "XX-ABCDEFGHIJKL".parse::<BallotToken>(),
            Err(ParseError::MissingPrefix)
        ));
        assert!(matches!(
            "VT-ABC".parse::<BallotToken>(),
            Err(ParseError::InvalidLength(3))
        ));
        assert!(matches!(
            "VT-abcdefghijkl".parse::<BallotToken>(),
            Err(ParseError::InvalidChar('a'))
        ));
        assert!("VT-ABCDEFGH1234".parse::<BallotToken>().is_ok());
    }
}
