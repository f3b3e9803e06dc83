//! Content identifiers as carried in PARAM.SFO (`CONTENT_ID`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Store region derived from the first two characters of a content id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Usa,
    Eur,
    Jap,
    Asia,
    Unknown,
}

impl Region {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Region::Usa => "USA",
            Region::Eur => "EUR",
            Region::Jap => "JAP",
            Region::Asia => "ASIA",
            Region::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContentIdError {
    #[error("content id is empty")]
    Empty,
    #[error("content id {0:?} does not match RR####-TTTT#####_##-<16 chars>")]
    Malformed(String),
}

/// Opaque identifier shaped `RR####-TTTT#####_##-IIIIIIIIIIIIIIII`.
///
/// Parsing validates the shape once; the value is immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    const LEN: usize = 36;

    pub fn parse(raw: &str) -> Result<Self, ContentIdError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(ContentIdError::Empty);
        }
        if !Self::is_well_formed(value) {
            return Err(ContentIdError::Malformed(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    fn is_well_formed(value: &str) -> bool {
        let bytes = value.as_bytes();
        if bytes.len() != Self::LEN || !value.is_ascii() {
            return false;
        }
        let service = &bytes[0..6];
        let title = &bytes[7..16];
        let revision = &bytes[17..19];
        let label = &bytes[20..36];

        bytes[6] == b'-'
            && bytes[16] == b'_'
            && bytes[19] == b'-'
            && service[..2].iter().all(u8::is_ascii_uppercase)
            && service[2..].iter().all(u8::is_ascii_digit)
            && title[..4]
                .iter()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            && title[4..].iter().all(u8::is_ascii_digit)
            && revision.iter().all(u8::is_ascii_digit)
            && label
                .iter()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || *b == b'_')
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Region tag derived from the service prefix.
    #[must_use]
    pub fn region(&self) -> Region {
        match &self.0[..2] {
            "UP" => Region::Usa,
            "EP" => Region::Eur,
            "JP" => Region::Jap,
            "HP" | "AP" | "KP" => Region::Asia,
            _ => Region::Unknown,
        }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
