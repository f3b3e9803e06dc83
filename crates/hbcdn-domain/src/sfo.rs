use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::md5_hex;

/// Immutable capture of one PARAM.SFO: parsed fields, raw bytes, MD5 of the
/// raw bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSfoSnapshot {
    pub fields: BTreeMap<String, String>,
    pub raw: Vec<u8>,
    pub hash: String,
}

impl ParamSfoSnapshot {
    #[must_use]
    pub fn new(fields: BTreeMap<String, String>, raw: Vec<u8>) -> Self {
        let hash = md5_hex(&raw);
        Self { fields, raw, hash }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map_or("", String::as_str)
    }
}
