//! Principal names.
//!
//! An `Identity` is the local part of a mail address (`bob` for
//! `bob@example.org`). It keys the certificate cache and is written verbatim
//! into the index file, so it may not contain whitespace or `@`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MailError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('@') || name.chars().any(char::is_whitespace) {
            return Err(MailError::InvalidIdentity(name));
        }
        Ok(Self(name))
    }

    /// Identity for `address`: everything before the first `@`, or the whole
    /// string when there is none.
    pub fn from_address(address: &str) -> Result<Self> {
        let local = address
            .split_once('@')
            .map_or(address, |(local, _domain)| local);
        Self::new(local.trim())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = MailError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}
