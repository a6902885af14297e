// ABOUTME: Validated names for services and target group roles.
// ABOUTME: Names end up in load balancer resource names, so they follow its naming rules.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Load balancer target group names are capped at 32 characters.
pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name cannot be empty")]
    Empty,

    #[error("name exceeds maximum length of {MAX_NAME_LEN} characters")]
    TooLong,

    #[error("name cannot start or end with a hyphen")]
    EdgeHyphen,

    #[error("name cannot contain consecutive hyphens")]
    DoubleHyphen,

    #[error("invalid character in name: '{0}'")]
    InvalidChar(char),
}

/// A lowercase identifier such as a service name (`superschedules`) or a
/// target group role (`frontend`, `api`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(value: &str) -> Result<Self, NameError> {
        if value.is_empty() {
            return Err(NameError::Empty);
        }
        if value.len() > MAX_NAME_LEN {
            return Err(NameError::TooLong);
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(NameError::EdgeHyphen);
        }
        if value.contains("--") {
            return Err(NameError::DoubleHyphen);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(NameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ResourceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ResourceName::new(&s).map_err(serde::de::Error::custom)
    }
}
