use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Address must contain exactly one '@': {0}")]
    Separator(String),

    #[error("Address has an empty local part or domain: {0}")]
    EmptyPart(String),

    #[error("Address contains whitespace: {0}")]
    Whitespace(String),
}

/// A recipient address in `local@domain` form, normalised to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress {
    address: String,
    at: usize,
}

impl EmailAddress {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.address[self.at + 1..]
    }
}

impl FromStr for EmailAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        if s.chars().any(char::is_whitespace) {
            return Err(AddressError::Whitespace(s.to_string()));
        }

        let mut parts = s.split('@');
        let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AddressError::Separator(s.to_string()));
        };

        if local.is_empty() || domain.is_empty() {
            return Err(AddressError::EmptyPart(s.to_string()));
        }

        let address = s.to_lowercase();
        let at = address.find('@').ok_or_else(|| AddressError::Separator(s.to_string()))?;

        Ok(Self { address, at })
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}
