//! Error types for engine option parsing.

use thiserror::Error;

/// Errors produced while interpreting user-supplied engine flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// A recognized flag that takes a value was given none.
    #[error("option {flag} requires a value")]
    MissingValue {
        /// The flag as written by the user.
        flag: String,
    },

    /// A recognized flag was given a value it cannot accept.
    #[error("invalid value {value:?} for option {flag}")]
    InvalidValue {
        /// The flag as written by the user.
        flag: String,
        /// The rejected value.
        value: String,
    },
}

impl OptionsError {
    pub(crate) fn missing(flag: &str) -> Self {
        Self::MissingValue {
            flag: flag.to_string(),
        }
    }

    pub(crate) fn invalid(flag: &str, value: &str) -> Self {
        Self::InvalidValue {
            flag: flag.to_string(),
            value: value.to_string(),
        }
    }
}
