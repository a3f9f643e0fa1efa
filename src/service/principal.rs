//! Principal normalization at the request boundary

use crate::metadata::OwnerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Why an externally decoded identifier could not be used
#[derive(Debug, Error, PartialEq)]
pub enum PrincipalError {
    #[error("not a number: {0}")]
    NotANumber(String),

    #[error("not a whole number: {0}")]
    Fractional(f64),

    #[error("out of range: {0}")]
    OutOfRange(String),
}

/// The authenticated identity a request executes for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(OwnerId);

impl Principal {
    pub fn new(id: OwnerId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> OwnerId {
        self.0
    }

    /// Normalize a decoded JSON value into a principal.
    ///
    /// Token decoders hand numbers back either as integers or as floats; both
    /// are accepted as long as they denote a whole number in `i64` range.
    /// Every other shape is an error.
    pub fn from_json(value: &Value) -> Result<Self, PrincipalError> {
        let Value::Number(number) = value else {
            return Err(PrincipalError::NotANumber(value.to_string()));
        };

        if let Some(id) = number.as_i64() {
            return Ok(Self(id));
        }
        if number.is_u64() {
            return Err(PrincipalError::OutOfRange(number.to_string()));
        }

        let float = number
            .as_f64()
            .ok_or_else(|| PrincipalError::NotANumber(number.to_string()))?;
        if !float.is_finite() || float.fract() != 0.0 {
            return Err(PrincipalError::Fractional(float));
        }
        // i64::MAX is not representable as f64; 2^63 is the first value past it.
        if float < i64::MIN as f64 || float >= 9_223_372_036_854_775_808.0 {
            return Err(PrincipalError::OutOfRange(number.to_string()));
        }
        Ok(Self(float as i64))
    }

    /// Normalize the raw text of an identifier, as carried in a header
    pub fn parse(raw: &str) -> Result<Self, PrincipalError> {
        let value: Value =
            serde_json::from_str(raw.trim()).map_err(|_| PrincipalError::NotANumber(raw.to_string()))?;
        Self::from_json(&value)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
