//! Canonical identity of a purchasable configuration.
//!
//! A key looks like `12|topping:3|filling:0|message:feliz cumple`. Absent
//! toppings and fillings are written as `0`, and the message is trimmed and
//! lower-cased, so two lines describing the same configuration always produce
//! byte-identical keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// Written in place of a missing topping or filling.
pub const NO_SELECTION: i64 = 0;

const TOPPING_PREFIX: &str = "topping:";
const FILLING_PREFIX: &str = "filling:";
const MESSAGE_PREFIX: &str = "message:";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VariantKeyError {
    #[error("variant key '{0}' does not have four segments")]
    Malformed(String),
    #[error("variant key segment '{segment}' expected prefix '{prefix}'")]
    UnexpectedSegment { segment: String, prefix: &'static str },
    #[error("variant key segment '{0}' is not a valid id")]
    InvalidId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct VariantKey(String);

/// The configuration a key encodes, with sentinels turned back into `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    pub product_id: i64,
    pub topping_id: Option<i64>,
    pub filling_id: Option<i64>,
    pub message: String,
}

/// Maps "no selection" in any of its spellings (`None`, `Some(0)`) to `None`.
pub fn normalize_selection(id: Option<i64>) -> Option<i64> {
    id.filter(|id| *id != NO_SELECTION)
}

pub fn normalize_message(message: Option<&str>) -> String {
    message.map(|m| m.trim().to_lowercase()).unwrap_or_default()
}

pub fn derive_key(
    product_id: i64,
    topping_id: Option<i64>,
    filling_id: Option<i64>,
    message: Option<&str>,
) -> VariantKey {
    VariantKey(format!(
        "{}|{}{}|{}{}|{}{}",
        product_id,
        TOPPING_PREFIX,
        normalize_selection(topping_id).unwrap_or(NO_SELECTION),
        FILLING_PREFIX,
        normalize_selection(filling_id).unwrap_or(NO_SELECTION),
        MESSAGE_PREFIX,
        normalize_message(message),
    ))
}

impl VariantKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<VariantSpec, VariantKeyError> {
        decode(&self.0)
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses and re-derives, so the result is canonical even if `s` was not
/// (e.g. an upper-case message typed into a URL).
impl FromStr for VariantKey {
    type Err = VariantKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = decode(s)?;
        Ok(derive_key(
            spec.product_id,
            spec.topping_id,
            spec.filling_id,
            Some(&spec.message),
        ))
    }
}

fn decode(raw: &str) -> Result<VariantSpec, VariantKeyError> {
    // The message is last and may itself contain '|'.
    let mut parts = raw.splitn(4, '|');
    let (Some(product), Some(topping), Some(filling), Some(message)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(VariantKeyError::Malformed(raw.to_string()));
    };

    Ok(VariantSpec {
        product_id: parse_id(product)?,
        topping_id: normalize_selection(Some(parse_id(strip(topping, TOPPING_PREFIX)?)?)),
        filling_id: normalize_selection(Some(parse_id(strip(filling, FILLING_PREFIX)?)?)),
        message: strip(message, MESSAGE_PREFIX)?.to_string(),
    })
}

fn strip<'a>(segment: &'a str, prefix: &'static str) -> Result<&'a str, VariantKeyError> {
    segment
        .strip_prefix(prefix)
        .ok_or_else(|| VariantKeyError::UnexpectedSegment {
            segment: segment.to_string(),
            prefix,
        })
}

fn parse_id(value: &str) -> Result<i64, VariantKeyError> {
    value
        .parse::<i64>()
        .map_err(|_| VariantKeyError::InvalidId(value.to_string()))
}
