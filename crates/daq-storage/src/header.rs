//! Ordered FITS header cards.

use crate::error::StorageError;
use std::fmt;

/// Keys the FITS library writes itself for an unsigned 16-bit primary image.
pub const STRUCTURAL_KEYS: &[&str] = &["SIMPLE", "BITPIX", "NAXIS", "BZERO", "BSCALE", "EXTEND"];

/// Value of a header card.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Quoted string
    Str(String),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Logical
    Bool(bool),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Str(s) => write!(f, "'{}'", s),
            HeaderValue::Int(v) => write!(f, "{}", v),
            HeaderValue::Float(v) => write!(f, "{}", v),
            HeaderValue::Bool(true) => f.write_str("T"),
            HeaderValue::Bool(false) => f.write_str("F"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Int(value.into())
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

/// One keyword/value/comment record.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCard {
    /// Upper-case keyword
    pub key: String,
    /// Card value
    pub value: HeaderValue,
    /// Comment after the value
    pub comment: String,
}

/// Header cards in insertion order, unique by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<HeaderCard>,
}

impl FitsHeader {
    /// Empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing card in place.
    ///
    /// The key is upper-cased before validation.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidKey`] for keys that are not 1-8 characters of
    /// `A-Z 0-9 - _`, and [`StorageError::ReservedKey`] for keys the FITS
    /// library owns.
    pub fn set(
        &mut self,
        key: &str,
        value: impl Into<HeaderValue>,
        comment: &str,
    ) -> Result<(), StorageError> {
        let key = normalize_key(key)?;
        let card = HeaderCard {
            key,
            value: value.into(),
            comment: comment.to_string(),
        };
        match self.cards.iter_mut().find(|c| c.key == card.key) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
        Ok(())
    }

    /// Card for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&HeaderCard> {
        let key = key.to_ascii_uppercase();
        self.cards.iter().find(|c| c.key == key)
    }

    /// Cards in write order.
    pub fn cards(&self) -> &[HeaderCard] {
        &self.cards
    }

    /// Number of cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// True when no card is set.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Append every card of `other`, replacing duplicates.
    pub fn extend(&mut self, other: FitsHeader) {
        for card in other.cards {
            match self.cards.iter_mut().find(|c| c.key == card.key) {
                Some(existing) => *existing = card,
                None => self.cards.push(card),
            }
        }
    }
}

fn normalize_key(key: &str) -> Result<String, StorageError> {
    let upper = key.trim().to_ascii_uppercase();
    let valid = (1..=8).contains(&upper.len())
        && upper
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if !valid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if is_structural(&upper) {
        return Err(StorageError::ReservedKey(upper));
    }
    Ok(upper)
}

fn is_structural(key: &str) -> bool {
    STRUCTURAL_KEYS.contains(&key)
        || key
            .strip_prefix("NAXIS")
            .is_some_and(|rest| rest.bytes().all(|b| b.is_ascii_digit()))
}
