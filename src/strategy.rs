//! Declarative key strategy descriptors.
//!
//! A [`KeyStrategy`] is attached to exactly one key member of an entity type
//! and describes how the key string is assembled: an ordered list of
//! [`KeySegment`]s, the property names consumed by `Property` segments, the
//! separator placed between rendered segments and an optional lowercase fold.
//!
//! Strategies are plain values. They are checked once, when a generator is
//! built for the owning type (see [`KeyStrategy::validate`]).

use crate::core::{KeyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when a strategy does not name one.
pub const DEFAULT_SEPARATOR: &str = ":";

/// One element of a key strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySegment {
    /// The string value of a named member of the entity.
    Property,
    /// A freshly generated random (UUID) token.
    Random,
    /// The current epoch milliseconds in hexadecimal.
    Time,
    /// `i64::MAX` minus the current epoch milliseconds, in hexadecimal.
    InverseTime,
}

impl KeySegment {
    /// Returns `true` when the segment renders identically for identical input.
    pub fn is_deterministic(self) -> bool {
        matches!(self, Self::Property)
    }

    fn is_clock(self) -> bool {
        matches!(self, Self::Time | Self::InverseTime)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Property => "PROPERTY",
            Self::Random => "RANDOM",
            Self::Time => "TIME",
            Self::InverseTime => "INVERSE_TIME",
        };
        write!(f, "{label}")
    }
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

/// Ordered description of how an entity key is composed.
///
/// # Examples
///
/// ```
/// use keyforge::{KeySegment, KeyStrategy};
///
/// let strategy = KeyStrategy::new([KeySegment::Property, KeySegment::Property])
///     .properties(["last_name", "first_name"])
///     .separator(",");
///
/// assert_eq!(strategy.property_segment_count(), 2);
/// assert!(strategy.is_deterministic());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStrategy {
    pub segments: Vec<KeySegment>,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub lowercase: bool,
}

impl KeyStrategy {
    /// Create a strategy from an ordered list of segments.
    pub fn new(segments: impl IntoIterator<Item = KeySegment>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
            properties: Vec::new(),
            separator: default_separator(),
            lowercase: false,
        }
    }

    /// Shorthand for a strategy made only of `Property` segments, one per name.
    pub fn from_properties<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let properties: Vec<String> = names.into_iter().map(Into::into).collect();
        Self {
            segments: vec![KeySegment::Property; properties.len()],
            properties,
            separator: default_separator(),
            lowercase: false,
        }
    }

    /// Set the property names consumed, in order, by `Property` segments.
    pub fn properties<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.properties = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the separator placed between rendered segments.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Fold the computed key to lower case.
    pub fn lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    pub fn property_segment_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| **segment == KeySegment::Property)
            .count()
    }

    /// Returns `true` iff every segment is a `Property` segment.
    pub fn is_deterministic(&self) -> bool {
        self.segments.iter().all(|segment| segment.is_deterministic())
    }

    /// Property names with surrounding whitespace removed.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|name| name.trim())
    }

    /// Checks the strategy declared on `type_name`.
    ///
    /// Rejects empty strategies, a lone `Time`/`InverseTime` segment, blank
    /// property names and any mismatch between the number of property names
    /// and the number of `Property` segments.
    pub fn validate(&self, type_name: &str) -> Result<()> {
        if self.segments.is_empty() {
            return Err(KeyError::ConfigurationError(format!(
                "Key strategy on {type_name} declares no segments"
            )));
        }

        if self.segments.len() == 1 && self.segments[0].is_clock() {
            return Err(KeyError::ConfigurationError(format!(
                "{type_name} cannot use a key made of only a {} segment",
                self.segments[0]
            )));
        }

        if let Some(position) = self.property_names().position(str::is_empty) {
            return Err(KeyError::ConfigurationError(format!(
                "Key strategy on {type_name} has a blank property name at position {position}"
            )));
        }

        let expected = self.property_segment_count();
        let declared = self.properties.len();
        if declared < expected {
            return Err(KeyError::ConfigurationError(format!(
                "Key strategy on {type_name} expected {expected} properties but found only {declared}: {:?}",
                self.properties
            )));
        }
        if declared > expected {
            return Err(KeyError::ConfigurationError(format!(
                "Key strategy on {type_name} expected {expected} properties but found an extra {}: {:?}",
                declared - expected,
                self.properties
            )));
        }

        Ok(())
    }
}
