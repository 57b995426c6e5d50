//! Key components: the realized form of each strategy segment.

use crate::accessor::Reader;
use crate::strategy::KeySegment;
use chrono::Utc;
use uuid::Uuid;

/// Upper bound that inverse timestamps count down from.
pub const MAX_64BIT: u64 = i64::MAX as u64;

/// Number of hex digits in an encoded timestamp.
pub const TIME_HEX_WIDTH: usize = 16;

/// Projects a named member of the entity into the key.
pub struct PropertyComponent<T> {
    reader: Reader<T>,
}

impl<T> PropertyComponent<T> {
    pub fn new(reader: Reader<T>) -> Self {
        Self { reader }
    }

    pub fn name(&self) -> &str {
        self.reader.name()
    }

    pub fn render(&self, entity: &T) -> String {
        self.reader.read(entity)
    }
}

/// One realized segment of a key strategy.
pub enum KeyComponent<T> {
    Property(PropertyComponent<T>),
    Random,
    Time { inverse: bool },
}

impl<T> KeyComponent<T> {
    pub fn render(&self, entity: &T) -> String {
        match self {
            Self::Property(component) => component.render(entity),
            Self::Random => random_token(),
            Self::Time { inverse } => encode_time(now_millis(), *inverse),
        }
    }

    pub fn segment(&self) -> KeySegment {
        match self {
            Self::Property(_) => KeySegment::Property,
            Self::Random => KeySegment::Random,
            Self::Time { inverse: false } => KeySegment::Time,
            Self::Time { inverse: true } => KeySegment::InverseTime,
        }
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self, Self::Property(_))
    }
}

impl<T> std::fmt::Debug for KeyComponent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Property(component) => f
                .debug_tuple("Property")
                .field(&component.name())
                .finish(),
            Self::Random => write!(f, "Random"),
            Self::Time { inverse } => f.debug_struct("Time").field("inverse", inverse).finish(),
        }
    }
}

/// A new random v4 UUID in hyphenated form.
pub fn random_token() -> String {
    Uuid::new_v4().to_string()
}

/// Current epoch milliseconds; clocks before the epoch read as zero.
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Lowercase hex of `millis` (or `MAX_64BIT - millis`), zero-padded to
/// [`TIME_HEX_WIDTH`] digits so keys sort by time.
pub fn encode_time(millis: u64, inverse: bool) -> String {
    let value = if inverse {
        MAX_64BIT.saturating_sub(millis)
    } else {
        millis
    };
    format!("{value:0width$x}", width = TIME_HEX_WIDTH)
}

/// Reverses [`encode_time`], returning the original millisecond reading.
pub fn decode_time(encoded: &str, inverse: bool) -> Option<u64> {
    if encoded.len() != TIME_HEX_WIDTH {
        return None;
    }
    let value = u64::from_str_radix(encoded, 16).ok()?;
    if inverse {
        MAX_64BIT.checked_sub(value)
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_pads_small_values() {
        assert_eq!(encode_time(0xff, false), "00000000000000ff");
        assert_eq!(encode_time(now_millis(), false).len(), TIME_HEX_WIDTH);
        assert_eq!(encode_time(0, true), "7fffffffffffffff");
    }

    #[test]
    fn decode_reverses_encode() {
        let now = now_millis();
        assert_eq!(decode_time(&encode_time(now, false), false), Some(now));
        assert_eq!(decode_time(&encode_time(now, true), true), Some(now));
        assert_eq!(decode_time("ff", false), None);
        assert_eq!(decode_time("zzzzzzzzzzzzzzzz", false), None);
    }

    #[test]
    fn inverse_encoding_sorts_newest_first() {
        let older = encode_time(1_700_000_000_000, true);
        let newer = encode_time(1_700_000_000_001, true);
        assert!(newer < older);

        let older = encode_time(1_700_000_000_000, false);
        let newer = encode_time(1_700_000_000_001, false);
        assert!(older < newer);
    }

    #[test]
    fn property_component_reads_through_its_reader() {
        let accessors = crate::accessor::EntityAccessors::<String>::named("Label")
            .field("text", |label: &String| label.clone());
        let component = PropertyComponent::new(accessors.resolve_reader("text").unwrap());
        assert_eq!(component.name(), "text");
        assert_eq!(component.render(&"MiXeD".to_string()), "MiXeD");
    }

    #[test]
    fn random_tokens_are_uuid_shaped_and_distinct() {
        let component = KeyComponent::<()>::Random;
        let first = component.render(&());
        let second = component.render(&());
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
        assert!(!component.is_deterministic());
        assert_eq!(component.segment(), KeySegment::Random);
    }
}
