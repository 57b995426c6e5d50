// ============================================================================
// keyforge Library
// ============================================================================

//! Composite entity key generation and retry/backoff execution for
//! datastore access layers.
//!
//! Key generation: every keyed type declares, on a single key member, a
//! [`KeyStrategy`] (an ordered list of property values, random tokens and
//! timestamps). The strategy is compiled once per type into a
//! [`Generator`] and cached in a [`GeneratorRegistry`].
//!
//! ```
//! use keyforge::{EntityAccessors, Generator, KeySegment, KeyStrategy};
//!
//! struct Person {
//!     id: Option<String>,
//!     last_name: String,
//!     first_name: String,
//! }
//!
//! let accessors = EntityAccessors::named("Person")
//!     .key_field(
//!         "id",
//!         KeyStrategy::new([KeySegment::Property, KeySegment::Property])
//!             .properties(["lastName", "firstName"])
//!             .separator(","),
//!         |p: &Person| p.id.as_deref(),
//!         |p: &mut Person, key: String| p.id = Some(key),
//!     )
//!     .field("lastName", |p: &Person| p.last_name.clone())
//!     .field("firstName", |p: &Person| p.first_name.clone());
//!
//! let generator = Generator::from_accessors(&accessors).unwrap();
//! let mut person = Person {
//!     id: None,
//!     last_name: "Cooper".into(),
//!     first_name: "Robert".into(),
//! };
//! generator.assign(&mut person);
//! assert_eq!(person.id.as_deref(), Some("Cooper,Robert"));
//! ```
//!
//! Retry execution: see [`retry`].

pub mod core;
pub mod strategy;
pub mod accessor;
pub mod component;
pub mod generator;
pub mod registry;
pub mod retry;
pub mod config;
pub mod store;
pub mod record;

// Re-export main types for convenience
pub use core::{KeyError, Result};
pub use strategy::{DEFAULT_SEPARATOR, KeySegment, KeyStrategy};
pub use accessor::{EntityAccessors, KeyPart, KeySetter, MemberKind, Reader};
pub use component::{KeyComponent, PropertyComponent};
pub use generator::Generator;
pub use registry::{GeneratorRegistry, Keyed, compute_key, has_key, have_keys, key, key_all};

// Derive macro shares the trait's name, as serde does
pub use keyforge_derive::Keyed;

// Re-export retry API
pub use retry::{
    Backoff, BackoffStrategy, ErrorCategories, MatchStyle, RetryBuilder, RetryError, RetryEvent,
    RetryListener, RetryPlan, TimeUnit,
};

pub use config::{KeyforgeConfig, RetrySettings};
pub use store::{StoreError, default_store_retry_plan, store_retry_plan};
pub use record::JsonRecord;
