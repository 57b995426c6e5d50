//! Accessor resolution for keyed entity types.
//!
//! Every keyed type registers its members once, explicitly, through an
//! [`EntityAccessors`] table: plain fields and getter-style properties that
//! can be read into key parts, plus the single key member (field or
//! property) that carries the [`KeyStrategy`] and receives computed keys.
//!
//! Lookups follow a fixed order: fields first, in declaration order, then
//! properties.

use crate::core::{KeyError, Result};
use crate::strategy::KeyStrategy;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

type ReadFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;
type KeyGetFn<T> = Arc<dyn for<'a> Fn(&'a T) -> Option<&'a str> + Send + Sync>;
type KeySetFn<T> = Arc<dyn Fn(&mut T, String) + Send + Sync>;

/// Renders a member value as a key part.
pub trait KeyPart {
    fn to_key_part(&self) -> String;
}

impl KeyPart for str {
    fn to_key_part(&self) -> String {
        self.to_string()
    }
}

impl KeyPart for String {
    fn to_key_part(&self) -> String {
        self.clone()
    }
}

impl<T: KeyPart + ?Sized> KeyPart for &T {
    fn to_key_part(&self) -> String {
        (**self).to_key_part()
    }
}

/// `None` renders as an empty part.
impl<T: KeyPart> KeyPart for Option<T> {
    fn to_key_part(&self) -> String {
        self.as_ref().map(KeyPart::to_key_part).unwrap_or_default()
    }
}

macro_rules! display_key_part {
    ($($ty:ty),* $(,)?) => {
        $(
            impl KeyPart for $ty {
                fn to_key_part(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_key_part!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, Uuid,
    NaiveDate, NaiveDateTime,
);

impl KeyPart for DateTime<Utc> {
    fn to_key_part(&self) -> String {
        self.to_rfc3339()
    }
}

/// Where a member was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Property,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field => write!(f, "field"),
            Self::Property => write!(f, "property"),
        }
    }
}

/// A resolved, named projection of an entity member to a string.
pub struct Reader<T> {
    name: String,
    kind: MemberKind,
    read: ReadFn<T>,
}

impl<T> Reader<T> {
    pub fn read(&self, entity: &T) -> String {
        (self.read)(entity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            read: Arc::clone(&self.read),
        }
    }
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The resolved key member: the strategy it declares plus typed get/set access.
pub struct KeySetter<T> {
    name: String,
    kind: MemberKind,
    strategy: KeyStrategy,
    get: KeyGetFn<T>,
    set: KeySetFn<T>,
}

impl<T> KeySetter<T> {
    /// Current key, if one was assigned.
    pub fn read<'a>(&self, entity: &'a T) -> Option<&'a str> {
        (self.get)(entity)
    }

    pub fn write(&self, entity: &mut T, key: String) {
        (self.set)(entity, key)
    }

    pub fn is_keyed(&self, entity: &T) -> bool {
        self.read(entity).is_some()
    }

    pub fn strategy(&self) -> &KeyStrategy {
        &self.strategy
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }
}

impl<T> Clone for KeySetter<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            strategy: self.strategy.clone(),
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<T> fmt::Debug for KeySetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySetter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("strategy", &self.strategy)
            .finish()
    }
}

struct Member<T> {
    name: String,
    kind: MemberKind,
    read: ReadFn<T>,
    key: Option<KeySetter<T>>,
}

/// Explicit accessor registration for one entity type.
///
/// # Examples
///
/// ```
/// use keyforge::{EntityAccessors, KeyStrategy};
///
/// struct Person {
///     id: Option<String>,
///     last_name: String,
///     first_name: String,
/// }
///
/// let accessors = EntityAccessors::<Person>::new()
///     .key_field(
///         "id",
///         KeyStrategy::from_properties(["last_name", "first_name"]).separator(","),
///         |p: &Person| p.id.as_deref(),
///         |p: &mut Person, key: String| p.id = Some(key),
///     )
///     .field("last_name", |p: &Person| p.last_name.clone())
///     .field("first_name", |p: &Person| p.first_name.clone());
///
/// assert_eq!(accessors.resolve_key_member().unwrap().name(), "id");
/// ```
pub struct EntityAccessors<T> {
    type_name: String,
    members: Vec<Member<T>>,
}

impl<T: 'static> EntityAccessors<T> {
    pub fn new() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    /// Registration table reported under a custom type name.
    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            members: Vec::new(),
        }
    }

    /// Register a readable field.
    pub fn field<F>(self, name: impl Into<String>, read: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.push_readable(name.into(), MemberKind::Field, Arc::new(read))
    }

    /// Register a readable getter-style property.
    pub fn property<F>(self, name: impl Into<String>, read: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.push_readable(name.into(), MemberKind::Property, Arc::new(read))
    }

    /// Register the field that declares the key strategy and stores the key.
    pub fn key_field<G, S>(self, name: impl Into<String>, strategy: KeyStrategy, get: G, set: S) -> Self
    where
        G: for<'a> Fn(&'a T) -> Option<&'a str> + Send + Sync + 'static,
        S: Fn(&mut T, String) + Send + Sync + 'static,
    {
        self.push_key(name.into(), MemberKind::Field, strategy, Arc::new(get), Arc::new(set))
    }

    /// Register a get/set property pair that declares the key strategy.
    pub fn key_property<G, S>(
        self,
        name: impl Into<String>,
        strategy: KeyStrategy,
        get: G,
        set: S,
    ) -> Self
    where
        G: for<'a> Fn(&'a T) -> Option<&'a str> + Send + Sync + 'static,
        S: Fn(&mut T, String) + Send + Sync + 'static,
    {
        self.push_key(name.into(), MemberKind::Property, strategy, Arc::new(get), Arc::new(set))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Locates the single member carrying a key strategy.
    pub fn resolve_key_member(&self) -> Result<KeySetter<T>> {
        let mut declared = self.ordered().filter_map(|member| member.key.as_ref());

        let Some(found) = declared.next() else {
            return Err(KeyError::ConfigurationError(format!(
                "Failed to find a key strategy member on {}",
                self.type_name
            )));
        };

        if let Some(extra) = declared.next() {
            return Err(KeyError::ConfigurationError(format!(
                "{} declares more than one key strategy member ('{}' and '{}')",
                self.type_name, found.name, extra.name
            )));
        }

        Ok(found.clone())
    }

    /// Resolves a readable member by name, fields before properties.
    pub fn resolve_reader(&self, name: &str) -> Result<Reader<T>> {
        let name = name.trim();
        self.ordered()
            .find(|member| member.name == name)
            .map(|member| Reader {
                name: member.name.clone(),
                kind: member.kind,
                read: Arc::clone(&member.read),
            })
            .ok_or_else(|| {
                KeyError::ConfigurationError(format!(
                    "Failed to find a readable field or property for {} on {}",
                    name, self.type_name
                ))
            })
    }

    fn ordered(&self) -> impl Iterator<Item = &Member<T>> {
        let fields = self
            .members
            .iter()
            .filter(|member| member.kind == MemberKind::Field);
        let properties = self
            .members
            .iter()
            .filter(|member| member.kind == MemberKind::Property);
        fields.chain(properties)
    }

    fn push_readable(mut self, name: String, kind: MemberKind, read: ReadFn<T>) -> Self {
        self.members.push(Member {
            name: name.trim().to_string(),
            kind,
            read,
            key: None,
        });
        self
    }

    fn push_key(
        mut self,
        name: String,
        kind: MemberKind,
        strategy: KeyStrategy,
        get: KeyGetFn<T>,
        set: KeySetFn<T>,
    ) -> Self {
        let name = name.trim().to_string();
        let key_get = Arc::clone(&get);
        let read: ReadFn<T> = Arc::new(move |entity: &T| {
            key_get(entity).map(str::to_string).unwrap_or_default()
        });
        self.members.push(Member {
            name: name.clone(),
            kind,
            read,
            key: Some(KeySetter {
                name,
                kind,
                strategy,
                get,
                set,
            }),
        });
        self
    }
}

impl<T: 'static> Default for EntityAccessors<T> {
    fn default() -> Self {
        Self::new()
    }
}
