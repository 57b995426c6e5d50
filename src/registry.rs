//! Per-type generator cache and the keying facade built on it.

use crate::accessor::EntityAccessors;
use crate::core::{KeyError, Result};
use crate::generator::Generator;
use lazy_static::lazy_static;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, RwLock};
use tracing::{Level, event};

/// An entity type whose key is derived by a [`Generator`].
///
/// Usually implemented with `#[derive(Keyed)]`; a manual implementation just
/// returns the type's accessor registration.
pub trait Keyed: Sized + 'static {
    fn accessors() -> EntityAccessors<Self>;
}

type CachedGenerator = Arc<dyn Any + Send + Sync>;

// Global registry shared by the free keying functions
lazy_static! {
    static ref GLOBAL_REGISTRY: GeneratorRegistry = GeneratorRegistry::new();
}

/// Lazily populated map from entity type to its compiled [`Generator`].
///
/// Lookups are safe from any number of threads. A generator is built
/// outside the lock; when two callers race on the same type both build, the
/// first one published wins and the other copy is discarded. Failed builds
/// are never cached, and entries are never evicted.
pub struct GeneratorRegistry {
    generators: RwLock<HashMap<TypeId, CachedGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self {
            generators: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static GeneratorRegistry {
        &GLOBAL_REGISTRY
    }

    /// Returns the generator for `T`, building and publishing it on first use.
    pub fn get<T: Keyed>(&self) -> Result<Arc<Generator<T>>> {
        if let Some(cached) = self.generators.read()?.get(&TypeId::of::<T>()) {
            return downcast::<T>(Arc::clone(cached));
        }

        let built: CachedGenerator = Arc::new(Generator::from_accessors(&T::accessors())?);

        let (published, inserted) = self.publish(TypeId::of::<T>(), built)?;
        if inserted {
            event!(
                Level::DEBUG,
                entity = std::any::type_name::<T>(),
                "key generator published"
            );
        }
        downcast::<T>(published)
    }

    /// Stores `built` unless another caller got there first; returns the
    /// cached entry and whether it is `built`.
    fn publish(&self, type_id: TypeId, built: CachedGenerator) -> Result<(CachedGenerator, bool)> {
        let mut generators = self.generators.write()?;
        Ok(match generators.entry(type_id) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
            Entry::Vacant(slot) => (Arc::clone(slot.insert(built)), true),
        })
    }

    /// Builds and caches the generator for `T` eagerly, surfacing
    /// configuration errors at registration time.
    pub fn register<T: Keyed>(&self) -> Result<()> {
        self.get::<T>().map(|_| ())
    }

    pub fn contains<T: Keyed>(&self) -> Result<bool> {
        Ok(self.generators.read()?.contains_key(&TypeId::of::<T>()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.generators.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Assigns a key to `entity` unless it already has one.
    pub fn key<T: Keyed>(&self, entity: &mut T) -> Result<bool> {
        Ok(self.get::<T>()?.assign(entity))
    }

    /// Keys every unkeyed entity, returning how many received a new key.
    pub fn key_all<'a, T, I>(&self, entities: I) -> Result<usize>
    where
        T: Keyed,
        I: IntoIterator<Item = &'a mut T>,
    {
        let generator = self.get::<T>()?;
        let mut keyed = 0;
        for entity in entities {
            if generator.assign(entity) {
                keyed += 1;
            }
        }
        Ok(keyed)
    }

    /// `true` when the entity is keyed or its key is deterministic, i.e.
    /// re-issuing a save cannot create a duplicate record.
    pub fn has_key<T: Keyed>(&self, entity: &T) -> Result<bool> {
        let generator = self.get::<T>()?;
        Ok(generator.is_keyed(entity) || generator.is_deterministic())
    }

    /// [`GeneratorRegistry::has_key`] for every entity.
    pub fn have_keys<'a, T, I>(&self, entities: I) -> Result<bool>
    where
        T: Keyed,
        I: IntoIterator<Item = &'a T>,
    {
        let generator = self.get::<T>()?;
        if generator.is_deterministic() {
            return Ok(true);
        }
        Ok(entities.into_iter().all(|entity| generator.is_keyed(entity)))
    }

    /// Computes the lookup key of an entity with a deterministic strategy.
    pub fn compute_key<T: Keyed>(&self, entity: &T) -> Result<String> {
        self.get::<T>()?.compute_deterministic(entity)
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn downcast<T: Keyed>(cached: CachedGenerator) -> Result<Arc<Generator<T>>> {
    cached.downcast::<Generator<T>>().map_err(|_| {
        KeyError::ConfigurationError(format!(
            "Cached generator for {} has an unexpected type",
            std::any::type_name::<T>()
        ))
    })
}

/// Assigns a key to `entity` through the global registry.
pub fn key<T: Keyed>(entity: &mut T) -> Result<bool> {
    GeneratorRegistry::global().key(entity)
}

pub fn key_all<'a, T, I>(entities: I) -> Result<usize>
where
    T: Keyed,
    I: IntoIterator<Item = &'a mut T>,
{
    GeneratorRegistry::global().key_all(entities)
}

pub fn has_key<T: Keyed>(entity: &T) -> Result<bool> {
    GeneratorRegistry::global().has_key(entity)
}

pub fn have_keys<'a, T, I>(entities: I) -> Result<bool>
where
    T: Keyed,
    I: IntoIterator<Item = &'a T>,
{
    GeneratorRegistry::global().have_keys(entities)
}

/// Computes a deterministic lookup key through the global registry.
pub fn compute_key<T: Keyed>(entity: &T) -> Result<String> {
    GeneratorRegistry::global().compute_key(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{KeySegment, KeyStrategy};

    struct Ticket {
        id: Option<String>,
        queue: String,
    }

    impl Keyed for Ticket {
        fn accessors() -> EntityAccessors<Self> {
            EntityAccessors::new()
                .key_field(
                    "id",
                    KeyStrategy::new([KeySegment::Property, KeySegment::Random])
                        .properties(["queue"]),
                    |t: &Ticket| t.id.as_deref(),
                    |t: &mut Ticket, key: String| t.id = Some(key),
                )
                .field("queue", |t: &Ticket| t.queue.clone())
        }
    }

    struct Broken;

    impl Keyed for Broken {
        fn accessors() -> EntityAccessors<Self> {
            EntityAccessors::new()
        }
    }

    fn ticket() -> Ticket {
        Ticket {
            id: None,
            queue: "ops".to_string(),
        }
    }

    #[test]
    fn get_returns_the_same_generator() {
        let registry = GeneratorRegistry::new();
        assert!(registry.is_empty().unwrap());
        let first = registry.get::<Ticket>().unwrap();
        let second = registry.get::<Ticket>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.contains::<Ticket>().unwrap());
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn losing_publisher_adopts_the_cached_generator() {
        let registry = GeneratorRegistry::new();
        let first = registry.get::<Ticket>().unwrap();

        let late: CachedGenerator =
            Arc::new(Generator::from_accessors(&Ticket::accessors()).unwrap());
        let (cached, inserted) = registry.publish(TypeId::of::<Ticket>(), late).unwrap();
        assert!(!inserted);
        assert!(Arc::ptr_eq(&downcast::<Ticket>(cached).unwrap(), &first));
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn failed_builds_are_not_cached() {
        let registry = GeneratorRegistry::new();
        assert!(matches!(
            registry.register::<Broken>(),
            Err(KeyError::ConfigurationError(_))
        ));
        assert!(!registry.contains::<Broken>().unwrap());
        assert!(registry.get::<Broken>().is_err());
    }

    #[test]
    fn has_key_tracks_assignment_for_random_keys() {
        let registry = GeneratorRegistry::new();
        let mut entities = vec![ticket(), ticket()];
        assert!(!registry.has_key(&entities[0]).unwrap());
        assert!(!registry.have_keys(&entities).unwrap());

        assert_eq!(registry.key_all(&mut entities).unwrap(), 2);
        assert_eq!(registry.key_all(&mut entities).unwrap(), 0);
        assert!(registry.have_keys(&entities).unwrap());
        assert_ne!(entities[0].id, entities[1].id);
        assert!(matches!(
            registry.compute_key(&entities[0]),
            Err(KeyError::IllegalUse(_))
        ));
    }
}
