use crate::accessor::{EntityAccessors, KeySetter};
use crate::component::{KeyComponent, PropertyComponent};
use crate::core::{KeyError, Result};
use crate::strategy::{KeySegment, KeyStrategy};
use tracing::{Level, event};

/// Compiled, immutable key computation for one entity type.
///
/// Built once from the type's [`EntityAccessors`]; the strategy declared on
/// the key member is validated and every `Property` segment is bound to its
/// reader up front, so computing a key never fails.
pub struct Generator<T> {
    type_name: String,
    components: Vec<KeyComponent<T>>,
    key: KeySetter<T>,
    separator: String,
    lowercase: bool,
    deterministic: bool,
}

impl<T: 'static> Generator<T> {
    pub fn from_accessors(accessors: &EntityAccessors<T>) -> Result<Self> {
        let type_name = accessors.type_name().to_string();
        let key = accessors.resolve_key_member()?;
        let strategy = key.strategy().clone();
        strategy.validate(&type_name)?;

        let mut names = strategy.property_names();
        let mut components = Vec::with_capacity(strategy.segments.len());
        for segment in &strategy.segments {
            let component = match segment {
                KeySegment::Property => {
                    // validate() guarantees one name per property segment
                    let name = names.next().ok_or_else(|| {
                        KeyError::ConfigurationError(format!(
                            "Key strategy on {type_name} ran out of property names"
                        ))
                    })?;
                    KeyComponent::Property(PropertyComponent::new(accessors.resolve_reader(name)?))
                }
                KeySegment::Random => KeyComponent::Random,
                KeySegment::Time => KeyComponent::Time { inverse: false },
                KeySegment::InverseTime => KeyComponent::Time { inverse: true },
            };
            components.push(component);
        }

        let deterministic = components.iter().all(KeyComponent::is_deterministic);
        event!(
            Level::DEBUG,
            entity = %type_name,
            key_member = key.name(),
            components = components.len(),
            deterministic,
            "key generator built"
        );

        Ok(Self {
            type_name,
            components,
            separator: strategy.separator.clone(),
            lowercase: strategy.lowercase,
            key,
            deterministic,
        })
    }
}

impl<T> Generator<T> {
    /// Computes the key for `entity` without touching it.
    pub fn compute(&self, entity: &T) -> String {
        let mut key = String::new();
        for (index, component) in self.components.iter().enumerate() {
            if index != 0 {
                key.push_str(&self.separator);
            }
            key.push_str(&component.render(entity));
        }
        if self.lowercase {
            key.to_lowercase()
        } else {
            key
        }
    }

    /// Computes and stores a key unless the entity already has one.
    ///
    /// Returns `true` when a key was written.
    pub fn assign(&self, entity: &mut T) -> bool {
        if self.key.is_keyed(entity) {
            return false;
        }
        let key = self.compute(entity);
        event!(Level::TRACE, entity = %self.type_name, key = %key, "key assigned");
        self.key.write(entity, key);
        true
    }

    pub fn is_keyed(&self, entity: &T) -> bool {
        self.key.is_keyed(entity)
    }

    /// The key currently stored on `entity`.
    pub fn current_key<'a>(&self, entity: &'a T) -> Option<&'a str> {
        self.key.read(entity)
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    /// Fails with [`KeyError::IllegalUse`] unless every component is a property.
    pub fn require_deterministic(&self) -> Result<()> {
        match self.components.iter().find(|c| !c.is_deterministic()) {
            Some(component) => Err(KeyError::IllegalUse(format!(
                "{} segment of the key strategy on {} isn't deterministic",
                component.segment(),
                self.type_name
            ))),
            None => Ok(()),
        }
    }

    /// Derives the lookup key for `entity` from its property values.
    pub fn compute_deterministic(&self, entity: &T) -> Result<String> {
        self.require_deterministic()?;
        Ok(self.compute(entity))
    }

    pub fn components(&self) -> &[KeyComponent<T>] {
        &self.components
    }

    pub fn strategy(&self) -> &KeyStrategy {
        self.key.strategy()
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn is_lowercase(&self) -> bool {
        self.lowercase
    }

    pub fn key_member(&self) -> &str {
        self.key.name()
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl<T> std::fmt::Debug for Generator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("type_name", &self.type_name)
            .field("components", &self.components)
            .field("key_member", &self.key.name())
            .field("separator", &self.separator)
            .field("lowercase", &self.lowercase)
            .field("deterministic", &self.deterministic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{MAX_64BIT, decode_time, now_millis};

    #[derive(Default)]
    struct Person {
        id: Option<String>,
        last_name: String,
        first_name: String,
    }

    fn person(last: &str, first: &str) -> Person {
        Person {
            id: None,
            last_name: last.to_string(),
            first_name: first.to_string(),
        }
    }

    fn accessors(strategy: KeyStrategy) -> EntityAccessors<Person> {
        EntityAccessors::named("Person")
            .key_field(
                "id",
                strategy,
                |p: &Person| p.id.as_deref(),
                |p: &mut Person, key: String| p.id = Some(key),
            )
            .field("lastName", |p: &Person| p.last_name.clone())
            .field("firstName", |p: &Person| p.first_name.clone())
    }

    fn generator(strategy: KeyStrategy) -> Generator<Person> {
        Generator::from_accessors(&accessors(strategy)).unwrap()
    }

    #[test]
    fn joins_properties_with_separator() {
        let generator =
            generator(KeyStrategy::from_properties(["lastName", "firstName"]).separator(","));
        let entity = person("Cooper", "Robert");
        assert_eq!(generator.compute(&entity), "Cooper,Robert");
        assert_eq!(generator.compute(&entity), generator.compute(&entity));
        assert!(entity.id.is_none());
        assert!(generator.is_deterministic());
    }

    #[test]
    fn lowercase_folds_the_whole_key() {
        let generator = generator(KeyStrategy::from_properties(["firstName"]).lowercase(true));
        assert_eq!(generator.compute(&person("x", "ROBERT")), "robert");
    }

    #[test]
    fn assign_is_idempotent() {
        let generator = generator(
            KeyStrategy::new([KeySegment::Property, KeySegment::Random]).properties(["lastName"]),
        );
        let mut entity = person("Cooper", "Robert");
        assert!(generator.assign(&mut entity));
        let first = entity.id.clone().unwrap();
        assert!(first.starts_with("Cooper:"));

        assert!(!generator.assign(&mut entity));
        assert_eq!(entity.id.as_deref(), Some(first.as_str()));
        assert_eq!(generator.current_key(&entity), Some(first.as_str()));
    }

    #[test]
    fn non_deterministic_generators_refuse_lookup_keys() {
        let generator = generator(KeyStrategy::new([KeySegment::Time, KeySegment::Random]));
        assert!(!generator.is_deterministic());
        assert!(matches!(
            generator.require_deterministic(),
            Err(KeyError::IllegalUse(_))
        ));
        assert!(generator.compute_deterministic(&Person::default()).is_err());
    }

    #[test]
    fn time_segments_decode_within_call_window() {
        let generator = generator(
            KeyStrategy::new([KeySegment::Property, KeySegment::Time, KeySegment::InverseTime])
                .properties(["lastName"])
                .separator("|"),
        );
        let before = now_millis();
        let key = generator.compute(&person("Cooper", "Robert"));
        let after = now_millis();

        let parts: Vec<&str> = key.split('|').collect();
        assert_eq!(parts.len(), 3);
        let time = decode_time(parts[1], false).unwrap();
        assert!(before <= time && time <= after);
        let inverse = u64::from_str_radix(parts[2], 16).unwrap();
        let restored = MAX_64BIT - inverse;
        assert!(before <= restored && restored <= after);
    }

    #[test]
    fn construction_reports_configuration_errors() {
        let lone_time = Generator::from_accessors(&accessors(KeyStrategy::new([KeySegment::Time])));
        assert!(matches!(lone_time, Err(KeyError::ConfigurationError(_))));

        let unknown =
            Generator::from_accessors(&accessors(KeyStrategy::from_properties(["middleName"])));
        assert!(matches!(
            unknown,
            Err(KeyError::ConfigurationError(ref msg)) if msg.contains("middleName")
        ));

        let mismatch = Generator::from_accessors(&accessors(
            KeyStrategy::new([KeySegment::Property]).properties(["lastName", "firstName"]),
        ));
        assert!(matches!(mismatch, Err(KeyError::ConfigurationError(_))));
    }
}
