//! Location identities: canonical tokens for abstract memory locations.
//!
//! Two memory operations may alias only if their location identities are
//! equal, or either is the wildcard [`LocationIdentity::any`]. Identities
//! are canonical by name: a process-wide [`LocationRegistry`] rejects
//! duplicate registration, so distinct call sites can never mint two
//! colliding identities for the same field. One identity per array element
//! kind is pre-interned when the registry is constructed.
//!
//! The registry is the one shared resource in this crate: lookups are
//! lock-free reads against the published table, while registration is
//! serialized by a single lock so the uniqueness check and the insert stay
//! atomic across concurrently compiling threads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use strum::IntoEnumIterator;

use crate::ir::stamp::ElementKind;
use crate::Result;

/// Name reserved for the wildcard identity that aliases everything.
const ANY_LOCATION_NAME: &str = "ANY_LOCATION";

/// Name reserved for the shared identity of provably-constant memory.
const FINAL_LOCATION_NAME: &str = "FINAL_LOCATION";

#[derive(Debug)]
struct Inner {
    name: String,
    immutable: bool,
}

/// A canonical token identifying an abstract memory location.
///
/// Equality and hashing are defined purely on the name. Cloning is cheap;
/// all clones share one allocation.
#[derive(Debug, Clone)]
pub struct LocationIdentity {
    inner: Arc<Inner>,
}

impl LocationIdentity {
    fn new(name: impl Into<String>, immutable: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                immutable,
            }),
        }
    }

    /// The wildcard identity: conservatively aliases every location.
    #[must_use]
    pub fn any() -> Self {
        Self::new(ANY_LOCATION_NAME, false)
    }

    /// The shared identity of memory that never changes after
    /// initialization. Accesses that need no finer aliasing than "this is
    /// constant" all use it.
    #[must_use]
    pub fn final_location() -> Self {
        Self::new(FINAL_LOCATION_NAME, true)
    }

    /// The identity's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the location's contents never change after initialization.
    ///
    /// Reads from an immutable location commute with everything.
    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.inner.immutable
    }

    /// Whether this is the wildcard identity.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.inner.name == ANY_LOCATION_NAME
    }

    /// Whether accesses to `self` and `other` may address the same memory.
    #[must_use]
    pub fn overlaps(&self, other: &LocationIdentity) -> bool {
        self.is_any() || other.is_any() || self == other
    }
}

impl PartialEq for LocationIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl Eq for LocationIdentity {}

impl std::hash::Hash for LocationIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

impl std::fmt::Display for LocationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suffix = if self.inner.immutable {
            "immutable"
        } else {
            "mutable"
        };
        write!(f, "{}:{}", self.inner.name, suffix)
    }
}

/// The process-wide table of registered location identities.
///
/// Registration is the only mutation; it is serialized by one lock so
/// name-uniqueness stays atomic. Lookups never take the lock.
pub struct LocationRegistry {
    table: DashMap<String, LocationIdentity>,
    registration: Mutex<()>,
    array_locations: HashMap<ElementKind, LocationIdentity>,
}

impl Default for LocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationRegistry {
    /// Creates a registry with the per-element-kind array locations
    /// pre-interned.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            table: DashMap::new(),
            registration: Mutex::new(()),
            array_locations: HashMap::new(),
        };
        let mut array_locations = HashMap::new();
        for kind in ElementKind::iter() {
            let identity = LocationIdentity::new(format!("Array: {kind}"), false);
            registry
                .table
                .insert(identity.name().to_string(), identity.clone());
            array_locations.insert(kind, identity);
        }
        Self {
            array_locations,
            ..registry
        }
    }

    /// Registers a new identity under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DuplicateLocation`] if the name is already
    /// registered (including the pre-interned array names and the reserved
    /// wildcard and final-location names), or [`crate::Error::LockError`]
    /// if the registration lock is poisoned.
    pub fn create(&self, name: &str, immutable: bool) -> Result<LocationIdentity> {
        let _guard = self
            .registration
            .lock()
            .map_err(|_| crate::Error::LockError)?;
        if name == ANY_LOCATION_NAME
            || name == FINAL_LOCATION_NAME
            || self.table.contains_key(name)
        {
            return Err(crate::Error::DuplicateLocation(name.to_string()));
        }
        let identity = LocationIdentity::new(name, immutable);
        self.table.insert(name.to_string(), identity.clone());
        Ok(identity)
    }

    /// Looks up a registered identity by name. Lock-free.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<LocationIdentity> {
        self.table.get(name).map(|entry| entry.value().clone())
    }

    /// The pre-interned identity shared by all array accesses of the given
    /// element kind.
    #[must_use]
    pub fn array_location(&self, kind: ElementKind) -> LocationIdentity {
        self.array_locations[&kind].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = LocationRegistry::new();
        registry.create("field:A", false).unwrap();

        let err = registry.create("field:A", false).unwrap_err();
        assert!(matches!(err, crate::Error::DuplicateLocation(name) if name == "field:A"));
    }

    #[test]
    fn test_lookup_before_registration() {
        let registry = LocationRegistry::new();
        assert!(registry.lookup("field:B").is_none());

        registry.create("field:B", true).unwrap();
        let found = registry.lookup("field:B").unwrap();
        assert!(found.is_immutable());
    }

    #[test]
    fn test_equality_is_by_name() {
        let registry = LocationRegistry::new();
        let a = registry.create("field:X", false).unwrap();
        let again = registry.lookup("field:X").unwrap();
        let b = registry.create("field:Y", false).unwrap();

        assert_eq!(a, again);
        assert_ne!(a, b);
    }

    #[test]
    fn test_any_overlaps_everything() {
        let registry = LocationRegistry::new();
        let a = registry.create("field:X", false).unwrap();
        let b = registry.create("field:Y", false).unwrap();
        let any = LocationIdentity::any();

        assert!(any.overlaps(&a));
        assert!(a.overlaps(&any));
        assert!(a.overlaps(&a));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_array_locations_preinterned() {
        let registry = LocationRegistry::new();
        let ints = registry.array_location(ElementKind::Int);
        let ints_again = registry.array_location(ElementKind::Int);
        let objects = registry.array_location(ElementKind::Object);

        assert_eq!(ints, ints_again);
        assert_ne!(ints, objects);
        // The names are reserved like any other registration.
        assert!(registry.create(ints.name(), false).is_err());
        assert_eq!(registry.lookup("Array: Int"), Some(ints));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let registry = LocationRegistry::new();
        assert!(registry.create("ANY_LOCATION", false).is_err());
        assert!(registry.create("FINAL_LOCATION", true).is_err());
    }

    #[test]
    fn test_final_location_is_immutable() {
        let fin = LocationIdentity::final_location();
        assert!(fin.is_immutable());
        assert!(!fin.is_any());
        assert_eq!(fin, LocationIdentity::final_location());
    }

    #[test]
    fn test_display_shows_mutability() {
        let registry = LocationRegistry::new();
        let counter = registry.create("field:counter", false).unwrap();
        let table = registry.create("field:vtable", true).unwrap();

        assert_eq!(counter.to_string(), "field:counter:mutable");
        assert_eq!(table.to_string(), "field:vtable:immutable");
        assert_eq!(
            LocationIdentity::final_location().to_string(),
            "FINAL_LOCATION:immutable"
        );
    }
}
