use std::collections::BTreeMap;
use std::sync::RwLock;

use stockledger_core::{DomainError, DomainResult, Entity};

/// In-memory keyed store for master-data entities.
///
/// Reads on a poisoned lock degrade to "nothing there"; writes report an error.
#[derive(Debug)]
pub struct InMemoryEntityStore<E: Entity> {
    inner: RwLock<BTreeMap<E::Id, E>>,
}

impl<E: Entity> InMemoryEntityStore<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<E: Entity> Default for InMemoryEntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InMemoryEntityStore<E>
where
    E: Entity + Clone,
{
    pub fn get(&self, id: &E::Id) -> Option<E> {
        let map = self.inner.read().ok()?;
        map.get(id).cloned()
    }

    /// All entities, ordered by id.
    pub fn list(&self) -> Vec<E> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }

    /// Insert a new entity; an existing id is a conflict.
    pub fn insert_new(&self, entity: E) -> DomainResult<()> {
        let mut map = self.write()?;
        if map.contains_key(entity.id()) {
            return Err(DomainError::conflict(format!("{:?} already exists", entity.id())));
        }
        map.insert(entity.id().clone(), entity);
        Ok(())
    }

    /// Insert or replace.
    pub fn upsert(&self, entity: E) -> DomainResult<()> {
        let mut map = self.write()?;
        map.insert(entity.id().clone(), entity);
        Ok(())
    }

    /// Mutate an existing entity in place and return the updated copy.
    pub fn update(
        &self,
        id: &E::Id,
        f: impl FnOnce(&mut E) -> DomainResult<()>,
    ) -> DomainResult<E> {
        let mut map = self.write()?;
        let entity = map
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(format!("{id:?}")))?;

        // Edit a scratch copy so a failed validation leaves the stored entity untouched.
        let mut draft = entity.clone();
        f(&mut draft)?;
        *entity = draft.clone();
        Ok(draft)
    }

    pub fn remove(&self, id: &E::Id) -> DomainResult<Option<E>> {
        let mut map = self.write()?;
        Ok(map.remove(id))
    }

    fn write(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, BTreeMap<E::Id, E>>> {
        self.inner
            .write()
            .map_err(|_| DomainError::invariant("master-data lock poisoned"))
    }
}
