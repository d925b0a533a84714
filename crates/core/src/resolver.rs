#![forbid(unsafe_code)]

//! Per-batch mapping of client temporary ids to persisted ids.

use crate::ids::{EntityId, EntityRef, TempRef};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("temporary id `{0}` is already registered in this batch")]
    DuplicateTempId(TempRef),
    #[error("temporary id `{0}` was not created earlier in this batch")]
    Unresolved(TempRef),
}

#[derive(Clone, Debug, Default)]
pub struct IdResolver {
    resolved: HashMap<TempRef, EntityId>,
}

impl IdResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, temp: TempRef, id: EntityId) -> Result<(), ResolveError> {
        if self.resolved.contains_key(&temp) {
            return Err(ResolveError::DuplicateTempId(temp));
        }
        self.resolved.insert(temp, id);
        Ok(())
    }

    pub fn contains(&self, temp: TempRef) -> bool {
        self.resolved.contains_key(&temp)
    }

    /// Real ids pass through; temporary ids must have been registered.
    pub fn resolve(&self, reference: EntityRef) -> Result<EntityId, ResolveError> {
        match reference {
            EntityRef::Real(id) => Ok(id),
            EntityRef::Temp(temp) => self
                .resolved
                .get(&temp)
                .copied()
                .ok_or(ResolveError::Unresolved(temp)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ObjectKind;

    #[test]
    fn register_rejects_duplicates() {
        let mut resolver = IdResolver::new();
        let temp = TempRef::new(ObjectKind::Node, 1);
        resolver.register(temp, 10).unwrap();
        assert_eq!(
            resolver.register(temp, 11).unwrap_err(),
            ResolveError::DuplicateTempId(temp)
        );
        assert_eq!(resolver.resolve(EntityRef::Temp(temp)).unwrap(), 10);
        assert!(resolver.contains(temp));
    }

    #[test]
    fn real_ids_pass_through() {
        let resolver = IdResolver::new();
        assert_eq!(resolver.resolve(EntityRef::parse("42").unwrap()).unwrap(), 42);
        assert_eq!(
            resolver.resolve(EntityRef::parse("w-3").unwrap()).unwrap_err(),
            ResolveError::Unresolved(TempRef::new(ObjectKind::Way, 3))
        );
    }
}
