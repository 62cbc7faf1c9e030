use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::routing::{
    error::{RoutingError, storage_error},
    ports::{TargetStorePort, duplicate_target, missing_target, position_of},
    types::Target,
};

#[derive(Default)]
pub struct InMemoryTargetStore {
    targets: RwLock<Vec<Target>>,
}

impl InMemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(targets: Vec<Target>) -> Self {
        Self {
            targets: RwLock::new(targets),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Target>>, RoutingError> {
        self.targets
            .read()
            .map_err(|_| storage_error("in-memory target store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Target>>, RoutingError> {
        self.targets
            .write()
            .map_err(|_| storage_error("in-memory target store lock poisoned"))
    }
}

#[async_trait]
impl TargetStorePort for InMemoryTargetStore {
    async fn list_all(&self) -> Result<Vec<Target>, RoutingError> {
        Ok(self.read()?.clone())
    }

    async fn create(&self, target: Target) -> Result<(), RoutingError> {
        let mut guard = self.write()?;
        if position_of(&guard, &target.id).is_some() {
            return Err(duplicate_target(&target.id));
        }
        guard.push(target);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Target, RoutingError> {
        let guard = self.read()?;
        position_of(&guard, id)
            .map(|index| guard[index].clone())
            .ok_or_else(|| missing_target(id))
    }

    async fn replace(&self, id: &str, target: Target) -> Result<(), RoutingError> {
        let mut guard = self.write()?;
        let index = position_of(&guard, id).ok_or_else(|| missing_target(id))?;
        guard[index] = target;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), RoutingError> {
        self.read().map(|_| ())
    }
}
