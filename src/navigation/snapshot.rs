//! Shared obstacle snapshot
//!
//! Perception may refresh the obstacle set while a navigation call is
//! running. Readers always receive a full owned copy taken under the read
//! lock; writers replace or edit the set under the write lock, so nobody can
//! observe a half-written snapshot.

use crate::common::types::{ObstacleFootprint, ObstacleId};
use crate::error::RobotError;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Lock-guarded set of obstacle footprints
#[derive(Debug, Clone, Default)]
pub struct ObstacleStore {
    footprints: Arc<RwLock<Vec<ObstacleFootprint>>>,
}

impl ObstacleStore {
    pub fn new(footprints: Vec<ObstacleFootprint>) -> Self {
        ObstacleStore {
            footprints: Arc::new(RwLock::new(footprints)),
        }
    }

    /// Owned copy of the current set
    pub fn snapshot(&self) -> Result<Vec<ObstacleFootprint>, RobotError> {
        let guard = self
            .footprints
            .read()
            .map_err(|_| RobotError::Sensor("Failed to lock obstacle store".to_string()))?;
        Ok(guard.clone())
    }

    /// Copy of the current set without the excluded bodies
    pub fn snapshot_excluding(
        &self,
        exclude: &HashSet<ObstacleId>,
    ) -> Result<Vec<ObstacleFootprint>, RobotError> {
        let guard = self
            .footprints
            .read()
            .map_err(|_| RobotError::Sensor("Failed to lock obstacle store".to_string()))?;
        Ok(guard
            .iter()
            .filter(|f| !exclude.contains(&f.id))
            .copied()
            .collect())
    }

    /// Swap in a complete new set
    pub fn replace(&self, footprints: Vec<ObstacleFootprint>) -> Result<(), RobotError> {
        let mut guard = self
            .footprints
            .write()
            .map_err(|_| RobotError::Sensor("Failed to lock obstacle store".to_string()))?;
        *guard = footprints;
        Ok(())
    }

    /// Add or move one body
    pub fn upsert(&self, footprint: ObstacleFootprint) -> Result<(), RobotError> {
        let mut guard = self
            .footprints
            .write()
            .map_err(|_| RobotError::Sensor("Failed to lock obstacle store".to_string()))?;
        match guard.iter_mut().find(|f| f.id == footprint.id) {
            Some(existing) => *existing = footprint,
            None => guard.push(footprint),
        }
        Ok(())
    }

    pub fn remove(&self, id: ObstacleId) -> Result<bool, RobotError> {
        let mut guard = self
            .footprints
            .write()
            .map_err(|_| RobotError::Sensor("Failed to lock obstacle store".to_string()))?;
        let before = guard.len();
        guard.retain(|f| f.id != id);
        Ok(guard.len() != before)
    }
}
