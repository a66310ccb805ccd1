use crate::installer::unit::InstallableUnit;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Every live unit of a run, indexed by requirement id.
/// The orchestrator owns it; graph building, scheduling and recipes only read it.
#[derive(Default, Clone)]
pub struct UnitRegistry {
    units: BTreeMap<String, Arc<InstallableUnit>>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, unit: Arc<InstallableUnit>) {
        self.units.insert(unit.id().to_string(), unit);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<InstallableUnit>> {
        self.units.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    /// Units in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<InstallableUnit>> {
        self.units.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Where a peer component lives for this run, detected or freshly installed.
    pub fn location_of(&self, id: &str) -> Option<PathBuf> {
        self.get(id).and_then(|unit| unit.location())
    }
}

impl FromIterator<Arc<InstallableUnit>> for UnitRegistry {
    fn from_iter<T: IntoIterator<Item = Arc<InstallableUnit>>>(iter: T) -> Self {
        let mut registry = UnitRegistry::new();
        for unit in iter {
            registry.insert(unit);
        }
        registry
    }
}
