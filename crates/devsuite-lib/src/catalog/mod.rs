//! The requirement catalog: every component the suite can install, filtered for the current OS.

pub mod types;

pub use types::{ArtifactFile, BundleClass, Credentials, DependencyRef, Requirement};

use crate::error::CatalogError;
use crate::installer::types::OsType;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const PLATFORM_KEY: &str = "platform";

/// Read-only table of requirements keyed by id. Cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Arc<BTreeMap<String, Arc<Requirement>>>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        Self::load_for(path, OsType::current())
    }

    pub fn load_for(path: &Path, os: OsType) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loading requirement catalog from {:?} for {}", path, os.platform_key());
        Self::from_json_str(&contents, os)
    }

    pub fn from_json_str(json: &str, os: OsType) -> Result<Self, CatalogError> {
        let root: Value = serde_json::from_str(json)?;
        Self::from_value(root, os)
    }

    pub fn from_value(root: Value, os: OsType) -> Result<Self, CatalogError> {
        let Value::Object(root) = root else {
            return Err(CatalogError::NotAnObject);
        };

        let mut entries = BTreeMap::new();
        for (id, raw) in root {
            let Some(merged) = merge_platform(raw, os) else {
                log::debug!("Requirement '{}' is not available on {}", id, os.platform_key());
                continue;
            };

            let mut requirement: Requirement = serde_json::from_value(merged)
                .map_err(|source| CatalogError::Entry {
                    id: id.clone(),
                    source,
                })?;
            requirement.id = id.clone();
            validate(&requirement)?;
            entries.insert(id, Arc::new(requirement));
        }

        log::info!("Catalog loaded with {} requirements", entries.len());
        Ok(Self {
            entries: Arc::new(entries),
        })
    }

    pub fn from_requirements(requirements: impl IntoIterator<Item = Requirement>) -> Self {
        let entries = requirements
            .into_iter()
            .map(|r| (r.id.clone(), Arc::new(r)))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Requirement>> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Requirement>> {
        self.entries.values()
    }

    pub fn is_tool(&self, id: &str) -> bool {
        self.get(id).map(|r| r.is_tool()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merge the current OS's `platform` object over the entry and strip `platform`.
/// Returns `None` when the entry declares platforms but not this one.
fn merge_platform(raw: Value, os: OsType) -> Option<Value> {
    let Value::Object(mut entry) = raw else {
        return Some(raw);
    };

    let Some(platforms) = entry.remove(PLATFORM_KEY) else {
        return Some(Value::Object(entry));
    };

    let overrides = match platforms {
        Value::Object(mut by_os) => by_os.remove(os.platform_key())?,
        _ => return Some(Value::Object(entry)),
    };

    if let Value::Object(overrides) = overrides {
        shallow_merge(&mut entry, overrides);
    }
    Some(Value::Object(entry))
}

fn shallow_merge(base: &mut Map<String, Value>, overrides: Map<String, Value>) {
    for (key, value) in overrides {
        base.insert(key, value);
    }
}

fn validate(requirement: &Requirement) -> Result<(), CatalogError> {
    if requirement.bundle_class == BundleClass::OnDemand
        && requirement
            .artifacts()
            .iter()
            .any(|a| a.effective_url().is_none())
    {
        return Err(CatalogError::MissingDownload(requirement.id.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "jdk": {
            "name": "OpenJDK",
            "version": "1.8.0.161",
            "bundle": "yes",
            "url": "https://example.com/jdk.zip",
            "fileName": "jdk.zip",
            "sha256sum": "aa",
            "size": 100,
            "detectable": true,
            "platform": {
                "win32": { "fileName": "jdk.msi", "url": "https://example.com/jdk.msi" },
                "linux": {}
            }
        },
        "hyperv": {
            "name": "Hyper-V",
            "bundle": "tools",
            "platform": { "win32": { "bundle": "no", "detectable": true } }
        },
        "kubectl": {
            "name": "kubectl",
            "url": "https://example.com/kubectl",
            "dmUrl": "https://staging.example.com/kubectl",
            "fileName": "kubectl",
            "requires": [["hyperv", "jdk"]]
        }
    }"#;

    #[test]
    fn merges_current_platform_and_strips_key() {
        let catalog = Catalog::from_json_str(CATALOG, OsType::Windows).unwrap();
        let jdk = catalog.get("jdk").unwrap();
        assert_eq!(jdk.file_name.as_deref(), Some("jdk.msi"));
        assert_eq!(jdk.download_url(), Some("https://example.com/jdk.msi"));
        assert_eq!(jdk.id, "jdk");
        assert!(catalog.contains("hyperv"));
        assert!(!catalog.is_tool("hyperv"));
    }

    #[test]
    fn drops_entries_without_current_platform() {
        let catalog = Catalog::from_json_str(CATALOG, OsType::Linux).unwrap();
        assert!(!catalog.contains("hyperv"));
        assert_eq!(
            catalog.get("jdk").unwrap().file_name.as_deref(),
            Some("jdk.zip")
        );
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["jdk", "kubectl"]);
    }

    #[test]
    fn staging_url_wins() {
        let catalog = Catalog::from_json_str(CATALOG, OsType::Linux).unwrap();
        assert_eq!(
            catalog.get("kubectl").unwrap().download_url(),
            Some("https://staging.example.com/kubectl")
        );
    }

    #[test]
    fn on_demand_entry_without_url_is_rejected() {
        let err = Catalog::from_json_str(
            r#"{ "oc": { "name": "oc", "fileName": "oc.zip" } }"#,
            OsType::Linux,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::MissingDownload(id) if id == "oc"));
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert!(matches!(
            Catalog::from_json_str("[]", OsType::Linux),
            Err(CatalogError::NotAnObject)
        ));
    }
}
