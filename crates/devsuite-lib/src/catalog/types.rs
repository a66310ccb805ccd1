use serde::{Deserialize, Serialize};

/// How an artifact reaches the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BundleClass {
    /// Shipped together with the installer
    #[serde(rename = "yes")]
    Bundled,
    /// Downloaded when selected
    #[serde(rename = "no")]
    #[default]
    OnDemand,
    /// Used by the installer itself, never installed or scheduled
    #[serde(rename = "tools")]
    ToolOnly,
}

/// A single `requires` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyRef {
    One(String),
    /// Ordered alternatives, any one of them satisfies the edge.
    AnyOf(Vec<String>),
}

impl DependencyRef {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            DependencyRef::One(id) => vec![id.as_str()],
            DependencyRef::AnyOf(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// Basic-auth credentials for gated download hosts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One downloadable file of a multi-file component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactFile {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Staging host override, wins over `url` when present
    #[serde(default)]
    pub dm_url: Option<String>,
    pub file_name: String,
    #[serde(default)]
    pub sha256sum: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl ArtifactFile {
    pub fn effective_url(&self) -> Option<&str> {
        self.dm_url.as_deref().or(self.url.as_deref())
    }
}

/// Immutable catalog entry describing one installable component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// Catalog key, filled in by the loader
    #[serde(default)]
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "bundle", default)]
    pub bundle_class: BundleClass,
    #[serde(default)]
    pub target_folder_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub dm_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(rename = "sha256sum", default)]
    pub checksum_sha256: Option<String>,
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
    #[serde(rename = "requires", default)]
    pub depends_on: Vec<DependencyRef>,
    #[serde(default)]
    pub detectable: bool,
    /// Option selected before detection runs
    #[serde(default)]
    pub default_option: Option<String>,
    #[serde(default)]
    pub minimum_version: Option<String>,
    #[serde(default)]
    pub maximum_version: Option<String>,
    /// Recipe used to install the component, defaults to the id
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub install_args: Option<String>,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub files: Vec<ArtifactFile>,
}

impl Requirement {
    pub fn is_tool(&self) -> bool {
        self.bundle_class == BundleClass::ToolOnly
    }

    /// Effective download source for the single-file form. `dmUrl` wins over `url`.
    pub fn download_url(&self) -> Option<&str> {
        self.dm_url.as_deref().or(self.url.as_deref())
    }

    /// Files to fetch in declared order. The single-file fields become one artifact named after the id.
    pub fn artifacts(&self) -> Vec<ArtifactFile> {
        if !self.files.is_empty() {
            return self.files.clone();
        }
        match &self.file_name {
            Some(file_name) => vec![ArtifactFile {
                name: self.id.clone(),
                url: self.url.clone(),
                dm_url: self.dm_url.clone(),
                file_name: file_name.clone(),
                sha256sum: self.checksum_sha256.clone(),
                size: self.size_bytes,
            }],
            None => Vec::new(),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.artifacts().iter().map(|a| a.size).sum()
    }

    pub fn recipe_kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.id)
    }

    pub fn target_folder(&self) -> &str {
        self.target_folder_name.as_deref().unwrap_or(&self.id)
    }
}
