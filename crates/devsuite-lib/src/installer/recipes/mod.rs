//! Product recipes and the table that maps catalog entries to them.

pub mod archive;
pub mod binary;
pub mod hyperv;
pub mod ide;
pub mod jdk;
pub mod virtualbox;

pub use archive::ArchiveRecipe;
pub use binary::BinaryRecipe;
pub use hyperv::HyperVRecipe;
pub use ide::IdeRecipe;
pub use jdk::JdkRecipe;
pub use virtualbox::VirtualBoxRecipe;

use crate::catalog::Requirement;
use crate::installer::core::traits::Recipe;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Pick the recipe for a catalog entry by its `kind`, falling back to its id.
/// Unknown kinds are installed as plain archives.
pub fn recipe_for(requirement: &Requirement) -> Box<dyn Recipe> {
    match requirement.recipe_kind() {
        "jdk" => Box::new(JdkRecipe),
        "virtualbox" => Box::new(VirtualBoxRecipe),
        "hyperv" => Box::new(HyperVRecipe),
        "ide" | "devstudio" => Box::new(IdeRecipe),
        "binary" | "kubectl" | "oc" => Box::new(BinaryRecipe),
        _ => Box::new(ArchiveRecipe),
    }
}

static VERSION_TOKEN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)+").ok());

/// First dotted version number in a tool's output, e.g. `5.1.26` out of `5.1.26r117224`.
pub fn first_version(output: &str) -> Option<String> {
    VERSION_TOKEN
        .as_ref()?
        .find(output)
        .map(|m| m.as_str().to_string())
}

/// Mark a file executable for its owner and everyone else. No-op off Unix.
pub(crate) fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
