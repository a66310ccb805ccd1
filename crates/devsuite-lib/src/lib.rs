//! Installation orchestration engine for a suite of developer tools.
//!
//! The crate is split the same way an install run flows:
//! [`catalog`] describes what can be installed, [`installer::graph`] orders it,
//! [`installer::scheduler`] chains the units together and
//! [`installer::orchestrator`] drives the verify, download and install phases.

pub mod catalog;
pub mod config;
pub mod error;
pub mod installer;
pub mod utils;

pub use catalog::{Catalog, Requirement};
pub use config::InstallerConfig;
pub use error::{Error, Result};
pub use installer::orchestrator::{Orchestrator, RunReport};
pub use installer::unit::InstallableUnit;
