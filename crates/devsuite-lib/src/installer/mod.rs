//! Installation engine: units, dependency ordering, install chain and the phase driver.

pub mod core;
pub mod graph;
pub mod orchestrator;
pub mod recipes;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod unit;

pub use self::core::downloader::{BatchReport, DownloadObserver, DownloadTask, Downloader};
pub use self::core::events::{CompletionEvent, EventBus, Target};
pub use self::core::traits::{InstallContext, Recipe};
pub use graph::DependencyGraph;
pub use registry::UnitRegistry;
pub use types::{
    LogProgressReporter, OptionDetail, ProgressReporter, SelectedOption, SilentProgressReporter,
    UnitState,
};
