pub mod downloader;
pub mod events;
pub mod progress;
pub mod traits;
