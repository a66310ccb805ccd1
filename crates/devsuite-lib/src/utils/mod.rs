pub mod hash;
pub mod process;
pub mod version;
