pub mod args;
pub mod batch;
pub mod config;
pub mod fs_store;
pub mod process;
pub mod progress;
pub mod types;
