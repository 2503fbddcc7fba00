//! CLI command implementations.

pub mod event;
pub mod import;
pub mod init;
pub mod launch;
pub mod merge;
