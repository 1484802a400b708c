//! indietool core - Shared functionality for indietool commands
//!
//! A local toolbox for indie builders: domains, DNS and an encrypted
//! secrets vault. This crate holds the pieces every command needs.

pub mod config;
pub mod format;
pub mod paths;

pub use config::{Config, SecretsConfig};
pub use paths::Paths;
