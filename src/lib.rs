// Core infrastructure modules
pub mod config;
pub mod core;
pub mod query;

// Adapters and the registry that builds them
pub mod adapters;
pub mod factory;

// Schema and data transfer
pub mod batch;
pub mod command;
pub mod diff;
pub mod dump;
pub mod exporter;
pub mod importer;

#[cfg(test)]
mod test_utils;
