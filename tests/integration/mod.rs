//! Cross-module scenarios run against temp-dir projects.

mod bridge_session;
mod config_files;
mod diagnostics_merge;
mod patch_scenarios;
mod refresh_batching;
