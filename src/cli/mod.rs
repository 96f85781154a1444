//! CLI command handlers

pub mod commands;

pub use commands::{about, lectures, merge, MergeArgs};
