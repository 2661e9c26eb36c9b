//! Command line interface module
//!
//! This module provides the entry point for parsing command-line arguments and running a replication.
//! It includes argument parsing, settings resolution, and the runner that drives a whole run.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::{RunReport, Runner, Settings};
