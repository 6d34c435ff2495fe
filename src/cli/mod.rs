//! CLI module for chargeq - command-line interface and subcommands.
//!
//! Provides subcommands for the daemon, user requests, pile administration
//! and queries.

pub mod commands;

pub use commands::Cli;
