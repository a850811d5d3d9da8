//! Subcommands of the `mixweave` binary.

pub mod commands;
