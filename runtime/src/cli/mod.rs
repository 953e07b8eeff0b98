//! CLI subcommand implementations for the tagharvest binary.

pub mod check_cmd;
pub mod output;
pub mod run_cmd;
pub mod status_cmd;
