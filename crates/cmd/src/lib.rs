pub mod cli;
pub mod commands;
pub mod common;

pub use cli::{Cli, Commands, StartArgs, StopArgs};
