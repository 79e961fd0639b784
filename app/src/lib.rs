pub mod cli;
pub mod commands;
pub mod render;

pub use cli::{Cli, Command, ProfileCommand, TaskCommand};
pub use commands::dispatch;
