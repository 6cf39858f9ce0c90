pub mod args;
pub mod commands;

pub use args::{Cli, Commands, SiteArgs};
pub use commands::run;
