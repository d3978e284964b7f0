pub mod command;
pub mod paths;
pub mod progress;
