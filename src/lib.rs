pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod locate;
pub mod media;
pub mod mount;
pub mod recover;
pub mod transfer;
pub mod types;
pub mod upstream;
pub mod util;

pub use error::{Result, XocopyError};
