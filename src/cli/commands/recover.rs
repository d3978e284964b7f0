use std::path::Path;

use crate::cli::args::RecoverArgs;
use crate::config::load_config;
use crate::error::{Result, XocopyError};
use crate::ledger::Ledger;
use crate::recover::recover;

pub fn run_recover(config_path: &Path, args: RecoverArgs) -> Result<()> {
    let ledger_path = match args.ledger {
        Some(path) => path,
        None => load_config(config_path)?.ledger,
    };
    // opening would create an empty ledger
    if !ledger_path.is_file() {
        return Err(XocopyError::message(format!(
            "ledger {} does not exist",
            ledger_path.display()
        )));
    }
    let ledger = Ledger::open(&ledger_path)?;
    let output = recover(
        &ledger,
        &args.source_path,
        &args.destination_directory,
        args.progress,
    )?;
    println!("{}", output.display());
    Ok(())
}
