pub mod copy;
pub mod pending;
pub mod recover;

use crate::error::{MediaError, RecoverError, XocopyError};

pub fn exit_code(err: &XocopyError) -> i32 {
    match err {
        XocopyError::Media(MediaError::NoAuthorizedDevice) => 10,
        XocopyError::Mount(_) => 14,
        XocopyError::Recover(RecoverError::NotFound(_)) => 20,
        XocopyError::Recover(RecoverError::DestinationMissing(_)) => 21,
        XocopyError::Config(_) | XocopyError::Ledger(_) => 2,
        _ => 1,
    }
}

pub fn exit_for_error(err: &XocopyError) -> ! {
    eprintln!("{}", err);
    std::process::exit(exit_code(err));
}
