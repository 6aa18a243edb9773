mod error;
pub mod millis;

pub use error::{ContactsError, ContactsResult, ErrorKind, ExitCode};
