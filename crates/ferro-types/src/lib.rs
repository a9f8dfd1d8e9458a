#![forbid(unsafe_code)]
#![doc = "Shared error types for the ferrotls workspace."]

mod error;

pub use error::{PkiError, TlsError};
