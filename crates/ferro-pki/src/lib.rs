#![forbid(unsafe_code)]
#![doc = "X.509 certificate parsing and chain verification for ferrotls."]

pub mod asn1;
pub mod chain;
pub mod x509;

pub use chain::{select_and_verify_leaf, ChainPolicy};
pub use x509::Certificate;
