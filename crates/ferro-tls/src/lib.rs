#![forbid(unsafe_code)]
#![doc = "Driven TLS 1.2 client handshake engine and record layer."]

pub mod alert;
pub mod codec;
pub mod config;
pub mod connection;
pub mod env;
pub mod handshake;
pub mod key_schedule;
pub mod prf;
pub mod record;
pub mod suites;
pub mod transcript;

pub use config::TlsConfig;
pub use connection::{TlsClient, TlsObserver};
pub use env::{Environment, SystemEnvironment};
pub use ferro_types::TlsError;
pub use suites::CipherSuite;

/// The only protocol version this engine speaks.
pub const TLS12_VERSION: u16 = 0x0303;

/// Connection lifecycle phases.
///
/// Progress is monotonic through the first four variants; `Renegotiating`
/// exists for interface completeness but the engine answers renegotiation as
/// a no-op and never actually enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionStatus {
    Disconnected,
    Negotiating,
    KeyExchange,
    Established,
    Renegotiating,
}

/// The role of a TLS endpoint. Only the client role is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    Client,
    Server,
}
