//! Handshake message types, header framing, and progress reporting.

pub mod client;

use crate::codec::Builder;

/// Handshake header length: type(1) + length(3).
pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// TLS 1.2 handshake message types (RFC 5246 §7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(HandshakeType::HelloRequest),
            1 => Ok(HandshakeType::ClientHello),
            2 => Ok(HandshakeType::ServerHello),
            11 => Ok(HandshakeType::Certificate),
            12 => Ok(HandshakeType::ServerKeyExchange),
            13 => Ok(HandshakeType::CertificateRequest),
            14 => Ok(HandshakeType::ServerHelloDone),
            15 => Ok(HandshakeType::CertificateVerify),
            16 => Ok(HandshakeType::ClientKeyExchange),
            20 => Ok(HandshakeType::Finished),
            other => Err(other),
        }
    }
}

/// Result of feeding bytes to the state machine, in the `Ok` arm.
///
/// `NeedMoreData` is non-fatal: re-deliver the same bytes with more appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeProgress {
    /// This many bytes were consumed (at least one full message).
    Consumed(usize),
    /// The buffer does not hold a complete message yet.
    NeedMoreData,
}

/// At-most-once tracking for inbound handshake messages.
///
/// HelloRequest is deliberately untracked; every other type may appear at
/// most once per handshake.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeenMessages {
    mask: u16,
}

impl SeenMessages {
    pub fn new() -> Self {
        Self::default()
    }

    fn bit(ty: HandshakeType) -> u16 {
        match ty {
            HandshakeType::HelloRequest => 0,
            HandshakeType::ClientHello => 1 << 0,
            HandshakeType::ServerHello => 1 << 1,
            HandshakeType::Certificate => 1 << 2,
            HandshakeType::ServerKeyExchange => 1 << 3,
            HandshakeType::CertificateRequest => 1 << 4,
            HandshakeType::ServerHelloDone => 1 << 5,
            HandshakeType::CertificateVerify => 1 << 6,
            HandshakeType::ClientKeyExchange => 1 << 7,
            HandshakeType::Finished => 1 << 8,
        }
    }

    /// Record a sighting; returns false when the type was already seen.
    pub fn mark(&mut self, ty: HandshakeType) -> bool {
        let bit = Self::bit(ty);
        if bit == 0 {
            return true;
        }
        if self.mask & bit != 0 {
            return false;
        }
        self.mask |= bit;
        true
    }

    pub fn contains(&self, ty: HandshakeType) -> bool {
        let bit = Self::bit(ty);
        bit != 0 && self.mask & bit != 0
    }

    /// Withdraw a sighting; used when a message turns out to be incomplete
    /// and will be re-delivered.
    pub fn unmark(&mut self, ty: HandshakeType) {
        self.mask &= !Self::bit(ty);
    }

    /// Forget everything; done once the handshake completes.
    pub fn clear(&mut self) {
        self.mask = 0;
    }
}

/// Wrap a handshake body with its type byte and 3-byte length.
pub fn wrap_handshake(ty: HandshakeType, body: &[u8]) -> Vec<u8> {
    let mut out = Builder::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
    out.put_u8(ty as u8);
    out.put_u24(body.len() as u32);
    out.put_bytes(body);
    out.finish()
}
