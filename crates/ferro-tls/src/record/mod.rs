//! TLS record layer: header framing and per-direction protection.
//!
//! Before ChangeCipherSpec in a direction, records pass through in
//! plaintext. After it, outgoing records are MAC-then-encrypted (CBC) or
//! AEAD-sealed (GCM) and incoming ones undergo the reverse, each direction
//! carrying its own sequence number, zeroed when its ChangeCipherSpec lands.

mod cbc;
mod gcm;

use ferro_types::TlsError;

use crate::key_schedule::KeyBlock;
use crate::suites::{CipherSuite, SuiteParams};
use crate::TLS12_VERSION;

pub use cbc::CbcDirection;
pub use gcm::GcmDirection;

/// Record header length: type(1) + version(2) + length(2).
pub const RECORD_HEADER_LEN: usize = 5;

/// Maximum plaintext fragment length (RFC 5246 §6.2.1).
pub const MAX_PLAINTEXT_LEN: usize = 16384;

/// Maximum protected fragment length (plaintext + IV/nonce + MAC + padding).
pub const MAX_CIPHERTEXT_LEN: usize = MAX_PLAINTEXT_LEN + 2048;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            20 => Ok(ContentType::ChangeCipherSpec),
            21 => Ok(ContentType::Alert),
            22 => Ok(ContentType::Handshake),
            23 => Ok(ContentType::ApplicationData),
            _ => Err(v),
        }
    }
}

/// One direction's record protection state.
enum Protection {
    Cbc(CbcDirection),
    Gcm(GcmDirection),
}

/// Record framing plus both directions' protection state.
pub struct RecordLayer {
    write: Option<Protection>,
    read: Option<Protection>,
}

impl RecordLayer {
    pub fn new() -> Self {
        Self {
            write: None,
            read: None,
        }
    }

    pub fn is_write_protected(&self) -> bool {
        self.write.is_some()
    }

    pub fn is_read_protected(&self) -> bool {
        self.read.is_some()
    }

    /// Activate outgoing protection with the client-direction keys.
    /// Resets the write sequence number to zero.
    pub fn activate_write(
        &mut self,
        suite: CipherSuite,
        params: &SuiteParams,
        keys: &KeyBlock,
    ) -> Result<(), TlsError> {
        self.write = Some(if params.is_cbc {
            Protection::Cbc(CbcDirection::new(
                &keys.client_write_key,
                &keys.client_write_mac_key,
                params.mac_len,
            )?)
        } else {
            Protection::Gcm(GcmDirection::new(
                suite,
                &keys.client_write_key,
                &keys.client_write_iv,
            )?)
        });
        Ok(())
    }

    /// Activate incoming protection with the server-direction keys.
    /// Resets the read sequence number to zero.
    pub fn activate_read(
        &mut self,
        suite: CipherSuite,
        params: &SuiteParams,
        keys: &KeyBlock,
    ) -> Result<(), TlsError> {
        self.read = Some(if params.is_cbc {
            Protection::Cbc(CbcDirection::new(
                &keys.server_write_key,
                &keys.server_write_mac_key,
                params.mac_len,
            )?)
        } else {
            Protection::Gcm(GcmDirection::new(
                suite,
                &keys.server_write_key,
                &keys.server_write_iv,
            )?)
        });
        Ok(())
    }

    pub fn write_sequence_number(&self) -> u64 {
        match &self.write {
            Some(Protection::Cbc(c)) => c.sequence_number(),
            Some(Protection::Gcm(g)) => g.sequence_number(),
            None => 0,
        }
    }

    pub fn read_sequence_number(&self) -> u64 {
        match &self.read {
            Some(Protection::Cbc(c)) => c.sequence_number(),
            Some(Protection::Gcm(g)) => g.sequence_number(),
            None => 0,
        }
    }

    /// Frame (and protect, when active) an outgoing record.
    pub fn seal(&mut self, content_type: ContentType, payload: &[u8]) -> Result<Vec<u8>, TlsError> {
        if payload.len() > MAX_PLAINTEXT_LEN {
            return Err(TlsError::InternalError(
                "outgoing fragment exceeds record limit".into(),
            ));
        }
        let fragment = match &mut self.write {
            None => payload.to_vec(),
            Some(Protection::Cbc(c)) => c.protect(content_type, payload)?,
            Some(Protection::Gcm(g)) => g.protect(content_type, payload)?,
        };

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + fragment.len());
        record.push(content_type as u8);
        record.extend_from_slice(&TLS12_VERSION.to_be_bytes());
        record.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
        record.extend_from_slice(&fragment);
        Ok(record)
    }

    /// Try to peel one record off the front of `data`.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a full record;
    /// otherwise the content type, the (decrypted, when read protection is
    /// active) payload, and the number of raw bytes consumed.
    pub fn open(&mut self, data: &[u8]) -> Result<Option<(ContentType, Vec<u8>, usize)>, TlsError> {
        if data.len() < RECORD_HEADER_LEN {
            return Ok(None);
        }
        let content_type = ContentType::from_u8(data[0]).map_err(|_| TlsError::BrokenPacket)?;
        if data[1] != 0x03 {
            return Err(TlsError::NotSafe);
        }
        let length = u16::from_be_bytes([data[3], data[4]]) as usize;
        if length > MAX_CIPHERTEXT_LEN {
            return Err(TlsError::BrokenPacket);
        }
        if data.len() < RECORD_HEADER_LEN + length {
            return Ok(None);
        }
        let fragment = &data[RECORD_HEADER_LEN..RECORD_HEADER_LEN + length];

        let payload = match &mut self.read {
            None => fragment.to_vec(),
            Some(Protection::Cbc(c)) => c.unprotect(content_type, fragment)?,
            Some(Protection::Gcm(g)) => g.unprotect(content_type, fragment)?,
        };
        Ok(Some((content_type, payload, RECORD_HEADER_LEN + length)))
    }
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// The 13-byte MAC/AAD prefix: seq(8) || type(1) || version(2) || length(2).
pub(crate) fn protection_header(seq: u64, content_type: ContentType, len: u16) -> [u8; 13] {
    let mut hdr = [0u8; 13];
    hdr[..8].copy_from_slice(&seq.to_be_bytes());
    hdr[8] = content_type as u8;
    hdr[9..11].copy_from_slice(&TLS12_VERSION.to_be_bytes());
    hdr[11..13].copy_from_slice(&len.to_be_bytes());
    hdr
}
