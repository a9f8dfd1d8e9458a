//! AES-GCM record protection with explicit nonce (RFC 5246 §6.2.3.3).
//!
//! Nonce = fixed_iv(4) || explicit_nonce(8), where the explicit nonce is the
//! record sequence number and travels at the front of the fragment.
//! AAD = seq(8) || type(1) || version(2) || plaintext_length(2).

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use ferro_types::TlsError;
use zeroize::Zeroize;

use super::{protection_header, ContentType, MAX_CIPHERTEXT_LEN};
use crate::suites::CipherSuite;

const EXPLICIT_NONCE_LEN: usize = 8;
const TAG_LEN: usize = 16;
const FIXED_IV_LEN: usize = 4;

enum GcmKey {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl GcmKey {
    fn seal(&self, nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, TlsError> {
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let nonce = GenericArray::from_slice(nonce);
        match self {
            GcmKey::Aes128(c) => c.encrypt(nonce, payload),
            GcmKey::Aes256(c) => c.encrypt(nonce, payload),
        }
        .map_err(|_| TlsError::InternalError("AEAD seal failed".into()))
    }

    fn open(&self, nonce: &[u8; 12], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, TlsError> {
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        let nonce = GenericArray::from_slice(nonce);
        match self {
            GcmKey::Aes128(c) => c.decrypt(nonce, payload),
            GcmKey::Aes256(c) => c.decrypt(nonce, payload),
        }
        .map_err(|_| TlsError::NotVerified)
    }
}

/// One direction of GCM record protection.
pub struct GcmDirection {
    key: GcmKey,
    fixed_iv: [u8; FIXED_IV_LEN],
    seq: u64,
}

impl Drop for GcmDirection {
    fn drop(&mut self) {
        self.fixed_iv.zeroize();
    }
}

impl GcmDirection {
    pub fn new(suite: CipherSuite, key: &[u8], fixed_iv: &[u8]) -> Result<Self, TlsError> {
        if fixed_iv.len() != FIXED_IV_LEN {
            return Err(TlsError::InternalError("bad GCM fixed IV length".into()));
        }
        let key = match suite {
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256 => GcmKey::Aes128(
                Aes128Gcm::new_from_slice(key)
                    .map_err(|_| TlsError::InternalError("bad AES-128-GCM key".into()))?,
            ),
            CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384 => GcmKey::Aes256(
                Aes256Gcm::new_from_slice(key)
                    .map_err(|_| TlsError::InternalError("bad AES-256-GCM key".into()))?,
            ),
            _ => return Err(TlsError::NoCommonCipher),
        };
        let mut iv = [0u8; FIXED_IV_LEN];
        iv.copy_from_slice(fixed_iv);
        Ok(Self {
            key,
            fixed_iv: iv,
            seq: 0,
        })
    }

    pub fn sequence_number(&self) -> u64 {
        self.seq
    }

    fn next_seq(&mut self) -> Result<u64, TlsError> {
        let seq = self.seq;
        self.seq = seq
            .checked_add(1)
            .ok_or_else(|| TlsError::InternalError("sequence number overflow".into()))?;
        Ok(seq)
    }

    fn nonce_for(&self, explicit: &[u8; EXPLICIT_NONCE_LEN]) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..FIXED_IV_LEN].copy_from_slice(&self.fixed_iv);
        nonce[FIXED_IV_LEN..].copy_from_slice(explicit);
        nonce
    }

    /// Seal one fragment: explicit_nonce(8) || ciphertext || tag(16).
    pub fn protect(&mut self, content_type: ContentType, plaintext: &[u8]) -> Result<Vec<u8>, TlsError> {
        let seq = self.next_seq()?;
        let explicit = seq.to_be_bytes();
        let nonce = self.nonce_for(&explicit);
        let aad = protection_header(seq, content_type, plaintext.len() as u16);

        let ciphertext = self.key.seal(&nonce, &aad, plaintext)?;

        let mut fragment = Vec::with_capacity(EXPLICIT_NONCE_LEN + ciphertext.len());
        fragment.extend_from_slice(&explicit);
        fragment.extend_from_slice(&ciphertext);
        Ok(fragment)
    }

    /// Open one fragment, authenticating against the expected sequence
    /// number.
    pub fn unprotect(
        &mut self,
        content_type: ContentType,
        fragment: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        if fragment.len() < EXPLICIT_NONCE_LEN + TAG_LEN || fragment.len() > MAX_CIPHERTEXT_LEN {
            return Err(TlsError::DecryptionFailed);
        }
        let explicit: [u8; EXPLICIT_NONCE_LEN] = fragment[..EXPLICIT_NONCE_LEN]
            .try_into()
            .expect("nonce length");
        let ciphertext = &fragment[EXPLICIT_NONCE_LEN..];

        let seq = self.next_seq()?;
        let nonce = self.nonce_for(&explicit);
        let plaintext_len = ciphertext.len() - TAG_LEN;
        let aad = protection_header(seq, content_type, plaintext_len as u16);

        self.key.open(&nonce, &aad, ciphertext)
    }
}
