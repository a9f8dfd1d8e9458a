//! AES-CBC MAC-then-encrypt record protection (RFC 5246 §6.2.3.2).
//!
//! Outgoing fragment = explicit_IV(16) || encrypt(plaintext || MAC || pad).
//! MAC = HMAC(mac_key, seq(8) || type(1) || version(2) || length(2) || plaintext).
//! Padding bytes all equal the padding length, which is itself the last byte.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use ferro_types::TlsError;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::{protection_header, ContentType, MAX_CIPHERTEXT_LEN};

const AES_BLOCK: usize = 16;

enum AesKey {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl AesKey {
    fn new(key: &[u8]) -> Result<Self, TlsError> {
        match key.len() {
            16 => Ok(AesKey::Aes128(
                Aes128::new_from_slice(key)
                    .map_err(|_| TlsError::InternalError("bad AES-128 key".into()))?,
            )),
            32 => Ok(AesKey::Aes256(
                Aes256::new_from_slice(key)
                    .map_err(|_| TlsError::InternalError("bad AES-256 key".into()))?,
            )),
            n => Err(TlsError::InternalError(format!("bad AES key length {n}"))),
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesKey::Aes128(c) => c.encrypt_block(block),
            AesKey::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            AesKey::Aes128(c) => c.decrypt_block(block),
            AesKey::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// HMAC for the record MAC; the MAC length picks the hash.
fn compute_mac(
    mac_key: &[u8],
    mac_len: usize,
    seq: u64,
    content_type: ContentType,
    plaintext: &[u8],
) -> Result<Vec<u8>, TlsError> {
    let header = protection_header(seq, content_type, plaintext.len() as u16);
    match mac_len {
        20 => {
            let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(mac_key)
                .map_err(|_| TlsError::InternalError("bad MAC key".into()))?;
            mac.update(&header);
            mac.update(plaintext);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        32 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(mac_key)
                .map_err(|_| TlsError::InternalError("bad MAC key".into()))?;
            mac.update(&header);
            mac.update(plaintext);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        n => Err(TlsError::InternalError(format!("bad MAC length {n}"))),
    }
}

/// TLS padding: every byte carries the padding length, plus the length byte
/// itself.
fn build_padding(data_len: usize) -> Vec<u8> {
    let pad_len = (AES_BLOCK - ((data_len + 1) % AES_BLOCK)) % AES_BLOCK;
    vec![pad_len as u8; pad_len + 1]
}

/// One direction of CBC record protection.
pub struct CbcDirection {
    key: AesKey,
    mac_key: Vec<u8>,
    mac_len: usize,
    seq: u64,
}

impl Drop for CbcDirection {
    fn drop(&mut self) {
        self.mac_key.zeroize();
    }
}

impl CbcDirection {
    pub fn new(key: &[u8], mac_key: &[u8], mac_len: usize) -> Result<Self, TlsError> {
        Ok(Self {
            key: AesKey::new(key)?,
            mac_key: mac_key.to_vec(),
            mac_len,
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

    /// MAC, pad, and encrypt one fragment; the explicit IV leads the output.
    pub fn protect(&mut self, content_type: ContentType, plaintext: &[u8]) -> Result<Vec<u8>, TlsError> {
        let seq = self.next_seq()?;
        let mac = compute_mac(&self.mac_key, self.mac_len, seq, content_type, plaintext)?;

        let data_len = plaintext.len() + self.mac_len;
        let padding = build_padding(data_len);
        let mut data = Vec::with_capacity(data_len + padding.len());
        data.extend_from_slice(plaintext);
        data.extend_from_slice(&mac);
        data.extend_from_slice(&padding);

        let mut iv = [0u8; AES_BLOCK];
        getrandom::getrandom(&mut iv)
            .map_err(|_| TlsError::InternalError("record IV generation failed".into()))?;

        // CBC encrypt in place.
        let mut prev = iv;
        for chunk in data.chunks_mut(AES_BLOCK) {
            for (b, p) in chunk.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            self.key.encrypt_block(chunk);
            prev.copy_from_slice(chunk);
        }

        let mut fragment = Vec::with_capacity(AES_BLOCK + data.len());
        fragment.extend_from_slice(&iv);
        fragment.extend_from_slice(&data);
        Ok(fragment)
    }

    /// Decrypt one fragment, validating padding and MAC in constant time.
    pub fn unprotect(
        &mut self,
        content_type: ContentType,
        fragment: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let min_data = (self.mac_len + 1).div_ceil(AES_BLOCK) * AES_BLOCK;
        if fragment.len() < AES_BLOCK + min_data || fragment.len() > MAX_CIPHERTEXT_LEN {
            return Err(TlsError::DecryptionFailed);
        }
        let (iv, encrypted) = fragment.split_at(AES_BLOCK);
        if encrypted.len() % AES_BLOCK != 0 {
            return Err(TlsError::DecryptionFailed);
        }

        let mut data = encrypted.to_vec();
        let mut prev = [0u8; AES_BLOCK];
        prev.copy_from_slice(iv);
        for chunk in data.chunks_mut(AES_BLOCK) {
            let ct_copy: [u8; AES_BLOCK] = chunk.try_into().expect("block size");
            self.key.decrypt_block(chunk);
            for (b, p) in chunk.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            prev = ct_copy;
        }

        let pad_len = data[data.len() - 1] as usize;
        let overhead = pad_len + 1 + self.mac_len;
        let length_ok: u8 = u8::from(overhead <= data.len());

        // Validate every claimed padding byte without early exit.
        let pad_start = data.len().saturating_sub(pad_len + 1);
        let mut pad_ok = length_ok;
        for &b in &data[pad_start..] {
            pad_ok &= b.ct_eq(&(pad_len as u8)).unwrap_u8();
        }

        let content_len = if length_ok == 1 {
            data.len() - overhead
        } else {
            0
        };

        let seq = self.next_seq()?;
        let expected_mac = compute_mac(
            &self.mac_key,
            self.mac_len,
            seq,
            content_type,
            &data[..content_len],
        )?;
        let received_mac = if length_ok == 1 {
            &data[content_len..content_len + self.mac_len]
        } else {
            &data[..self.mac_len]
        };
        let mac_ok = received_mac.ct_eq(expected_mac.as_slice()).unwrap_u8();

        if pad_ok & mac_ok != 1 {
            return Err(TlsError::NotVerified);
        }
        Ok(data[..content_len].to_vec())
    }
}
