//! TLS 1.2 key derivation (RFC 5246 §6.3, §7.4.9, §8.1) and premaster
//! secret construction.

use zeroize::{Zeroize, Zeroizing};

use crate::env::Environment;
use crate::prf::prf;
use crate::suites::SuiteParams;
use crate::TLS12_VERSION;

/// Finished verify_data length.
pub const VERIFY_DATA_LEN: usize = 12;

/// Premaster and master secret length.
pub const SECRET_LEN: usize = 48;

/// Per-direction MAC keys, write keys, and IVs sliced from the key block.
///
/// MAC keys are empty for AEAD suites; IVs are empty for CBC suites (the
/// explicit IV travels with each record).
pub struct KeyBlock {
    pub client_write_mac_key: Vec<u8>,
    pub server_write_mac_key: Vec<u8>,
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub client_write_iv: Vec<u8>,
    pub server_write_iv: Vec<u8>,
}

impl Drop for KeyBlock {
    fn drop(&mut self) {
        self.client_write_mac_key.zeroize();
        self.server_write_mac_key.zeroize();
        self.client_write_key.zeroize();
        self.server_write_key.zeroize();
        self.client_write_iv.zeroize();
        self.server_write_iv.zeroize();
    }
}

/// Build the 48-byte premaster secret: offered version in the first two
/// bytes, then 46 random bytes none of which may be zero (each zero byte is
/// re-drawn individually).
pub fn build_premaster(env: &dyn Environment) -> Zeroizing<[u8; SECRET_LEN]> {
    let mut pms = Zeroizing::new([0u8; SECRET_LEN]);
    pms[0] = (TLS12_VERSION >> 8) as u8;
    pms[1] = TLS12_VERSION as u8;
    env.fill_random(&mut pms[2..]);
    for i in 2..SECRET_LEN {
        while pms[i] == 0 {
            let mut b = [0u8; 1];
            env.fill_random(&mut b);
            pms[i] = b[0];
        }
    }
    pms
}

/// `master_secret = PRF(premaster, "master secret", client_random ||
/// server_random)[0..48]`.
pub fn derive_master_secret(
    premaster: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Zeroizing<Vec<u8>> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);
    Zeroizing::new(prf(premaster, "master secret", &seed, SECRET_LEN))
}

/// `key_block = PRF(master_secret, "key expansion", server_random ||
/// client_random)`, sliced MAC keys → write keys → IVs.
pub fn derive_key_block(
    master_secret: &[u8],
    server_random: &[u8; 32],
    client_random: &[u8; 32],
    params: &SuiteParams,
) -> KeyBlock {
    // Seed order is reversed relative to the master secret derivation.
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);

    let mut block = prf(master_secret, "key expansion", &seed, params.key_block_len());

    let mut offset = 0;
    let mut slice = |len: usize| {
        let out = block[offset..offset + len].to_vec();
        offset += len;
        out
    };
    let client_write_mac_key = slice(params.mac_len);
    let server_write_mac_key = slice(params.mac_len);
    let client_write_key = slice(params.key_len);
    let server_write_key = slice(params.key_len);
    let client_write_iv = slice(params.fixed_iv_len);
    let server_write_iv = slice(params.fixed_iv_len);
    block.zeroize();

    KeyBlock {
        client_write_mac_key,
        server_write_mac_key,
        client_write_key,
        server_write_key,
        client_write_iv,
        server_write_iv,
    }
}

/// Finished verify_data: `PRF(master_secret, label, transcript_hash)[0..12]`
/// with label `"client finished"` or `"server finished"`.
pub fn compute_verify_data(master_secret: &[u8], label: &str, transcript_hash: &[u8]) -> Vec<u8> {
    prf(master_secret, label, transcript_hash, VERIFY_DATA_LEN)
}
