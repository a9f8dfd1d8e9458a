//! TLS 1.2 pseudo-random function (RFC 5246 §5).
//!
//! ```text
//! PRF(secret, label, seed) = P_SHA256(secret, label + seed)
//!
//! P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) ||
//!                        HMAC_hash(secret, A(2) + seed) || ...
//! A(0) = seed
//! A(i) = HMAC_hash(secret, A(i-1))
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive `output_len` bytes from `secret`, `label`, and `seed`.
pub fn prf(secret: &[u8], label: &str, seed: &[u8], output_len: usize) -> Vec<u8> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label.as_bytes());
    label_seed.extend_from_slice(seed);
    p_sha256(secret, &label_seed, output_len)
}

fn p_sha256(secret: &[u8], seed: &[u8], output_len: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(output_len);
    let mut a = seed.to_vec();

    while result.len() < output_len {
        a = hmac_sha256(secret, &a);

        let mut a_seed = Vec::with_capacity(a.len() + seed.len());
        a_seed.extend_from_slice(&a);
        a_seed.extend_from_slice(seed);
        result.extend_from_slice(&hmac_sha256(secret, &a_seed));
    }

    result.truncate(output_len);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_prf_deterministic() {
        let out1 = prf(b"secret", "label", b"seed", 48);
        let out2 = prf(b"secret", "label", b"seed", 48);
        assert_eq!(out1, out2);
        assert_eq!(out1.len(), 48);
    }

    #[test]
    fn test_prf_known_answer() {
        // Widely circulated P_SHA256 test vector.
        let secret = hex("9bbe436ba940f017b17652849a71db35");
        let seed = hex("a0a1a2a3a4a5a6a7a8a9");
        let out = prf(&secret, "test label", &seed, 100);
        assert_eq!(
            to_hex(&out),
            "e3f229ba727be17b8d122620557cd453c2aab21d07c3d495329b52d4e61edb5a\
             6b301791e90d35c9c9a46b4e14baf9af0fa022f7077def17abfd3797c0564bab\
             4fbc91666e9def9b97fce34f796789baa48082d122ee42c5a72e5a5110fff701\
             87347b66"
        );
    }

    #[test]
    fn test_prf_label_and_seed_sensitivity() {
        let base = prf(b"secret", "label", b"seed", 32);
        assert_ne!(base, prf(b"secret", "other", b"seed", 32));
        assert_ne!(base, prf(b"secret", "label", b"seed2", 32));
        assert_ne!(base, prf(b"other ", "label", b"seed", 32));
    }

    #[test]
    fn test_prf_output_lengths_and_prefix_property() {
        for len in [1, 12, 31, 32, 33, 48, 64, 104, 136] {
            assert_eq!(prf(b"s", "l", b"x", len).len(), len);
        }
        let short = prf(b"s", "l", b"x", 32);
        let long = prf(b"s", "l", b"x", 96);
        assert_eq!(&long[..32], &short[..]);
    }

    #[test]
    fn test_prf_empty_inputs() {
        assert_eq!(prf(&[], "l", b"x", 32).len(), 32);
        assert_eq!(prf(b"s", "l", &[], 32).len(), 32);
        assert!(prf(b"s", "l", b"x", 0).is_empty());
    }
}
