//! Supported cipher suites and their record-protection parameters.
//!
//! The engine negotiates RSA key exchange only; AES-CBC suites MAC with
//! HMAC-SHA1 or HMAC-SHA256, AES-GCM suites carry no MAC key. The PRF and
//! transcript hash stay SHA-256 for every suite.

use ferro_types::TlsError;

/// TLS cipher suite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuite(pub u16);

impl CipherSuite {
    pub const INVALID: Self = Self(0x0000);

    pub const TLS_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x002F);
    pub const TLS_RSA_WITH_AES_256_CBC_SHA: Self = Self(0x0035);
    pub const TLS_RSA_WITH_AES_128_CBC_SHA256: Self = Self(0x003C);
    pub const TLS_RSA_WITH_AES_256_CBC_SHA256: Self = Self(0x003D);
    pub const TLS_RSA_WITH_AES_128_GCM_SHA256: Self = Self(0x009C);
    pub const TLS_RSA_WITH_AES_256_GCM_SHA384: Self = Self(0x009D);
}

/// Every suite the engine will offer and accept, in preference order.
pub fn supported_suites() -> Vec<CipherSuite> {
    vec![
        CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
        CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256,
        CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
        CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
        CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
    ]
}

/// Record-protection parameters of a negotiated suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteParams {
    /// Symmetric key length per direction.
    pub key_len: usize,
    /// HMAC output/key length per direction; 0 for AEAD suites.
    pub mac_len: usize,
    /// IV bytes taken from the key block per direction (GCM fixed IV).
    pub fixed_iv_len: usize,
    pub is_cbc: bool,
}

impl SuiteParams {
    /// Look up parameters; anything outside the supported set is
    /// `NoCommonCipher`.
    pub fn from_suite(suite: CipherSuite) -> Result<Self, TlsError> {
        let params = match suite {
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA => Self {
                key_len: 16,
                mac_len: 20,
                fixed_iv_len: 0,
                is_cbc: true,
            },
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA => Self {
                key_len: 32,
                mac_len: 20,
                fixed_iv_len: 0,
                is_cbc: true,
            },
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256 => Self {
                key_len: 16,
                mac_len: 32,
                fixed_iv_len: 0,
                is_cbc: true,
            },
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256 => Self {
                key_len: 32,
                mac_len: 32,
                fixed_iv_len: 0,
                is_cbc: true,
            },
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256 => Self {
                key_len: 16,
                mac_len: 0,
                fixed_iv_len: 4,
                is_cbc: false,
            },
            CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384 => Self {
                key_len: 32,
                mac_len: 0,
                fixed_iv_len: 4,
                is_cbc: false,
            },
            _ => return Err(TlsError::NoCommonCipher),
        };
        Ok(params)
    }

    /// Total key block length: MAC keys, write keys, then IVs, both
    /// directions each.
    pub fn key_block_len(&self) -> usize {
        2 * self.mac_len + 2 * self.key_len + 2 * self.fixed_iv_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_set_has_six_suites() {
        let suites = supported_suites();
        assert_eq!(suites.len(), 6);
        for s in suites {
            assert!(SuiteParams::from_suite(s).is_ok());
        }
    }

    #[test]
    fn test_cbc_sha256_params() {
        let p = SuiteParams::from_suite(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256).unwrap();
        assert_eq!(p.key_len, 16);
        assert_eq!(p.mac_len, 32);
        assert_eq!(p.fixed_iv_len, 0);
        assert!(p.is_cbc);
        // 2*32 MAC + 2*16 key
        assert_eq!(p.key_block_len(), 96);
    }

    #[test]
    fn test_gcm_params() {
        let p = SuiteParams::from_suite(CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256).unwrap();
        assert_eq!(p.mac_len, 0);
        assert_eq!(p.fixed_iv_len, 4);
        assert!(!p.is_cbc);
        // 2*16 key + 2*4 IV
        assert_eq!(p.key_block_len(), 40);

        let p256 = SuiteParams::from_suite(CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384).unwrap();
        assert_eq!(p256.key_block_len(), 72);
    }

    #[test]
    fn test_unknown_suite_is_no_common_cipher() {
        // ECDHE suite — valid TLS, outside this engine's set.
        assert!(matches!(
            SuiteParams::from_suite(CipherSuite(0xC02F)),
            Err(TlsError::NoCommonCipher)
        ));
        assert!(SuiteParams::from_suite(CipherSuite::INVALID).is_err());
    }
}
