//! Client configuration with builder-style setters.

use std::time::Duration;

use zeroize::Zeroize;

use crate::suites::{supported_suites, CipherSuite};

/// RSA private key components for client authentication, big-endian.
#[derive(Clone)]
pub struct ClientPrivateKey {
    pub n: Vec<u8>,
    pub e: Vec<u8>,
    pub d: Vec<u8>,
    pub p: Vec<u8>,
    pub q: Vec<u8>,
}

impl Drop for ClientPrivateKey {
    fn drop(&mut self) {
        self.d.zeroize();
        self.p.zeroize();
        self.q.zeroize();
    }
}

impl std::fmt::Debug for ClientPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPrivateKey")
            .field("modulus_bits", &(self.n.len() * 8))
            .finish_non_exhaustive()
    }
}

/// TLS client configuration.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Hostname the leaf certificate must authenticate; `None` matches any
    /// well-formed leaf. Also sent as the SNI extension.
    pub server_name: Option<String>,
    /// ALPN protocols offered, in preference order.
    pub alpn_protocols: Vec<String>,
    /// Deadline for the whole handshake (Disconnected → Established).
    pub handshake_timeout: Duration,
    /// Accept a chain ending at a self-signed certificate absent from the
    /// trust anchors.
    pub accept_self_signed: bool,
    /// Kept for interface compatibility; the engine never initiates
    /// renegotiation and answers HelloRequest as a no-op either way.
    pub enable_renegotiation: bool,
    /// Trust anchors as DER blobs.
    pub trusted_certs: Vec<Vec<u8>>,
    /// Cipher suites offered, in preference order.
    pub cipher_suites: Vec<CipherSuite>,
    /// Client certificate chain (DER, leaf first) for CertificateRequest.
    pub client_certificate_chain: Vec<Vec<u8>>,
    /// Client private key matching the chain's leaf.
    pub client_private_key: Option<ClientPrivateKey>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            server_name: None,
            alpn_protocols: Vec::new(),
            handshake_timeout: Duration::from_secs(30),
            accept_self_signed: false,
            enable_renegotiation: false,
            trusted_certs: Vec::new(),
            cipher_suites: supported_suites(),
            client_certificate_chain: Vec::new(),
            client_private_key: None,
        }
    }
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn with_alpn<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alpn_protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_accept_self_signed(mut self, accept: bool) -> Self {
        self.accept_self_signed = accept;
        self
    }

    pub fn with_trusted_cert(mut self, der: Vec<u8>) -> Self {
        self.trusted_certs.push(der);
        self
    }

    pub fn with_cipher_suites(mut self, suites: Vec<CipherSuite>) -> Self {
        self.cipher_suites = suites;
        self
    }

    pub fn with_client_identity(mut self, chain: Vec<Vec<u8>>, key: ClientPrivateKey) -> Self {
        self.client_certificate_chain = chain;
        self.client_private_key = Some(key);
        self
    }
}
