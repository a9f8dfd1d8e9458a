/// PKI certificate errors.
#[derive(Debug, thiserror::Error)]
pub enum PkiError {
    #[error("asn1 parse error: {0}")]
    Asn1Error(String),
    #[error("invalid certificate: {0}")]
    InvalidCert(String),
    #[error("unsupported public key algorithm")]
    UnsupportedKeyAlgorithm,
    #[error("unsupported signature algorithm")]
    UnsupportedSignatureAlgorithm,
    #[error("certificate expired")]
    CertExpired,
    #[error("certificate not yet valid")]
    CertNotYetValid,
    #[error("no certificate matches the requested hostname")]
    NoMatchingLeaf,
    #[error("certificate chain verification failed: {0}")]
    ChainVerifyFailed(String),
    #[error("issuer certificate not found")]
    IssuerNotFound,
    #[error("signature verification failed")]
    SignatureMismatch,
}

/// TLS protocol errors.
///
/// Every variant is fatal: the state machine maps it to a critical alert,
/// marks the connection dead, and refuses further input. Buffer underflow is
/// not represented here — it is the `NeedMoreData` arm of the handshake
/// progress type, reported through the `Ok` path.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("length fields disagree with the surrounding frame")]
    BrokenPacket,
    #[error("protocol version is not TLS 1.2")]
    NotSafe,
    #[error("no common cipher suite")]
    NoCommonCipher,
    #[error("peer requested compression")]
    CompressionNotSupported,
    #[error("message not legal in the current state, or duplicated")]
    UnexpectedMessage,
    #[error("bad certificate")]
    BadCertificate,
    #[error("unsupported certificate")]
    UnsupportedCertificate,
    #[error("certificate validity period check failed")]
    CertificateExpired,
    #[error("certificate chain could not be verified")]
    CertificateUnknown,
    #[error("MAC or Finished verification failed")]
    NotVerified,
    #[error("renegotiation refused")]
    NoRenegotiation,
    #[error("record decryption failed")]
    DecryptionFailed,
    #[error("unknown handshake message type {0}")]
    NotUnderstood(u8),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("pki error: {0}")]
    Pki(#[from] PkiError),
}
