//! TLS alert protocol: levels, descriptions, payload framing, and the
//! error-kind → outbound-alert mapping.

use ferro_types::TlsError;

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Critical = 2,
}

impl AlertLevel {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            1 => Ok(AlertLevel::Warning),
            2 => Ok(AlertLevel::Critical),
            _ => Err(v),
        }
    }
}

/// Alert description codes (RFC 5246 §7.2), restricted to the set this
/// engine emits or reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    DecryptionFailed = 21,
    DecompressionFailure = 30,
    HandshakeFailure = 40,
    NoCertificate = 41,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    DecodeError = 50,
    InsufficientSecurity = 71,
    InternalError = 80,
    NoRenegotiation = 100,
}

impl AlertDescription {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(AlertDescription::CloseNotify),
            10 => Ok(AlertDescription::UnexpectedMessage),
            20 => Ok(AlertDescription::BadRecordMac),
            21 => Ok(AlertDescription::DecryptionFailed),
            30 => Ok(AlertDescription::DecompressionFailure),
            40 => Ok(AlertDescription::HandshakeFailure),
            41 => Ok(AlertDescription::NoCertificate),
            42 => Ok(AlertDescription::BadCertificate),
            43 => Ok(AlertDescription::UnsupportedCertificate),
            45 => Ok(AlertDescription::CertificateExpired),
            46 => Ok(AlertDescription::CertificateUnknown),
            47 => Ok(AlertDescription::IllegalParameter),
            50 => Ok(AlertDescription::DecodeError),
            71 => Ok(AlertDescription::InsufficientSecurity),
            80 => Ok(AlertDescription::InternalError),
            100 => Ok(AlertDescription::NoRenegotiation),
            _ => Err(v),
        }
    }

    /// The outbound alert for a fatal error kind.
    pub fn for_error(err: &TlsError) -> AlertDescription {
        match err {
            TlsError::UnexpectedMessage => AlertDescription::UnexpectedMessage,
            TlsError::CompressionNotSupported => AlertDescription::DecompressionFailure,
            TlsError::BrokenPacket => AlertDescription::DecodeError,
            TlsError::NotVerified => AlertDescription::BadRecordMac,
            TlsError::BadCertificate => AlertDescription::BadCertificate,
            TlsError::UnsupportedCertificate => AlertDescription::UnsupportedCertificate,
            TlsError::CertificateExpired => AlertDescription::CertificateExpired,
            TlsError::CertificateUnknown => AlertDescription::CertificateUnknown,
            TlsError::NoCommonCipher => AlertDescription::InsufficientSecurity,
            TlsError::NotSafe => AlertDescription::InsufficientSecurity,
            TlsError::NotUnderstood(_) => AlertDescription::InternalError,
            TlsError::NoRenegotiation => AlertDescription::NoRenegotiation,
            TlsError::DecryptionFailed => AlertDescription::DecryptionFailed,
            TlsError::InternalError(_) => AlertDescription::InternalError,
            TlsError::Pki(_) => AlertDescription::CertificateUnknown,
        }
    }
}

/// A TLS alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn critical(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Critical,
            description,
        }
    }

    pub fn close_notify() -> Self {
        Self {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        }
    }

    /// Two-byte wire payload: level then description.
    pub fn to_bytes(self) -> [u8; 2] {
        [self.level as u8, self.description as u8]
    }

    /// Parse an inbound alert payload.
    pub fn parse(payload: &[u8]) -> Result<Self, TlsError> {
        if payload.len() != 2 {
            return Err(TlsError::BrokenPacket);
        }
        let level = AlertLevel::from_u8(payload[0]).map_err(|_| TlsError::BrokenPacket)?;
        let description =
            AlertDescription::from_u8(payload[1]).map_err(|_| TlsError::BrokenPacket)?;
        Ok(Self { level, description })
    }
}
