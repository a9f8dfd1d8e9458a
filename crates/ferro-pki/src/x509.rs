//! X.509 certificate parsing, restricted to what the TLS client needs:
//! names, validity, subjectAltName, and RSA public keys.

use ferro_types::PkiError;

use crate::asn1::{tags, Decoder, TagClass};

// OID DER values (without tag/length).
pub(crate) mod oid {
    /// 1.2.840.113549.1.1.1 rsaEncryption
    pub const RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
    /// 1.2.840.113549.1.1.5 sha1WithRSAEncryption
    pub const SHA1_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x05];
    /// 1.2.840.113549.1.1.11 sha256WithRSAEncryption
    pub const SHA256_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B];
    /// 1.2.840.113549.1.1.12 sha384WithRSAEncryption
    pub const SHA384_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0C];
    /// 2.5.4.3 commonName
    pub const COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];
    /// 2.5.29.17 subjectAltName
    pub const SUBJECT_ALT_NAME: &[u8] = &[0x55, 0x1D, 0x11];
}

/// A distinguished name as ordered (attribute, value) pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    pub entries: Vec<(String, String)>,
}

impl DistinguishedName {
    /// Value of the first attribute with the given short name (e.g. "CN").
    pub fn get(&self, attr: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == attr)
            .map(|(_, v)| v.as_str())
    }

    pub fn common_name(&self) -> Option<&str> {
        self.get("CN")
    }
}

impl std::fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// An RSA public key as raw big-endian component bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKeyParts {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

/// A parsed X.509 certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// DER bytes as received.
    pub raw: Vec<u8>,
    pub serial_number: Vec<u8>,
    pub issuer: DistinguishedName,
    pub subject: DistinguishedName,
    /// Validity window as UNIX timestamps.
    pub not_before: i64,
    pub not_after: i64,
    /// RSA subject public key (the only key type in scope).
    pub public_key: RsaPublicKeyParts,
    /// dNSName entries from subjectAltName.
    pub subject_alt_names: Vec<String>,
    /// Raw TBS span (tag + length + value) for signature verification.
    pub tbs_raw: Vec<u8>,
    /// Outer signatureAlgorithm OID value bytes.
    pub signature_algorithm: Vec<u8>,
    pub signature_value: Vec<u8>,
}

impl Certificate {
    /// Parse a certificate from DER bytes.
    pub fn from_der(data: &[u8]) -> Result<Self, PkiError> {
        let mut outer = Decoder::new(data).read_sequence()?;

        // Capture the exact TBS span for signature verification.
        let before = outer.remaining();
        let tbs_tlv = outer.read_tlv()?;
        if tbs_tlv.tag.number != tags::SEQUENCE || !tbs_tlv.tag.constructed {
            return Err(PkiError::InvalidCert("tbsCertificate is not a SEQUENCE".into()));
        }
        let tbs_len = before.len() - outer.remaining().len();
        let tbs_raw = before[..tbs_len].to_vec();

        let mut tbs = Decoder::new(tbs_tlv.value);

        // version [0] EXPLICIT INTEGER DEFAULT v1 — value unused here.
        let _ = tbs.try_read_context_specific(0)?;

        let serial_number = tbs.read_integer()?.to_vec();

        // signature AlgorithmIdentifier (inner copy; the outer one is authoritative).
        skip_algorithm_identifier(&mut tbs)?;

        let issuer = parse_name(&mut tbs)?;
        let (not_before, not_after) = parse_validity(&mut tbs)?;
        let subject = parse_name(&mut tbs)?;
        let public_key = parse_rsa_spki(&mut tbs)?;

        // issuerUniqueID [1] / subjectUniqueID [2] — skip if present.
        let _ = tbs.try_read_context_specific(1)?;
        let _ = tbs.try_read_context_specific(2)?;

        // extensions [3] EXPLICIT — only subjectAltName is of interest.
        let mut subject_alt_names = Vec::new();
        if let Some(ext_tlv) = tbs.try_read_context_specific(3)? {
            subject_alt_names = parse_san_from_extensions(ext_tlv.value)?;
        }

        let mut alg = outer.read_sequence()?;
        let signature_algorithm = alg.read_oid()?.to_vec();
        let signature_value = outer.read_bit_string()?.to_vec();

        Ok(Certificate {
            raw: data.to_vec(),
            serial_number,
            issuer,
            subject,
            not_before,
            not_after,
            public_key,
            subject_alt_names,
            tbs_raw,
            signature_algorithm,
            signature_value,
        })
    }

    /// True when issuer and subject are the same DN.
    pub fn is_self_issued(&self) -> bool {
        self.issuer == self.subject
    }
}

fn skip_algorithm_identifier(dec: &mut Decoder) -> Result<(), PkiError> {
    let mut alg = dec.read_sequence()?;
    let _ = alg.read_oid()?;
    // Optional parameters (NULL for RSA) — drain whatever remains.
    while !alg.is_empty() {
        let _ = alg.read_tlv()?;
    }
    Ok(())
}

fn parse_name(dec: &mut Decoder) -> Result<DistinguishedName, PkiError> {
    let mut name = dec.read_sequence()?;
    let mut entries = Vec::new();
    while !name.is_empty() {
        let mut rdn = name.read_set()?;
        while !rdn.is_empty() {
            let mut atav = rdn.read_sequence()?;
            let oid_bytes = atav.read_oid()?;
            let attr = dn_short_name(oid_bytes);
            let value = atav.read_string()?;
            entries.push((attr, value));
        }
    }
    Ok(DistinguishedName { entries })
}

/// Map a DN attribute OID to its conventional short name; unknown attributes
/// keep a hex spelling so DN equality still works.
fn dn_short_name(oid_bytes: &[u8]) -> String {
    match oid_bytes {
        x if x == oid::COMMON_NAME => "CN".into(),
        [0x55, 0x04, 0x06] => "C".into(),
        [0x55, 0x04, 0x07] => "L".into(),
        [0x55, 0x04, 0x08] => "ST".into(),
        [0x55, 0x04, 0x0A] => "O".into(),
        [0x55, 0x04, 0x0B] => "OU".into(),
        other => other.iter().map(|b| format!("{b:02x}")).collect(),
    }
}

fn parse_validity(dec: &mut Decoder) -> Result<(i64, i64), PkiError> {
    let mut validity = dec.read_sequence()?;
    let not_before = validity.read_time()?;
    let not_after = validity.read_time()?;
    Ok((not_before, not_after))
}

/// Parse SubjectPublicKeyInfo; only rsaEncryption keys are accepted.
fn parse_rsa_spki(dec: &mut Decoder) -> Result<RsaPublicKeyParts, PkiError> {
    let mut spki = dec.read_sequence()?;
    let mut alg = spki.read_sequence()?;
    let alg_oid = alg.read_oid()?;
    if alg_oid != oid::RSA_ENCRYPTION {
        return Err(PkiError::UnsupportedKeyAlgorithm);
    }
    while !alg.is_empty() {
        let _ = alg.read_tlv()?;
    }
    let key_bits = spki.read_bit_string()?;

    // RSAPublicKey ::= SEQUENCE { modulus INTEGER, publicExponent INTEGER }
    let mut key = Decoder::new(key_bits).read_sequence()?;
    let modulus = strip_leading_zero(key.read_integer()?).to_vec();
    let exponent = strip_leading_zero(key.read_integer()?).to_vec();
    if modulus.is_empty() || exponent.is_empty() {
        return Err(PkiError::InvalidCert("empty RSA key component".into()));
    }
    Ok(RsaPublicKeyParts { modulus, exponent })
}

fn strip_leading_zero(bytes: &[u8]) -> &[u8] {
    if bytes.len() > 1 && bytes[0] == 0 {
        &bytes[1..]
    } else {
        bytes
    }
}

/// Walk the Extensions SEQUENCE and collect subjectAltName dNSName entries.
fn parse_san_from_extensions(ext_data: &[u8]) -> Result<Vec<String>, PkiError> {
    let mut ext_seq = Decoder::new(ext_data).read_sequence()?;
    let mut names = Vec::new();
    while !ext_seq.is_empty() {
        let mut ext = ext_seq.read_sequence()?;
        let ext_oid = ext.read_oid()?.to_vec();
        // critical BOOLEAN DEFAULT FALSE
        if !ext.is_empty() {
            let tag = ext.peek_tag()?;
            if tag.class == TagClass::Universal && tag.number == tags::BOOLEAN {
                let _ = ext.read_boolean()?;
            }
        }
        let value = ext.read_octet_string()?;
        if ext_oid == oid::SUBJECT_ALT_NAME {
            // GeneralNames ::= SEQUENCE OF GeneralName; dNSName is [2] IA5String.
            let mut general_names = Decoder::new(value).read_sequence()?;
            while !general_names.is_empty() {
                let gn = general_names.read_tlv()?;
                if gn.tag.class == TagClass::ContextSpecific && gn.tag.number == 2 {
                    if let Ok(s) = String::from_utf8(gn.value.to_vec()) {
                        names.push(s);
                    }
                }
            }
        }
    }
    Ok(names)
}
