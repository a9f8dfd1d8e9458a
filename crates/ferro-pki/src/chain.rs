//! Leaf selection and certificate chain verification.

use ferro_types::PkiError;
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};

use crate::x509::{oid, Certificate};

/// Maximum issuer hops from leaf to anchor.
const MAX_CHAIN_DEPTH: usize = 8;

/// Inputs to chain verification that come from the embedding connection.
pub struct ChainPolicy<'a> {
    /// Trust anchors as DER blobs.
    pub trust_anchors: &'a [Vec<u8>],
    /// Accept a chain that ends at a self-signed certificate not present in
    /// the anchor set.
    pub accept_self_signed: bool,
    /// Wall-clock UNIX time for validity checks.
    pub now: i64,
}

/// Pick the leaf matching `hostname` (any leaf when empty) and verify its
/// chain. Returns the index of the chosen leaf within `certs`.
pub fn select_and_verify_leaf(
    certs: &[Certificate],
    hostname: &str,
    policy: &ChainPolicy,
) -> Result<usize, PkiError> {
    let leaf_idx = certs
        .iter()
        .position(|c| hostname.is_empty() || cert_matches_hostname(c, hostname))
        .ok_or(PkiError::NoMatchingLeaf)?;
    verify_chain(certs, leaf_idx, policy)?;
    Ok(leaf_idx)
}

/// True when the certificate's subject CN or any SAN dNSName matches.
pub fn cert_matches_hostname(cert: &Certificate, hostname: &str) -> bool {
    if let Some(cn) = cert.subject.common_name() {
        if matches_dns(cn, hostname) {
            return true;
        }
    }
    cert.subject_alt_names
        .iter()
        .any(|san| matches_dns(san, hostname))
}

/// DNS name matching. A leading `*.` wildcard matches exactly one label and
/// never the bare domain; comparison is case-insensitive.
fn matches_dns(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        None => pattern == hostname,
        Some(suffix) => {
            let Some(first_dot) = hostname.find('.') else {
                return false;
            };
            let (head, tail) = hostname.split_at(first_dot);
            !head.is_empty() && &tail[1..] == suffix
        }
    }
}

fn check_validity(cert: &Certificate, now: i64) -> Result<(), PkiError> {
    if now < cert.not_before {
        return Err(PkiError::CertNotYetValid);
    }
    if now > cert.not_after {
        return Err(PkiError::CertExpired);
    }
    Ok(())
}

/// Walk issuer → subject links from the chosen leaf until a trust anchor,
/// verifying each signature and validity window along the way.
fn verify_chain(certs: &[Certificate], leaf_idx: usize, policy: &ChainPolicy) -> Result<(), PkiError> {
    let anchors: Vec<Certificate> = policy
        .trust_anchors
        .iter()
        .filter_map(|der| Certificate::from_der(der).ok())
        .collect();

    let mut current = &certs[leaf_idx];
    for _ in 0..MAX_CHAIN_DEPTH {
        check_validity(current, policy.now)?;

        // The certificate itself is an anchor.
        if anchors.iter().any(|a| a.raw == current.raw) {
            return Ok(());
        }

        // Issued directly by an anchor.
        if let Some(anchor) = anchors.iter().find(|a| a.subject == current.issuer) {
            verify_signature(current, anchor)?;
            check_validity(anchor, policy.now)?;
            return Ok(());
        }

        if current.is_self_issued() {
            verify_signature(current, current)?;
            return if policy.accept_self_signed {
                Ok(())
            } else {
                Err(PkiError::IssuerNotFound)
            };
        }

        let issuer = certs
            .iter()
            .find(|c| c.subject == current.issuer && c.raw != current.raw)
            .ok_or(PkiError::IssuerNotFound)?;
        verify_signature(current, issuer)?;
        current = issuer;
    }
    Err(PkiError::ChainVerifyFailed("maximum depth exceeded".into()))
}

/// Verify `cert`'s signature over its TBS bytes using `issuer`'s RSA key.
pub fn verify_signature(cert: &Certificate, issuer: &Certificate) -> Result<(), PkiError> {
    let n = BigUint::from_bytes_be(&issuer.public_key.modulus);
    let e = BigUint::from_bytes_be(&issuer.public_key.exponent);
    let key = RsaPublicKey::new(n, e)
        .map_err(|e| PkiError::InvalidCert(format!("issuer public key: {e}")))?;

    let result = match cert.signature_algorithm.as_slice() {
        x if x == oid::SHA256_WITH_RSA => {
            let digest = Sha256::digest(&cert.tbs_raw);
            key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &cert.signature_value)
        }
        x if x == oid::SHA384_WITH_RSA => {
            let digest = Sha384::digest(&cert.tbs_raw);
            key.verify(Pkcs1v15Sign::new::<Sha384>(), &digest, &cert.signature_value)
        }
        x if x == oid::SHA1_WITH_RSA => {
            let digest = Sha1::digest(&cert.tbs_raw);
            key.verify(Pkcs1v15Sign::new::<Sha1>(), &digest, &cert.signature_value)
        }
        _ => return Err(PkiError::UnsupportedSignatureAlgorithm),
    };
    result.map_err(|_| PkiError::SignatureMismatch)
}
