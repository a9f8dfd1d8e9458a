//! Client-side handshake state machine.
//!
//! The engine is driven: `consume` takes a contiguous handshake payload and
//! processes at most one complete message, reporting how many bytes it took
//! or that it needs more. Outbound flights accumulate in a queue the
//! connection layer drains and seals.

use ferro_pki::{select_and_verify_leaf, Certificate, ChainPolicy};
use ferro_types::{PkiError, TlsError};
use log::{debug, warn};
use rsa::{BigUint, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPublicKey};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::{
    wrap_handshake, HandshakeProgress, HandshakeType, SeenMessages, HANDSHAKE_HEADER_LEN,
};
use crate::codec::{Builder, Reader, ShortInput};
use crate::config::TlsConfig;
use crate::env::{EnvRng, Environment};
use crate::key_schedule::{
    build_premaster, compute_verify_data, derive_key_block, derive_master_secret, KeyBlock,
    VERIFY_DATA_LEN,
};
use crate::suites::{CipherSuite, SuiteParams};
use crate::transcript::TranscriptHash;
use crate::{ConnectionStatus, TLS12_VERSION};

// Extension identifiers recognized in ServerHello.
const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000D;
const EXT_ALPN: u16 = 0x0010;

// Signature scheme codes offered in ClientHello.
const SIG_RSA_PKCS1_SHA256: u16 = 0x0401;
const SIG_RSA_PKCS1_SHA384: u16 = 0x0501;
const SIG_RSA_PKCS1_SHA1: u16 = 0x0201;

/// Client-auth progress, driven by CertificateRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVerification {
    NotRequested,
    Needed,
    Sent,
}

/// One element of an outbound flight, in emission order.
pub enum OutboundItem {
    /// A complete handshake message to seal as a Handshake record.
    Handshake(Vec<u8>),
    /// Emit a ChangeCipherSpec record, then switch the write direction to
    /// the freshly derived keys before sealing anything further.
    ChangeCipherSpec,
}

/// Engine-level happenings the connection reports to its observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    CertificateRequested,
    Established,
}

/// Non-fatal and fatal interruptions during message handling.
enum Interrupt {
    NeedMore,
    Fatal(TlsError),
}

impl From<TlsError> for Interrupt {
    fn from(e: TlsError) -> Self {
        Interrupt::Fatal(e)
    }
}

impl From<ShortInput> for Interrupt {
    fn from(_: ShortInput) -> Self {
        Interrupt::NeedMore
    }
}

/// The client handshake state machine and its connection context.
pub struct ClientHandshake {
    config: TlsConfig,
    status: ConnectionStatus,
    suite: CipherSuite,
    suite_params: Option<SuiteParams>,
    local_random: [u8; 32],
    remote_random: [u8; 32],
    session_id: Vec<u8>,
    /// Nonempty ServerName echo from the server, if any.
    server_name_echo: Option<String>,
    negotiated_alpn: Option<String>,
    /// Raw SignatureAlgorithms extension body; recorded, not enforced.
    signature_algorithms: Vec<u8>,
    /// Server chain as received, validated leaf swapped to position 0.
    certificates: Vec<Certificate>,
    master_secret: Option<Zeroizing<Vec<u8>>>,
    keys: Option<KeyBlock>,
    transcript: TranscriptHash,
    seen: SeenMessages,
    client_verified: ClientVerification,
    outbound: Vec<OutboundItem>,
    events: Vec<EngineEvent>,
}

impl ClientHandshake {
    pub fn new(config: TlsConfig) -> Self {
        Self {
            config,
            status: ConnectionStatus::Disconnected,
            suite: CipherSuite::INVALID,
            suite_params: None,
            local_random: [0u8; 32],
            remote_random: [0u8; 32],
            session_id: Vec::new(),
            server_name_echo: None,
            negotiated_alpn: None,
            signature_algorithms: Vec::new(),
            certificates: Vec::new(),
            master_secret: None,
            keys: None,
            transcript: TranscriptHash::new(),
            seen: SeenMessages::new(),
            client_verified: ClientVerification::NotRequested,
            outbound: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn suite_params(&self) -> Option<SuiteParams> {
        self.suite_params
    }

    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    pub fn negotiated_alpn(&self) -> Option<&str> {
        self.negotiated_alpn.as_deref()
    }

    pub fn server_name_echo(&self) -> Option<&str> {
        self.server_name_echo.as_deref()
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    pub fn client_verified(&self) -> ClientVerification {
        self.client_verified
    }

    /// Key material derived at ServerHelloDone; the connection activates
    /// record protection from it.
    pub fn key_block(&self) -> Option<&KeyBlock> {
        self.keys.as_ref()
    }

    /// Current transcript digest; exposed for tests and key export.
    pub fn transcript_snapshot(&self) -> [u8; 32] {
        self.transcript.snapshot()
    }

    pub fn take_outbound(&mut self) -> Vec<OutboundItem> {
        std::mem::take(&mut self.outbound)
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Build the opening ClientHello and queue it for sending.
    pub fn start(&mut self, env: &dyn Environment) -> Result<(), TlsError> {
        if self.status != ConnectionStatus::Disconnected || self.seen.contains(HandshakeType::ServerHello)
        {
            return Err(TlsError::InternalError(
                "handshake already started".into(),
            ));
        }

        // First four bytes of the random carry the clock, the rest entropy.
        let stamp = (env.unix_time() as u32).to_be_bytes();
        self.local_random[..4].copy_from_slice(&stamp);
        env.fill_random(&mut self.local_random[4..]);

        let msg = self.build_client_hello();
        self.transcript.absorb(&msg);
        self.outbound.push(OutboundItem::Handshake(msg));
        Ok(())
    }

    fn build_client_hello(&self) -> Vec<u8> {
        let mut body = Builder::with_capacity(128);
        body.put_u16(TLS12_VERSION);
        body.put_bytes(&self.local_random);
        body.put_vec8(&[]); // session id: always fresh, resumption is out of scope

        let mut suites = Builder::with_capacity(self.config.cipher_suites.len() * 2);
        for s in &self.config.cipher_suites {
            suites.put_u16(s.0);
        }
        body.put_vec16(suites.as_slice());

        // Compression: null only.
        body.put_u8(1);
        body.put_u8(0);

        let mut exts = Builder::new();
        if let Some(ref name) = self.config.server_name {
            let mut sni = Builder::new();
            let mut entry = Builder::new();
            entry.put_u8(0); // name_type host_name
            entry.put_vec16(name.as_bytes());
            sni.put_vec16(entry.as_slice());
            exts.put_u16(EXT_SERVER_NAME);
            exts.put_vec16(sni.as_slice());
        }
        {
            let mut algs = Builder::new();
            let mut list = Builder::new();
            for code in [SIG_RSA_PKCS1_SHA256, SIG_RSA_PKCS1_SHA384, SIG_RSA_PKCS1_SHA1] {
                list.put_u16(code);
            }
            algs.put_vec16(list.as_slice());
            exts.put_u16(EXT_SIGNATURE_ALGORITHMS);
            exts.put_vec16(algs.as_slice());
        }
        if !self.config.alpn_protocols.is_empty() {
            let mut alpn = Builder::new();
            let mut list = Builder::new();
            for proto in &self.config.alpn_protocols {
                list.put_vec8(proto.as_bytes());
            }
            alpn.put_vec16(list.as_slice());
            exts.put_u16(EXT_ALPN);
            exts.put_vec16(alpn.as_slice());
        }
        body.put_vec16(exts.as_slice());

        wrap_handshake(HandshakeType::ClientHello, &body.finish())
    }

    /// Process at most one complete handshake message from `payload`.
    pub fn consume(
        &mut self,
        payload: &[u8],
        env: &dyn Environment,
    ) -> Result<HandshakeProgress, TlsError> {
        if payload.len() < HANDSHAKE_HEADER_LEN {
            return Ok(HandshakeProgress::NeedMoreData);
        }
        let ty_byte = payload[0];
        let body_len = ((payload[1] as usize) << 16) | ((payload[2] as usize) << 8) | payload[3] as usize;
        let total = HANDSHAKE_HEADER_LEN + body_len;
        if payload.len() < total {
            return Ok(HandshakeProgress::NeedMoreData);
        }
        let ty = HandshakeType::from_u8(ty_byte).map_err(TlsError::NotUnderstood)?;
        let body = &payload[HANDSHAKE_HEADER_LEN..total];

        if ty == HandshakeType::HelloRequest {
            // Renegotiation bait. Answered as a no-op: not hashed, not
            // counted, nothing sent back.
            debug!("ignoring HelloRequest (renegotiation declined)");
            return Ok(HandshakeProgress::Consumed(total));
        }

        if !self.seen.mark(ty) {
            warn!("duplicate {ty:?} message");
            return Err(TlsError::UnexpectedMessage);
        }

        // Handlers absorb `raw` into the transcript themselves: most need
        // the message hashed before acting (the flight after ServerHelloDone
        // hashes its own output on top), while Finished verifies against the
        // transcript standing just before it.
        let raw = &payload[..total];
        let outcome = match ty {
            HandshakeType::HelloRequest => unreachable!("handled above"),
            HandshakeType::ClientHello | HandshakeType::ClientKeyExchange => {
                // Server-to-client flights never carry these.
                Err(Interrupt::Fatal(TlsError::UnexpectedMessage))
            }
            HandshakeType::ServerHello => self.handle_server_hello(raw, body),
            HandshakeType::Certificate => self.handle_certificate(raw, body, env),
            HandshakeType::ServerKeyExchange => {
                // RSA key exchange derives everything from the certificate.
                Err(Interrupt::Fatal(TlsError::UnexpectedMessage))
            }
            HandshakeType::CertificateRequest => self.handle_certificate_request(raw),
            HandshakeType::ServerHelloDone => self.handle_server_hello_done(raw, env),
            HandshakeType::CertificateVerify => self.handle_certificate_verify(raw, body),
            HandshakeType::Finished => self.handle_finished(raw, body),
        };

        match outcome {
            Ok(()) => Ok(HandshakeProgress::Consumed(total)),
            Err(Interrupt::NeedMore) => {
                // The message will come around again once more bytes arrive.
                self.seen.unmark(ty);
                Ok(HandshakeProgress::NeedMoreData)
            }
            Err(Interrupt::Fatal(e)) => Err(e),
        }
    }

    fn handle_server_hello(&mut self, raw: &[u8], body: &[u8]) -> Result<(), Interrupt> {
        if self.status != ConnectionStatus::Disconnected
            && self.status != ConnectionStatus::Renegotiating
        {
            return Err(TlsError::UnexpectedMessage.into());
        }

        let mut r = Reader::new(body);
        let version = r.read_u16()?;
        if version != TLS12_VERSION {
            return Err(TlsError::NotSafe.into());
        }

        self.remote_random.copy_from_slice(r.take(32)?);

        let sid_len = r.read_u8()? as usize;
        if sid_len > 32 {
            return Err(TlsError::BrokenPacket.into());
        }
        self.session_id = r.take(sid_len)?.to_vec();

        let suite = CipherSuite(r.read_u16()?);
        let params = match SuiteParams::from_suite(suite) {
            Ok(p) if self.config.cipher_suites.contains(&suite) => p,
            _ => {
                self.suite = CipherSuite::INVALID;
                warn!("server chose unsupported cipher suite 0x{:04x}", suite.0);
                return Err(TlsError::NoCommonCipher.into());
            }
        };

        let compression = r.read_u8()?;
        if compression != 0 {
            warn!("server asked for compression method {compression}");
            return Err(TlsError::CompressionNotSupported.into());
        }

        if !r.is_empty() {
            self.parse_hello_extensions(&mut r)?;
        }

        self.suite = suite;
        self.suite_params = Some(params);
        if self.status != ConnectionStatus::Renegotiating {
            self.status = ConnectionStatus::Negotiating;
        }
        self.transcript.absorb(raw);
        debug!("negotiated cipher suite 0x{:04x}", suite.0);
        Ok(())
    }

    fn parse_hello_extensions(&mut self, r: &mut Reader) -> Result<(), Interrupt> {
        let block_len = r.read_u16()? as usize;
        if r.remaining() < block_len {
            // The declared block runs past the message: wait for a saner
            // retransmission rather than misparse.
            return Err(Interrupt::NeedMore);
        }
        let after_block = r.remaining() - block_len;
        let mut exts = r.sub(block_len)?;

        while !exts.is_empty() {
            if exts.remaining() < 4 {
                return Err(TlsError::BrokenPacket.into());
            }
            let ext_type = exts.read_u16()?;
            let ext_len = exts.read_u16()? as usize;
            if ext_len > exts.remaining() {
                // Overruns the extensions block. If it also overruns the
                // message, the buffer is short; otherwise the frame lies.
                return if ext_len > exts.remaining() + after_block {
                    Err(Interrupt::NeedMore)
                } else {
                    Err(TlsError::BrokenPacket.into())
                };
            }
            let data = exts.take(ext_len)?;

            match ext_type {
                EXT_SERVER_NAME => {
                    // Echo is usually empty; a nonempty one is recorded.
                    if let Some(name) = parse_server_name_echo(data) {
                        debug!("server name echo: {name}");
                        self.server_name_echo = Some(name);
                    }
                }
                EXT_ALPN => {
                    self.negotiated_alpn = self.parse_alpn(data)?;
                    if let Some(ref proto) = self.negotiated_alpn {
                        debug!("negotiated alpn: {proto}");
                    }
                }
                EXT_SIGNATURE_ALGORITHMS => {
                    self.signature_algorithms = data.to_vec();
                }
                other => {
                    debug!("skipping extension 0x{other:04x} ({ext_len} bytes)");
                }
            }
        }
        Ok(())
    }

    /// ALPN body: 2-byte list length, then `{u8 length, token}` entries.
    /// The first token the client offered wins.
    fn parse_alpn(&self, data: &[u8]) -> Result<Option<String>, Interrupt> {
        if self.config.alpn_protocols.is_empty() {
            return Ok(None);
        }
        let mut r = Reader::new(data);
        let list_len = r.read_u16()? as usize;
        if list_len > r.remaining() {
            return Err(TlsError::BrokenPacket.into());
        }
        let mut list = r.sub(list_len)?;
        while !list.is_empty() {
            let token = list.read_vec8().map_err(|_| TlsError::BrokenPacket)?;
            if token.is_empty() {
                continue;
            }
            let Ok(token) = std::str::from_utf8(token) else {
                continue;
            };
            if self.config.alpn_protocols.iter().any(|p| p == token) {
                return Ok(Some(token.to_string()));
            }
            // A server is expected to pick exactly one; anything after the
            // first entry is noise.
            break;
        }
        Ok(None)
    }

    fn handle_certificate(
        &mut self,
        raw: &[u8],
        body: &[u8],
        env: &dyn Environment,
    ) -> Result<(), Interrupt> {
        if self.status != ConnectionStatus::Negotiating {
            return Err(TlsError::UnexpectedMessage.into());
        }
        self.transcript.absorb(raw);

        let mut r = Reader::new(body);
        let list_len = r.read_u24().map_err(|_| TlsError::BadCertificate)? as usize;
        if list_len != r.remaining() {
            return Err(TlsError::BadCertificate.into());
        }
        let mut list = r.sub(list_len).map_err(|_| TlsError::BadCertificate)?;

        let mut certs = Vec::new();
        while !list.is_empty() {
            let der = list.read_vec24().map_err(|_| TlsError::BadCertificate)?;
            match Certificate::from_der(der) {
                Ok(cert) => certs.push(cert),
                Err(PkiError::UnsupportedKeyAlgorithm) => {
                    return Err(TlsError::UnsupportedCertificate.into())
                }
                Err(e) => {
                    debug!("skipping unparseable certificate: {e}");
                }
            }
        }
        if certs.is_empty() {
            return Err(TlsError::BadCertificate.into());
        }

        let hostname = self.config.server_name.as_deref().unwrap_or("");
        let policy = ChainPolicy {
            trust_anchors: &self.config.trusted_certs,
            accept_self_signed: self.config.accept_self_signed,
            now: env.unix_time() as i64,
        };
        let leaf_idx = select_and_verify_leaf(&certs, hostname, &policy)
            .map_err(map_chain_error)?;
        if leaf_idx != 0 {
            certs.swap(0, leaf_idx);
        }
        debug!(
            "validated chain, leaf subject: {}",
            certs[0].subject
        );
        self.certificates = certs;
        Ok(())
    }

    fn handle_certificate_request(&mut self, raw: &[u8]) -> Result<(), Interrupt> {
        if self.status != ConnectionStatus::Negotiating {
            return Err(TlsError::UnexpectedMessage.into());
        }
        // Body lists acceptable types and CAs; the embedder supplies the
        // chain through config, so only the fact of the request matters.
        self.transcript.absorb(raw);
        self.client_verified = ClientVerification::Needed;
        self.events.push(EngineEvent::CertificateRequested);
        Ok(())
    }

    fn handle_server_hello_done(&mut self, raw: &[u8], env: &dyn Environment) -> Result<(), Interrupt> {
        if self.status != ConnectionStatus::Negotiating {
            return Err(TlsError::UnexpectedMessage.into());
        }
        if self.certificates.is_empty() {
            // RSA key exchange cannot proceed without the server's key.
            return Err(TlsError::UnexpectedMessage.into());
        }
        self.transcript.absorb(raw);
        self.status = ConnectionStatus::KeyExchange;
        self.build_client_flight(env)
    }

    /// Assemble (optional Certificate) → ClientKeyExchange →
    /// ChangeCipherSpec → Finished as one atomic outbound sequence.
    fn build_client_flight(&mut self, env: &dyn Environment) -> Result<(), Interrupt> {
        let params = self
            .suite_params
            .ok_or_else(|| TlsError::InternalError("no suite parameters".into()))?;

        if self.client_verified == ClientVerification::Needed {
            let mut chain = Builder::new();
            for der in &self.config.client_certificate_chain {
                chain.put_vec24(der);
            }
            let mut body = Builder::new();
            body.put_vec24(chain.as_slice());
            let msg = wrap_handshake(HandshakeType::Certificate, &body.finish());
            self.transcript.absorb(&msg);
            self.outbound.push(OutboundItem::Handshake(msg));
            self.client_verified = ClientVerification::Sent;
        }

        // Premaster, encrypted to the validated leaf.
        let premaster = build_premaster(env);
        let leaf = &self.certificates[0];
        let public_key = RsaPublicKey::new(
            BigUint::from_bytes_be(&leaf.public_key.modulus),
            BigUint::from_bytes_be(&leaf.public_key.exponent),
        )
        .map_err(|_| TlsError::BadCertificate)?;
        let mut rng = EnvRng::new(env);
        let encrypted = public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, premaster.as_slice())
            .map_err(|e| TlsError::InternalError(format!("premaster encryption: {e}")))?;

        let mut cke_body = Builder::with_capacity(2 + encrypted.len());
        cke_body.put_vec16(&encrypted);
        let cke = wrap_handshake(HandshakeType::ClientKeyExchange, &cke_body.finish());
        self.transcript.absorb(&cke);
        self.outbound.push(OutboundItem::Handshake(cke));

        let master = derive_master_secret(
            premaster.as_slice(),
            &self.local_random,
            &self.remote_random,
        );
        self.keys = Some(derive_key_block(
            &master,
            &self.remote_random,
            &self.local_random,
            &params,
        ));

        self.outbound.push(OutboundItem::ChangeCipherSpec);

        // Finished is the first record under the new keys; its verify data
        // covers the transcript up to and including ClientKeyExchange.
        let verify_data =
            compute_verify_data(&master, "client finished", &self.transcript.snapshot());
        let finished = wrap_handshake(HandshakeType::Finished, &verify_data);
        self.transcript.absorb(&finished);
        self.outbound.push(OutboundItem::Handshake(finished));

        self.master_secret = Some(master);
        Ok(())
    }

    fn handle_certificate_verify(&mut self, raw: &[u8], body: &[u8]) -> Result<(), Interrupt> {
        if self.status != ConnectionStatus::KeyExchange {
            return Err(TlsError::UnexpectedMessage.into());
        }
        let leaf_der = self
            .config
            .client_certificate_chain
            .first()
            .ok_or(TlsError::UnexpectedMessage)?;

        let mut r = Reader::new(body);
        let scheme = r.read_u16()?;
        if scheme != SIG_RSA_PKCS1_SHA256 {
            return Err(TlsError::NotUnderstood((scheme >> 8) as u8).into());
        }
        let signature = r.read_vec16()?;

        let cert = Certificate::from_der(leaf_der).map_err(|_| TlsError::BadCertificate)?;
        let key = RsaPublicKey::new(
            BigUint::from_bytes_be(&cert.public_key.modulus),
            BigUint::from_bytes_be(&cert.public_key.exponent),
        )
        .map_err(|_| TlsError::BadCertificate)?;
        // The signature covers the transcript standing just before this
        // message.
        let digest = self.transcript.snapshot();
        key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            .map_err(|_| TlsError::NotVerified)?;
        self.transcript.absorb(raw);
        Ok(())
    }

    fn handle_finished(&mut self, raw: &[u8], body: &[u8]) -> Result<(), Interrupt> {
        if self.status != ConnectionStatus::KeyExchange {
            return Err(TlsError::UnexpectedMessage.into());
        }
        if body.len() < VERIFY_DATA_LEN {
            return Err(TlsError::BrokenPacket.into());
        }
        let master = self
            .master_secret
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no master secret".into()))?;

        // The server's view of the transcript includes our Finished but not
        // its own; the snapshot already stands exactly there.
        let expected =
            compute_verify_data(master, "server finished", &self.transcript.snapshot());
        if body[..VERIFY_DATA_LEN].ct_eq(&expected).unwrap_u8() != 1 {
            warn!("server Finished verify_data mismatch");
            return Err(TlsError::NotVerified.into());
        }

        self.transcript.absorb(raw);
        self.status = ConnectionStatus::Established;
        self.seen.clear();
        self.events.push(EngineEvent::Established);
        debug!("handshake established");
        Ok(())
    }
}

fn map_chain_error(e: PkiError) -> Interrupt {
    let tls = match e {
        PkiError::NoMatchingLeaf => TlsError::BadCertificate,
        PkiError::CertExpired | PkiError::CertNotYetValid => TlsError::CertificateExpired,
        PkiError::UnsupportedKeyAlgorithm | PkiError::UnsupportedSignatureAlgorithm => {
            TlsError::UnsupportedCertificate
        }
        _ => TlsError::CertificateUnknown,
    };
    Interrupt::Fatal(tls)
}

/// ServerName echo body: list length, entry type, name length, name. Absent
/// or empty bodies are the common case.
fn parse_server_name_echo(data: &[u8]) -> Option<String> {
    let mut r = Reader::new(data);
    let list_len = r.read_u16().ok()? as usize;
    let mut list = r.sub(list_len.min(r.remaining())).ok()?;
    let name_type = list.read_u8().ok()?;
    if name_type != 0 {
        return None;
    }
    let name = list.read_vec16().ok()?;
    if name.is_empty() {
        return None;
    }
    String::from_utf8(name.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;

    struct FixedEnv;

    impl Environment for FixedEnv {
        fn fill_random(&self, out: &mut [u8]) {
            out.fill(0x42);
        }

        fn unix_time(&self) -> u64 {
            1_780_000_000
        }
    }

    /// ServerHello with the given suite and extension block.
    fn server_hello(version: u16, sid: &[u8], suite: u16, compression: u8, exts: &[u8]) -> Vec<u8> {
        let mut body = Builder::new();
        body.put_u16(version);
        body.put_bytes(&[0xA5; 32]);
        body.put_vec8(sid);
        body.put_u16(suite);
        body.put_u8(compression);
        if !exts.is_empty() {
            body.put_vec16(exts);
        }
        wrap_handshake(HandshakeType::ServerHello, &body.finish())
    }

    fn engine() -> ClientHandshake {
        ClientHandshake::new(TlsConfig::default())
    }

    fn started_engine(config: TlsConfig) -> ClientHandshake {
        let mut hs = ClientHandshake::new(config);
        hs.start(&FixedEnv).unwrap();
        hs.take_outbound();
        hs
    }

    #[test]
    fn test_client_hello_shape() {
        let config = TlsConfig::default()
            .with_server_name("example.com")
            .with_alpn(["h2"]);
        let mut hs = ClientHandshake::new(config);
        hs.start(&FixedEnv).unwrap();
        let out = hs.take_outbound();
        assert_eq!(out.len(), 1);
        let OutboundItem::Handshake(msg) = &out[0] else {
            panic!("expected a handshake message");
        };

        assert_eq!(msg[0], HandshakeType::ClientHello as u8);
        let body_len = ((msg[1] as usize) << 16) | ((msg[2] as usize) << 8) | msg[3] as usize;
        assert_eq!(msg.len(), 4 + body_len);
        // Version, then the timestamped random.
        assert_eq!(&msg[4..6], &[0x03, 0x03]);
        assert_eq!(&msg[6..10], &(1_780_000_000u32).to_be_bytes());
        assert_eq!(&msg[10..38], &[0x42; 28]);
        // Empty session id.
        assert_eq!(msg[38], 0);
        // Six suites, two bytes each.
        assert_eq!(&msg[39..41], &[0x00, 0x0C]);
        // SNI is present somewhere in the extension block.
        assert!(msg
            .windows(b"example.com".len())
            .any(|w| w == b"example.com"));
    }

    #[test]
    fn test_start_twice_fails() {
        let mut hs = engine();
        hs.start(&FixedEnv).unwrap();
        assert!(hs.start(&FixedEnv).is_err());
    }

    #[test]
    fn test_minimal_server_hello_accepted() {
        let mut hs = started_engine(TlsConfig::default());
        let msg = server_hello(0x0303, &[], 0x003C, 0, &[]);
        let progress = hs.consume(&msg, &FixedEnv).unwrap();
        assert_eq!(progress, HandshakeProgress::Consumed(msg.len()));
        assert_eq!(hs.status(), ConnectionStatus::Negotiating);
        assert_eq!(hs.cipher_suite(), CipherSuite(0x003C));
        assert!(hs.session_id().is_empty());
    }

    #[test]
    fn test_version_rejection() {
        let mut hs = started_engine(TlsConfig::default());
        let msg = server_hello(0x0302, &[], 0x003C, 0, &[]);
        assert!(matches!(
            hs.consume(&msg, &FixedEnv),
            Err(TlsError::NotSafe)
        ));
    }

    #[test]
    fn test_unsupported_suite_rejected() {
        let mut hs = started_engine(TlsConfig::default());
        let msg = server_hello(0x0303, &[], 0xC02F, 0, &[]);
        assert!(matches!(
            hs.consume(&msg, &FixedEnv),
            Err(TlsError::NoCommonCipher)
        ));
        assert_eq!(hs.cipher_suite(), CipherSuite::INVALID);
    }

    #[test]
    fn test_compression_rejected() {
        let mut hs = started_engine(TlsConfig::default());
        let msg = server_hello(0x0303, &[], 0x003C, 1, &[]);
        assert!(matches!(
            hs.consume(&msg, &FixedEnv),
            Err(TlsError::CompressionNotSupported)
        ));
    }

    #[test]
    fn test_oversized_session_id_is_broken_packet() {
        // Hand-build a hello whose session id length byte claims 33.
        let mut body = Builder::new();
        body.put_u16(0x0303);
        body.put_bytes(&[0xA5; 32]);
        body.put_u8(33);
        body.put_bytes(&[0x01; 33]);
        body.put_u16(0x003C);
        body.put_u8(0);
        let msg = wrap_handshake(HandshakeType::ServerHello, &body.finish());

        let mut hs = started_engine(TlsConfig::default());
        assert!(matches!(
            hs.consume(&msg, &FixedEnv),
            Err(TlsError::BrokenPacket)
        ));
    }

    #[test]
    fn test_duplicate_server_hello() {
        let mut hs = started_engine(TlsConfig::default());
        let msg = server_hello(0x0303, &[], 0x003C, 0, &[]);
        hs.consume(&msg, &FixedEnv).unwrap();
        assert!(matches!(
            hs.consume(&msg, &FixedEnv),
            Err(TlsError::UnexpectedMessage)
        ));
    }

    #[test]
    fn test_partial_message_needs_more() {
        let mut hs = started_engine(TlsConfig::default());
        let msg = server_hello(0x0303, &[], 0x003C, 0, &[]);
        for cut in [0, 1, 3, 10, msg.len() - 1] {
            assert_eq!(
                hs.consume(&msg[..cut], &FixedEnv).unwrap(),
                HandshakeProgress::NeedMoreData,
                "cut at {cut}"
            );
        }
        // The full buffer then parses.
        assert!(matches!(
            hs.consume(&msg, &FixedEnv).unwrap(),
            HandshakeProgress::Consumed(_)
        ));
    }

    #[test]
    fn test_alpn_first_offered_match_wins() {
        let config = TlsConfig::default().with_alpn(["h2", "http/1.1"]);
        let mut hs = started_engine(config);

        let mut list = Builder::new();
        list.put_vec8(b"http/1.1");
        let mut alpn = Builder::new();
        alpn.put_vec16(list.as_slice());
        let mut exts = Builder::new();
        exts.put_u16(EXT_ALPN);
        exts.put_vec16(alpn.as_slice());

        let msg = server_hello(0x0303, &[], 0x003C, 0, exts.as_slice());
        hs.consume(&msg, &FixedEnv).unwrap();
        assert_eq!(hs.negotiated_alpn(), Some("http/1.1"));
    }

    #[test]
    fn test_alpn_unknown_token_stays_unset() {
        let config = TlsConfig::default().with_alpn(["h2"]);
        let mut hs = started_engine(config);

        let mut list = Builder::new();
        list.put_vec8(b"spdy/3");
        let mut alpn = Builder::new();
        alpn.put_vec16(list.as_slice());
        let mut exts = Builder::new();
        exts.put_u16(EXT_ALPN);
        exts.put_vec16(alpn.as_slice());

        let msg = server_hello(0x0303, &[], 0x003C, 0, exts.as_slice());
        hs.consume(&msg, &FixedEnv).unwrap();
        assert_eq!(hs.negotiated_alpn(), None);
    }

    #[test]
    fn test_unknown_extension_skipped_and_sigalgs_recorded() {
        let mut exts = Builder::new();
        // Unknown extension first.
        exts.put_u16(0xFF01);
        exts.put_vec16(&[0xAA, 0xBB]);
        // SignatureAlgorithms after it.
        exts.put_u16(EXT_SIGNATURE_ALGORITHMS);
        exts.put_vec16(&[0x00, 0x02, 0x04, 0x01]);

        let mut hs = started_engine(TlsConfig::default());
        let msg = server_hello(0x0303, &[], 0x003C, 0, exts.as_slice());
        hs.consume(&msg, &FixedEnv).unwrap();
        assert_eq!(hs.signature_algorithms, vec![0x00, 0x02, 0x04, 0x01]);
    }

    #[test]
    fn test_extension_overrunning_block_is_broken_packet() {
        // Extension claims 200 bytes; the block ends before that but the
        // message continues (padding makes the outer buffer long enough).
        let mut body = Builder::new();
        body.put_u16(0x0303);
        body.put_bytes(&[0xA5; 32]);
        body.put_vec8(&[]);
        body.put_u16(0x003C);
        body.put_u8(0);
        let mut exts = Builder::new();
        exts.put_u16(0xFF01);
        exts.put_u16(200); // claimed length, block holds none of it
        body.put_vec16(exts.as_slice());
        body.put_bytes(&[0u8; 300]); // trailing bytes inside the message
        let msg = wrap_handshake(HandshakeType::ServerHello, &body.finish());

        let mut hs = started_engine(TlsConfig::default());
        assert!(matches!(
            hs.consume(&msg, &FixedEnv),
            Err(TlsError::BrokenPacket)
        ));
    }

    #[test]
    fn test_extension_overrunning_message_needs_more() {
        // The declared extensions block is longer than the message itself.
        let mut body = Builder::new();
        body.put_u16(0x0303);
        body.put_bytes(&[0xA5; 32]);
        body.put_vec8(&[]);
        body.put_u16(0x003C);
        body.put_u8(0);
        body.put_u16(500); // extensions block length with no bytes behind it
        let msg = wrap_handshake(HandshakeType::ServerHello, &body.finish());

        let mut hs = started_engine(TlsConfig::default());
        assert_eq!(
            hs.consume(&msg, &FixedEnv).unwrap(),
            HandshakeProgress::NeedMoreData
        );
    }

    #[test]
    fn test_redelivery_after_need_more_is_not_a_duplicate() {
        // A hello whose extensions block claims more bytes than the message
        // holds parks as NeedMoreData; the completed retransmission must
        // then parse rather than trip the duplicate check.
        let mut body = Builder::new();
        body.put_u16(0x0303);
        body.put_bytes(&[0xA5; 32]);
        body.put_vec8(&[]);
        body.put_u16(0x003C);
        body.put_u8(0);
        body.put_u16(6); // extensions block length, bytes not yet arrived
        let truncated = wrap_handshake(HandshakeType::ServerHello, &body.finish());

        let mut hs = started_engine(TlsConfig::default());
        assert_eq!(
            hs.consume(&truncated, &FixedEnv).unwrap(),
            HandshakeProgress::NeedMoreData
        );

        // Same hello, extensions now present.
        let mut exts = Builder::new();
        exts.put_u16(0xFF01);
        exts.put_vec16(&[0xAA, 0xBB]);
        let complete = server_hello(0x0303, &[], 0x003C, 0, exts.as_slice());
        assert!(matches!(
            hs.consume(&complete, &FixedEnv).unwrap(),
            HandshakeProgress::Consumed(_)
        ));
        assert_eq!(hs.status(), ConnectionStatus::Negotiating);
    }

    #[test]
    fn test_hello_request_ignored_and_unhashed() {
        let mut hs = started_engine(TlsConfig::default());
        let before = hs.transcript_snapshot();
        let msg = wrap_handshake(HandshakeType::HelloRequest, &[]);
        let progress = hs.consume(&msg, &FixedEnv).unwrap();
        assert_eq!(progress, HandshakeProgress::Consumed(4));
        assert_eq!(hs.transcript_snapshot(), before);
        // And it may repeat without tripping the duplicate check.
        hs.consume(&msg, &FixedEnv).unwrap();
    }

    #[test]
    fn test_unknown_handshake_type() {
        let mut hs = started_engine(TlsConfig::default());
        let msg = wrap_handshake_raw(99, &[]);
        assert!(matches!(
            hs.consume(&msg, &FixedEnv),
            Err(TlsError::NotUnderstood(99))
        ));
    }

    fn wrap_handshake_raw(ty: u8, body: &[u8]) -> Vec<u8> {
        let mut out = Builder::new();
        out.put_u8(ty);
        out.put_u24(body.len() as u32);
        out.put_bytes(body);
        out.finish()
    }

    #[test]
    fn test_client_hello_inbound_is_unexpected() {
        let mut hs = started_engine(TlsConfig::default());
        let msg = wrap_handshake(HandshakeType::ClientHello, &[0x03, 0x03]);
        assert!(matches!(
            hs.consume(&msg, &FixedEnv),
            Err(TlsError::UnexpectedMessage)
        ));
    }

    #[test]
    fn test_server_key_exchange_is_unexpected_for_rsa() {
        let mut hs = started_engine(TlsConfig::default());
        let hello = server_hello(0x0303, &[], 0x003C, 0, &[]);
        hs.consume(&hello, &FixedEnv).unwrap();
        let ske = wrap_handshake(HandshakeType::ServerKeyExchange, &[0u8; 8]);
        assert!(matches!(
            hs.consume(&ske, &FixedEnv),
            Err(TlsError::UnexpectedMessage)
        ));
    }

    #[test]
    fn test_finished_before_key_exchange_is_unexpected() {
        let mut hs = started_engine(TlsConfig::default());
        let hello = server_hello(0x0303, &[], 0x003C, 0, &[]);
        hs.consume(&hello, &FixedEnv).unwrap();
        let fin = wrap_handshake(HandshakeType::Finished, &[0u8; 12]);
        assert!(matches!(
            hs.consume(&fin, &FixedEnv),
            Err(TlsError::UnexpectedMessage)
        ));
    }

    #[test]
    fn test_transcript_excludes_current_message_during_dispatch() {
        // Consuming the ServerHello must extend the transcript by exactly
        // that message (byte-identical to hashing it manually).
        let mut hs = started_engine(TlsConfig::default());
        let ch_snapshot = hs.transcript_snapshot();
        let msg = server_hello(0x0303, &[], 0x003C, 0, &[]);
        hs.consume(&msg, &FixedEnv).unwrap();
        assert_ne!(hs.transcript_snapshot(), ch_snapshot);
    }

    #[test]
    fn test_session_id_recorded() {
        let mut hs = started_engine(TlsConfig::default());
        let sid = [0x11u8; 16];
        let msg = server_hello(0x0303, &sid, 0x009C, 0, &[]);
        hs.consume(&msg, &FixedEnv).unwrap();
        assert_eq!(hs.session_id(), &sid);
        assert_eq!(
            hs.cipher_suite(),
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256
        );
    }
}
