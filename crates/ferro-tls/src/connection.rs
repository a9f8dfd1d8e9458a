//! Driven client connection: owns the state machine and record layer,
//! shuttles bytes in and out, and reports events to the embedder.
//!
//! The embedding transport feeds raw bytes into `read_input` whenever the
//! socket is readable and drains `take_output` whenever it is writable. The
//! connection never blocks; everything that would wait is parked in buffers.

use log::{debug, warn};

use ferro_types::TlsError;

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::config::TlsConfig;
use crate::env::{Environment, SystemEnvironment};
use crate::handshake::client::{ClientHandshake, EngineEvent, OutboundItem};
use crate::handshake::HandshakeProgress;
use crate::record::{ContentType, RecordLayer, MAX_PLAINTEXT_LEN};
use crate::suites::CipherSuite;
use crate::ConnectionStatus;

/// Embedder callbacks.
///
/// Every method has a default empty body so observers implement only what
/// they care about.
pub trait TlsObserver {
    /// The handshake finished; application data may flow.
    fn on_tls_ready_to_write(&mut self) {}
    /// The server asked for client authentication; the chain and key come
    /// from the configuration.
    fn on_tls_certificate_request(&mut self) {}
    /// An alert arrived from the peer.
    fn on_tls_alert(&mut self, _level: AlertLevel, _description: AlertDescription) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl TlsObserver for NullObserver {}

/// A driven TLS 1.2 client connection.
pub struct TlsClient {
    engine: ClientHandshake,
    record_layer: RecordLayer,
    env: Box<dyn Environment>,
    observer: Box<dyn TlsObserver>,
    /// Raw bytes from the transport awaiting record framing.
    recv_buf: Vec<u8>,
    /// Reassembled handshake payload awaiting a complete message.
    cached_handshake: Vec<u8>,
    /// Framed records waiting for the transport to drain.
    output: Vec<u8>,
    /// Decrypted application data waiting for the embedder.
    app_data: Vec<u8>,
    /// Sticky fatal fault; once set no further input is consumed.
    critical_error: Option<AlertDescription>,
    /// Handshake deadline in UNIX seconds.
    deadline: Option<u64>,
    timeout_secs: u64,
}

impl TlsClient {
    pub fn new(config: TlsConfig, observer: Box<dyn TlsObserver>) -> Self {
        Self::with_environment(config, Box::new(SystemEnvironment), observer)
    }

    pub fn with_environment(
        config: TlsConfig,
        env: Box<dyn Environment>,
        observer: Box<dyn TlsObserver>,
    ) -> Self {
        let timeout_secs = config.handshake_timeout.as_secs().max(1);
        Self {
            engine: ClientHandshake::new(config),
            record_layer: RecordLayer::new(),
            env,
            observer,
            recv_buf: Vec::new(),
            cached_handshake: Vec::new(),
            output: Vec::new(),
            app_data: Vec::new(),
            critical_error: None,
            deadline: None,
            timeout_secs,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.engine.status()
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.engine.cipher_suite()
    }

    pub fn negotiated_alpn(&self) -> Option<&str> {
        self.engine.negotiated_alpn()
    }

    /// The sticky fatal fault, if the connection died.
    pub fn critical_error(&self) -> Option<AlertDescription> {
        self.critical_error
    }

    pub fn is_closed(&self) -> bool {
        self.critical_error.is_some()
    }

    /// Begin the handshake: queue the ClientHello and arm the deadline.
    pub fn start(&mut self) -> Result<(), TlsError> {
        self.engine.start(self.env.as_ref())?;
        self.deadline = Some(self.env.unix_time() + self.timeout_secs);
        self.flush_engine()
            .map_err(|e| self.raise_fatal(e))
    }

    /// Feed raw transport bytes into the connection.
    pub fn read_input(&mut self, data: &[u8]) -> Result<(), TlsError> {
        if self.critical_error.is_some() {
            return Err(TlsError::InternalError("connection is closed".into()));
        }
        self.check_deadline()?;

        self.recv_buf.extend_from_slice(data);
        loop {
            match self.record_layer.open(&self.recv_buf) {
                Ok(None) => break,
                Ok(Some((content_type, payload, consumed))) => {
                    self.recv_buf.drain(..consumed);
                    if let Err(e) = self.dispatch_record(content_type, &payload) {
                        return Err(self.raise_fatal(e));
                    }
                    if self.critical_error.is_some() {
                        break;
                    }
                }
                Err(e) => return Err(self.raise_fatal(e)),
            }
        }
        Ok(())
    }

    /// Drain framed records for the transport to write.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Drain decrypted application data.
    pub fn take_application_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.app_data)
    }

    /// Protect and queue application data; legal once Established.
    pub fn write_application_data(&mut self, data: &[u8]) -> Result<(), TlsError> {
        if self.critical_error.is_some() || self.status() != ConnectionStatus::Established {
            return Err(TlsError::UnexpectedMessage);
        }
        for chunk in data.chunks(MAX_PLAINTEXT_LEN) {
            let record = self.record_layer.seal(ContentType::ApplicationData, chunk)?;
            self.output.extend_from_slice(&record);
        }
        Ok(())
    }

    /// Send close_notify and refuse further traffic.
    pub fn close(&mut self) {
        if self.critical_error.is_some() {
            return;
        }
        let alert = Alert::close_notify();
        if let Ok(record) = self.record_layer.seal(ContentType::Alert, &alert.to_bytes()) {
            self.output.extend_from_slice(&record);
        }
        self.critical_error = Some(AlertDescription::CloseNotify);
    }

    /// Abort if the handshake deadline passed before Established.
    fn check_deadline(&mut self) -> Result<(), TlsError> {
        if self.status() == ConnectionStatus::Established {
            self.deadline = None;
            return Ok(());
        }
        if let Some(deadline) = self.deadline {
            if self.env.unix_time() > deadline {
                warn!("handshake deadline passed");
                let e = TlsError::InternalError("handshake timeout".into());
                return Err(self.raise_fatal(e));
            }
        }
        Ok(())
    }

    fn dispatch_record(&mut self, content_type: ContentType, payload: &[u8]) -> Result<(), TlsError> {
        match content_type {
            ContentType::Handshake => self.dispatch_handshake(payload),
            ContentType::ChangeCipherSpec => self.dispatch_change_cipher_spec(payload),
            ContentType::Alert => {
                self.dispatch_alert(payload);
                Ok(())
            }
            ContentType::ApplicationData => {
                if self.status() != ConnectionStatus::Established {
                    return Err(TlsError::UnexpectedMessage);
                }
                self.app_data.extend_from_slice(payload);
                Ok(())
            }
        }
    }

    fn dispatch_handshake(&mut self, payload: &[u8]) -> Result<(), TlsError> {
        self.cached_handshake.extend_from_slice(payload);
        while !self.cached_handshake.is_empty() {
            match self.engine.consume(&self.cached_handshake, self.env.as_ref())? {
                HandshakeProgress::Consumed(n) => {
                    self.cached_handshake.drain(..n);
                    self.flush_engine()?;
                }
                HandshakeProgress::NeedMoreData => break,
            }
        }
        Ok(())
    }

    fn dispatch_change_cipher_spec(&mut self, payload: &[u8]) -> Result<(), TlsError> {
        if payload != [0x01] {
            return Err(TlsError::BrokenPacket);
        }
        let params = self
            .engine
            .suite_params()
            .ok_or(TlsError::UnexpectedMessage)?;
        let keys = self.engine.key_block().ok_or(TlsError::UnexpectedMessage)?;
        // Every record from the server is protected from here on; the read
        // sequence number restarts at zero.
        self.record_layer
            .activate_read(self.engine.cipher_suite(), &params, keys)?;
        debug!("server ChangeCipherSpec: read protection active");
        Ok(())
    }

    fn dispatch_alert(&mut self, payload: &[u8]) {
        let Ok(alert) = Alert::parse(payload) else {
            warn!("undecodable alert record");
            let e = TlsError::BrokenPacket;
            let _ = self.raise_fatal(e);
            return;
        };
        debug!("alert from peer: {:?} {:?}", alert.level, alert.description);
        self.observer.on_tls_alert(alert.level, alert.description);
        if alert.level == AlertLevel::Critical
            || alert.description == AlertDescription::CloseNotify
        {
            self.critical_error = Some(alert.description);
        }
    }

    /// Seal queued engine output and fire pending events.
    fn flush_engine(&mut self) -> Result<(), TlsError> {
        for item in self.engine.take_outbound() {
            match item {
                OutboundItem::Handshake(msg) => {
                    let record = self.record_layer.seal(ContentType::Handshake, &msg)?;
                    self.output.extend_from_slice(&record);
                }
                OutboundItem::ChangeCipherSpec => {
                    let record = self.record_layer.seal(ContentType::ChangeCipherSpec, &[0x01])?;
                    self.output.extend_from_slice(&record);
                    let params = self
                        .engine
                        .suite_params()
                        .ok_or_else(|| TlsError::InternalError("no suite parameters".into()))?;
                    let keys = self
                        .engine
                        .key_block()
                        .ok_or_else(|| TlsError::InternalError("no key block".into()))?;
                    self.record_layer
                        .activate_write(self.engine.cipher_suite(), &params, keys)?;
                }
            }
        }
        for event in self.engine.take_events() {
            match event {
                EngineEvent::CertificateRequested => self.observer.on_tls_certificate_request(),
                EngineEvent::Established => {
                    self.deadline = None;
                    self.observer.on_tls_ready_to_write();
                }
            }
        }
        Ok(())
    }

    /// Send the mapped critical alert once, then latch the failure.
    fn raise_fatal(&mut self, e: TlsError) -> TlsError {
        if self.critical_error.is_none() {
            let description = AlertDescription::for_error(&e);
            let alert = Alert::critical(description);
            match self.record_layer.seal(ContentType::Alert, &alert.to_bytes()) {
                Ok(record) => self.output.extend_from_slice(&record),
                Err(seal_err) => warn!("could not send alert: {seal_err}"),
            }
            self.critical_error = Some(description);
        }
        e
    }
}
