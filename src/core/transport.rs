//! Purpose: Hold the transport policy the dispatcher applies to every call.
//! Exports: `TransportSettings`, `Transport`.
//! Role: Owns the HTTP agents and the mutable settings read at call time.
//! Invariants: Settings are snapshotted once per call, never cached across calls.
//! Invariants: Plain-http endpoints are refused unless explicitly allowed.
//! Invariants: Trust-all disables certificate and hostname checks; never use it in production.
#![allow(clippy::result_large_err)]

use super::error::{Error, ErrorKind};
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use ureq::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use ureq::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use ureq::rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use url::Url;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TransportSettings {
    /// `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
    pub insecure_http_allowed: bool,
    pub trust_all_certificates: bool,
    pub streaming: bool,
}

impl TransportSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero duration means no timeout.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout.filter(|timeout| !timeout.is_zero());
        self
    }

    pub fn with_insecure_http_allowed(mut self, allowed: bool) -> Self {
        self.insecure_http_allowed = allowed;
        self
    }

    pub fn with_trust_all_certificates(mut self, trust_all: bool) -> Self {
        self.trust_all_certificates = trust_all;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Refuses `http` targets unless insecure transport is allowed.
    pub fn check_scheme(&self, url: &Url) -> Result<(), Error> {
        if url.scheme() == "http" && !self.insecure_http_allowed {
            return Err(Error::new(ErrorKind::Transport)
                .with_message(format!("refusing insecure http connection to {url}"))
                .with_hint("Use an https endpoint or call set_insecure_http_allowed(true)."));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AcceptAllServerCertVerifier;

impl ServerCertVerifier for AcceptAllServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ureq::rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Shared transport state: two agents (verifying and trust-all) and the
/// live settings that pick between them.
pub struct Transport {
    settings: RwLock<TransportSettings>,
    verified: ureq::Agent,
    trust_all: ureq::Agent,
}

impl Transport {
    pub fn new(settings: TransportSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            verified: ureq::AgentBuilder::new().build(),
            trust_all: trust_all_agent(),
        }
    }

    /// Same as `new`, but certificate verification trusts only the PEM bundle at `path`.
    pub fn with_ca_file(settings: TransportSettings, path: &Path) -> Result<Self, Error> {
        let roots = load_ca_roots(path)?;
        let tls_config = ureq::rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            settings: RwLock::new(settings),
            verified: ureq::builder().tls_config(Arc::new(tls_config)).build(),
            trust_all: trust_all_agent(),
        })
    }

    pub fn settings(&self) -> TransportSettings {
        *self
            .settings
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn update(&self, apply: impl FnOnce(&mut TransportSettings)) {
        let mut settings = self
            .settings
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        apply(&mut settings);
    }

    /// Builds a request under `settings`, which the caller snapshotted for this call.
    pub fn request(&self, settings: &TransportSettings, method: &str, url: &Url) -> ureq::Request {
        let agent = if settings.trust_all_certificates {
            if url.scheme() == "https" {
                tracing::warn!(%url, "sending request with TLS certificate checks disabled");
            }
            &self.trust_all
        } else {
            &self.verified
        };
        let request = agent.request(method, url.as_str());
        match settings.read_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

fn trust_all_agent() -> ureq::Agent {
    let _ = ureq::rustls::crypto::aws_lc_rs::default_provider().install_default();
    let tls_config = ureq::rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAllServerCertVerifier))
        .with_no_client_auth();
    ureq::builder().tls_config(Arc::new(tls_config)).build()
}

fn load_ca_roots(path: &Path) -> Result<ureq::rustls::RootCertStore, Error> {
    let cert_bytes = std::fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read TLS CA/certificate file")
            .with_path(path)
            .with_source(err)
    })?;
    let mut cert_reader = Cursor::new(cert_bytes);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to parse TLS CA/certificate file")
                .with_path(path)
                .with_source(err)
        })?;
    if certs.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("TLS CA/certificate file contains no certificates")
            .with_path(path));
    }

    let _ = ureq::rustls::crypto::aws_lc_rs::default_provider().install_default();
    let mut root_store = ureq::rustls::RootCertStore::empty();
    let (added, _) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("TLS CA/certificate file contains no parsable certificates")
            .with_path(path));
    }
    Ok(root_store)
}

/// Maps a ureq transport failure (DNS, connect, TLS, timeout) onto `Transport`.
pub fn transport_error(err: ureq::Transport, url: &Url) -> Error {
    let message = match err.kind() {
        ureq::ErrorKind::Dns => "could not resolve host",
        ureq::ErrorKind::ConnectionFailed => "connection failed",
        ureq::ErrorKind::TooManyRedirects => "too many redirects",
        ureq::ErrorKind::BadStatus | ureq::ErrorKind::BadHeader => "malformed http response",
        ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => "invalid endpoint url",
        _ => "request failed",
    };
    Error::new(ErrorKind::Transport)
        .with_message(format!("{message}: {url}"))
        .with_source(err)
}
