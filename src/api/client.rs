//! Purpose: Public construction and configuration surface for the RPC client.
//! Exports: `ClientBuilder`, `RpcClient`.
//! Role: Validates the endpoint and credential once, then shares one `Caller` across clones.
//! Invariants: A client only exists after its credential (if any) validated successfully.
//! Invariants: Setters change transport settings for calls issued after the change.
#![allow(clippy::result_large_err)]

use crate::core::caller::{AuthPolicy, Caller};
use crate::core::credential::{AuthService, AuthToken, Credential, DEFAULT_AUTH_URL};
use crate::core::envelope::RpcContext;
use crate::core::error::{Error, ErrorKind};
use crate::core::shape::ResultShape;
use crate::core::transport::{Transport, TransportSettings};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug)]
pub struct ClientBuilder {
    url: String,
    credential: Credential,
    auth_url: String,
    tls_ca_file: Option<PathBuf>,
    settings: TransportSettings,
}

impl ClientBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credential: Credential::Anonymous,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            tls_ca_file: None,
            settings: TransportSettings::default(),
        }
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn token(self, token: impl Into<String>) -> Self {
        self.credential(Credential::token(token))
    }

    pub fn user_password(self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credential(Credential::user_password(user, password))
    }

    pub fn auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    pub fn tls_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls_ca_file = Some(path.into());
        self
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings = self.settings.with_read_timeout(timeout);
        self
    }

    pub fn insecure_http_allowed(mut self, allowed: bool) -> Self {
        self.settings = self.settings.with_insecure_http_allowed(allowed);
        self
    }

    /// Disables TLS certificate and hostname verification. Test environments only.
    pub fn trust_all_certificates(mut self, trust_all: bool) -> Self {
        self.settings = self.settings.with_trust_all_certificates(trust_all);
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.settings = self.settings.with_streaming(streaming);
        self
    }

    pub fn build(self) -> ApiResult<RpcClient> {
        let endpoint = normalize_endpoint(&self.url)?;
        let transport = match &self.tls_ca_file {
            Some(path) => Transport::with_ca_file(self.settings, path)?,
            None => Transport::new(self.settings),
        };
        let token = match self.credential {
            Credential::Anonymous => None,
            credential => AuthService::new(&self.auth_url)?.resolve(&transport, credential)?,
        };
        Ok(RpcClient {
            caller: Arc::new(Caller::new(endpoint, token, transport)),
        })
    }
}

/// Cheap to clone; clones share the credential, settings, and capture override.
#[derive(Clone)]
pub struct RpcClient {
    caller: Arc<Caller>,
}

impl RpcClient {
    /// Anonymous client; no network access happens here.
    pub fn new(url: impl Into<String>) -> ApiResult<Self> {
        ClientBuilder::new(url).build()
    }

    pub fn builder(url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(url)
    }

    pub fn url(&self) -> &Url {
        self.caller.endpoint()
    }

    pub fn token(&self) -> Option<&AuthToken> {
        self.caller.token()
    }

    pub fn transport_settings(&self) -> TransportSettings {
        self.caller.transport().settings()
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.transport_settings().read_timeout
    }

    /// `None` or a zero duration waits indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.caller.transport().update(|settings| {
            *settings = settings.with_read_timeout(timeout);
        });
    }

    pub fn is_insecure_http_allowed(&self) -> bool {
        self.transport_settings().insecure_http_allowed
    }

    pub fn set_insecure_http_allowed(&self, allowed: bool) {
        self.caller
            .transport()
            .update(|settings| settings.insecure_http_allowed = allowed);
    }

    pub fn is_all_certificates_trusted(&self) -> bool {
        self.transport_settings().trust_all_certificates
    }

    /// When true, certificate chains and hostnames are not verified at all.
    /// Unsafe outside test or internal environments.
    pub fn set_all_certificates_trusted(&self, trust_all: bool) {
        self.caller
            .transport()
            .update(|settings| settings.trust_all_certificates = trust_all);
    }

    pub fn is_streaming(&self) -> bool {
        self.transport_settings().streaming
    }

    /// Streaming sends request bodies with chunked transfer encoding;
    /// the server must accept chunked requests.
    pub fn set_streaming(&self, streaming: bool) {
        self.caller
            .transport()
            .update(|settings| settings.streaming = streaming);
    }

    /// The next call (only) writes its raw response body to `path`.
    pub fn set_file_for_next_response(&self, path: impl Into<PathBuf>) {
        self.caller.set_file_for_next_response(Some(path.into()));
    }

    pub fn clear_file_for_next_response(&self) {
        self.caller.set_file_for_next_response(None);
    }

    pub fn file_for_next_response(&self) -> Option<PathBuf> {
        self.caller.file_for_next_response()
    }

    pub fn invoke<A, S>(
        &self,
        method: &str,
        args: &A,
        shape: &S,
        context: Option<&RpcContext>,
    ) -> ApiResult<S::Output>
    where
        A: Serialize + Sync + ?Sized,
        S: ResultShape,
    {
        self.caller.invoke(method, args, shape, context)
    }

    /// Like `invoke`; with `AuthPolicy::Required` an anonymous client fails
    /// with `Authorization` before anything is sent.
    pub fn invoke_with<A, S>(
        &self,
        method: &str,
        args: &A,
        shape: &S,
        context: Option<&RpcContext>,
        auth: AuthPolicy,
    ) -> ApiResult<S::Output>
    where
        A: Serialize + Sync + ?Sized,
        S: ResultShape,
    {
        self.caller.invoke_with(method, args, shape, context, auth)
    }

    pub fn call<T, A>(&self, method: &str, args: &A, context: Option<&RpcContext>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        A: Serialize + Sync + ?Sized,
    {
        self.caller.call(method, args, context)
    }
}

fn normalize_endpoint(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid service url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Usage).with_message("service url must use http or https scheme")
        );
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::new(ErrorKind::Usage).with_message("service url must include a host"));
    }
    url.set_fragment(None);
    Ok(url)
}
