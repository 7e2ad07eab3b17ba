//! Purpose: Dispatch one JSON-RPC call and turn its reply into a typed value.
//! Exports: `Caller`, `AuthPolicy`.
//! Role: The single code path every typed call site delegates to.
//! Invariants: Each call builds its own envelope, request, and decode buffer.
//! Invariants: Transport settings are snapshotted once at call start.
//! Invariants: The capture override is taken (get-and-clear) before any other work.
//! Invariants: Streamed bodies are encoded on a scoped thread through a bounded pipe.
//! Invariants: No retries; every failure is surfaced with a distinct `ErrorKind`.
#![allow(clippy::result_large_err)]

use super::body::body_pipe;
use super::credential::AuthToken;
use super::envelope::{CallEnvelope, ResponseEnvelope, RpcContext};
use super::error::{Error, ErrorKind};
use super::shape::{ResultShape, Typed};
use super::transport::{Transport, TransportSettings, transport_error};
use getrandom::fill as fill_random;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;
use url::Url;

type CallResult<T> = Result<T, Error>;

/// Whether a procedure may be called without a bearer token.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AuthPolicy {
    #[default]
    Optional,
    /// Anonymous clients fail locally with `Authorization`; nothing is sent.
    Required,
}

pub struct Caller {
    endpoint: Url,
    token: Option<AuthToken>,
    transport: Transport,
    capture: Mutex<Option<PathBuf>>,
}

impl Caller {
    pub fn new(endpoint: Url, token: Option<AuthToken>, transport: Transport) -> Self {
        Self {
            endpoint,
            token,
            transport,
            capture: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Arms (or with `None`, disarms) the capture override for the next call.
    pub fn set_file_for_next_response(&self, path: Option<PathBuf>) {
        *self
            .capture
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = path;
    }

    pub fn file_for_next_response(&self) -> Option<PathBuf> {
        self.capture
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    fn take_capture(&self) -> Option<PathBuf> {
        self.capture
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take()
    }

    /// Calls `method` with positional `args` and decodes element 0 of the
    /// reply through `shape`.
    pub fn invoke<A, S>(
        &self,
        method: &str,
        args: &A,
        shape: &S,
        context: Option<&RpcContext>,
    ) -> CallResult<S::Output>
    where
        A: Serialize + Sync + ?Sized,
        S: ResultShape,
    {
        self.invoke_with(method, args, shape, context, AuthPolicy::Optional)
    }

    pub fn invoke_with<A, S>(
        &self,
        method: &str,
        args: &A,
        shape: &S,
        context: Option<&RpcContext>,
        auth: AuthPolicy,
    ) -> CallResult<S::Output>
    where
        A: Serialize + Sync + ?Sized,
        S: ResultShape,
    {
        let capture = self.take_capture();
        let settings = self.transport.settings();
        let started = Instant::now();

        let result = self
            .check_auth(method, auth)
            .and_then(|()| {
                self.dispatch(
                    method,
                    args,
                    context,
                    &settings,
                    capture.as_deref(),
                    shape.expects_value(),
                )
            })
            .and_then(|value| shape.decode(method, value));

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::debug!(
                method,
                streaming = settings.streaming,
                captured = capture.is_some(),
                elapsed_ms,
                "call succeeded"
            ),
            Err(err) => tracing::debug!(
                method,
                streaming = settings.streaming,
                captured = capture.is_some(),
                elapsed_ms,
                kind = ?err.kind(),
                error = %err,
                "call failed"
            ),
        }
        result
    }

    pub fn call<T, A>(&self, method: &str, args: &A, context: Option<&RpcContext>) -> CallResult<T>
    where
        T: DeserializeOwned,
        A: Serialize + Sync + ?Sized,
    {
        self.invoke(method, args, &Typed::<T>::new(), context)
    }

    fn check_auth(&self, method: &str, auth: AuthPolicy) -> CallResult<()> {
        if auth == AuthPolicy::Required && self.token.is_none() {
            return Err(Error::new(ErrorKind::Authorization)
                .with_method(method)
                .with_message("procedure requires authentication but the client is anonymous")
                .with_hint("Construct the client with a token or a user name and password."));
        }
        Ok(())
    }

    fn dispatch<A>(
        &self,
        method: &str,
        args: &A,
        context: Option<&RpcContext>,
        settings: &TransportSettings,
        capture: Option<&Path>,
        expects_value: bool,
    ) -> CallResult<Value>
    where
        A: Serialize + Sync + ?Sized,
    {
        let envelope = CallEnvelope::new(method, args, context, new_request_id()?)?;
        settings
            .check_scheme(&self.endpoint)
            .map_err(|err| err.with_method(method))?;

        let mut request = self
            .transport
            .request(settings, "POST", &self.endpoint)
            .set("Accept", "application/json")
            .set("Content-Type", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token.token()));
        }

        let request_id = envelope.id().to_string();
        tracing::trace!(method, id = %request_id, "sending call");
        let response = if settings.streaming {
            send_streaming(request, &envelope)?
        } else {
            let body = envelope.to_vec()?;
            request.send_bytes(&body)
        };

        let response = match response {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(err)) => {
                return Err(transport_error(err, &self.endpoint).with_method(method));
            }
        };
        let status = response.status();
        let reply = match capture {
            Some(path) => read_captured_envelope(response, path),
            None => read_envelope(response),
        };
        decode_reply(status, reply, method, &request_id, expects_value)
    }
}

/// Sends the envelope with chunked encoding while a scoped thread encodes it.
/// An encoding failure wins over the transport error it causes.
fn send_streaming<A>(
    request: ureq::Request,
    envelope: &CallEnvelope<'_, A>,
) -> CallResult<Result<ureq::Response, ureq::Error>>
where
    A: Serialize + Sync + ?Sized,
{
    let (writer, reader) = body_pipe();
    thread::scope(|scope| {
        let encoder = thread::Builder::new()
            .name("annorpc-body".to_string())
            .spawn_scoped(scope, move || envelope.stream_into(writer))
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to start request body encoder")
                    .with_source(err)
            })?;
        let sent = request.send(reader);
        let encoded = encoder.join().map_err(|_| {
            Error::new(ErrorKind::Usage)
                .with_message("request body encoder panicked")
                .with_method(envelope.method())
        })?;
        match encoded {
            Err(err) if !err.is_io() => Err(Error::new(ErrorKind::Usage)
                .with_message("failed to encode request json")
                .with_method(envelope.method())
                .with_source(err)),
            _ => Ok(sent),
        }
    })
}

fn new_request_id() -> CallResult<String> {
    let mut bytes = [0u8; 8];
    fill_random(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to generate request id: {err}"))
    })?;
    Ok((u64::from_le_bytes(bytes) >> 1).to_string())
}

fn read_envelope(response: ureq::Response) -> CallResult<ResponseEnvelope> {
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|err| {
            Error::new(ErrorKind::Transport)
                .with_message("failed to read response body")
                .with_source(err)
        })?;
    serde_json::from_slice(&body).map_err(|err| {
        Error::new(ErrorKind::Protocol)
            .with_message("invalid response json")
            .with_source(err)
    })
}

/// Streams the raw body to `path`, then decodes the envelope back from the file.
fn read_captured_envelope(response: ureq::Response, path: &Path) -> CallResult<ResponseEnvelope> {
    let io_error = |message: &str, err: io::Error| {
        Error::new(ErrorKind::Io)
            .with_message(message.to_string())
            .with_path(path)
            .with_source(err)
    };
    let file = File::create(path).map_err(|err| io_error("failed to create capture file", err))?;
    let mut writer = BufWriter::new(file);
    io::copy(&mut response.into_reader(), &mut writer).map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to stream response body to capture file")
            .with_path(path)
            .with_source(err)
    })?;
    writer
        .flush()
        .map_err(|err| io_error("failed to flush capture file", err))?;
    drop(writer);

    let file = File::open(path).map_err(|err| io_error("failed to reopen capture file", err))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| {
        Error::new(ErrorKind::Protocol)
            .with_message("invalid response json")
            .with_path(path)
            .with_source(err)
    })
}

fn decode_reply(
    status: u16,
    reply: CallResult<ResponseEnvelope>,
    method: &str,
    request_id: &str,
    expects_value: bool,
) -> CallResult<Value> {
    match status {
        200..=299 => reply
            .map_err(|err| err.with_method(method))?
            .into_first(method, request_id, expects_value),
        401 | 403 => {
            let mut err = Error::new(ErrorKind::Authorization)
                .with_method(method)
                .with_message(format!("authorization failed with status {status}"))
                .with_hint("Construct a new client with a valid credential.");
            if let Ok(ResponseEnvelope {
                error: Some(remote),
                ..
            }) = reply
            {
                if let Some(message) = remote.message {
                    err = err.with_message(message);
                }
                if let Some(code) = remote.code {
                    err = err.with_code(code);
                }
            }
            Err(err)
        }
        _ => match reply {
            Ok(envelope) if envelope.error.is_some() => {
                envelope.into_first(method, request_id, expects_value)
            }
            Ok(_) => Err(Error::new(ErrorKind::Protocol)
                .with_method(method)
                .with_message(format!("remote error status {status}"))),
            Err(err) => Err(Error::new(ErrorKind::Protocol)
                .with_method(method)
                .with_message(format!("remote error status {status}"))
                .with_source(err)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthPolicy, Caller, decode_reply, new_request_id};
    use crate::core::envelope::ResponseEnvelope;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::credential::AuthToken;
    use crate::core::shape::{NoResult, Raw};
    use crate::core::transport::{Transport, TransportSettings};
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use url::Url;

    fn reply(body: Value) -> Result<ResponseEnvelope, Error> {
        Ok(serde_json::from_value(body).expect("envelope"))
    }

    fn caller(endpoint: &str) -> Caller {
        Caller::new(
            Url::parse(endpoint).expect("url"),
            None,
            Transport::new(TransportSettings::default()),
        )
    }

    #[test]
    fn request_ids_are_decimal_and_vary() {
        let first = new_request_id().expect("id");
        let second = new_request_id().expect("id");
        assert!(first.chars().all(|c| c.is_ascii_digit()));
        assert_ne!(first, second);
    }

    #[test]
    fn success_status_returns_first_element() {
        let value = decode_reply(200, reply(json!({"result": ["a", "b"]})), "svc.m", "1", true)
            .expect("value");
        assert_eq!(value, json!("a"));
    }

    #[test]
    fn error_body_on_success_status_is_protocol_error() {
        let err = decode_reply(
            200,
            reply(json!({"error": {"code": -32601, "message": "method not found"}})),
            "svc.m",
            "1",
            true,
        )
        .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.code(), Some(-32601));
    }

    #[test]
    fn unauthorized_status_is_authorization_error() {
        for status in [401, 403] {
            let err = decode_reply(
                status,
                reply(json!({"error": {"code": -32400, "message": "token expired"}})),
                "svc.m",
                "1",
                true,
            )
            .expect_err("err");
            assert_eq!(err.kind(), ErrorKind::Authorization);
            assert_eq!(err.message(), Some("token expired"));
        }
    }

    #[test]
    fn server_fault_without_descriptor_is_protocol_error() {
        let unparsable = Err(Error::new(ErrorKind::Protocol).with_message("invalid response json"));
        let err = decode_reply(502, unparsable, "svc.m", "1", true).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.message(), Some("remote error status 502"));
    }

    #[test]
    fn server_fault_with_descriptor_carries_it() {
        let err = decode_reply(
            500,
            reply(json!({"error": {"name": "JSONRPCError", "code": -32500, "message": "boom"}})),
            "svc.m",
            "1",
            true,
        )
        .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.code(), Some(-32500));
        assert_eq!(err.name(), Some("JSONRPCError"));
    }

    #[test]
    fn insecure_endpoint_fails_before_sending() {
        let caller = caller("http://127.0.0.1:9/rpc");
        let err = caller
            .invoke("svc.m", &("x",), &Raw, None)
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.method(), Some("svc.m"));
    }

    #[test]
    fn capture_override_is_cleared_after_a_failed_call() {
        let caller = caller("http://127.0.0.1:9/rpc");
        caller.set_file_for_next_response(Some(PathBuf::from("/tmp/never-written.json")));
        assert!(caller.file_for_next_response().is_some());
        let _ = caller.invoke("svc.m", &(), &Raw, None);
        assert!(caller.file_for_next_response().is_none());
    }

    #[test]
    fn bad_arguments_are_usage_errors() {
        let caller = caller("https://svc.example/rpc");
        let err = caller
            .invoke("svc.m", &json!("not an array"), &Raw, None)
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn empty_reply_is_accepted_only_without_an_expected_value() {
        let body = json!({"version": "1.1", "id": "1"});
        let err = decode_reply(200, reply(body.clone()), "svc.delete_widget", "1", true)
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let value = decode_reply(200, reply(body), "svc.delete_widget", "1", false).expect("value");
        assert!(value.is_null());
    }

    #[test]
    fn anonymous_caller_is_refused_when_auth_is_required() {
        let caller = caller("https://svc.example/rpc");
        caller.set_file_for_next_response(Some(PathBuf::from("/tmp/never-written.json")));
        let err = caller
            .invoke_with("svc.m", &(), &NoResult, None, AuthPolicy::Required)
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(err.method(), Some("svc.m"));
        assert!(caller.file_for_next_response().is_none());
    }

    #[test]
    fn authenticated_caller_passes_the_auth_check() {
        let caller = Caller::new(
            Url::parse("http://127.0.0.1:9/rpc").expect("url"),
            Some(AuthToken::new("t", "alice")),
            Transport::new(TransportSettings::default()),
        );
        let err = caller
            .invoke_with("svc.m", &(), &Raw, None, AuthPolicy::Required)
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
