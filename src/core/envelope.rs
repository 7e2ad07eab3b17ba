//! Purpose: Define the JSON-RPC call and response envelopes exchanged with the service.
//! Exports: `RpcContext`, `CallEnvelope`, `ResponseEnvelope`, `RemoteError`.
//! Role: Pure encode/decode layer; no network access happens here.
//! Invariants: Request bodies always carry `method`, `params` (array), `version`, `id`.
//! Invariants: Arguments are borrowed and encoded straight to the output, never copied into a tree.
//! Invariants: An empty context is omitted from the request body.
//! Invariants: Only element 0 of a `result` array ever leaves this module.
#![allow(clippy::result_large_err)]

use super::body::BodyWriter;
use super::error::{Error, ErrorKind};
use serde::ser::{SerializeSeq, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::io::{self, Write};

pub const PROTOCOL_VERSION: &str = "1.1";

type EnvelopeResult<T> = Result<T, Error>;

/// Call-scoped metadata forwarded to the server alongside a procedure call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RpcContext {
    entries: Map<String, Value>,
}

impl RpcContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }
}

impl From<Map<String, Value>> for RpcContext {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}

/// The request body for one procedure invocation, borrowing its arguments.
pub struct CallEnvelope<'a, A: ?Sized> {
    method: &'a str,
    args: &'a A,
    no_args: bool,
    id: String,
    context: Option<&'a RpcContext>,
}

impl<'a, A> CallEnvelope<'a, A>
where
    A: Serialize + ?Sized,
{
    /// Accepts any value that serializes to a JSON array.
    /// Tuples, slices and `Vec`s qualify; `()` means no arguments.
    pub fn new(
        method: &'a str,
        args: &'a A,
        context: Option<&'a RpcContext>,
        id: String,
    ) -> EnvelopeResult<Self> {
        if method.trim().is_empty() {
            return Err(
                Error::new(ErrorKind::Usage).with_message("procedure name must not be empty")
            );
        }
        let no_args = match leading_byte(args) {
            Ok(b'[') => false,
            Ok(b'n') => true,
            Ok(_) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("procedure arguments must serialize to a JSON array")
                    .with_method(method)
                    .with_hint("Pass arguments as a tuple, array, or Vec."));
            }
            Err(err) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("failed to encode procedure arguments")
                    .with_method(method)
                    .with_source(err));
            }
        };
        Ok(Self {
            method,
            args,
            no_args,
            id,
            context: context.filter(|context| !context.is_empty()),
        })
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> Option<&RpcContext> {
        self.context
    }

    pub fn to_vec(&self) -> EnvelopeResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to encode request json")
                .with_method(self.method)
                .with_source(err)
        })
    }

    /// Encodes the envelope into a streamed body, then closes it.
    /// On failure the body is marked broken so the reader never sees a clean end.
    pub fn stream_into(&self, mut writer: BodyWriter) -> serde_json::Result<()> {
        let result = serde_json::to_writer(&mut writer, self)
            .and_then(|()| writer.flush().map_err(serde_json::Error::io));
        if result.is_err() {
            writer.fail();
        }
        result
    }
}

impl<A> Serialize for CallEnvelope<'_, A>
where
    A: Serialize + ?Sized,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = 4 + usize::from(self.context.is_some());
        let mut state = serializer.serialize_struct("CallEnvelope", fields)?;
        state.serialize_field("method", self.method)?;
        state.serialize_field(
            "params",
            &Params {
                args: self.args,
                empty: self.no_args,
            },
        )?;
        state.serialize_field("version", PROTOCOL_VERSION)?;
        state.serialize_field("id", &self.id)?;
        if let Some(context) = self.context {
            state.serialize_field("context", context)?;
        }
        state.end()
    }
}

struct Params<'a, A: ?Sized> {
    args: &'a A,
    empty: bool,
}

impl<A> Serialize for Params<'_, A>
where
    A: Serialize + ?Sized,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.empty {
            serializer.serialize_seq(Some(0))?.end()
        } else {
            self.args.serialize(serializer)
        }
    }
}

/// First byte `serde_json` emits for `value`; encoding stops right after it.
fn leading_byte<A: Serialize + ?Sized>(value: &A) -> serde_json::Result<u8> {
    let mut first = LeadingByte(None);
    match serde_json::to_writer(&mut first, value) {
        Err(err) if !(err.is_io() && first.0.is_some()) => return Err(err),
        _ => {}
    }
    first
        .0
        .ok_or_else(|| <serde_json::Error as serde::ser::Error>::custom("arguments encode to nothing"))
}

struct LeadingByte(Option<u8>);

impl Write for LeadingByte {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match buf.first() {
            Some(&byte) => {
                self.0 = Some(byte);
                Err(io::Error::other("leading byte captured"))
            }
            None => Ok(0),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Structured error descriptor carried by a failed response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    /// Server-side trace; some servers name this field `data`.
    #[serde(default, alias = "data")]
    pub error: Option<Value>,
}

impl RemoteError {
    pub fn into_error(self, method: &str) -> Error {
        let mut err = Error::new(ErrorKind::Protocol)
            .with_method(method)
            .with_message(
                self.message
                    .unwrap_or_else(|| "remote procedure failed".to_string()),
            );
        if let Some(code) = self.code {
            err = err.with_code(code);
        }
        if let Some(name) = self.name {
            err = err.with_name(name);
        }
        match self.error {
            Some(Value::String(trace)) => err = err.with_trace(trace),
            Some(Value::Null) | None => {}
            Some(other) => err = err.with_trace(other.to_string()),
        }
        err
    }
}

/// Decoded server reply. Success carries `result`, failure carries `error`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

impl ResponseEnvelope {
    /// Checks the envelope against the request it answers and returns
    /// element 0 of the `result` array. When `expects_value` is false an
    /// empty or missing `result` yields `Value::Null` instead of an error.
    pub fn into_first(
        self,
        method: &str,
        request_id: &str,
        expects_value: bool,
    ) -> EnvelopeResult<Value> {
        if let Some(remote) = self.error {
            return Err(remote.into_error(method));
        }
        if let Some(id) = &self.id {
            let matches = match id {
                Value::String(id) => id == request_id,
                Value::Number(id) => id.to_string() == request_id,
                Value::Null => true,
                _ => false,
            };
            if !matches {
                return Err(Error::new(ErrorKind::Protocol)
                    .with_message(format!(
                        "response id {id} does not match request id {request_id}"
                    ))
                    .with_method(method));
            }
        }
        match self.result {
            Some(Value::Array(values)) => {
                let count = values.len();
                match values.into_iter().next() {
                    Some(first) => {
                        if count > 1 {
                            tracing::debug!(method, count, "ignoring extra result elements");
                        }
                        Ok(first)
                    }
                    None if expects_value => Err(Error::new(ErrorKind::Protocol)
                        .with_message("response result array is empty")
                        .with_method(method)),
                    None => Ok(Value::Null),
                }
            }
            Some(Value::Null) | None if !expects_value => Ok(Value::Null),
            Some(Value::Null) | None => Err(Error::new(ErrorKind::Protocol)
                .with_message("response carries neither result nor error")
                .with_method(method)),
            Some(_) => Err(Error::new(ErrorKind::Protocol)
                .with_message("response result is not an array")
                .with_method(method)),
        }
    }
}
