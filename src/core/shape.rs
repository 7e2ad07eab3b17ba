//! Purpose: Describe how element 0 of a response is turned into a caller-facing value.
//! Exports: `ResultShape`, `Typed`, `Raw`, `NoResult`.
//! Role: Keeps the dispatcher free of per-procedure knowledge; call sites pick the shape.
//! Invariants: Decode failures are protocol errors tagged with the procedure name.
#![allow(clippy::result_large_err)]

use super::error::{Error, ErrorKind};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

pub trait ResultShape {
    type Output;

    fn decode(&self, method: &str, value: Value) -> Result<Self::Output, Error>;

    /// False for procedures that return nothing; an empty or missing
    /// `result` is then accepted and `decode` sees `Value::Null`.
    fn expects_value(&self) -> bool {
        true
    }
}

/// Decodes element 0 into `T` with serde.
pub struct Typed<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Typed<T> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Typed<T> {}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Typed<{}>", std::any::type_name::<T>())
    }
}

impl<T> ResultShape for Typed<T>
where
    T: DeserializeOwned,
{
    type Output = T;

    fn decode(&self, method: &str, value: Value) -> Result<T, Error> {
        serde_json::from_value(value).map_err(|err| {
            Error::new(ErrorKind::Protocol)
                .with_message(format!(
                    "result does not match expected shape {}",
                    std::any::type_name::<T>()
                ))
                .with_method(method)
                .with_source(err)
        })
    }
}

/// Returns element 0 untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct Raw;

impl ResultShape for Raw {
    type Output = Value;

    fn decode(&self, _method: &str, value: Value) -> Result<Value, Error> {
        Ok(value)
    }
}

/// For procedures with no return value; whatever the server sends back is discarded.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoResult;

impl ResultShape for NoResult {
    type Output = ();

    fn decode(&self, _method: &str, _value: Value) -> Result<(), Error> {
        Ok(())
    }

    fn expects_value(&self) -> bool {
        false
    }
}
