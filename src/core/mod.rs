// Core modules implementing call dispatch, transport policy, credentials, and errors.
pub mod body;
pub mod caller;
pub mod credential;
pub mod envelope;
pub mod error;
pub mod shape;
pub mod transport;
