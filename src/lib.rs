//! Purpose: Typed JSON-RPC client library for the genome annotation service.
//! Exports: `core` (dispatch, transport, credentials, errors) and `api` (public surface).
//! Role: Backs the `annorpc` CLI; `api` is the stable entry point for library users.
//! Invariants: Calls are blocking; no async runtime is required by library users.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
