//! Purpose: Define the stable public Rust API boundary for annorpc.
//! Exports: Client construction, configuration, dispatch, typed call sites, records, errors.
//! Role: Public, additive-only surface; `core` holds the machinery behind it.
//! Invariants: Library users never need to name `core` types beyond those re-exported here.

mod client;
mod genome_annotation;
mod records;

pub use crate::core::caller::AuthPolicy;
pub use crate::core::credential::{AuthToken, Credential, DEFAULT_AUTH_URL};
pub use crate::core::envelope::RpcContext;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::shape::{NoResult, Raw, ResultShape, Typed};
pub use crate::core::transport::TransportSettings;
pub use client::{ApiResult, ClientBuilder, RpcClient};
pub use genome_annotation::{GenomeAnnotationClient, ListMap, SERVICE_NAME, StringMap};
pub use records::{
    AnnotationResults, Extra, FeatureData, FeatureIdFilters, FeatureIdMapping, ProteinData, Region,
};
