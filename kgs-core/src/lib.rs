//! kgs core library — manifest model, identities, fingerprints, results.
//!
//! Public API surface:
//! - [`types`] — [`Manifest`] and its two variants, [`LiveState`]
//! - [`fingerprint`] — canonical hashing and annotation of desired content
//! - [`result`] — [`ReconcileResult`], [`ResultKind`], [`ErrorKind`]
//! - [`keys`] — annotation/label/values keys written onto managed objects
//! - [`error`] — [`ManifestError`]

pub mod error;
pub mod fingerprint;
pub mod keys;
pub mod result;
pub mod types;

pub use error::ManifestError;
pub use result::{ErrorKind, ReconcileResult, ResultKind};
pub use types::{ChartRef, LiveState, Manifest, ManifestId, RawManifest, ReleaseManifest};
