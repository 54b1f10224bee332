//! Error types of the pipeline.
//!
//! The typed errors live in the `fleetcast-error` workspace crate; this
//! module re-exports them together with the result aliases used across the
//! crate.

pub use fleetcast_error::{
    BusError, CommandError, ErrorExt, StatusCode, StoreError, ValidationError,
};

pub type StoreResult<T> = Result<T, StoreError>;
pub type BusResult<T> = Result<T, BusError>;
