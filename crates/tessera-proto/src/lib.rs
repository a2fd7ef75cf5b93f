//! Centralized wire protocol definitions.
//!
//! All protobuf messages and the tonic service stubs live here, together
//! with the conversions between wire messages and the domain types in
//! `tessera-core`. Logic in this crate is limited to those conversions.

pub mod convert;

/// Generated code for the `tessera.v1` protocol package.
pub mod v1 {
    #![allow(clippy::all)]
    tonic::include_proto!("tessera.v1");
}

pub use convert::{ConvertError, FromOptionalField};
