//! Uniform mapping of internal failures onto gRPC statuses.

use std::fmt;
use tessera_core::AccessError;
use tessera_proto::ConvertError;
use tonic::Status;

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

/// Everything a request handler can fail with.
#[derive(Debug)]
pub enum ServerError {
    /// The provider id is not registered. Maps to NOT_FOUND, which tells
    /// the FDW client to re-register.
    UnknownProvider(String),
    /// The table declines this write operation.
    Unsupported(&'static str),
    /// A component failure, carried through unchanged.
    Access(AccessError),
    /// A malformed wire message.
    Convert(ConvertError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::UnknownProvider(id) => write!(f, "provider not registered: {}", id),
            ServerError::Unsupported(op) => write!(f, "{} not supported", op),
            ServerError::Access(e) => write!(f, "{}", e),
            ServerError::Convert(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<AccessError> for ServerError {
    fn from(e: AccessError) -> Self {
        ServerError::Access(e)
    }
}

impl From<ConvertError> for ServerError {
    fn from(e: ConvertError) -> Self {
        ServerError::Convert(e)
    }
}

impl From<ServerError> for Status {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::UnknownProvider(_) => Status::not_found(e.to_string()),
            ServerError::Unsupported(_) => Status::unimplemented(e.to_string()),
            ServerError::Convert(_) => Status::invalid_argument(e.to_string()),
            ServerError::Access(access) => {
                let message = access.to_string();
                match access {
                    AccessError::ProviderNotFound(_) => Status::not_found(message),
                    AccessError::ProviderInit(_) => Status::failed_precondition(message),
                    // unknown table names come from the client
                    AccessError::TableNotFound(_) => Status::invalid_argument(message),
                    AccessError::InvalidQuery(_) => Status::invalid_argument(message),
                    AccessError::UnsupportedQueryShape(_) => Status::internal(message),
                    AccessError::ProviderRead(_) => Status::internal(message),
                    AccessError::ResourceExceeded(_) => Status::resource_exhausted(message),
                    AccessError::Cancelled => Status::cancelled(message),
                }
            }
        }
    }
}
