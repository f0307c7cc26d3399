//! Control-plane error causes.
//!
//! Recovery decisions (reuse an existing service, skip an existing
//! relation, acquire a macaroon) are driven by typed causes. Control
//! planes that only speak message strings still work: the predicates
//! fall back to the historical message suffixes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable cause of a control-plane error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    AlreadyExists,
    RelationAlreadyExists,
    DischargeRequired,
    NotFound,
    Unauthorized,
    Other,
}

/// An error returned by the control plane or the charm store.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> ApiError {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> ApiError {
        ApiError::new(ErrorCode::Other, message)
    }

    pub fn not_found(message: impl Into<String>) -> ApiError {
        ApiError::new(ErrorCode::NotFound, message)
    }

    /// The service named in a deploy call already exists.
    pub fn is_service_already_deployed(&self) -> bool {
        self.code == ErrorCode::AlreadyExists
            || self.message.ends_with("service already exists")
    }

    /// The relation named in an add-relation call already exists.
    pub fn is_relation_already_present(&self) -> bool {
        self.code == ErrorCode::RelationAlreadyExists
            || self.message.ends_with("relation already exists")
    }

    /// The operation needs a macaroon discharge before it can proceed.
    pub fn is_discharge_required(&self) -> bool {
        self.code == ErrorCode::DischargeRequired
            || self.message.ends_with("discharge required")
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
