//! The charm source interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use halyard_bundle::CharmUrl;

use crate::error::ApiResult;

/// An opaque serialized macaroon authorizing access to one charm
/// entity. The engine never inspects it, only forwards it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macaroon(String);

impl Macaroon {
    pub fn new(token: impl Into<String>) -> Macaroon {
        Macaroon(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolves charm references and hands out charm-scoped authorization.
///
/// Covers both the remote charm store (`cs:`) and a local repository
/// (`local:`): resolution fills in whatever the reference omitted
/// (schema, series, latest revision).
#[async_trait]
pub trait CharmSource: Send + Sync {
    /// Resolve a charm reference to a fully qualified URL.
    async fn resolve(&self, charm_ref: &str) -> ApiResult<CharmUrl>;

    /// Obtain a macaroon scoped to the given charm entity.
    async fn delegatable_macaroon(&self, url: &CharmUrl) -> ApiResult<Macaroon>;
}
