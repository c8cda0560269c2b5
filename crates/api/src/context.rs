use axum::http::HeaderMap;

use atelie_core::TenantId;

/// Header carrying the tenant (atelier) id on every scoped request.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// The atelier a request acts for. Inserted by the tenant middleware;
/// handlers behind it can rely on it being present.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    /// Read the tenant from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, &'static str> {
        let raw = headers
            .get(TENANT_HEADER)
            .ok_or("x-tenant-id header is required")?
            .to_str()
            .map_err(|_| "x-tenant-id header is not valid text")?;

        raw.parse::<TenantId>()
            .map(Self::new)
            .map_err(|_| "x-tenant-id must be a UUID")
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Bucket key for per-tenant rate limiting.
    pub fn rate_limit_key(&self) -> String {
        format!("tenant:{}", self.tenant_id)
    }
}
