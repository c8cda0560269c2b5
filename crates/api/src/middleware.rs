use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};

use atelie_infra::rate_limit::RateLimiter;

use crate::app::errors;
use crate::context::TenantContext;

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<dyn RateLimiter>,
}

/// Resolve the tenant from `x-tenant-id` and attach a [`TenantContext`].
pub async fn tenant_middleware(mut req: Request<Body>, next: Next) -> Response {
    let tenant = match TenantContext::from_headers(req.headers()) {
        Ok(t) => t,
        Err(message) => return errors::json_error(StatusCode::BAD_REQUEST, "missing_tenant", message),
    };

    req.extensions_mut().insert(tenant);
    next.run(req).await
}

/// Per-tenant rate limiting. Must run after [`tenant_middleware`].
///
/// When the limiter backend is unreachable the request is let through.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(tenant) = req.extensions().get::<TenantContext>().copied() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "missing_tenant", "tenant context missing");
    };

    let limiter = state.limiter.clone();
    let key = tenant.rate_limit_key();
    let decision = tokio::task::spawn_blocking(move || limiter.check(&key)).await;

    match decision {
        Ok(Ok(d)) if d.allowed => {
            let mut res = next.run(req).await;
            res.headers_mut()
                .insert("x-ratelimit-remaining", HeaderValue::from(d.remaining));
            res
        }
        Ok(Ok(d)) => {
            let mut res = errors::json_error(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                format!("too many requests; retry in {}s", d.reset_after.as_secs().max(1)),
            );
            res.headers_mut()
                .insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            res.headers_mut()
                .insert("retry-after", HeaderValue::from(d.reset_after.as_secs().max(1)));
            res
        }
        Ok(Err(e)) => {
            warn!(tenant_id = %tenant.tenant_id(), error = %e, "rate limiter unavailable; allowing request");
            next.run(req).await
        }
        Err(e) => {
            warn!(error = %e, "rate limit check panicked; allowing request");
            next.run(req).await
        }
    }
}

/// One log line per request.
pub async fn log_requests(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let res = next.run(req).await;

    info!(
        %method,
        %path,
        status = res.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    res
}
