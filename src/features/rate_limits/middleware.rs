use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::core::error::AppError;
use crate::features::rate_limits::models::RetryPolicy;
use crate::features::rate_limits::services::RateLimitEngine;

/// Result of running the admission loop for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted { attempts: u32 },
    Rejected { attempts: u32 },
}

/// Asks the engine for a token, retrying after `retryDelay` up to `maxRetries` times.
///
/// Attempts are strictly sequential. Dropping the returned future while it
/// waits cancels the pending attempt without consuming a token.
pub async fn admit_with_retry(
    engine: &RateLimitEngine,
    client_id: &str,
    route: &str,
) -> AdmissionOutcome {
    // Policy of the bucket that denied first
    let mut retry: Option<RetryPolicy> = None;
    let mut attempt: u32 = 0;
    loop {
        if engine.admit(client_id, route).await {
            tracing::debug!(
                "Admitted {}:{} on attempt {}",
                client_id,
                route,
                attempt + 1
            );
            return AdmissionOutcome::Admitted {
                attempts: attempt + 1,
            };
        }

        let policy = retry.get_or_insert_with(|| engine.retry_policy(client_id, route));
        if attempt >= policy.max_retries {
            return AdmissionOutcome::Rejected {
                attempts: attempt + 1,
            };
        }

        tracing::warn!(
            "Rate limit hit for {}:{}, retry {}/{} in {}ms",
            client_id,
            route,
            attempt + 1,
            policy.max_retries,
            policy.retry_delay.as_millis()
        );
        tokio::time::sleep(policy.retry_delay).await;
        attempt += 1;
    }
}

/// Admission control in front of proxied routes.
///
/// Requires the client identity header; forwards admitted requests unchanged
/// and answers 429 once the retries are spent.
pub async fn admission_middleware(
    State(engine): State<Arc<RateLimitEngine>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = &engine.settings().client_header;
    let client_id = req
        .headers()
        .get(header)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| AppError::BadRequest(format!("Missing {} header", header)))?;

    let route = req.uri().path().to_owned();

    match admit_with_retry(&engine, &client_id, &route).await {
        AdmissionOutcome::Admitted { .. } => Ok(next.run(req).await),
        AdmissionOutcome::Rejected { attempts } => {
            tracing::warn!(
                "Rejected {}:{} after {} attempt(s)",
                client_id,
                route,
                attempts
            );
            Err(AppError::RateLimitExceeded(
                "Too many requests".to_string(),
            ))
        }
    }
}
