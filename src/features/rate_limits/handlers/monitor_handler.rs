use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, Json};

use crate::features::rate_limits::dtos::BucketSnapshotDto;
use crate::features::rate_limits::services::RateLimitEngine;

/// Token counts of every cached bucket, keyed by `clientId:route`
#[utoipa::path(
    get,
    path = "/monitor",
    responses(
        (status = 200, description = "Cached buckets", body = BTreeMap<String, BucketSnapshotDto>)
    ),
    tag = "monitor"
)]
pub async fn get_monitor(
    State(engine): State<Arc<RateLimitEngine>>,
) -> Json<BTreeMap<String, BucketSnapshotDto>> {
    let snapshot = engine
        .snapshot()
        .into_iter()
        .map(|(key, bucket)| (key, bucket.into()))
        .collect();

    Json(snapshot)
}
