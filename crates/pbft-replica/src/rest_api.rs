use crate::{metrics, NodeSnapshot, Replica};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use pbft_common::Transaction;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct MakeTxRequest {
    data: String,
}

pub async fn make_tx(
    State(replica): State<Arc<Replica>>,
    Json(req): Json<MakeTxRequest>,
) -> Result<Json<Transaction>, String> {
    replica
        .submit_transaction(req.data)
        .await
        .map(Json)
        .map_err(|e| e.to_string())
}

pub async fn info(State(replica): State<Arc<Replica>>) -> Json<NodeSnapshot> {
    Json(replica.snapshot().await)
}

pub async fn metrics_text() -> String {
    metrics::gather_text()
}

/// Admin routes: `POST /makeTx`, `GET /info`, `GET /metrics`.
pub fn router(replica: Arc<Replica>) -> Router {
    Router::new()
        .route("/makeTx", post(make_tx))
        .route("/info", get(info))
        .route("/metrics", get(metrics_text))
        .with_state(replica)
}
