//! Read-only HTTP surfaces: `GET /system/functions`, `GET
//! /system/functions/<name>`, `GET /stats`.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::Controller;

use super::error::ApiError;

/// Mirrors the upstream FaaS provider's function-status shape. Replica and
/// invocation counts are placeholders, as in the source this surface is
/// modeled on — real values would require tracking live replica counts per
/// function, which this control plane does not do beyond the ready pool
/// itself.
#[derive(Debug, Serialize)]
pub struct FunctionSummary {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Replicas")]
    pub replicas: u32,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "AvailableReplicas")]
    pub available_replicas: u32,
    #[serde(rename = "InvocationCount")]
    pub invocation_count: u64,
    #[serde(rename = "Labels")]
    pub labels: HashMap<String, String>,
    #[serde(rename = "Annotations")]
    pub annotations: HashMap<String, String>,
    #[serde(rename = "Namespace")]
    pub namespace: String,
    #[serde(rename = "Secrets")]
    pub secrets: Vec<String>,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

impl FunctionSummary {
    fn placeholder(name: String) -> Self {
        Self {
            name,
            replicas: 1,
            image: "None".to_string(),
            available_replicas: 1,
            invocation_count: 0,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            namespace: "openfaas".to_string(),
            secrets: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

pub async fn list_functions(State(controller): State<Controller>) -> impl IntoResponse {
    let summaries: Vec<FunctionSummary> = controller
        .catalog()
        .functions()
        .iter()
        .cloned()
        .map(FunctionSummary::placeholder)
        .collect();

    Json(summaries)
}

pub async fn get_function(
    State(controller): State<Controller>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !controller.catalog().contains(&name) {
        return Err(ApiError::not_found(format!("function {name} does not exist")));
    }
    Ok(Json(FunctionSummary::placeholder(name)))
}

pub async fn stats(State(controller): State<Controller>) -> impl IntoResponse {
    Json(controller.stats().summary())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::{BackendKind, Config};
    use crate::state::Controller;

    fn test_config(catalog_dir: std::path::PathBuf) -> Config {
        Config {
            backend: BackendKind::Unikernel,
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            catalog_dir,
            bridge_name: "ofhbr".to_string(),
            bridge_ip: "172.44.0.1".to_string(),
            bridge_mask: 16,
            tap_prefix: "ofhtap".to_string(),
            disable_vm_reuse: false,
            dispatch_timeout: Duration::from_secs(5),
            log_level: "error".to_string(),
        }
    }

    #[tokio::test]
    async fn list_functions_reports_every_catalog_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("unikernels").join("pi")).unwrap();
        std::fs::create_dir_all(dir.path().join("unikernels").join("hello")).unwrap();

        let controller = Controller::new(test_config(dir.path().to_path_buf())).unwrap();
        controller.register_catalog_pools();

        let app = crate::api::create_router(controller);
        let request = Request::builder()
            .uri("/system/functions")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let summaries: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        let mut names: Vec<_> = summaries
            .iter()
            .map(|s| s["Name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["hello".to_string(), "pi".to_string()]);
    }

    #[tokio::test]
    async fn get_function_for_unknown_name_is_a_404() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Controller::new(test_config(dir.path().to_path_buf())).unwrap();
        controller.register_catalog_pools();

        let app = crate::api::create_router(controller);
        let request = Request::builder()
            .uri("/system/functions/ghost")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_reports_the_worked_example() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Controller::new(test_config(dir.path().to_path_buf())).unwrap();
        for n in [1, 2, 3, 4, 5] {
            controller.stats().record_vm_init(n);
        }

        let app = crate::api::create_router(controller);
        let request = Request::builder().uri("/stats").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let summary: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary["NumbInitVms"], 5);
        assert_eq!(summary["VmInitTimeNanoAvg"], 3);
        assert_eq!(summary["VmInitTimeNano95"], 5);
        assert_eq!(summary["VmInitTimeNanoMax"], 5);
    }
}
