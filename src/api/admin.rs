//! `POST /preBoot/<name>`: synchronously provision N instances ahead of
//! demand and seed them into the function's ready pool.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use bytes::Bytes;
use tracing::{error, info};

use crate::state::Controller;

pub async fn pre_boot(
    State(controller): State<Controller>,
    Path(function): Path<String>,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, String)> {
    if !controller.catalog().contains(&function) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("function {function} does not exist"),
        ));
    }

    let text = String::from_utf8_lossy(&body);
    let count: u32 = text.trim().parse().map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "request body must be a decimal instance count".to_string(),
        )
    })?;

    let Some(pool) = controller.pool(&function) else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("no pool registered for function {function}"),
        ));
    };

    for _ in 0..count {
        match controller.provision(&function).await {
            Ok(instance) => pool.put(instance),
            Err(e) => {
                error!(function, error = %e, "preBoot provisioning attempt failed");
                return Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("failed to provision instance for {function}: {e}"),
                ));
            }
        }
    }

    info!(function, count, "preBoot complete");
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
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
    async fn pre_boot_for_unknown_function_is_a_500() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Controller::new(test_config(dir.path().to_path_buf())).unwrap();
        controller.register_catalog_pools();

        let app = crate::api::create_router(controller);
        let request = Request::builder()
            .method("POST")
            .uri("/preBoot/ghost")
            .body(Body::from("1"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn pre_boot_with_non_integer_body_is_a_500() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("unikernels").join("pi")).unwrap();
        let controller = Controller::new(test_config(dir.path().to_path_buf())).unwrap();
        controller.register_catalog_pools();

        let app = crate::api::create_router(controller);
        let request = Request::builder()
            .method("POST")
            .uri("/preBoot/pi")
            .body(Body::from("not-a-number"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn pre_boot_with_zero_count_provisions_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("unikernels").join("pi")).unwrap();
        let controller = Controller::new(test_config(dir.path().to_path_buf())).unwrap();
        controller.register_catalog_pools();

        let app = crate::api::create_router(controller.clone());
        let request = Request::builder()
            .method("POST")
            .uri("/preBoot/pi")
            .body(Body::from("0"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(controller.pool("pi").unwrap().len(), 0);
    }
}
