//! `GET|POST /function/<name>`: the invocation dispatcher.
//!
//! Resolve the function's pool, acquire an instance (provisioning on miss,
//! blocking on readiness), forward the invoke, return the body, and return
//! the instance to its pool unless `DISABLE_VM_REUSE=TRUE`.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use tracing::{error, warn};

use crate::state::Controller;

use super::error::DispatchError;

pub async fn handle(
    State(controller): State<Controller>,
    Path(function): Path<String>,
) -> impl IntoResponse {
    let start = Instant::now();

    let Some(pool) = controller.pool(&function) else {
        return DispatchError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error getting VM instance for function",
        )
        .into_response();
    };

    let instance = match pool.get().await {
        Ok(instance) => instance,
        Err(e) => {
            error!(function, error = %e, "failed to provision instance");
            return DispatchError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error getting VM instance for function",
            )
            .into_response();
        }
    };

    let url = format!("http://{}:8080/invoke", instance.ip);
    let response = controller.http_client().get(&url).send().await;

    let body = match response {
        Ok(resp) => match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(function, error = %e, "failed to read function response body");
                return DispatchError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error reading function response",
                )
                .into_response();
            }
        },
        Err(e) if e.is_timeout() => {
            warn!(function, %url, "dispatch timed out, abandoning instance");
            return (StatusCode::GATEWAY_TIMEOUT, Bytes::new()).into_response();
        }
        Err(e) => {
            error!(function, %url, error = %e, "failed to invoke function instance");
            return DispatchError::new(StatusCode::INTERNAL_SERVER_ERROR, "Error invoking function")
                .into_response();
        }
    };

    if !controller.config().disable_vm_reuse {
        pool.put(instance);
    }

    let elapsed = start.elapsed();
    controller.stats().record_func_exec(elapsed.as_nanos() as i64);

    (StatusCode::OK, body).into_response()
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{BackendKind, Config};
    use crate::instance::{Instance, InstanceHandle};
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

    /// `MockServer` bound to 127.0.0.1:8080, the literal port the dispatcher
    /// hardcodes for the in-guest agent's `/invoke` endpoint. Only one test
    /// in this binary may bind it at a time, which is fine since this is the
    /// sole consumer.
    async fn mock_agent_on_8080() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:8080").expect("port 8080 free for test");
        MockServer::builder().listener(listener).start().await
    }

    #[tokio::test]
    async fn dispatch_reuses_a_warm_instance_and_returns_its_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("unikernels").join("pi")).unwrap();

        let server = mock_agent_on_8080().await;
        Mock::given(method("GET"))
            .and(path("/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_string("3.1415"))
            .mount(&server)
            .await;

        let controller = Controller::new(test_config(dir.path().to_path_buf())).unwrap();
        controller.register_catalog_pools();

        let instance = Instance::new(
            "127.0.0.1".to_string(),
            "pi".to_string(),
            BackendKind::Unikernel,
            "127.0.0.1".parse().unwrap(),
            None,
            InstanceHandle::Container("unused".to_string()),
        );
        controller.pool("pi").unwrap().put(std::sync::Arc::new(instance));

        let app = crate::api::create_router(controller.clone());
        let request = Request::builder()
            .uri("/function/pi")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"3.1415");

        assert_eq!(controller.pool("pi").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_to_unregistered_function_returns_literal_error_body() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Controller::new(test_config(dir.path().to_path_buf())).unwrap();
        controller.register_catalog_pools();

        let app = crate::api::create_router(controller);
        let request = Request::builder()
            .uri("/function/ghost")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Error getting VM instance for function");
    }
}
