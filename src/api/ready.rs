//! `POST /ready`: the in-guest agent's readiness callback.
//!
//! The request body is ignored; the semantic argument is the poster's
//! source IP, which the host sees because the agent reaches this endpoint
//! over the TAP/bridge (or CNI) network it was just provisioned on.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;

use crate::state::Controller;

pub async fn handle(
    State(controller): State<Controller>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> StatusCode {
    if let std::net::IpAddr::V4(ip) = addr.ip() {
        controller.mark_ready(ip);
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::extract::{ConnectInfo, State};
    use axum::http::StatusCode;

    use super::handle;
    use crate::config::{BackendKind, Config};
    use crate::state::Controller;

    fn test_config() -> Config {
        Config {
            backend: BackendKind::Unikernel,
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            catalog_dir: std::path::PathBuf::from("."),
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
    async fn ready_post_for_an_unindexed_ip_responds_ok_without_panicking() {
        let controller = Controller::new(test_config()).unwrap();
        let addr: SocketAddr = "10.0.0.9:54321".parse().unwrap();

        let status = handle(State(controller), ConnectInfo(addr)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
