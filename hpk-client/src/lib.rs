//! HPK HTTP Client
//!
//! A small, typed client for the control plane API the bridge serves pods
//! from. Only the pod endpoints the bridge needs are covered:
//! - `GET /api/pods`
//! - `PUT /api/pods/{uid}/status`
//!
//! # Example
//!
//! ```no_run
//! use hpk_client::ControlPlaneClient;
//!
//! # async fn example() -> hpk_client::Result<()> {
//! let client = ControlPlaneClient::new("http://localhost:8080");
//! for pod in client.list_pods().await? {
//!     println!("{}/{}", pod.namespace, pod.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
mod pods;

pub use error::{ClientError, Result};

use reqwest::{Client, Response};

/// HTTP client for the control plane API
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    /// Base URL without a trailing slash (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl ControlPlaneClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Turns a non-2xx answer into an [`ClientError::ApiError`] carrying its body
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ClientError::api_error(status.as_u16(), message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ControlPlaneClient::new("http://control-plane:6443//");
        assert_eq!(client.base_url(), "http://control-plane:6443");
    }

    #[tokio::test]
    async fn test_unreachable_control_plane_is_transient() {
        let client = ControlPlaneClient::new("http://127.0.0.1:1");
        let err = client.list_pods().await.unwrap_err();
        assert!(matches!(err, ClientError::RequestFailed(_)));
        assert!(err.is_transient());
    }
}
