//! Pods repository
//!
//! Handles communication with the control plane for pod-related operations:
//! - Listing the pods assigned to the bridge
//! - Pushing pod status updates

use anyhow::{Context, Result};
use async_trait::async_trait;
use hpk_client::ControlPlaneClient;
use hpk_core::domain::pod::{Pod, PodId};
use hpk_core::domain::status::PodStatus;
use std::sync::Arc;

/// Repository trait for pod-related operations with the control plane
#[async_trait]
pub trait PodRepository: Send + Sync {
    /// Fetches every pod currently assigned to the bridge
    async fn list_pods(&self) -> Result<Vec<Pod>>;

    /// Replaces the status of a pod
    ///
    /// # Arguments
    /// * `uid` - The pod uid
    /// * `status` - The full status, including every container status
    async fn update_pod_status(&self, uid: PodId, status: &PodStatus) -> Result<()>;
}

/// HTTP implementation of PodRepository
pub struct HttpPodRepository {
    client: Arc<ControlPlaneClient>,
}

impl HttpPodRepository {
    pub fn new(client: Arc<ControlPlaneClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodRepository for HttpPodRepository {
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.client
            .list_pods()
            .await
            .context("Failed to list pods")
    }

    async fn update_pod_status(&self, uid: PodId, status: &PodStatus) -> Result<()> {
        self.client
            .update_pod_status(uid, status)
            .await
            .with_context(|| format!("Failed to update status of pod {}", uid))
    }
}
