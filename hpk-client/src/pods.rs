//! Pod API endpoints

use crate::error::{ClientError, Result};
use crate::{ControlPlaneClient, check_status};
use hpk_core::domain::pod::{Pod, PodId};
use hpk_core::domain::status::PodStatus;
use tracing::debug;

impl ControlPlaneClient {
    /// List the pods scheduled onto this node
    pub async fn list_pods(&self) -> Result<Vec<Pod>> {
        let url = format!("{}/api/pods", self.base_url);
        let response = check_status(self.client.get(&url).send().await?).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse pod list: {}", e)))
    }

    /// Replace the status of a pod
    ///
    /// # Arguments
    /// * `uid` - The pod uid
    /// * `status` - The full pod status, including every container status
    pub async fn update_pod_status(&self, uid: PodId, status: &PodStatus) -> Result<()> {
        let url = format!("{}/api/pods/{}/status", self.base_url, uid);
        debug!("Pushing status of pod {}: phase={}", uid, status.phase);
        check_status(self.client.put(&url).json(status).send().await?).await?;
        Ok(())
    }
}
