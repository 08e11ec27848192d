//! Door DTOs
//!
//! The `door` tool runs on the cluster login node and acts on a single
//! container. It receives the container together with the identity of the pod
//! it belongs to, so the per-pod working directory can be derived remotely.

use serde::{Deserialize, Serialize};

use crate::domain::container::ContainerSpec;
use crate::domain::pod::{Pod, PodRef};

/// A container addressed to the `door` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorContainer {
    pub pod: PodRef,
    pub spec: ContainerSpec,
}

impl DoorContainer {
    /// Builds the request for one of the pod's containers
    ///
    /// Pod annotations are folded into the container spec.
    pub fn for_container(pod: &Pod, container: &ContainerSpec) -> Self {
        Self {
            pod: pod.pod_ref(),
            spec: pod.effective_spec(container),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_keeps_pod_annotations() {
        let pod = Pod::new("ns", "p").with_annotation("slurm-job.hpk.io/flags", "--exclusive");
        let container = ContainerSpec::new("main", "busybox");
        let door = DoorContainer::for_container(&pod, &container);

        let json = serde_json::to_string(&door).unwrap();
        let decoded: DoorContainer = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, door);
        assert_eq!(
            decoded.spec.annotation("slurm-job.hpk.io/flags"),
            Some("--exclusive")
        );
    }
}
