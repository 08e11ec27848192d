//! Pod domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::container::ContainerSpec;

/// Stable identifier of a pod, its control-plane uid
pub type PodId = Uuid;

/// Unit of scheduling intent: ordered init containers, then main containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub uid: PodId,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub init_containers: Vec<ContainerSpec>,
    pub containers: Vec<ContainerSpec>,
}

impl Pod {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4(),
            namespace: namespace.into(),
            name: name.into(),
            annotations: BTreeMap::new(),
            init_containers: Vec::new(),
            containers: Vec::new(),
        }
    }

    pub fn with_init_container(mut self, spec: ContainerSpec) -> Self {
        self.init_containers.push(spec);
        self
    }

    pub fn with_container(mut self, spec: ContainerSpec) -> Self {
        self.containers.push(spec);
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// `namespace/name`, used in log lines
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn pod_ref(&self) -> PodRef {
        PodRef {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            uid: self.uid,
        }
    }

    /// Container spec with the pod annotations merged in
    ///
    /// Container annotations take precedence over pod annotations.
    pub fn effective_spec(&self, container: &ContainerSpec) -> ContainerSpec {
        let mut spec = container.clone();
        let mut annotations = self.annotations.clone();
        annotations.extend(container.annotations.clone());
        spec.annotations = annotations;
        spec
    }
}

/// Identity of a pod without its containers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    pub uid: PodId,
}

impl PodRef {
    /// Scheduler job name for one of the pod's containers
    pub fn job_name(&self, container: &str) -> String {
        format!("{}-{}-{}", self.namespace, self.name, container)
    }
}
