//! Kubernetes object shapes needed to find image references.
//!
//! Only the fields that carry images are modelled. Everything else in the
//! API payload is ignored during deserialization.

use serde::Deserialize;

/// A list of workload objects (`PodList`, `ReplicaSetList` or a mixed `List`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkloadList {
    /// Listed objects.
    #[serde(default)]
    pub items: Vec<WorkloadObject>,
}

/// A pod, or any object carrying a pod template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkloadObject {
    #[serde(default)]
    spec: Option<ObjectSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ObjectSpec {
    #[serde(flatten)]
    pod: PodSpec,
    #[serde(default)]
    template: Option<PodTemplate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PodTemplate {
    #[serde(default)]
    spec: Option<PodSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpec {
    #[serde(default)]
    containers: Vec<Container>,
    #[serde(default)]
    init_containers: Vec<Container>,
    #[serde(default)]
    ephemeral_containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Container {
    #[serde(default)]
    image: Option<String>,
}

impl PodSpec {
    fn images(&self) -> impl Iterator<Item = &str> {
        self.containers
            .iter()
            .chain(&self.init_containers)
            .chain(&self.ephemeral_containers)
            .filter_map(|container| container.image.as_deref())
            .filter(|image| !image.trim().is_empty())
    }
}

impl WorkloadObject {
    /// Returns the images declared by this object's own spec and its pod
    /// template, if any.
    pub fn images(&self) -> Vec<&str> {
        let Some(spec) = &self.spec else {
            return Vec::new();
        };

        let template = spec
            .template
            .as_ref()
            .and_then(|template| template.spec.as_ref());

        spec.pod
            .images()
            .chain(template.into_iter().flat_map(PodSpec::images))
            .collect()
    }
}

impl WorkloadList {
    /// Returns every image declared by every listed object.
    pub fn images(&self) -> Vec<String> {
        self.items
            .iter()
            .flat_map(WorkloadObject::images)
            .map(ToString::to_string)
            .collect()
    }
}
