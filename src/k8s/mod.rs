/// Kubernetes workload operations over the REST API
pub mod client;
pub mod manifest;

pub use client::{Applied, KubernetesClient};
pub use manifest::Manifest;
