/// Workload manifest parsing and kind classification
use serde_yaml::Value;
use std::fmt;

use crate::error::{Result, WorkloadError};
use crate::utils::value::scalar_to_string;

/// Workload kinds managed through the apps/v1 API group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// Collections probed for a named resource whose kind is unknown, in order
    pub const PROBE_ORDER: [WorkloadKind; 2] = [WorkloadKind::Deployment, WorkloadKind::StatefulSet];

    /// Match a manifest `kind` exactly
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(Self::Deployment),
            "StatefulSet" => Some(Self::StatefulSet),
            _ => None,
        }
    }

    /// Kind as written in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
        }
    }

    /// REST collection name under apps/v1
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Deployment => "deployments",
            Self::StatefulSet => "statefulsets",
        }
    }

    /// Singular lowercase resource name
    pub fn resource(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed Deployment or StatefulSet manifest
#[derive(Debug, Clone)]
pub struct Manifest {
    kind: WorkloadKind,
    document: Value,
}

impl Manifest {
    /// Parse a YAML (or JSON) document and accept it only if its kind is supported
    pub fn parse(text: &str) -> Result<Self> {
        let document: Value =
            serde_yaml::from_str(text).map_err(|e| WorkloadError::InvalidManifest(e.to_string()))?;

        let kind = document
            .get("kind")
            .and_then(scalar_to_string)
            .unwrap_or_default();

        match WorkloadKind::from_kind(&kind) {
            Some(kind) => Ok(Self { kind, document }),
            None => Err(WorkloadError::UnsupportedKind { kind }),
        }
    }

    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    /// `metadata.name`, if the manifest sets one
    pub fn name(&self) -> Option<&str> {
        self.document
            .get("metadata")
            .and_then(|metadata| metadata.get("name"))
            .and_then(Value::as_str)
    }

    /// Serialize the full document as a JSON request body
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.document).map_err(|e| WorkloadError::InvalidManifest(e.to_string()))
    }
}
