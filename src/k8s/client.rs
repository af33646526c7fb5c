/// Kubernetes apps/v1 REST client for Deployments and StatefulSets
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::manifest::{Manifest, WorkloadKind};
use crate::config::{ConnectionConfig, BEARER_TOKEN, K8S_API, NAMESPACE, RESOURCE_NAME};
use crate::error::{Result, WorkloadError};

const APPS_V1: [&str; 3] = ["apis", "apps", "v1"];
const STRATEGIC_MERGE_PATCH: &str = "application/strategic-merge-patch+json";

/// Operation performed against the API server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Delete,
    Scale { replicas: i32 },
}

impl Action {
    fn verb(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Delete => "Delete",
            Self::Scale { .. } => "Scale",
        }
    }

    fn method(&self) -> &'static str {
        match self {
            Self::Create => "POST",
            Self::Delete => "DELETE",
            Self::Scale { .. } => "PATCH",
        }
    }
}

/// Successful result of an API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub action: Action,
    pub kind: WorkloadKind,
    pub name: Option<String>,
    pub namespace: String,
    pub status: u16,
}

impl fmt::Display for Applied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.action, &self.name) {
            (Action::Create, Some(name)) => write!(
                f,
                "Created {} '{}' in namespace '{}'",
                self.kind, name, self.namespace
            ),
            (Action::Create, None) => {
                write!(f, "Created {} in namespace '{}'", self.kind, self.namespace)
            }
            (action, name) => {
                write!(
                    f,
                    "{} succeeded on {} '{}' in namespace '{}'",
                    action.verb(),
                    self.kind.resource(),
                    name.as_deref().unwrap_or_default(),
                    self.namespace
                )?;
                if let Action::Scale { replicas } = action {
                    write!(f, " (replicas={})", replicas)?;
                }
                Ok(())
            }
        }
    }
}

/// Client for the apps/v1 workload collections of one API server
#[derive(Clone)]
pub struct KubernetesClient {
    client: Client,
    api: Url,
}

impl KubernetesClient {
    /// Create a client authenticating with the configured bearer token
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| WorkloadError::InvalidSetting {
                key: BEARER_TOKEN.to_string(),
                reason: "token contains characters not allowed in an HTTP header".to_string(),
            })?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .timeout(config.timeout);

        if config.insecure_skip_tls_verify {
            warn!("TLS certificate verification is disabled for {}", config.api);
            builder = builder.danger_accept_invalid_certs(true);
        }

        let api = Url::parse(&config.api)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| WorkloadError::InvalidSetting {
                key: K8S_API.to_string(),
                reason: format!("'{}' is not a base URL", config.api),
            })?;

        let client = builder.build().map_err(WorkloadError::HttpClient)?;

        Ok(Self { client, api })
    }

    fn collection_url(&self, namespace: &str, kind: WorkloadKind) -> Result<String> {
        self.endpoint(namespace, kind, None)
    }

    fn resource_url(&self, namespace: &str, kind: WorkloadKind, name: &str) -> Result<String> {
        self.endpoint(namespace, kind, Some(name))
    }

    /// Build `{api}/apis/apps/v1/namespaces/{ns}/{collection}[/{name}]` with the
    /// namespace and name each percent-encoded as a single path segment
    fn endpoint(&self, namespace: &str, kind: WorkloadKind, name: Option<&str>) -> Result<String> {
        path_segment(NAMESPACE, namespace)?;
        if let Some(name) = name {
            path_segment(RESOURCE_NAME, name)?;
        }

        let mut url = self.api.clone();
        url.path_segments_mut()
            .map_err(|_| WorkloadError::InvalidSetting {
                key: K8S_API.to_string(),
                reason: format!("'{}' is not a base URL", self.api),
            })?
            .pop_if_empty()
            .extend(APPS_V1)
            .extend(["namespaces", namespace, kind.collection()])
            .extend(name);

        Ok(url.into())
    }

    /// Create the manifest in its kind's collection
    pub async fn create(&self, namespace: &str, manifest: &Manifest) -> Result<Applied> {
        let kind = manifest.kind();
        let url = self.collection_url(namespace, kind)?;
        let body = manifest.to_json()?;

        let request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);
        let response = self.send(Action::Create, &url, request).await?;

        let status = response.status();
        if status.is_success() {
            Ok(Applied {
                action: Action::Create,
                kind,
                name: manifest.name().map(str::to_string),
                namespace: namespace.to_string(),
                status: status.as_u16(),
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(WorkloadError::Api {
                action: Action::Create.verb().to_string(),
                target: String::new(),
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Delete the named Deployment, or the named StatefulSet if no Deployment exists
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<Applied> {
        self.probe(namespace, name, Action::Delete, |url| self.client.delete(url))
            .await
    }

    /// Set the replica count of the named Deployment, or StatefulSet if no Deployment exists
    pub async fn scale(&self, namespace: &str, name: &str, replicas: i32) -> Result<Applied> {
        let patch = scale_patch(replicas);
        self.probe(namespace, name, Action::Scale { replicas }, |url| {
            self.client
                .patch(url)
                .header(header::CONTENT_TYPE, STRATEGIC_MERGE_PATCH)
                .body(patch.clone())
        })
        .await
    }

    /// Try each kind in probe order. A 404 moves on to the next kind; any
    /// other response ends the search.
    async fn probe<F>(&self, namespace: &str, name: &str, action: Action, build: F) -> Result<Applied>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        for kind in WorkloadKind::PROBE_ORDER {
            let url = self.resource_url(namespace, kind, name)?;
            let response = self.send(action, &url, build(&url)).await?;
            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                debug!("No {} named {}, trying next kind", kind, name);
                continue;
            }

            if status.is_success() {
                return Ok(Applied {
                    action,
                    kind,
                    name: Some(name.to_string()),
                    namespace: namespace.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = response.text().await.unwrap_or_default();
            return Err(WorkloadError::Api {
                action: action.verb().to_string(),
                target: format!(" on {} '{}'", kind.resource(), name),
                status: status.as_u16(),
                body,
            });
        }

        Err(WorkloadError::ResourceNotFound {
            name: name.to_string(),
            namespace: namespace.to_string(),
        })
    }

    async fn send(&self, action: Action, url: &str, request: RequestBuilder) -> Result<Response> {
        debug!("{} {}", action.method(), url);

        request.send().await.map_err(|source| WorkloadError::Transport {
            url: url.to_string(),
            source,
        })
    }
}

/// Reject values that path segment encoding would drop or collapse
fn path_segment(key: &str, value: &str) -> Result<()> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(WorkloadError::InvalidSetting {
            key: key.to_string(),
            reason: format!("'{}' cannot be used as a path segment", value),
        });
    }
    Ok(())
}

/// Strategic merge patch body setting `spec.replicas`
fn scale_patch(replicas: i32) -> String {
    serde_json::json!({ "spec": { "replicas": replicas } }).to_string()
}
