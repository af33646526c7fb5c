/// Mode selection and orchestration of a single create, delete or scale run
use std::fmt;
use tracing::{debug, info};

use crate::config::{
    parse_replicas, validate_resource_name, ConnectionConfig, Settings, MODE, RESOURCE_NAME,
    RESOURCE_URI, SCALE_COUNT,
};
use crate::error::{Result, WorkloadError};
use crate::k8s::{Applied, KubernetesClient, Manifest};
use crate::loader::ResourceLoader;

/// Operation selected by `MODE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Delete,
    Scale,
}

impl Mode {
    /// Case-insensitive match on `create`, `delete` or `scale`
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "delete" => Some(Self::Delete),
            "scale" => Some(Self::Scale),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Scale => "scale",
        })
    }
}

/// The single line reported for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Succeeded(String),
    Failed(String),
    /// Unrecognized mode; not treated as a failure
    Usage(String),
}

impl Report {
    pub fn line(&self) -> &str {
        match self {
            Self::Succeeded(line) | Self::Failed(line) | Self::Usage(line) => line,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded(_) | Self::Usage(_) => 0,
            Self::Failed(_) => 1,
        }
    }
}

/// Mode-specific inputs, validated before any connection is made
#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    Create { uri: String },
    Delete { name: String },
    Scale { name: String, replicas: i32 },
}

impl Plan {
    fn from_settings(mode: Mode, settings: &Settings) -> Result<Self> {
        Ok(match mode {
            Mode::Create => Plan::Create {
                uri: settings.require(RESOURCE_URI)?.trim().to_string(),
            },
            Mode::Delete => Plan::Delete {
                name: resource_name(settings)?,
            },
            Mode::Scale => {
                let name = resource_name(settings)?;
                let replicas = parse_replicas(settings.require(SCALE_COUNT)?)?;
                Plan::Scale { name, replicas }
            }
        })
    }
}

fn resource_name(settings: &Settings) -> Result<String> {
    let name = settings.require(RESOURCE_NAME)?.trim();
    validate_resource_name(name)?;
    Ok(name.to_string())
}

/// Run the mode selected by the settings.
///
/// Results of attempted API operations come back as a `Report`; problems that
/// prevent an attempt (configuration, unreadable manifest) are returned as errors.
pub async fn run(settings: &Settings) -> Result<Report> {
    let raw_mode = settings.require(MODE)?;
    let Some(mode) = Mode::parse(raw_mode) else {
        return Ok(Report::Usage(format!(
            "Invalid MODE '{}'. Use MODE=create|delete|scale",
            raw_mode
        )));
    };

    let plan = Plan::from_settings(mode, settings)?;
    let connection = ConnectionConfig::from_settings(settings)?;
    let client = KubernetesClient::new(&connection)?;

    info!("Running {} in namespace {} against {}", mode, connection.namespace, connection.api);

    let result = match plan {
        Plan::Create { uri } => create(&client, &connection, &uri).await,
        Plan::Delete { name } => client.delete(&connection.namespace, &name).await,
        Plan::Scale { name, replicas } => {
            client.scale(&connection.namespace, &name, replicas).await
        }
    };

    match result {
        Ok(applied) => {
            debug!("API server answered {}", applied.status);
            Ok(Report::Succeeded(applied.to_string()))
        }
        Err(e) if e.is_outcome() => Ok(Report::Failed(e.to_string())),
        Err(e) => Err(e),
    }
}

async fn create(
    client: &KubernetesClient,
    connection: &ConnectionConfig,
    uri: &str,
) -> Result<Applied> {
    let loader = ResourceLoader::new(connection.timeout)?;
    let bytes = loader.load(uri).await?;
    let text = String::from_utf8(bytes)
        .map_err(|e| WorkloadError::InvalidManifest(format!("{} is not UTF-8: {}", uri, e)))?;

    let manifest = Manifest::parse(&text)?;
    client.create(&connection.namespace, &manifest).await
}
