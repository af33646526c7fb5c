/// Configuration resolution: config file first, then `.env`, then process environment
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, WorkloadError};
use crate::loader::ResourceLoader;
use crate::utils::value::scalar_to_string;

pub const CONFIG_JSON: &str = "CONFIG_JSON";
pub const K8S_API: &str = "K8S_API";
pub const NAMESPACE: &str = "NAMESPACE";
pub const MODE: &str = "MODE";
pub const BEARER_TOKEN: &str = "BEARER_TOKEN";
pub const RESOURCE_NAME: &str = "RESOURCE_NAME";
pub const RESOURCE_URI: &str = "RESOURCE_URI";
pub const SCALE_COUNT: &str = "SCALE_COUNT";
pub const INSECURE_SKIP_TLS_VERIFY: &str = "INSECURE_SKIP_TLS_VERIFY";
pub const REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DOTENV_FILE: &str = ".env";

/// Resolved key/value settings.
///
/// Lookup order: config file, then `.env`, then the process environment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    file: HashMap<String, String>,
    dotenv: HashMap<String, String>,
    env: HashMap<String, String>,
}

impl Settings {
    /// Build settings from already-parsed file values and environment values
    pub fn new(file: HashMap<String, String>, env: HashMap<String, String>) -> Self {
        Self::layered(file, HashMap::new(), env)
    }

    /// Build settings from all three layers
    pub fn layered(
        file: HashMap<String, String>,
        dotenv: HashMap<String, String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self { file, dotenv, env }
    }

    /// Resolve settings from the process environment, `./.env` and the optional config file.
    ///
    /// `config_location` overrides `CONFIG_JSON`.
    pub async fn load(config_location: Option<&str>) -> Result<Self> {
        Self::load_from(config_location, Path::new(DOTENV_FILE)).await
    }

    /// Same as [`Settings::load`] with an explicit `.env` path
    pub async fn load_from(config_location: Option<&str>, dotenv_path: &Path) -> Result<Self> {
        let env = process_env();
        let dotenv = read_dotenv(dotenv_path)?;

        let location = config_location
            .map(str::to_string)
            .or_else(|| dotenv.get(CONFIG_JSON).or_else(|| env.get(CONFIG_JSON)).cloned())
            .filter(|l| !l.trim().is_empty());

        let file = match location {
            Some(location) => {
                let loader = ResourceLoader::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?;
                let bytes = loader.load(&location).await?;
                parse_config_file(&location, &bytes)?
            }
            None => HashMap::new(),
        };

        Ok(Self::layered(file, dotenv, env))
    }

    /// Look up a key: config file, then `.env`, then environment
    pub fn get(&self, key: &str) -> Option<&str> {
        self.file
            .get(key)
            .or_else(|| self.dotenv.get(key))
            .or_else(|| self.env.get(key))
            .map(String::as_str)
    }

    /// Look up a key that must be present and non-blank
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(WorkloadError::MissingConfiguration(key.to_string())),
        }
    }
}

/// Process environment, skipping entries that are not valid UTF-8
fn process_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (Ok(key), Err(_)) => {
                debug!("Ignoring non-UTF-8 value of environment variable {}", key);
                None
            }
            _ => None,
        })
        .collect()
}

/// Read a `.env` file. A missing file yields no values.
fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    let invalid = |e: dotenvy::Error| WorkloadError::InvalidConfigFile {
        location: path.display().to_string(),
        reason: e.to_string(),
    };

    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => return Err(invalid(e)),
    };

    entries.map(|entry| entry.map_err(&invalid)).collect()
}

/// Parse a config document into flat key/value pairs.
///
/// `.yaml`/`.yml` locations are read as YAML, everything else as JSON.
pub fn parse_config_file(location: &str, bytes: &[u8]) -> Result<HashMap<String, String>> {
    let invalid = |reason: String| WorkloadError::InvalidConfigFile {
        location: location.to_string(),
        reason,
    };

    let lower = location.to_ascii_lowercase();
    let document: serde_yaml::Value = if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        serde_yaml::from_slice(bytes).map_err(|e| invalid(e.to_string()))?
    } else {
        let json: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;
        serde_yaml::to_value(json).map_err(|e| invalid(e.to_string()))?
    };

    let mapping = match document {
        serde_yaml::Value::Mapping(mapping) => mapping,
        serde_yaml::Value::Null => return Ok(HashMap::new()),
        _ => return Err(invalid("top-level value must be a mapping".to_string())),
    };

    let mut values = HashMap::new();
    for (key, value) in mapping {
        let Some(key) = scalar_to_string(&key) else {
            continue;
        };
        match value {
            serde_yaml::Value::Null => {}
            serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => {
                warn!("Ignoring non-scalar config value for {}", key);
            }
            scalar => {
                if let Some(rendered) = scalar_to_string(&scalar) {
                    values.insert(key, rendered);
                }
            }
        }
    }

    Ok(values)
}

/// Connection settings for the Kubernetes API server
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// API server base URL without trailing slash
    pub api: String,
    pub namespace: String,
    pub token: String,
    /// Skip TLS certificate verification (development clusters only)
    pub insecure_skip_tls_verify: bool,
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Build and validate connection settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api = settings.require(K8S_API)?.trim();
        Self::validate_api(api)?;

        let namespace = settings.require(NAMESPACE)?.trim().to_string();
        validate_namespace(&namespace)?;
        let token = settings.require(BEARER_TOKEN)?.to_string();

        let insecure_skip_tls_verify = settings
            .get(INSECURE_SKIP_TLS_VERIFY)
            .map(parse_flag)
            .unwrap_or(false);

        let timeout = match settings.get(REQUEST_TIMEOUT_SECS) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(WorkloadError::InvalidSetting {
                        key: REQUEST_TIMEOUT_SECS.to_string(),
                        reason: format!("expected a positive number of seconds, got '{}'", raw),
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api: api.trim_end_matches('/').to_string(),
            namespace,
            token,
            insecure_skip_tls_verify,
            timeout,
        })
    }

    /// Validate the API server URL
    fn validate_api(api: &str) -> Result<()> {
        let invalid = |reason: String| WorkloadError::InvalidSetting {
            key: K8S_API.to_string(),
            reason,
        };

        let url = Url::parse(api).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        Ok(())
    }
}

/// Check that `name` is a DNS-1123 label: at most 63 lowercase alphanumerics or
/// `-`, starting and ending with an alphanumeric
pub fn validate_namespace(name: &str) -> Result<()> {
    if name.len() <= 63 && is_dns_label(name) {
        Ok(())
    } else {
        Err(invalid_name(NAMESPACE, name, "a DNS-1123 label"))
    }
}

/// Check that `name` is a DNS-1123 subdomain: dot-separated labels, at most 253 characters
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.len() <= 253 && name.split('.').all(is_dns_label) {
        Ok(())
    } else {
        Err(invalid_name(RESOURCE_NAME, name, "a DNS-1123 subdomain"))
    }
}

fn is_dns_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        }
        _ => false,
    }
}

fn invalid_name(key: &str, name: &str, expected: &str) -> WorkloadError {
    WorkloadError::InvalidSetting {
        key: key.to_string(),
        reason: format!("'{}' is not {}", name, expected),
    }
}

/// Parse a replica count: a non-negative 32-bit integer
pub fn parse_replicas(raw: &str) -> Result<i32> {
    match raw.trim().parse::<i32>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(WorkloadError::InvalidReplicaCount(raw.to_string())),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn connection_settings() -> Settings {
        Settings::new(
            HashMap::new(),
            map(&[
                (K8S_API, "https://127.0.0.1:6443/"),
                (NAMESPACE, "apps"),
                (BEARER_TOKEN, "secret"),
            ]),
        )
    }

    #[test]
    fn test_file_overrides_env() {
        let settings = Settings::new(
            map(&[(NAMESPACE, "from-file")]),
            map(&[(NAMESPACE, "from-env"), (MODE, "delete")]),
        );
        assert_eq!(settings.get(NAMESPACE), Some("from-file"));
        assert_eq!(settings.get(MODE), Some("delete"));
        assert_eq!(settings.get(RESOURCE_NAME), None);
    }

    #[test]
    fn test_blank_file_value_still_wins() {
        let settings = Settings::new(map(&[(MODE, "  ")]), map(&[(MODE, "scale")]));
        assert_eq!(settings.get(MODE), Some("  "));
        assert!(matches!(
            settings.require(MODE),
            Err(WorkloadError::MissingConfiguration(ref key)) if key == MODE
        ));
    }

    #[test]
    fn test_require_missing_names_key() {
        let settings = Settings::default();
        let err = settings.require(RESOURCE_URI).unwrap_err();
        assert_eq!(err.to_string(), "Required configuration RESOURCE_URI is missing");
    }

    #[test]
    fn test_parse_yaml_config() {
        let content = b"K8S_API: https://cluster:6443\nSCALE_COUNT: 3\nINSECURE_SKIP_TLS_VERIFY: true\nRESOURCE_NAME: ~\nextra:\n  nested: 1\n";
        let values = parse_config_file("settings.YML", content).unwrap();
        assert_eq!(values.get(K8S_API).map(String::as_str), Some("https://cluster:6443"));
        assert_eq!(values.get(SCALE_COUNT).map(String::as_str), Some("3"));
        assert_eq!(values.get(INSECURE_SKIP_TLS_VERIFY).map(String::as_str), Some("true"));
        assert!(!values.contains_key(RESOURCE_NAME));
        assert!(!values.contains_key("extra"));
    }

    #[test]
    fn test_parse_json_config() {
        let content = br#"{"NAMESPACE": "apps", "SCALE_COUNT": 5}"#;
        let values = parse_config_file("https://config.example.com/settings.json", content).unwrap();
        assert_eq!(values.get(NAMESPACE).map(String::as_str), Some("apps"));
        assert_eq!(values.get(SCALE_COUNT).map(String::as_str), Some("5"));
    }

    #[test]
    fn test_json_extension_rejects_yaml_content() {
        let err = parse_config_file("settings.json", b"NAMESPACE: apps").unwrap_err();
        assert!(matches!(err, WorkloadError::InvalidConfigFile { .. }));
    }

    #[test]
    fn test_non_mapping_config_rejected() {
        let err = parse_config_file("settings.yaml", b"- a\n- b\n").unwrap_err();
        assert!(matches!(err, WorkloadError::InvalidConfigFile { .. }));
    }

    #[tokio::test]
    async fn test_load_with_config_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "RESOURCE_NAME: from-file-only").unwrap();

        let settings = Settings::load(Some(file.path().to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(settings.get(RESOURCE_NAME), Some("from-file-only"));
    }

    #[tokio::test]
    async fn test_load_with_missing_config_file() {
        let err = Settings::load(Some("/nonexistent/settings.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkloadError::ResourceUnreachable(_)));
    }

    #[test]
    fn test_connection_config() {
        let config = ConnectionConfig::from_settings(&connection_settings()).unwrap();
        assert_eq!(config.api, "https://127.0.0.1:6443");
        assert_eq!(config.namespace, "apps");
        assert_eq!(config.token, "secret");
        assert!(!config.insecure_skip_tls_verify);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_connection_config_has_no_defaults() {
        let settings = Settings::new(
            HashMap::new(),
            map(&[(K8S_API, "https://127.0.0.1:6443"), (NAMESPACE, "apps")]),
        );
        assert!(matches!(
            ConnectionConfig::from_settings(&settings),
            Err(WorkloadError::MissingConfiguration(ref key)) if key == BEARER_TOKEN
        ));
    }

    #[test]
    fn test_connection_config_rejects_bad_api() {
        let mut env = map(&[(NAMESPACE, "apps"), (BEARER_TOKEN, "secret")]);
        env.insert(K8S_API.to_string(), "127.0.0.1:6443".to_string());
        let result = ConnectionConfig::from_settings(&Settings::new(HashMap::new(), env.clone()));
        assert!(matches!(result, Err(WorkloadError::InvalidSetting { .. })));

        env.insert(K8S_API.to_string(), "ftp://cluster".to_string());
        let result = ConnectionConfig::from_settings(&Settings::new(HashMap::new(), env));
        assert!(matches!(result, Err(WorkloadError::InvalidSetting { .. })));
    }

    #[test]
    fn test_insecure_and_timeout_settings() {
        let settings = Settings::new(
            map(&[(INSECURE_SKIP_TLS_VERIFY, "Yes"), (REQUEST_TIMEOUT_SECS, "5")]),
            connection_settings().env,
        );
        let config = ConnectionConfig::from_settings(&settings).unwrap();
        assert!(config.insecure_skip_tls_verify);
        assert_eq!(config.timeout, Duration::from_secs(5));

        let settings = Settings::new(
            map(&[(REQUEST_TIMEOUT_SECS, "0")]),
            connection_settings().env,
        );
        assert!(ConnectionConfig::from_settings(&settings).is_err());
    }

    #[test]
    fn test_dotenv_sits_between_file_and_env() {
        let settings = Settings::layered(
            map(&[(NAMESPACE, "from-file")]),
            map(&[(NAMESPACE, "from-dotenv"), (MODE, "from-dotenv")]),
            map(&[(NAMESPACE, "from-env"), (MODE, "from-env"), (RESOURCE_NAME, "from-env")]),
        );
        assert_eq!(settings.get(NAMESPACE), Some("from-file"));
        assert_eq!(settings.get(MODE), Some("from-dotenv"));
        assert_eq!(settings.get(RESOURCE_NAME), Some("from-env"));
    }

    #[tokio::test]
    async fn test_load_from_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("settings.yaml");
        std::fs::write(&config_path, "RESOURCE_NAME: from-file\n").unwrap();

        let dotenv_path = dir.path().join(".env");
        std::fs::write(
            &dotenv_path,
            format!(
                "CONFIG_JSON={}\nRESOURCE_NAME=from-dotenv\nWORKLOADCTL_TEST_LAYERED=from-dotenv\n",
                config_path.display()
            ),
        )
        .unwrap();
        std::env::set_var("WORKLOADCTL_TEST_LAYERED", "from-env");

        let settings = Settings::load_from(None, &dotenv_path).await.unwrap();
        // CONFIG_JSON came from .env, and the file it names wins over .env
        assert_eq!(settings.get(RESOURCE_NAME), Some("from-file"));
        assert_eq!(settings.get("WORKLOADCTL_TEST_LAYERED"), Some("from-dotenv"));
    }

    #[tokio::test]
    async fn test_missing_dotenv_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("WORKLOADCTL_TEST_NO_DOTENV", "from-env");

        let settings = Settings::load_from(None, &dir.path().join(".env"))
            .await
            .unwrap();
        assert_eq!(settings.get("WORKLOADCTL_TEST_NO_DOTENV"), Some("from-env"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_environment_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("WORKLOADCTL_TEST_NOT_UTF8", OsStr::from_bytes(b"\xff\xfe"));
        std::env::set_var("WORKLOADCTL_TEST_UTF8", "fine");

        let settings = Settings::load_from(None, &dir.path().join(".env"))
            .await
            .unwrap();
        assert_eq!(settings.get("WORKLOADCTL_TEST_NOT_UTF8"), None);
        assert_eq!(settings.get("WORKLOADCTL_TEST_UTF8"), Some("fine"));
    }

    #[test]
    fn test_token_used_as_is() {
        let mut env = connection_settings().env;
        env.insert(BEARER_TOKEN.to_string(), " secret ".to_string());
        let config = ConnectionConfig::from_settings(&Settings::new(HashMap::new(), env)).unwrap();
        assert_eq!(config.token, " secret ");
    }

    #[test]
    fn test_namespace_must_be_dns_label() {
        let mut env = connection_settings().env;
        env.insert(NAMESPACE.to_string(), "../kube-system".to_string());
        let result = ConnectionConfig::from_settings(&Settings::new(HashMap::new(), env));
        assert!(matches!(
            result,
            Err(WorkloadError::InvalidSetting { ref key, .. }) if key == NAMESPACE
        ));
    }

    #[test]
    fn test_resource_name_validation() {
        assert!(validate_resource_name("web").is_ok());
        assert!(validate_resource_name("web-0.v2").is_ok());
        assert!(validate_resource_name("../statefulsets/foo").is_err());
        assert!(validate_resource_name("..").is_err());
        assert!(validate_resource_name("web?dryRun=All").is_err());
        assert!(validate_resource_name("web#x").is_err());
        assert!(validate_resource_name("Web").is_err());
        assert!(validate_resource_name("-web").is_err());
        assert!(validate_resource_name(&"a".repeat(254)).is_err());
    }

    #[test]
    fn test_parse_replicas() {
        assert_eq!(parse_replicas("3").unwrap(), 3);
        assert_eq!(parse_replicas("0").unwrap(), 0);
        assert!(matches!(
            parse_replicas("-1"),
            Err(WorkloadError::InvalidReplicaCount(ref v)) if v == "-1"
        ));
        assert!(parse_replicas("three").is_err());
        assert!(parse_replicas("").is_err());
    }
}
