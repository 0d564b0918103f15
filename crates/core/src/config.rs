//! Configuration loader
//!
//! Loads [`GuardConfig`] from the environment or from a config file.
//!
//! ## Loading Strategy
//! 1. `CALLGUARD_CONFIG` names a config file: load it
//! 2. Otherwise probe the standard locations
//! 3. No file anywhere: defaults
//!
//! `CALLGUARD_STRICT_ADAPTERS` overrides `strict_adapters` in every case.
//!
//! ## File Locations
//! The loader probes, in order:
//! 1. `./callguard.toml`, `./callguard.json`, `./config/callguard.toml`
//! 2. The same names next to the executable
//!
//! Configured policy groups become [`ConfiguredGroupProducer`]s.

use std::path::{Path, PathBuf};
use std::time::Duration;

use callguard_common::CommonError;
use callguard_domain::constants::{DEFAULT_PRODUCER_PRIORITY, ENV_CONFIG_PATH, ENV_STRICT_ADAPTERS};
use callguard_domain::{
    BackoffSettings, CallGuardError, GroupConfig, GuardConfig, Result, RetrySettings,
};
use tracing::{debug, info};

use crate::policy::{PolicyGroup, PolicyGroupBuilder};
use crate::registry::{PolicyGroupProducer, RegistryBuilder};

const CONFIG_FILE_NAMES: [&str; 3] = ["callguard.toml", "callguard.json", "config/callguard.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `CallGuardError::Config` if `CALLGUARD_CONFIG` names a file that
/// is missing or invalid, or if a probed config file cannot be read or
/// parsed.
pub fn load() -> Result<GuardConfig> {
    if std::env::var_os(ENV_CONFIG_PATH).is_some() {
        let config = load_from_env()?;
        info!("Configuration loaded from {ENV_CONFIG_PATH}");
        return Ok(config);
    }

    debug!("{ENV_CONFIG_PATH} not set, probing files");
    let mut config = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            debug!("No config file found, using defaults");
            GuardConfig::default()
        }
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load the file named by `CALLGUARD_CONFIG`
///
/// # Errors
/// Returns `CallGuardError::Config` if the variable is unset or the file
/// cannot be loaded.
pub fn load_from_env() -> Result<GuardConfig> {
    let path = env_var(ENV_CONFIG_PATH)?;
    let mut config = load_from_file(Some(PathBuf::from(path)))?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. TOML and JSON are
/// detected by extension.
///
/// # Errors
/// Returns `CallGuardError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<GuardConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CallGuardError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CallGuardError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(CommonError::from)
        .map_err(|e| CallGuardError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// # Errors
/// Returns `CallGuardError::Config` if the format is unsupported or parsing
/// fails.
pub fn parse_config(contents: &str, path: &Path) -> Result<GuardConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    let parsed: std::result::Result<GuardConfig, CommonError> = match extension {
        "toml" => toml::from_str(contents).map_err(CommonError::from),
        "json" => serde_json::from_str(contents).map_err(CommonError::from),
        _ => return Err(CallGuardError::Config(format!("Unsupported config format: {extension}"))),
    };
    parsed.map_err(|e| CallGuardError::Config(format!("{}: {e}", path.display())))
}

/// Probe the standard locations for a config file
///
/// Returns the first existing candidate.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| cwd.join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn apply_env_overrides(config: &mut GuardConfig) {
    if std::env::var_os(ENV_STRICT_ADAPTERS).is_some() {
        config.strict_adapters = env_bool(ENV_STRICT_ADAPTERS, config.strict_adapters);
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| CallGuardError::Config(format!("Missing environment variable: {key}")))
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Producer for a policy group declared in configuration
#[derive(Debug, Clone)]
pub struct ConfiguredGroupProducer {
    name: String,
    priority: i32,
    group: PolicyGroup,
}

impl ConfiguredGroupProducer {
    /// Translate a configured group into a descriptor
    ///
    /// # Errors
    /// Returns `CallGuardError::InvalidPolicy` if the settings do not
    /// compile.
    pub fn new(name: impl Into<String>, config: &GroupConfig) -> Result<Self> {
        let name = name.into();
        let group = describe(&name, config);
        group.build("()").map_err(|err| CallGuardError::InvalidPolicy {
            group: name.clone(),
            message: err.to_string(),
        })?;

        Ok(Self { priority: config.priority.unwrap_or(DEFAULT_PRODUCER_PRIORITY), name, group })
    }

    pub fn group(&self) -> &PolicyGroup {
        &self.group
    }
}

impl PolicyGroupProducer for ConfiguredGroupProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn create(&self) -> PolicyGroup {
        self.group.clone()
    }
}

impl RegistryBuilder {
    /// Register one producer per configured group
    ///
    /// # Errors
    /// Returns `CallGuardError::InvalidPolicy` for the first group whose
    /// settings do not compile.
    pub fn with_config(self, config: &GuardConfig) -> Result<Self> {
        config.groups.iter().try_fold(self, |builder, (name, group)| {
            Ok(builder.register(ConfiguredGroupProducer::new(name.as_str(), group)?))
        })
    }
}

fn describe(name: &str, config: &GroupConfig) -> PolicyGroup {
    let mut builder =
        PolicyGroup::builder().description(config.description.clone().unwrap_or_else(|| name.to_string()));

    if let Some(bulkhead) = &config.bulkhead {
        let mut stage = builder.bulkhead();
        if let Some(limit) = bulkhead.limit {
            stage = stage.limit(limit);
        }
        if let Some(size) = bulkhead.queue_size {
            stage = stage.queue_size(size);
        }
        builder = stage.done();
    }

    if let Some(timeout) = &config.timeout {
        let mut stage = builder.timeout();
        if let Some(ms) = timeout.duration_ms {
            stage = stage.duration(Duration::from_millis(ms));
        }
        builder = stage.done();
    }

    if let Some(breaker) = &config.circuit_breaker {
        let mut stage = builder.circuit_breaker();
        if let Some(ms) = breaker.delay_ms {
            stage = stage.delay(Duration::from_millis(ms));
        }
        if let Some(threshold) = breaker.request_volume_threshold {
            stage = stage.request_volume_threshold(threshold);
        }
        if let Some(ratio) = breaker.failure_ratio {
            stage = stage.failure_ratio(ratio);
        }
        if let Some(threshold) = breaker.success_threshold {
            stage = stage.success_threshold(threshold);
        }
        if let Some(name) = &breaker.name {
            stage = stage.name(name.clone());
        }
        builder = stage.done();
    }

    if let Some(retry) = &config.retry {
        builder = describe_retry(builder, retry);
    }

    builder.build()
}

fn describe_retry(builder: PolicyGroupBuilder, settings: &RetrySettings) -> PolicyGroupBuilder {
    let mut stage = builder.retry();
    if let Some(retries) = settings.max_retries {
        stage = stage.max_retries(retries);
    }
    if let Some(ms) = settings.delay_ms {
        stage = stage.delay(Duration::from_millis(ms));
    }
    if let Some(ms) = settings.max_duration_ms {
        stage = stage.max_duration(Duration::from_millis(ms));
    }
    if let Some(ms) = settings.jitter_ms {
        stage = stage.jitter(Duration::from_millis(ms));
    }
    stage = match &settings.backoff {
        Some(BackoffSettings::Exponential { factor, max_delay_ms }) => {
            let mut backoff = stage.with_exponential_backoff();
            if let Some(factor) = factor {
                backoff = backoff.factor(*factor);
            }
            if let Some(ms) = max_delay_ms {
                backoff = backoff.max_delay(Duration::from_millis(*ms));
            }
            backoff.done()
        }
        Some(BackoffSettings::Fibonacci { max_delay_ms }) => {
            let mut backoff = stage.with_fibonacci_backoff();
            if let Some(ms) = max_delay_ms {
                backoff = backoff.max_delay(Duration::from_millis(*ms));
            }
            backoff.done()
        }
        None => stage,
    };
    stage.done()
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use callguard_domain::constants::IDEMPOTENT_GROUP;
    use callguard_domain::{BulkheadSettings, TimeoutSettings};
    use once_cell::sync::Lazy;
    use tempfile::{Builder, NamedTempFile};

    use super::*;
    use crate::policy::StageSpec;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const TOML_CONFIG: &str = r#"
strict_adapters = true
infrastructure_interfaces = ["Session"]

[groups.catalog]
priority = 20
description = "catalog reads"

[groups.catalog.retry]
max_retries = 2
jitter_ms = 0
backoff = { kind = "exponential", factor = 3 }

[groups.catalog.timeout]
duration_ms = 250
"#;

    fn temp_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("CALLGUARD_TEST_BOOL_YES", "YES");
        std::env::set_var("CALLGUARD_TEST_BOOL_OFF", "off");
        std::env::remove_var("CALLGUARD_TEST_BOOL_MISSING");

        assert!(env_bool("CALLGUARD_TEST_BOOL_YES", false));
        assert!(!env_bool("CALLGUARD_TEST_BOOL_OFF", true));
        assert!(env_bool("CALLGUARD_TEST_BOOL_MISSING", true));

        std::env::remove_var("CALLGUARD_TEST_BOOL_YES");
        std::env::remove_var("CALLGUARD_TEST_BOOL_OFF");
    }

    #[test]
    fn test_parse_toml() {
        let config = parse_config(TOML_CONFIG, Path::new("callguard.toml")).expect("valid toml");
        assert!(config.strict_adapters);
        assert_eq!(config.infrastructure_interfaces, ["Session".to_string()]);
        let catalog = &config.groups["catalog"];
        assert_eq!(catalog.priority, Some(20));
        assert_eq!(
            catalog.retry.as_ref().and_then(|r| r.backoff.clone()),
            Some(BackoffSettings::Exponential { factor: Some(3), max_delay_ms: None })
        );
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{ "groups": { "writes": { "bulkhead": { "limit": 2 } } } }"#;
        let config = parse_config(json, Path::new("callguard.json")).expect("valid json");
        assert_eq!(
            config.groups["writes"].bulkhead,
            Some(BulkheadSettings { limit: Some(2), queue_size: None })
        );
    }

    #[test]
    fn test_parse_rejects_unknown_extension() {
        let err = parse_config("", Path::new("callguard.yaml")).expect_err("unsupported");
        assert!(matches!(err, CallGuardError::Config(message) if message.contains("yaml")));
    }

    #[test]
    fn test_parse_reports_invalid_toml() {
        let err = parse_config("strict_adapters = ", Path::new("callguard.toml")).expect_err("invalid");
        assert!(matches!(err, CallGuardError::Config(_)));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = load_from_file(Some(PathBuf::from("/nonexistent/callguard.toml"))).expect_err("missing");
        assert!(matches!(err, CallGuardError::Config(message) if message.contains("not found")));
    }

    #[test]
    fn test_load_from_env_path_with_strict_override() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        let file = temp_config(".toml", TOML_CONFIG);

        std::env::set_var(ENV_CONFIG_PATH, file.path());
        std::env::set_var(ENV_STRICT_ADAPTERS, "false");
        let result = load();
        std::env::remove_var(ENV_CONFIG_PATH);
        std::env::remove_var(ENV_STRICT_ADAPTERS);

        let config = result.expect("config from env path");
        assert!(!config.strict_adapters);
        assert!(config.groups.contains_key("catalog"));
    }

    #[test]
    fn test_load_reports_broken_env_config_file() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        let malformed = temp_config(".toml", "strict_adapters = ");

        std::env::set_var(ENV_CONFIG_PATH, malformed.path());
        let parse_result = load();
        std::env::set_var(ENV_CONFIG_PATH, "/nonexistent/callguard.toml");
        let missing_result = load();
        std::env::remove_var(ENV_CONFIG_PATH);

        assert!(matches!(parse_result, Err(CallGuardError::Config(_))));
        assert!(matches!(
            missing_result,
            Err(CallGuardError::Config(message)) if message.contains("not found")
        ));
    }

    #[test]
    fn test_configured_group_translates_settings() {
        let config = parse_config(TOML_CONFIG, Path::new("callguard.toml")).expect("valid toml");
        let producer = ConfiguredGroupProducer::new("catalog", &config.groups["catalog"]).expect("valid group");

        assert_eq!(producer.priority(), 20);
        let group = producer.create();
        assert_eq!(group.description(), Some("catalog reads"));
        let kinds: Vec<_> = group.stages().iter().map(StageSpec::kind).collect();
        assert_eq!(kinds, ["timeout", "retry"]);
    }

    #[test]
    fn test_configured_group_rejects_invalid_settings() {
        let group = GroupConfig {
            timeout: Some(TimeoutSettings { duration_ms: Some(0) }),
            ..GroupConfig::default()
        };
        let err = ConfiguredGroupProducer::new("broken", &group).expect_err("zero timeout");
        assert!(matches!(err, CallGuardError::InvalidPolicy { group, .. } if group == "broken"));
    }

    #[test]
    fn test_configured_group_overrides_builtin_by_priority() {
        let mut config = GuardConfig::default();
        config.groups.insert(
            IDEMPOTENT_GROUP.to_string(),
            GroupConfig {
                priority: Some(DEFAULT_PRODUCER_PRIORITY + 5),
                description: Some("tuned".to_string()),
                ..GroupConfig::default()
            },
        );

        let registry = RegistryBuilder::new()
            .with_builtins()
            .with_config(&config)
            .expect("valid config")
            .freeze();
        let group = registry.get(IDEMPOTENT_GROUP).expect("group");
        assert_eq!(group.description(), Some("tuned"));
        assert!(group.is_empty());
    }
}
