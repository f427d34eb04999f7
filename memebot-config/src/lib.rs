use memebot_dispatch::OrderingMode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Ollama model reference: `name`, `namespace/name`, `host/namespace/name`,
/// each optionally followed by `:tag`.
static MODEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._\-]*(/[a-zA-Z0-9][a-zA-Z0-9._\-]*)*(:[a-zA-Z0-9][a-zA-Z0-9._\-]*)?$")
        .expect("model regex")
});

/// Go-style duration as accepted by Ollama's `keep_alive` (`5m`, `1h30m`, `-1s`).
static DURATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?([0-9]+(\.[0-9]+)?(ns|us|µs|ms|s|m|h))+$").expect("duration regex")
});

#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub ollama: Option<OllamaSection>,
    #[serde(default)]
    pub dispatch: Option<DispatchSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize)]
pub struct OllamaSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub keep_alive: Option<RawKeepAlive>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// `keep_alive` may be written as a duration string or as bare seconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawKeepAlive {
    Seconds(i64),
    Text(String),
}

impl RawKeepAlive {
    fn into_string(self) -> String {
        match self {
            Self::Seconds(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DispatchSection {
    #[serde(default)]
    pub ordering: Option<OrderingMode>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a RawConfigFile from a path. The format is inferred from the extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// No usable extension: try each enabled format in turn.
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    // Last, since most plain text is valid YAML of some shape.
    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(any(feature = "yaml", feature = "toml", feature = "json"))]
    {
        Err(ConfigError::Parse(
            "failed to parse config as any supported format".into(),
        ))
    }

    #[cfg(not(any(feature = "yaml", feature = "toml", feature = "json")))]
    {
        let _ = s;
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Concrete application configuration with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OllamaConfig {
    pub model: String,
    pub api_url: String,
    /// Passed through to Ollama; `None` leaves the server default (5m).
    pub keep_alive: Option<String>,
    pub request_timeout_secs: u64,
}

impl OllamaConfig {
    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchConfig {
    pub ordering: OrderingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig {
                model: "llama3".to_string(),
                api_url: "http://localhost:11434".to_string(),
                keep_alive: None,
                request_timeout_secs: 300,
            },
            dispatch: DispatchConfig {
                ordering: OrderingMode::Priority,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(()),
    }
}

/// Helper macro to apply optional value if present
macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
    ($target:expr, $source:expr, wrap) => {
        if let Some(v) = $source {
            $target = Some(v);
        }
    };
}

/// Load concrete `Config` from optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        apply_file(&mut cfg, raw);
    }

    apply_env_overrides(&mut cfg, |key| env::var(key).ok())?;

    Ok(cfg)
}

fn apply_file(cfg: &mut Config, raw: RawConfigFile) {
    if let Some(ollama) = raw.ollama {
        apply_opt!(cfg.ollama.model, ollama.model);
        apply_opt!(cfg.ollama.api_url, ollama.api_url);
        apply_opt!(
            cfg.ollama.keep_alive,
            ollama.keep_alive.map(RawKeepAlive::into_string),
            wrap
        );
        apply_opt!(cfg.ollama.request_timeout_secs, ollama.request_timeout_secs);
    }
    if let Some(dispatch) = raw.dispatch {
        apply_opt!(cfg.dispatch.ordering, dispatch.ordering);
    }
    if let Some(logging) = raw.logging {
        apply_opt!(cfg.logging.level, logging.level);
        apply_opt!(cfg.logging.json, logging.json);
    }
}

/// Parse an override with `FromStr`, naming the key on failure.
#[inline]
fn parse_var<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e)))
        })
        .transpose()
}

#[inline]
fn parse_bool_var(key: &str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    value
        .map(|v| parse_bool(&v).map_err(|_| ConfigError::Parse(format!("invalid {}", key))))
        .transpose()
}

/// Apply environment overrides read through `var`.
///
/// The unprefixed `OLLAMA_MODEL` and `OLLAMA_API_URL` are accepted as
/// legacy aliases but lose to the `MEMEBOT_` keys.
fn apply_env_overrides<F>(cfg: &mut Config, var: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Ollama
    if let Some(v) = var("MEMEBOT_OLLAMA_MODEL").or_else(|| var("OLLAMA_MODEL")) {
        cfg.ollama.model = v;
    }
    if let Some(v) = var("MEMEBOT_OLLAMA_API_URL").or_else(|| var("OLLAMA_API_URL")) {
        cfg.ollama.api_url = v;
    }
    if let Some(v) = var("MEMEBOT_OLLAMA_KEEP_ALIVE") {
        cfg.ollama.keep_alive = Some(v);
    }
    let key = "MEMEBOT_OLLAMA_REQUEST_TIMEOUT_SECS";
    if let Some(v) = parse_var::<u64>(key, var(key))? {
        cfg.ollama.request_timeout_secs = v;
    }

    // Dispatch
    let key = "MEMEBOT_DISPATCH_ORDERING";
    if let Some(v) = parse_var::<OrderingMode>(key, var(key))? {
        cfg.dispatch.ordering = v;
    }

    // Logging
    if let Some(v) = var("MEMEBOT_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    let key = "MEMEBOT_LOG_JSON";
    if let Some(v) = parse_bool_var(key, var(key))? {
        cfg.logging.json = v;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    if !MODEL_REGEX.is_match(&cfg.ollama.model) {
        return Err(ConfigError::Validation(format!(
            "invalid ollama.model: {:?}",
            cfg.ollama.model
        )));
    }

    match url::Url::parse(&cfg.ollama.api_url) {
        Ok(u) => {
            let scheme = u.scheme();
            if scheme != "http" && scheme != "https" {
                return Err(ConfigError::Validation(format!(
                    "ollama.api_url must be http or https: {}",
                    cfg.ollama.api_url
                )));
            }
        }
        Err(e) => {
            return Err(ConfigError::Validation(format!(
                "invalid ollama.api_url {}: {}",
                cfg.ollama.api_url, e
            )))
        }
    }

    if let Some(keep_alive) = cfg.ollama.keep_alive.as_deref() {
        let keep_alive = keep_alive.trim();
        if keep_alive.parse::<i64>().is_err() && !DURATION_REGEX.is_match(keep_alive) {
            return Err(ConfigError::Validation(format!(
                "ollama.keep_alive must be a duration like \"5m\" or whole seconds: {}",
                keep_alive
            )));
        }
    }

    if cfg.ollama.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "ollama.request_timeout_secs must be > 0".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
        let f = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("tmpfile");
        std::fs::write(f.path(), contents).unwrap();
        f
    }

    #[test]
    fn parse_toml() {
        let f = write_config(
            ".toml",
            r#"
[ollama]
model = "mistral:7b"
api_url = "http://gpu-box:11434"
keep_alive = "10m"

[dispatch]
ordering = "fifo"
"#,
        );
        let raw = load_raw_from_file(f.path()).expect("load");
        let ollama = raw.ollama.unwrap();
        assert_eq!(ollama.model.unwrap(), "mistral:7b");
        assert_eq!(ollama.api_url.unwrap(), "http://gpu-box:11434");
        assert_eq!(raw.dispatch.unwrap().ordering, Some(OrderingMode::Fifo));
        assert!(raw.logging.is_none());
    }

    #[test]
    fn parse_yaml_with_numeric_keep_alive() {
        let f = write_config(
            ".yaml",
            r#"
ollama:
  model: llama3
  keep_alive: -1
logging:
  level: debug
  json: true
"#,
        );
        let mut cfg = Config::default();
        apply_file(&mut cfg, load_raw_from_file(f.path()).expect("load"));
        assert_eq!(cfg.ollama.keep_alive.as_deref(), Some("-1"));
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn parse_without_extension_falls_back_to_detection() {
        let raw = parse_config_str(r#"{"dispatch": {"ordering": "priority"}}"#, None).unwrap();
        assert_eq!(raw.dispatch.unwrap().ordering, Some(OrderingMode::Priority));

        let raw = parse_config_str("[ollama]\nmodel = \"phi3\"\n", None).unwrap();
        assert_eq!(raw.ollama.unwrap().model.unwrap(), "phi3");
    }

    #[test]
    fn unknown_ordering_in_file_is_a_parse_error() {
        let err =
            parse_config_str("[dispatch]\nordering = \"random\"\n", Some("toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.ollama.model, "llama3");
        assert_eq!(cfg.ollama.request_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.dispatch.ordering, OrderingMode::Priority);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.ollama.model = "from-file".into();

        apply_env_overrides(
            &mut cfg,
            vars(&[
                ("MEMEBOT_OLLAMA_MODEL", "llama3:70b"),
                ("MEMEBOT_OLLAMA_KEEP_ALIVE", "1h"),
                ("MEMEBOT_OLLAMA_REQUEST_TIMEOUT_SECS", "60"),
                ("MEMEBOT_DISPATCH_ORDERING", "FIFO"),
                ("MEMEBOT_LOG_LEVEL", "memebot=trace"),
                ("MEMEBOT_LOG_JSON", "yes"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.ollama.model, "llama3:70b");
        assert_eq!(cfg.ollama.keep_alive.as_deref(), Some("1h"));
        assert_eq!(cfg.ollama.request_timeout_secs, 60);
        assert_eq!(cfg.dispatch.ordering, OrderingMode::Fifo);
        assert_eq!(cfg.logging.level, "memebot=trace");
        assert!(cfg.logging.json);
    }

    #[test]
    fn legacy_ollama_vars_lose_to_prefixed_ones() {
        let mut cfg = Config::default();
        apply_env_overrides(
            &mut cfg,
            vars(&[
                ("OLLAMA_MODEL", "legacy-model"),
                ("OLLAMA_API_URL", "http://legacy:11434"),
                ("MEMEBOT_OLLAMA_API_URL", "http://preferred:11434"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.ollama.model, "legacy-model");
        assert_eq!(cfg.ollama.api_url, "http://preferred:11434");
    }

    #[test]
    fn bad_env_values_name_the_key() {
        let mut cfg = Config::default();
        let err = apply_env_overrides(
            &mut cfg,
            vars(&[("MEMEBOT_OLLAMA_REQUEST_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("MEMEBOT_OLLAMA_REQUEST_TIMEOUT_SECS"));

        let err =
            apply_env_overrides(&mut cfg, vars(&[("MEMEBOT_LOG_JSON", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("MEMEBOT_LOG_JSON"));
    }

    #[test]
    fn load_config_reads_process_env() {
        let key = "MEMEBOT_OLLAMA_REQUEST_TIMEOUT_SECS";
        std::env::set_var(key, "42");
        let f = write_config(".toml", "[ollama]\nrequest_timeout_secs = 7\n");
        let cfg = load_config(Some(f.path())).expect("load config");
        std::env::remove_var(key);
        assert_eq!(cfg.ollama.request_timeout_secs, 42);
    }

    #[test]
    fn model_names() {
        for ok in [
            "llama3",
            "llama3:8b-instruct-q4_0",
            "library/mistral:latest",
            "hf.co/bartowski/Llama-3.2-1B-Instruct-GGUF:Q4_K_M",
        ] {
            let mut cfg = Config::default();
            cfg.ollama.model = ok.into();
            assert!(validate_config(&cfg).is_ok(), "{ok} should be valid");
        }
        for bad in ["", "has space", ":tag", "llama3:", "-llama"] {
            let mut cfg = Config::default();
            cfg.ollama.model = bad.into();
            assert!(validate_config(&cfg).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn api_url_must_be_http() {
        let mut cfg = Config::default();
        cfg.ollama.api_url = "ftp://localhost:11434".into();
        assert!(matches!(validate_config(&cfg), Err(ConfigError::Validation(_))));
        cfg.ollama.api_url = "localhost".into();
        assert!(validate_config(&cfg).is_err());
        cfg.ollama.api_url = "https://ollama.example.com".into();
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn keep_alive_and_timeout_checks() {
        let mut cfg = Config::default();
        for ok in ["5m", "1h30m", "-1", "0", "2.5h", "300"] {
            cfg.ollama.keep_alive = Some(ok.into());
            assert!(validate_config(&cfg).is_ok(), "{ok} should be valid");
        }
        cfg.ollama.keep_alive = Some("forever".into());
        assert!(validate_config(&cfg).is_err());

        cfg.ollama.keep_alive = None;
        cfg.ollama.request_timeout_secs = 0;
        assert!(validate_config(&cfg).is_err());
    }
}
