use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SESSION_URL: &str = "https://api.fastmail.com/.well-known/jmap";
pub const DEFAULT_NOT_BEFORE: &str = "2000-01-01";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub dest_dir: PathBuf,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<NaiveDate>,
    #[serde(default = "default_delay_hours")]
    pub delay_hours: i64,
    #[serde(
        default,
        deserialize_with = "deserialize_end_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verify_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_url: Option<String>,
    /// Keys we don't know about survive the rewrite at the end of a run.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_delay_hours() -> i64 {
    24
}

/// Accepts RFC 3339 as well as the `2024-01-31 12:00:00+00:00` form older
/// configs were written with.
fn deserialize_end_time<'de, D>(d: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    raw.map(|s| parse_end_time(&s).map_err(serde::de::Error::custom))
        .transpose()
}

fn parse_end_time(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z")
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("invalid last_end_time '{s}': {e}"))
}

impl Config {
    pub fn session_url(&self) -> &str {
        self.session_url.as_deref().unwrap_or(DEFAULT_SESSION_URL)
    }

    /// Floor for the first run and for verify rescans. The environment is
    /// only consulted when the file has no `not_before`.
    pub fn not_before(&self, env: &EnvSettings) -> Result<NaiveDate> {
        match self.not_before {
            Some(d) => Ok(d),
            None => env.default_not_before(),
        }
    }

    pub fn pre_command(&self) -> Vec<String> {
        self.pre_cmd.iter().map(|c| expand_tilde(c)).collect()
    }

    pub fn post_command(&self) -> Vec<String> {
        self.post_cmd.iter().map(|c| expand_tilde(c)).collect()
    }
}

/// Timeouts applied to every request the transport makes.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(20),
        }
    }
}

/// Settings that come from the process environment rather than the file.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    pub debug: bool,
    /// Raw `NOT_BEFORE`, parsed only when a run needs it.
    pub not_before: Option<String>,
}

impl EnvSettings {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("JMAP_DEBUG").ok().as_deref(),
            std::env::var("NOT_BEFORE").ok().as_deref(),
        )
    }

    pub fn from_vars(debug: Option<&str>, not_before: Option<&str>) -> Self {
        Self {
            debug: debug.is_some_and(str_to_bool),
            not_before: not_before.map(str::to_string),
        }
    }

    pub fn default_not_before(&self) -> Result<NaiveDate> {
        let raw = self.not_before.as_deref().unwrap_or(DEFAULT_NOT_BEFORE);
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|e| anyhow!("NOT_BEFORE must be YYYY-MM-DD, got '{raw}': {e}"))
    }
}

pub fn str_to_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

pub fn expand_tilde(p: &str) -> String {
    if p == "~" || p.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), &p[1..]);
        }
    }
    p.to_string()
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow!("no home dir available"))?
        .join(".jmapbackup")
        .join("fastmail.yml"))
}

/// A loaded config together with the file it came from.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub config: Config,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!(
                "configuration file '{}' does not exist",
                path.display()
            ));
        }
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&s)
            .with_context(|| format!("Configuration error in {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// Replace the file through a temp file in the same directory.
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.config)?;
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        tmp.write_all(yaml.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| anyhow!("writing {}: {}", self.path.display(), e.error))?;
        Ok(())
    }
}
