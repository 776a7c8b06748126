use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::policy::{default_policy, Cutoff, Policy};

const DEFAULT_SECTION: &str = "_default";

/// The resolved, per-section settings the orchestrator actually consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub policy: Policy,
    pub recursive: bool,
    pub ignore: bool,
}

/// A fully-loaded configuration: a mapping from filesystem path (or `_default`) to its
/// resolved [`Section`]. Always contains a `_default` entry, injected by [`parse`] if the
/// document does not define one, so [`Config::resolve`] never has to fail.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    sections: HashMap<String, Section>,
}

impl Config {
    /// Look up the resolved section for `key`, falling back to `_default`.
    pub fn resolve(&self, key: &str) -> &Section {
        self.sections
            .get(key)
            .unwrap_or_else(|| self.sections.get(DEFAULT_SECTION).expect("_default always present"))
    }

    pub fn default_only() -> Self {
        let mut sections = HashMap::new();
        sections.insert(DEFAULT_SECTION.to_string(), built_in_default_section());
        Config { sections }
    }
}

fn built_in_default_section() -> Section {
    Section {
        policy: default_policy(),
        recursive: true,
        ignore: false,
    }
}

/// Raw TOML shape. Values for the filter keys may be an integer (days), or the strings
/// `"unlimited"`, `"0"`, `"disabled"`. `toml`'s untagged enum support lets a single field type
/// accept either without a custom Deserializer.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Int(i64),
    Str(String),
}

#[derive(Debug, Deserialize, Default)]
struct RawSection {
    all: Option<RawValue>,
    hourly: Option<RawValue>,
    daily: Option<RawValue>,
    weekly: Option<RawValue>,
    monthly: Option<RawValue>,
    yearly: Option<RawValue>,
    recursive: Option<bool>,
    ignore: Option<bool>,
}

fn parse_cutoff(key: &str, value: &RawValue) -> Result<Option<Cutoff>> {
    match value {
        RawValue::Str(s) => match s.as_str() {
            "unlimited" => Ok(Some(Cutoff::Unbounded)),
            "0" | "disabled" => Ok(None),
            other => other
                .parse::<i64>()
                .ok()
                .filter(|n| *n >= 0)
                .map(|n| Some(Cutoff::Days(n as u32)))
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "key '{key}' has unrecognized value '{other}' (expected a non-negative integer, \"unlimited\", \"0\" or \"disabled\")"
                    ))
                }),
        },
        RawValue::Int(n) if *n == 0 => Ok(None),
        RawValue::Int(n) if *n > 0 => Ok(Some(Cutoff::Days(*n as u32))),
        RawValue::Int(n) => Err(Error::Configuration(format!(
            "key '{key}' has a negative value '{n}'"
        ))),
    }
}

fn build_policy(raw: &RawSection) -> Result<Policy> {
    let mut entries = Vec::new();
    for (key, filter, value) in [
        ("all", Filter::Passthrough, &raw.all),
        ("hourly", Filter::Hourly, &raw.hourly),
        ("daily", Filter::Daily, &raw.daily),
        ("weekly", Filter::Weekly, &raw.weekly),
        ("monthly", Filter::Monthly, &raw.monthly),
        ("yearly", Filter::Yearly, &raw.yearly),
    ] {
        if let Some(value) = value {
            if let Some(cutoff) = parse_cutoff(key, value)? {
                entries.push((filter, cutoff));
            }
        }
    }
    // Policy::new canonicalizes by granularity, so the order these keys appeared in the
    // document never matters.
    Ok(Policy::new(entries))
}

/// Parse a keyed TOML configuration document into a [`Config`].
///
/// The file is read as raw bytes and decoded as UTF-8 before parsing, matching the upstream
/// tool's binary-mode file handling. Unknown keys are silently ignored for forward
/// compatibility; a `_default` section is injected with the built-in policy if the document
/// does not define one.
pub fn load(path: &Path) -> Result<Config> {
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes)
        .map_err(|e| Error::Configuration(format!("configuration is not valid UTF-8: {e}")))?;
    parse(&text)
}

/// Parse a configuration document already read into memory. Split out from [`load`] so tests
/// can exercise the parser without touching the filesystem.
pub fn parse(text: &str) -> Result<Config> {
    let raw: HashMap<String, RawSection> =
        toml::from_str(text).map_err(|e| Error::Configuration(format!("invalid TOML: {e}")))?;

    let mut sections = HashMap::new();
    for (key, raw_section) in &raw {
        let policy = build_policy(raw_section)?;
        sections.insert(
            key.clone(),
            Section {
                policy,
                recursive: raw_section.recursive.unwrap_or(true),
                ignore: raw_section.ignore.unwrap_or(false),
            },
        );
    }

    if !sections.contains_key(DEFAULT_SECTION) {
        sections.insert(DEFAULT_SECTION.to_string(), built_in_default_section());
    }

    Ok(Config { sections })
}

const DEFAULT_BACKUP_PREFIX: &str = "backup_";
const DEFAULT_BACKUP_FILESYSTEM: &str = "tank/Default";

/// The replication selector's configuration: which filesystems to back up, and the prefix
/// their daily backup snapshots carry.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    pub filesystems: Vec<String>,
    pub backup_prefix: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            filesystems: vec![DEFAULT_BACKUP_FILESYSTEM.to_string()],
            backup_prefix: DEFAULT_BACKUP_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawBackupConfig {
    filesystems: Option<Vec<String>>,
    #[serde(rename = "backup-prefix")]
    backup_prefix: Option<String>,
}

/// Load a backup configuration document, falling back to the built-in default (a single
/// filesystem, `backup_` prefix) if `path` is `None`.
pub fn load_backup_config(path: Option<&Path>) -> Result<BackupConfig> {
    let Some(path) = path else {
        return Ok(BackupConfig::default());
    };
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes)
        .map_err(|e| Error::Configuration(format!("configuration is not valid UTF-8: {e}")))?;
    let raw: RawBackupConfig =
        toml::from_str(&text).map_err(|e| Error::Configuration(format!("invalid TOML: {e}")))?;
    let default = BackupConfig::default();
    Ok(BackupConfig {
        filesystems: raw.filesystems.unwrap_or(default.filesystems),
        backup_prefix: raw.backup_prefix.unwrap_or(default.backup_prefix),
    })
}
