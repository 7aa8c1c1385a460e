use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::api::apply_override_to_snapshot;
use crate::defaults::default_snapshot;
use crate::errors::PolicyError;
use crate::model::{PolicySnapshot, PolicySource};

const DEFAULT_ENV_PREFIX: &str = "INTERPOSE_POLICY";

const BUILTIN_PATHS: &[&str] = &[
    "rev",
    "dispatch.scheduling",
    "dispatch.cache_chains",
    "logging.level",
    "logging.json",
    "rules",
];

/// Layers applied on top of the builtin defaults, in order.
///
/// With prefix `P`, environment overrides are read from `P__<PATH>`, a JSON
/// document from `P_OVERRIDE_JSON` and `path=value` pairs from
/// `P_CLI_OVERRIDES`.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
    pub include_cli_env: bool,
    pub env_prefix: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            include_env: false,
            include_cli_env: false,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }
}

impl LoadOptions {
    /// File plus every environment layer.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            ..Self::environment()
        }
    }

    pub fn environment() -> Self {
        Self {
            include_env: true,
            include_cli_env: true,
            ..Self::default()
        }
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }
}

pub fn load_snapshot(path: Option<&Path>) -> Result<PolicySnapshot, PolicyError> {
    let mut options = LoadOptions::environment();
    options.paths.extend(path.map(Path::to_path_buf));
    load_snapshot_with_options(&options)
}

pub fn load_snapshot_with_options(options: &LoadOptions) -> Result<PolicySnapshot, PolicyError> {
    let mut snapshot = default_snapshot();
    for path in BUILTIN_PATHS {
        snapshot.set_provenance(path, PolicySource::Builtin);
    }

    let mut overlays = Vec::new();
    for path in &options.paths {
        overlays.extend(file_overlays(path)?);
    }
    if options.include_env {
        overlays.extend(env_overlays(&options.env_prefix)?);
    }
    if options.include_cli_env {
        overlays.extend(cli_overlays(&options.env_prefix));
    }

    let applied = overlays.len();
    for overlay in overlays {
        apply_override_to_snapshot(&mut snapshot, &overlay.path, &overlay.value, overlay.source)?;
    }
    debug!(rev = snapshot.rev, applied, "policy snapshot loaded");
    Ok(snapshot)
}

struct Overlay {
    path: String,
    value: Value,
    source: PolicySource,
}

fn file_overlays(path: &Path) -> Result<Vec<Overlay>, PolicyError> {
    if !path.exists() {
        debug!(path = %path.display(), "policy file not found; skipping");
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .map_err(|err| PolicyError::Io(format!("{}: {err}", path.display())))?;
    let document: Value = match path.extension().and_then(OsStr::to_str) {
        Some("json") => serde_json::from_str(&content).map_err(invalid)?,
        _ => serde_yaml::from_str(&content).map_err(invalid)?,
    };
    Ok(leaves(document, PolicySource::File))
}

fn env_overlays(prefix: &str) -> Result<Vec<Overlay>, PolicyError> {
    let path_prefix = format!("{prefix}__");
    let mut overlays: Vec<Overlay> = env::vars()
        .filter_map(|(key, raw)| {
            let path = key
                .strip_prefix(&path_prefix)?
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(str::to_ascii_lowercase)
                .collect::<Vec<_>>()
                .join(".");
            (!path.is_empty()).then(|| Overlay {
                path,
                value: scalar(&raw),
                source: PolicySource::Env,
            })
        })
        .collect();

    match env::var(format!("{prefix}_OVERRIDE_JSON")) {
        Ok(raw) if !raw.trim().is_empty() => {
            let document: Value = serde_json::from_str(&raw).map_err(invalid)?;
            overlays.extend(leaves(document, PolicySource::Env));
        }
        _ => {}
    }
    Ok(overlays)
}

fn cli_overlays(prefix: &str) -> Vec<Overlay> {
    let Ok(raw) = env::var(format!("{prefix}_CLI_OVERRIDES")) else {
        return Vec::new();
    };
    raw.split(',')
        .filter_map(|pair| {
            let (path, value) = pair.trim().split_once('=')?;
            let path = path.trim();
            (!path.is_empty()).then(|| Overlay {
                path: path.to_string(),
                value: scalar(value.trim()),
                source: PolicySource::Cli,
            })
        })
        .collect()
}

/// JSON literal when the text parses as one, otherwise a plain string.
fn scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Flattens nested objects into dotted paths. Arrays stay whole.
fn leaves(document: Value, source: PolicySource) -> Vec<Overlay> {
    let mut out = Vec::new();
    let mut pending = vec![(String::new(), document)];
    while let Some((prefix, value)) = pending.pop() {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let key = key.trim().to_ascii_lowercase();
                    let path = if prefix.is_empty() {
                        key
                    } else {
                        format!("{prefix}.{key}")
                    };
                    pending.push((path, child));
                }
            }
            leaf if !prefix.is_empty() => out.push(Overlay {
                path: prefix,
                value: leaf,
                source,
            }),
            _ => {}
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn invalid(err: impl std::fmt::Display) -> PolicyError {
    PolicyError::Invalid(err.to_string())
}
