use std::collections::HashMap;

use interpose_invocation::{ProxyRequest, StageScheduling};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PolicySnapshot {
    pub rev: u64,
    pub dispatch: DispatchPolicy,
    pub logging: LoggingPolicy,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    #[serde(default)]
    pub provenance: HashMap<String, PolicyProvenance>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct DispatchPolicy {
    pub scheduling: StageScheduling,
    pub cache_chains: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct LoggingPolicy {
    pub level: String,
    pub json: bool,
}

/// Configured binding of a named interceptor to matching call sites.
///
/// `type` and `method` are globs with at most one `*`; a missing glob
/// matches everything.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSpec {
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    pub interceptor: String,
    #[serde(default)]
    pub order: i32,
}

impl RuleSpec {
    pub fn matches(&self, request: &ProxyRequest) -> bool {
        let method = request.method();
        let type_ok = self
            .type_name
            .as_deref()
            .map_or(true, |glob| glob_matches(glob, method.declaring_type().as_str()));
        let method_ok = self
            .method
            .as_deref()
            .map_or(true, |glob| glob_matches(glob, method.name()));
        type_ok && method_ok
    }
}

fn glob_matches(glob: &str, candidate: &str) -> bool {
    match glob.split_once('*') {
        None => glob == candidate,
        Some((prefix, suffix)) => {
            candidate.len() >= prefix.len() + suffix.len()
                && candidate.starts_with(prefix)
                && candidate.ends_with(suffix)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyProvenance {
    pub path: String,
    pub source: PolicySource,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicySource {
    Builtin,
    File,
    Env,
    Cli,
}

impl PolicySnapshot {
    pub fn set_provenance(&mut self, path: &str, source: PolicySource) {
        self.provenance.insert(
            path.to_string(),
            PolicyProvenance {
                path: path.to_string(),
                source,
            },
        );
    }
}
