//! Configuration loader (§4.7): the `mcpServers` document, environment
//! synthesis (`MCP_SERVER_<NAME>_*`), and the bridge's own bind address.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

/// Default path probed when `MCP_CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "mcp_config.json";
/// Default HTTP bind address when `MCP_BRIDGE_ADDR` is unset.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Risk class governing confirmation and container isolation (§4.6, §4.1).
///
/// Absence is distinct from `Low` on the wire (§6): a server configured with
/// no `riskLevel` omits all `risk_*` fields in API responses, while one
/// configured with `riskLevel: 1` reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Serialize for RiskLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        RiskLevel::from_i64(value).ok_or_else(|| D::Error::custom(format!("invalid risk level `{value}`, expected 1, 2, or 3")))
    }
}

impl RiskLevel {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(RiskLevel::Low),
            2 => Some(RiskLevel::Medium),
            3 => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn description(self) -> &'static str {
        match self {
            RiskLevel::Low => "standard execution",
            RiskLevel::Medium => "confirmation required before tool calls",
            RiskLevel::High => "container-isolated execution",
        }
    }
}

/// Container configuration required when `risk_level` is High (§4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerSpec {
    pub image: String,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub network: Option<String>,
}

/// Launch specification for one server (§3 ServerRecord, §4.1 input).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, rename = "riskLevel")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub docker: Option<DockerSpec>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default, rename = "mcpServers")]
    mcp_servers: BTreeMap<String, LaunchSpec>,
}

/// The resolved set of servers to start at boot, plus the HTTP bind address.
#[derive(Debug, Default)]
pub struct BridgeConfig {
    pub servers: BTreeMap<String, LaunchSpec>,
}

impl BridgeConfig {
    /// Loads the config file (from `MCP_CONFIG_PATH` or [`DEFAULT_CONFIG_FILE`])
    /// and merges in any `MCP_SERVER_<NAME>_*`-synthesized servers. Never
    /// fails: a missing or unparseable file yields an empty config with a
    /// logged warning, per §4.7/§7c (configuration errors are never fatal).
    pub fn load() -> Self {
        let path = config_path();
        let mut servers = read_config_file(&path);

        for (name, spec) in synthesize_from_env(env::vars()) {
            if servers.contains_key(&name) {
                warn!(
                    server = %name,
                    "MCP_SERVER_{}_COMMAND ignored: a file-configured server with the same id already exists",
                    name.to_uppercase()
                );
                continue;
            }
            servers.insert(name, spec);
        }

        BridgeConfig { servers }
    }
}

fn config_path() -> PathBuf {
    env::var("MCP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn read_config_file(path: &Path) -> BTreeMap<String, LaunchSpec> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read MCP config file, starting with no configured servers");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<ConfigFile>(&contents) {
        Ok(file) => file.mcp_servers,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to parse MCP config file, starting with no configured servers");
            BTreeMap::new()
        }
    }
}

/// Returns the HTTP bind address from `MCP_BRIDGE_ADDR`, falling back to
/// [`DEFAULT_BIND_ADDR`].
pub fn bind_addr() -> SocketAddr {
    env::var("MCP_BRIDGE_ADDR")
        .ok()
        .and_then(|addr| addr.parse().ok())
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.parse().expect("default bind addr is valid"))
}

/// Synthesizes servers from `MCP_SERVER_<NAME>_COMMAND` (+ companions), per §4.7/§6.
fn synthesize_from_env(
    vars: impl Iterator<Item = (String, String)>,
) -> BTreeMap<String, LaunchSpec> {
    let vars: BTreeMap<String, String> = vars.collect();
    let mut servers = BTreeMap::new();

    for key in vars.keys() {
        let Some(rest) = key.strip_prefix("MCP_SERVER_") else {
            continue;
        };
        let Some(name) = rest.strip_suffix("_COMMAND") else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let command = vars[key].clone();
        let lower_name = name.to_lowercase();

        let args = vars
            .get(&format!("MCP_SERVER_{name}_ARGS"))
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();

        let env_vars = vars
            .get(&format!("MCP_SERVER_{name}_ENV"))
            .and_then(|raw| serde_json::from_str::<BTreeMap<String, String>>(raw).ok())
            .unwrap_or_default();

        let risk_level = vars
            .get(&format!("MCP_SERVER_{name}_RISK_LEVEL"))
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(RiskLevel::from_i64);

        let docker = vars
            .get(&format!("MCP_SERVER_{name}_DOCKER_CONFIG"))
            .and_then(|raw| serde_json::from_str::<DockerSpec>(raw).ok());

        servers.insert(
            lower_name,
            LaunchSpec {
                command,
                args,
                env: env_vars,
                risk_level,
                docker,
            },
        );
    }

    servers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_minimal_server_from_env() {
        let vars = vec![("MCP_SERVER_ECHO_COMMAND".to_string(), "/bin/cat".to_string())];
        let servers = synthesize_from_env(vars.into_iter());
        assert_eq!(servers.len(), 1);
        let spec = &servers["echo"];
        assert_eq!(spec.command, "/bin/cat");
        assert!(spec.args.is_empty());
        assert!(spec.risk_level.is_none());
    }

    #[test]
    fn synthesizes_full_server_from_env() {
        let vars = vec![
            ("MCP_SERVER_TOOL_COMMAND".to_string(), "npx".to_string()),
            ("MCP_SERVER_TOOL_ARGS".to_string(), "-y, some-pkg".to_string()),
            ("MCP_SERVER_TOOL_ENV".to_string(), r#"{"FOO":"bar"}"#.to_string()),
            ("MCP_SERVER_TOOL_RISK_LEVEL".to_string(), "2".to_string()),
        ];
        let servers = synthesize_from_env(vars.into_iter());
        let spec = &servers["tool"];
        assert_eq!(spec.args, vec!["-y".to_string(), "some-pkg".to_string()]);
        assert_eq!(spec.env.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(spec.risk_level, Some(RiskLevel::Medium));
    }

    #[test]
    fn ignores_unrelated_env_vars() {
        let vars = vec![("PATH".to_string(), "/usr/bin".to_string())];
        assert!(synthesize_from_env(vars.into_iter()).is_empty());
    }

    #[test]
    fn reads_mcp_servers_map_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_config.json");
        fs::write(
            &path,
            r#"{"mcpServers":{"echo":{"command":"/bin/cat","riskLevel":2}}}"#,
        )
        .unwrap();

        let servers = read_config_file(&path);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers["echo"].command, "/bin/cat");
        assert_eq!(servers["echo"].risk_level, Some(RiskLevel::Medium));
    }

    #[test]
    fn missing_config_file_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        assert!(read_config_file(&path).is_empty());
    }

    #[test]
    fn unparseable_config_file_yields_empty_map_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_config.json");
        fs::write(&path, "not json").unwrap();
        assert!(read_config_file(&path).is_empty());
    }

    #[test]
    fn risk_level_round_trips_through_json() {
        let spec = LaunchSpec {
            command: "foo".to_string(),
            args: vec![],
            env: BTreeMap::new(),
            risk_level: Some(RiskLevel::High),
            docker: None,
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["riskLevel"], 3);
    }
}
