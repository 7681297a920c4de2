//! Client configuration via `aeroclient.toml`
//!
//! Holds the seed hosts, credentials, pool sizing and the client-wide
//! default policies. Policy tables use the same field names as per-call
//! overrides and go through the same resolver, so a value that is valid in
//! a call is valid in the file and vice versa.

use crate::resolver::{resolve, PolicyDefaults};
use aeroclient_core::{Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "aeroclient.toml";

/// Per-family policy tables; each is an override map onto the built-in
/// default for that family.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyTables {
    /// `[policies.read]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<toml::Table>,
    /// `[policies.write]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<toml::Table>,
    /// `[policies.apply]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<toml::Table>,
    /// `[policies.operate]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operate: Option<toml::Table>,
    /// `[policies.remove]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<toml::Table>,
    /// `[policies.scan]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan: Option<toml::Table>,
    /// `[policies.query]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<toml::Table>,
    /// `[policies.batch]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<toml::Table>,
    /// `[policies.batch_read]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_read: Option<toml::Table>,
    /// `[policies.batch_write]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_write: Option<toml::Table>,
    /// `[policies.batch_apply]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_apply: Option<toml::Table>,
    /// `[policies.batch_remove]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_remove: Option<toml::Table>,
    /// `[policies.info]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<toml::Table>,
    /// `[policies.admin]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<toml::Table>,
}

/// Client configuration loaded from `aeroclient.toml`.
///
/// # Example
///
/// ```toml
/// hosts = ["127.0.0.1:3000"]
/// max_conns_per_node = 100
///
/// [policies.read]
/// total_timeout = 500
/// replica = "prefer_rack"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Seed hosts as `host:port`.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,
    /// User name for clusters with security enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Expected cluster name; connections to other clusters are refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    /// Connection cap per node.
    #[serde(default = "default_max_conns")]
    pub max_conns_per_node: u32,
    /// Share one cluster connection between clients with the same hosts and user.
    #[serde(default = "default_true")]
    pub shared_connection: bool,
    /// Default policy tables.
    #[serde(default)]
    pub policies: PolicyTables,
}

fn default_hosts() -> Vec<String> {
    vec!["127.0.0.1:3000".to_string()]
}

fn default_max_conns() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            user: None,
            cluster_name: None,
            max_conns_per_node: default_max_conns(),
            shared_connection: true,
            policies: PolicyTables::default(),
        }
    }
}

impl ClientConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# aeroclient configuration
#
# Seed hosts; the rest of the cluster is discovered from these.
hosts = ["127.0.0.1:3000"]

# user = "admin"
# cluster_name = "prod"

# Connection cap per node (default: 100)
max_conns_per_node = 100

# Clients with the same hosts and user share one cluster connection.
shared_connection = true

# Default policies. Field names match per-call overrides.
# Enumerated fields take either the numeric code or the name.
#
# [policies.read]
# total_timeout = 1000
# max_retries = 2
# replica = "sequence"
#
# [policies.write]
# key = "send"
# commit_level = "all"
#
# [policies.scan]
# max_records = 0
"#
    }

    /// Parse a config from TOML text and validate it.
    ///
    /// # Errors
    ///
    /// Returns a `ParamError` if the text does not parse or a policy table
    /// holds an invalid value.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)
            .map_err(|e| Error::param(format!("failed to parse client config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::client(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            Error::param(format!(
                "invalid config file '{}': {}",
                path.display(),
                e.message()
            ))
        })
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::client(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::client(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Validate hosts, sizing and every policy table.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::param("config must list at least one host"));
        }
        for host in &self.hosts {
            let valid = host
                .rsplit_once(':')
                .map(|(name, port)| !name.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(Error::param(format!(
                    "invalid host '{}', expected host:port",
                    host
                )));
            }
        }
        if self.max_conns_per_node == 0 {
            return Err(Error::param("max_conns_per_node must be positive"));
        }
        self.policy_defaults().map(|_| ())
    }

    /// Build the client-wide default policies from the policy tables.
    pub fn policy_defaults(&self) -> Result<PolicyDefaults> {
        let base = PolicyDefaults::default();
        let t = &self.policies;
        Ok(PolicyDefaults {
            read: resolve(&base.read, table_value(&t.read).as_ref())?,
            write: resolve(&base.write, table_value(&t.write).as_ref())?,
            apply: resolve(&base.apply, table_value(&t.apply).as_ref())?,
            operate: resolve(&base.operate, table_value(&t.operate).as_ref())?,
            remove: resolve(&base.remove, table_value(&t.remove).as_ref())?,
            scan: resolve(&base.scan, table_value(&t.scan).as_ref())?,
            query: resolve(&base.query, table_value(&t.query).as_ref())?,
            batch: resolve(&base.batch, table_value(&t.batch).as_ref())?,
            batch_read: resolve(&base.batch_read, table_value(&t.batch_read).as_ref())?,
            batch_write: resolve(&base.batch_write, table_value(&t.batch_write).as_ref())?,
            batch_apply: resolve(&base.batch_apply, table_value(&t.batch_apply).as_ref())?,
            batch_remove: resolve(&base.batch_remove, table_value(&t.batch_remove).as_ref())?,
            info: resolve(&base.info, table_value(&t.info).as_ref())?,
            admin: resolve(&base.admin, table_value(&t.admin).as_ref())?,
        })
    }

    /// Key under which clients share a cluster connection.
    pub fn connection_alias(&self) -> String {
        let mut hosts = self.hosts.clone();
        hosts.sort();
        format!(
            "{};{}",
            hosts.join(","),
            self.user.as_deref().unwrap_or_default()
        )
    }
}

fn table_value(table: &Option<toml::Table>) -> Option<Value> {
    table.as_ref().map(|t| {
        Value::Map(
            t.iter()
                .map(|(k, v)| (Value::String(k.clone()), toml_to_value(v)))
                .collect(),
        )
    })
}

fn toml_to_value(v: &toml::Value) -> Value {
    match v {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(d) => Value::String(d.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(toml_to_value).collect()),
        toml::Value::Table(t) => Value::Map(
            t.iter()
                .map(|(k, v)| (Value::String(k.clone()), toml_to_value(v)))
                .collect(),
        ),
    }
}
