//! UDF module management
//!
//! Modules are uploaded, listed, fetched and removed with info commands.
//! Module content travels base64 encoded.

use crate::client::Client;
use aeroclient_core::{param_error, Error, Result, ResultCode, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::info;

/// How long [`Client::udf_put`] waits for the module to show up in the
/// cluster's module list
pub const UDF_PUT_WAIT: Duration = Duration::from_millis(2000);

const UDF_LIST_POLL: Duration = Duration::from_millis(50);

/// Language of a UDF module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum UdfLanguage {
    /// Lua
    #[default]
    Lua,
}

impl UdfLanguage {
    /// Name used on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            UdfLanguage::Lua => "LUA",
        }
    }
}

impl fmt::Display for UdfLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UdfLanguage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("lua") {
            Ok(UdfLanguage::Lua)
        } else {
            Err(param_error!("unsupported udf language {:?}", s))
        }
    }
}

/// A module registered with the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UdfModuleInfo {
    /// File name, e.g. `my_module.lua`
    pub name: String,
    /// Content hash reported by the cluster
    pub hash: String,
    /// Language
    pub language: UdfLanguage,
}

fn parse_module_list(reply: &str) -> Result<Vec<UdfModuleInfo>> {
    let mut modules = Vec::new();
    for entry in reply.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let mut name = None;
        let mut hash = String::new();
        let mut language = UdfLanguage::default();
        for (k, v) in entry.split(',').filter_map(|f| f.split_once('=')) {
            match k {
                "filename" => name = Some(v.to_string()),
                "hash" => hash = v.to_string(),
                "type" => language = v.parse()?,
                _ => {}
            }
        }
        let name = name.ok_or_else(|| {
            Error::new(
                ResultCode::ServerError,
                format!("udf list entry without a file name: {}", entry),
            )
        })?;
        modules.push(UdfModuleInfo {
            name,
            hash,
            language,
        });
    }
    Ok(modules)
}

fn check_module_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains([';', ':', '=', ',']) {
        return Err(param_error!("invalid udf module name {:?}", name));
    }
    Ok(())
}

impl Client {
    /// Upload the module at `path` and wait until the cluster lists it.
    ///
    /// The module is registered under the file's base name. A missing or
    /// empty file fails with `LuaFileNotFound`.
    pub fn udf_put(
        &self,
        path: impl AsRef<Path>,
        language: UdfLanguage,
        policy: Option<&Value>,
    ) -> Result<()> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| param_error!("udf path {} has no file name", path.display()))?;
        let content = std::fs::read(path).map_err(|e| {
            Error::new(
                ResultCode::LuaFileNotFound,
                format!("cannot read udf module {}: {}", path.display(), e),
            )
        })?;
        self.udf_put_bytes(name, &content, language, policy)
    }

    /// Upload module content under `name` and wait until the cluster lists
    /// it
    pub fn udf_put_bytes(
        &self,
        name: &str,
        content: &[u8],
        language: UdfLanguage,
        policy: Option<&Value>,
    ) -> Result<()> {
        check_module_name(name)?;
        if content.is_empty() {
            return Err(Error::new(
                ResultCode::LuaFileNotFound,
                format!("udf module {} is empty", name),
            ));
        }
        let encoded = BASE64.encode(content);
        let command = format!(
            "udf-put:filename={};content={};content-len={};udf-type={};",
            name,
            encoded,
            encoded.len(),
            language
        );
        self.info(&command, policy)
            .map_err(|e| e.with_subject(name))?;

        let started = Instant::now();
        while !self.udf_list(policy)?.iter().any(|m| m.name == name) {
            if started.elapsed() >= UDF_PUT_WAIT {
                return Err(Error::timeout(format!(
                    "udf module {} not listed after {:?}",
                    name, UDF_PUT_WAIT
                )));
            }
            std::thread::sleep(UDF_LIST_POLL);
        }
        info!(
            target: "aeroclient::udf",
            module = name,
            bytes = content.len(),
            "Registered udf module"
        );
        Ok(())
    }

    /// Remove a module by file name
    pub fn udf_remove(&self, name: &str, policy: Option<&Value>) -> Result<()> {
        check_module_name(name)?;
        self.info(&format!("udf-remove:filename={};", name), policy)
            .map(|_| ())
            .map_err(|e| e.with_subject(name))
    }

    /// Modules registered with the cluster
    pub fn udf_list(&self, policy: Option<&Value>) -> Result<Vec<UdfModuleInfo>> {
        let reply = self.info("udf-list", policy)?;
        parse_module_list(&reply)
    }

    /// Content of a registered module
    pub fn udf_get(
        &self,
        name: &str,
        language: UdfLanguage,
        policy: Option<&Value>,
    ) -> Result<String> {
        check_module_name(name)?;
        let command = format!("udf-get:filename={};udf-type={};", name, language);
        let reply = self
            .info(&command, policy)
            .map_err(|e| e.with_subject(name))?;
        let encoded = reply
            .split(';')
            .find_map(|field| field.strip_prefix("content="))
            .ok_or_else(|| {
                Error::new(
                    ResultCode::ServerError,
                    format!("udf-get reply for {} has no content", name),
                )
            })?;
        let bytes = BASE64.decode(encoded.trim()).map_err(|e| {
            Error::new(
                ResultCode::ServerError,
                format!("udf module {} content is not base64: {}", name, e),
            )
        })?;
        String::from_utf8(bytes).map_err(|_| {
            Error::new(
                ResultCode::ServerError,
                format!("udf module {} is not valid UTF-8", name),
            )
        })
    }
}
