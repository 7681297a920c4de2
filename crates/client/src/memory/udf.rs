//! UDF module catalog of the in-process cluster
//!
//! Uploaded modules are stored and listed but never interpreted. A module's
//! functions run only once bound natively with
//! [`MemoryCluster::register_udf`](super::MemoryCluster::register_udf).

use super::info::{require, InfoError, Params};
use super::Inner;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ripemd::{Digest, Ripemd160};
use std::fmt::Write as _;

/// One uploaded module
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct UdfModule {
    pub(super) content: Vec<u8>,
    pub(super) language: String,
    pub(super) hash: String,
}

impl UdfModule {
    pub(super) fn new(content: Vec<u8>, language: &str) -> Self {
        let hash = Ripemd160::digest(&content)
            .iter()
            .fold(String::with_capacity(40), |mut out, b| {
                let _ = write!(out, "{:02x}", b);
                out
            });
        UdfModule {
            content,
            language: language.to_string(),
            hash,
        }
    }
}

/// Catalog file name of a module as named in a UDF call
pub(super) fn module_file(module: &str) -> String {
    if module.ends_with(".lua") {
        module.to_string()
    } else {
        format!("{}.lua", module)
    }
}

pub(super) fn put(inner: &Inner, p: &Params<'_>) -> Result<String, InfoError> {
    let filename = require(p, "filename")?;
    let encoded = p.get("content").copied().unwrap_or("");
    if let Some(len) = p.get("content-len") {
        let expected: usize = len.parse().map_err(|_| InfoError::invalid("content-len", len))?;
        if expected != encoded.len() {
            return Err(InfoError::invalid("content-len", len));
        }
    }
    let language = p.get("udf-type").copied().unwrap_or("LUA");
    if language != "LUA" {
        return Err(InfoError::invalid("udf-type", language));
    }
    let content = BASE64
        .decode(encoded)
        .map_err(|_| InfoError::invalid("content", filename))?;
    if content.is_empty() {
        return Err(InfoError::EmptyModule(filename.to_string()));
    }
    inner
        .modules
        .write()
        .insert(filename.to_string(), UdfModule::new(content, language));
    Ok("ok".to_string())
}

pub(super) fn remove(inner: &Inner, p: &Params<'_>) -> Result<String, InfoError> {
    let filename = require(p, "filename")?;
    if inner.modules.write().remove(filename).is_none() {
        return Err(InfoError::ModuleMissing(filename.to_string()));
    }
    let module = filename.trim_end_matches(".lua");
    inner.udfs.write().retain(|(m, _), _| m != module);
    Ok("ok".to_string())
}

pub(super) fn list(inner: &Inner) -> String {
    inner
        .modules
        .read()
        .iter()
        .map(|(name, m)| format!("filename={},hash={},type={}", name, m.hash, m.language))
        .collect::<Vec<_>>()
        .join(";")
}

pub(super) fn get(inner: &Inner, p: &Params<'_>) -> Result<String, InfoError> {
    let filename = require(p, "filename")?;
    let modules = inner.modules.read();
    let m = modules
        .get(filename)
        .ok_or_else(|| InfoError::ModuleMissing(filename.to_string()))?;
    Ok(format!(
        "gen={};type={};content={}",
        m.hash,
        m.language,
        BASE64.encode(&m.content)
    ))
}
