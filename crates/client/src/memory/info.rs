//! Info commands of the in-process cluster
//!
//! Commands look like `name:key=value;key=value`. Failures are answered as
//! `FAIL:<code>:<message>`, the same shape a server node uses.

use super::{jobs, udf, Inner};
use crate::client::IndexDataType;
use crate::job::JobModule;
use crate::transport::IndexCollection;
use aeroclient_core::ResultCode;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// A secondary index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct IndexDef {
    pub(super) set: Option<String>,
    pub(super) bin: String,
    pub(super) collection: IndexCollection,
    pub(super) data: IndexDataType,
}

#[derive(Debug, Error)]
pub(super) enum InfoError {
    #[error("index {0} already exists")]
    IndexExists(String),
    #[error("index {0} does not exist")]
    IndexMissing(String),
    #[error("missing parameter {0}")]
    MissingParam(&'static str),
    #[error("invalid {name}: {value:?}")]
    InvalidParam { name: &'static str, value: String },
    #[error("unrecognized command {0}")]
    UnknownCommand(String),
    #[error("udf module {0} is empty")]
    EmptyModule(String),
    #[error("udf module {0} not found")]
    ModuleMissing(String),
    #[error("job {0} not found")]
    JobMissing(u64),
}

impl InfoError {
    pub(super) fn code(&self) -> ResultCode {
        match self {
            InfoError::IndexExists(_) => ResultCode::IndexFound,
            InfoError::IndexMissing(_) => ResultCode::IndexNotFound,
            InfoError::EmptyModule(_) | InfoError::ModuleMissing(_) => {
                ResultCode::LuaFileNotFound
            }
            InfoError::JobMissing(_) => ResultCode::KeyNotFound,
            _ => ResultCode::ParameterError,
        }
    }

    pub(super) fn invalid(name: &'static str, value: &str) -> Self {
        InfoError::InvalidParam {
            name,
            value: value.to_string(),
        }
    }
}

pub(super) type Params<'a> = BTreeMap<&'a str, &'a str>;

fn params(args: &str) -> Params<'_> {
    args.split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

pub(super) fn require<'a>(p: &Params<'a>, name: &'static str) -> Result<&'a str, InfoError> {
    p.get(name)
        .copied()
        .filter(|v| !v.is_empty())
        .ok_or(InfoError::MissingParam(name))
}

fn collection_name(c: IndexCollection) -> &'static str {
    match c {
        IndexCollection::Default => "default",
        IndexCollection::List => "list",
        IndexCollection::MapKeys => "mapkeys",
        IndexCollection::MapValues => "mapvalues",
    }
}

fn data_name(d: IndexDataType) -> &'static str {
    match d {
        IndexDataType::Numeric => "numeric",
        IndexDataType::String => "string",
        IndexDataType::Geo2dSphere => "geo2dsphere",
    }
}

fn index_create(inner: &Inner, p: &Params<'_>) -> Result<String, InfoError> {
    let ns = require(p, "ns")?;
    let name = require(p, "indexname")?;
    let collection = match p.get("indextype").copied().unwrap_or("default") {
        "default" => IndexCollection::Default,
        "list" => IndexCollection::List,
        "mapkeys" => IndexCollection::MapKeys,
        "mapvalues" => IndexCollection::MapValues,
        other => return Err(InfoError::invalid("indextype", other)),
    };
    let indexdata = require(p, "indexdata")?;
    let (bin, ty) = indexdata
        .split_once(',')
        .ok_or_else(|| InfoError::invalid("indexdata", indexdata))?;
    let data = match ty {
        "numeric" => IndexDataType::Numeric,
        "string" => IndexDataType::String,
        "geo2dsphere" => IndexDataType::Geo2dSphere,
        other => return Err(InfoError::invalid("indexdata", other)),
    };
    let mut indexes = inner.indexes.write();
    let id = (ns.to_string(), name.to_string());
    if indexes.contains_key(&id) {
        return Err(InfoError::IndexExists(name.to_string()));
    }
    indexes.insert(
        id,
        IndexDef {
            set: p.get("set").map(|s| s.to_string()),
            bin: bin.to_string(),
            collection,
            data,
        },
    );
    Ok("OK".to_string())
}

fn index_delete(inner: &Inner, p: &Params<'_>) -> Result<String, InfoError> {
    let ns = require(p, "ns")?;
    let name = require(p, "indexname")?;
    inner
        .indexes
        .write()
        .remove(&(ns.to_string(), name.to_string()))
        .map(|_| "OK".to_string())
        .ok_or_else(|| InfoError::IndexMissing(name.to_string()))
}

fn index_list(inner: &Inner, p: &Params<'_>) -> String {
    let only = p.get("ns").copied();
    inner
        .indexes
        .read()
        .iter()
        .filter(|((ns, _), _)| only.map_or(true, |o| o == ns))
        .map(|((ns, name), def)| {
            format!(
                "ns={}:indexname={}:set={}:bin={}:type={}:indextype={}",
                ns,
                name,
                def.set.as_deref().unwrap_or("NULL"),
                def.bin,
                data_name(def.data),
                collection_name(def.collection)
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn truncate(inner: &Inner, p: &Params<'_>, whole_namespace: bool) -> Result<String, InfoError> {
    let ns = require(p, "namespace")?;
    let set = if whole_namespace { None } else { p.get("set").copied() };
    let before = match p.get("lut") {
        None => chrono::DateTime::<Utc>::MAX_UTC,
        Some(lut) => {
            let nanos: i64 = lut.parse().map_err(|_| InfoError::invalid("lut", lut))?;
            Utc.timestamp_nanos(nanos)
        }
    };
    let dropped = inner.store.truncate(ns, set, before);
    tracing::debug!(
        target: "aeroclient::memory",
        namespace = ns,
        set = set.unwrap_or(""),
        dropped,
        "Truncated records"
    );
    Ok("ok".to_string())
}

fn job(inner: &Inner, p: &Params<'_>) -> Result<String, InfoError> {
    let name = require(p, "module")?;
    let module: JobModule = name.parse().map_err(|_| InfoError::invalid("module", name))?;
    match require(p, "cmd")? {
        "get-job" => {}
        other => return Err(InfoError::invalid("cmd", other)),
    }
    let trid = require(p, "trid")?;
    let id: u64 = trid.parse().map_err(|_| InfoError::invalid("trid", trid))?;
    inner
        .jobs
        .lock()
        .get(&id)
        .filter(|job| job.module == module)
        .map(|job| jobs::describe(id, job))
        .ok_or(InfoError::JobMissing(id))
}

fn run(inner: &Inner, command: &str) -> Result<String, InfoError> {
    let (name, args) = command.split_once(':').unwrap_or((command, ""));
    let p = params(args);
    match name.trim() {
        "build" => Ok(env!("CARGO_PKG_VERSION").to_string()),
        "namespaces" => Ok(inner.store.namespaces().join(";")),
        "sindex-create" => index_create(inner, &p),
        "sindex-delete" => index_delete(inner, &p),
        "sindex-list" => Ok(index_list(inner, &p)),
        "truncate" => truncate(inner, &p, false),
        "truncate-namespace" => truncate(inner, &p, true),
        "udf-put" => udf::put(inner, &p),
        "udf-remove" => udf::remove(inner, &p),
        "udf-list" => Ok(udf::list(inner)),
        "udf-get" => udf::get(inner, &p),
        "jobs" => job(inner, &p),
        other => Err(InfoError::UnknownCommand(other.to_string())),
    }
}

/// Answer one info command
pub(super) fn handle(inner: &Inner, command: &str) -> String {
    match run(inner, command) {
        Ok(reply) => reply,
        Err(e) => format!("FAIL:{}:{}", e.code().code(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_catalog() {
        let inner = Inner::default();
        let create = concat!(
            "sindex-create:ns=test;set=demo;indexname=by_tag;",
            "indextype=list;indexdata=tags,string"
        );
        assert_eq!(handle(&inner, create), "OK");
        assert!(handle(&inner, create).starts_with("FAIL:200:"));
        assert_eq!(
            handle(&inner, "sindex-list:ns=test"),
            "ns=test:indexname=by_tag:set=demo:bin=tags:type=string:indextype=list"
        );
        assert_eq!(handle(&inner, "sindex-delete:ns=test;indexname=by_tag"), "OK");
        assert!(handle(&inner, "sindex-delete:ns=test;indexname=by_tag").starts_with("FAIL:201:"));
    }

    #[test]
    fn test_bad_commands() {
        let inner = Inner::default();
        assert!(handle(&inner, "bogus").starts_with("FAIL:4:"));
        assert!(handle(&inner, "sindex-create:ns=test").starts_with("FAIL:4:missing parameter"));
        assert!(handle(&inner, "truncate:namespace=test;lut=abc").starts_with("FAIL:4:"));
        assert!(handle(&inner, "jobs:module=batch;cmd=get-job;trid=1").starts_with("FAIL:4:"));
        assert!(handle(&inner, "jobs:module=scan;cmd=get-job;trid=x").starts_with("FAIL:4:"));
    }

    #[test]
    fn test_unknown_job() {
        let inner = Inner::default();
        assert_eq!(
            handle(&inner, "jobs:module=scan;cmd=get-job;trid=9"),
            "FAIL:2:job 9 not found"
        );
    }
}
