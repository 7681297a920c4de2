//! Partition walks for scans and queries

use super::expr::{passes, EvalContext};
use super::info::IndexDef;
use super::store::StoredRecord;
use super::Inner;
use crate::client::IndexDataType;
use crate::geo::GeoShape;
use crate::partition::PartitionsStatus;
use crate::transport::{IndexCollection, IndexPredicate, RawRecord, StreamItem, StreamRequest};
use aeroclient_core::{Digest, Error, Key, Result, ResultCode, Value};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A query predicate resolved against its index
struct IndexMatch<'a> {
    predicate: &'a IndexPredicate,
    def: IndexDef,
    shape: Option<GeoShape>,
}

fn find_index(
    inner: &Inner,
    request: &StreamRequest,
    predicate: &IndexPredicate,
) -> Result<IndexDef> {
    let collection = predicate.collection();
    inner
        .indexes
        .read()
        .iter()
        .filter(|((ns, _), _)| *ns == request.namespace)
        .map(|(_, def)| def)
        .find(|def| {
            def.bin == predicate.bin().as_str()
                && def.collection == collection
                && (def.set.is_none() || def.set == request.set)
        })
        .cloned()
        .ok_or_else(|| {
            Error::new(
                ResultCode::IndexNotFound,
                format!("no index on bin {} in {}", predicate.bin(), request.namespace),
            )
        })
}

fn typed(def: &IndexDef, v: &Value) -> bool {
    matches!(
        (def.data, v),
        (IndexDataType::Numeric, Value::Int(_))
            | (IndexDataType::String, Value::String(_))
            | (IndexDataType::Geo2dSphere, Value::GeoJson(_))
    )
}

impl IndexMatch<'_> {
    fn element(&self, x: &Value) -> bool {
        if !typed(&self.def, x) {
            return false;
        }
        match (self.predicate, &self.shape, x) {
            (IndexPredicate::Equals { value, .. }, _, _)
            | (IndexPredicate::Contains { value, .. }, _, _) => x == value,
            (IndexPredicate::Between { begin, end, .. }, _, Value::Int(i)) => {
                (*begin..=*end).contains(i)
            }
            (IndexPredicate::GeoWithin { .. }, Some(region), Value::GeoJson(json)) => {
                match GeoShape::parse(json) {
                    Ok(GeoShape::Point(p)) => region.covers(p),
                    _ => false,
                }
            }
            (IndexPredicate::GeoContains { .. }, Some(point), Value::GeoJson(json)) => {
                let GeoShape::Point(p) = point else {
                    return false;
                };
                GeoShape::parse(json).is_ok_and(|region| region.covers(*p))
            }
            _ => false,
        }
    }

    fn record(&self, rec: &StoredRecord) -> bool {
        let Some(v) = rec.bin(self.predicate.bin().as_str()) else {
            return false;
        };
        match (self.def.collection, v) {
            (IndexCollection::Default, v) => self.element(v),
            (IndexCollection::List, Value::List(items)) => items.iter().any(|x| self.element(x)),
            (IndexCollection::MapKeys, Value::Map(entries)) => {
                entries.iter().any(|(k, _)| self.element(k))
            }
            (IndexCollection::MapValues, Value::Map(entries)) => {
                entries.iter().any(|(_, x)| self.element(x))
            }
            _ => false,
        }
    }
}

fn stream_key(namespace: &str, digest: Digest, rec: &StoredRecord) -> Result<Key> {
    match &rec.user_key {
        Some(k) => Key::new(namespace, rec.set.as_str(), k.to_value()),
        None => Key::from_digest(namespace, rec.set.as_str(), digest),
    }
}

fn project(
    rec: StoredRecord,
    bins: Option<&[aeroclient_operations::BinName]>,
    now: DateTime<Utc>,
) -> RawRecord {
    let ttl = rec.ttl(now);
    let bins = match bins {
        None => rec.bins,
        Some(names) => rec
            .bins
            .into_iter()
            .filter(|(n, _)| names.iter().any(|b| b == n.as_str()))
            .collect(),
    };
    RawRecord {
        generation: rec.generation,
        ttl,
        bins,
    }
}

/// Walk the unfinished partitions of `partitions` in id then digest order
pub(super) fn walk(
    inner: &Inner,
    request: &StreamRequest,
    partitions: &mut PartitionsStatus,
    on_item: &mut dyn FnMut(StreamItem) -> bool,
) -> Result<()> {
    let index = match &request.predicate {
        Some(predicate) => Some(IndexMatch {
            predicate,
            shape: predicate.geo_shape()?,
            def: find_index(inner, request, predicate)?,
        }),
        None => None,
    };
    let pace = (request.records_per_second > 0)
        .then(|| Duration::from_secs(1) / request.records_per_second);
    let now = Utc::now();
    let mut delivered = 0u64;

    for part in partitions.parts.iter_mut().filter(|p| !p.done) {
        for (digest, rec) in inner.store.page(&request.namespace, part.id, part.digest, now) {
            if request.set.as_deref().is_some_and(|s| s != rec.set) {
                continue;
            }
            if let Some(filter) = &request.filter {
                let cx = EvalContext {
                    record: &rec,
                    digest: &digest,
                    now,
                };
                if !passes(filter, &cx) {
                    continue;
                }
            }
            if index.as_ref().is_some_and(|m| !m.record(&rec)) {
                continue;
            }
            if request.max_records > 0 && delivered >= request.max_records {
                return Ok(());
            }
            let item = StreamItem {
                key: stream_key(&request.namespace, digest, &rec)?,
                record: project(rec, request.bins.as_deref(), now),
            };
            part.digest = Some(digest);
            delivered += 1;
            if let Some(pace) = pace {
                std::thread::sleep(pace);
            }
            if !on_item(item) {
                return Ok(());
            }
        }
        part.done = true;
        part.retry = false;
    }
    Ok(())
}
