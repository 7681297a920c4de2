//! Partition filters and resumable per-partition cursors

use aeroclient_core::{param_error, Digest, Error, Result, Value, N_PARTITIONS};
use serde::{Deserialize, Serialize};

/// Cursor for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStatus {
    /// Partition id
    pub id: u16,
    /// Last digest delivered; the next page starts after it
    pub digest: Option<Digest>,
    /// Last secondary-index value position delivered (queries)
    pub bval: u64,
    /// The partition still needs a pass
    pub retry: bool,
    /// Every record of the partition has been delivered
    pub done: bool,
}

impl PartitionStatus {
    fn fresh(id: u16) -> Self {
        PartitionStatus {
            id,
            digest: None,
            bval: 0,
            retry: true,
            done: false,
        }
    }
}

/// Cursor over a contiguous partition range.
///
/// Serializable so a caller can persist it and resume a paginated scan or
/// query in a later call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionsStatus {
    /// First partition
    pub begin: u16,
    /// Number of partitions
    pub count: u16,
    /// Every partition is done
    pub done: bool,
    /// Some partition still needs a pass
    pub retry: bool,
    /// One entry per partition, in id order
    pub parts: Vec<PartitionStatus>,
}

impl PartitionsStatus {
    /// Cursor positioned at the start of each partition
    pub fn new(begin: u16, count: u16, digest: Option<Digest>) -> Self {
        let mut parts: Vec<_> = (begin..begin + count).map(PartitionStatus::fresh).collect();
        if let (Some(first), Some(d)) = (parts.first_mut(), digest) {
            first.digest = Some(d);
        }
        PartitionsStatus {
            begin,
            count,
            done: false,
            retry: true,
            parts,
        }
    }

    /// Status of one partition
    pub fn part(&self, id: u16) -> Option<&PartitionStatus> {
        id.checked_sub(self.begin)
            .and_then(|i| self.parts.get(i as usize))
    }

    /// Mutable status of one partition
    pub fn part_mut(&mut self, id: u16) -> Option<&mut PartitionStatus> {
        id.checked_sub(self.begin)
            .and_then(move |i| self.parts.get_mut(i as usize))
    }

    /// Recompute the aggregate flags from the partitions
    pub fn refresh(&mut self) {
        self.done = self.parts.iter().all(|p| p.done);
        self.retry = !self.done;
    }

    /// Compact MessagePack form, for persisting a cursor outside the process
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self)
            .map_err(|e| Error::client(format!("cannot encode partition status: {}", e)))
    }

    /// Decode the output of [`PartitionsStatus::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| param_error!("invalid partition status bytes: {}", e))
    }
}

/// Which partitions a scan or query covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFilter {
    begin: u16,
    count: u16,
    digest: Option<Digest>,
    status: Option<PartitionsStatus>,
}

impl Default for PartitionFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl PartitionFilter {
    /// Every partition
    pub fn all() -> Self {
        PartitionFilter {
            begin: 0,
            count: N_PARTITIONS as u16,
            digest: None,
            status: None,
        }
    }

    /// `count` partitions starting at `begin`
    pub fn by_range(begin: i64, count: i64) -> Result<Self> {
        let n = N_PARTITIONS as i64;
        if !(0..n).contains(&begin) {
            return Err(param_error!(
                "invalid partition_filter begin {}, must be between 0 and {}",
                begin,
                n - 1
            ));
        }
        if !(1..=n).contains(&count) {
            return Err(param_error!(
                "invalid partition_filter count {}, must be between 1 and {}",
                count,
                n
            ));
        }
        if begin + count > n {
            return Err(param_error!(
                "invalid partition filter range, begin: {} count: {}, \
                 begin + count must not exceed {}",
                begin,
                count,
                n
            ));
        }
        Ok(PartitionFilter {
            begin: begin as u16,
            count: count as u16,
            digest: None,
            status: None,
        })
    }

    /// One partition
    pub fn by_id(id: i64) -> Result<Self> {
        Self::by_range(id, 1)
    }

    /// The partition holding `digest`, starting after that record
    pub fn by_digest(digest: Digest) -> Self {
        PartitionFilter {
            begin: digest.partition_id() as u16,
            count: 1,
            digest: Some(digest),
            status: None,
        }
    }

    /// Resume from a cursor returned by an earlier page
    pub fn from_status(status: PartitionsStatus) -> Result<Self> {
        let mut filter = Self::by_range(status.begin as i64, status.count as i64)?;
        if status.parts.len() != status.count as usize
            || status
                .parts
                .iter()
                .enumerate()
                .any(|(i, p)| p.id as usize != status.begin as usize + i)
        {
            return Err(param_error!(
                "partition_status does not match its range {}..{}",
                status.begin,
                status.begin as u32 + status.count as u32
            ));
        }
        filter.status = Some(status);
        Ok(filter)
    }

    /// Decode the loose form
    /// `{"begin": .., "count": .., "digest": bytes, "partition_status": {..}}`.
    ///
    /// `partition_status` maps each partition id to
    /// `[id, init, retry, digest, bval]`; ids missing from it start fresh.
    pub fn decode(value: &Value) -> Result<Self> {
        if value.as_map().is_none() {
            return Err(param_error!(
                "invalid partition_filter policy, partition_filter must be a map"
            ));
        }
        let int = |name: &str, default: i64| -> Result<i64> {
            match value.get(name) {
                None | Some(Value::Nil) => Ok(default),
                Some(Value::Int(i)) => Ok(*i),
                Some(other) => Err(param_error!(
                    "invalid partition_filter {}, must be an integer, got {}",
                    name,
                    other.type_name()
                )),
            }
        };
        let mut filter = Self::by_range(int("begin", 0)?, int("count", N_PARTITIONS as i64)?)?;
        if let Some(d) = value.get("digest").filter(|d| !d.is_nil()) {
            let bytes = d
                .as_blob()
                .ok_or_else(|| param_error!("partition_filter digest must be bytes"))?;
            filter.digest = Some(Digest::from_slice(bytes)?);
        }
        if let Some(ps) = value.get("partition_status").filter(|p| !p.is_nil()) {
            filter.status = Some(decode_status(&filter, ps)?);
        }
        Ok(filter)
    }

    /// First partition
    pub fn begin(&self) -> u16 {
        self.begin
    }

    /// Number of partitions
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Cursor the transport advances
    pub fn into_status(self) -> PartitionsStatus {
        match self.status {
            Some(status) => status,
            None => PartitionsStatus::new(self.begin, self.count, self.digest),
        }
    }
}

fn decode_status(filter: &PartitionFilter, value: &Value) -> Result<PartitionsStatus> {
    let entries = value.as_map().ok_or_else(|| {
        param_error!("invalid partition_filter policy, partition_status must be a map")
    })?;
    let mut status = PartitionsStatus::new(filter.begin, filter.count, filter.digest);
    for (k, v) in entries {
        match k {
            Value::String(name) if name == "done" => {
                status.done = flag(v, "done")?;
            }
            Value::String(name) if name == "retry" => {
                status.retry = flag(v, "retry")?;
            }
            Value::Int(id) => {
                let Some(part) = u16::try_from(*id).ok().and_then(|id| status.part_mut(id)) else {
                    tracing::debug!(
                        target: "aeroclient::partition",
                        id,
                        "Ignoring status outside the filter range"
                    );
                    continue;
                };
                let fields = v
                    .as_list()
                    .ok_or_else(|| param_error!("invalid status for part_id: {}", id))?;
                if let Some(retry) = fields.get(2) {
                    part.retry = flag(retry, "retry")?;
                }
                let init = match fields.get(1) {
                    Some(init) => flag(init, "init")?,
                    None => false,
                };
                if let Some(d) = fields.get(3).filter(|d| !d.is_nil()) {
                    let bytes = d
                        .as_blob()
                        .ok_or_else(|| param_error!("invalid digest value for part_id: {}", id))?;
                    if init {
                        part.digest = Some(Digest::from_slice(bytes)?);
                    }
                }
                if let Some(bval) = fields.get(4) {
                    let b = bval
                        .as_int()
                        .ok_or_else(|| param_error!("invalid bval for part_id: {}", id))?;
                    part.bval = b as u64;
                }
                part.done = !part.retry && init;
            }
            other => {
                return Err(param_error!(
                    "unexpected partition_status key {}",
                    other
                ))
            }
        }
    }
    Ok(status)
}

fn flag(v: &Value, name: &str) -> Result<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Int(i) => Ok(*i != 0),
        other => Err(param_error!(
            "partition_status key '{}' must be an int, got {}",
            name,
            other.type_name()
        )),
    }
}
