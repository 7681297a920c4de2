//! Client facade: single-record calls, info commands and index management
//!
//! A [`Client`] owns a cluster handle and the client-wide default policies.
//! Every call resolves its policy family against those defaults, validates
//! its input before any I/O, dispatches through the [`Cluster`] trait under
//! the retry budget, and assembles the raw answer into a [`Record`].

use crate::assembler::{assemble, AssembleMode};
use crate::memory::MemoryCluster;
use crate::pool::{ConnectionPool, PooledCluster};
use crate::retry::with_retry;
use crate::transport::{
    Cluster, CommandSettings, IndexCollection, NodeAddress, RawRecord, Request, RequestKind,
    UdfCall, UDF_RESULT_BIN,
};
use aeroclient_core::{
    compute_digest, param_error, partition_id_for, Digest, Error, Key, Limits, Record,
    RecordMetadata, Result, ResultCode, Value,
};
use aeroclient_operations::{
    Expiration, Operation, OperationBatch, OperationBuilder, ValidationContext,
};
use aeroclient_policy::{
    resolve, ApplyPolicy, BasePolicy, ClientConfig, GenerationPolicy, InfoPolicy, OperatePolicy,
    PolicyDefaults, ReadPolicy, RemovePolicy, WritePolicy,
};
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) struct Shared {
    pub(crate) cluster: PooledCluster,
    pub(crate) defaults: PolicyDefaults,
    pub(crate) limits: Limits,
}

/// Handle to a cluster. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("cluster", &self.shared.cluster)
            .finish()
    }
}

/// Data type of a secondary index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexDataType {
    /// Integer values
    Numeric,
    /// String values
    String,
    /// GeoJSON values
    Geo2dSphere,
}

impl IndexDataType {
    fn as_str(self) -> &'static str {
        match self {
            IndexDataType::Numeric => "numeric",
            IndexDataType::String => "string",
            IndexDataType::Geo2dSphere => "geo2dsphere",
        }
    }
}

impl Client {
    /// Client over an already connected cluster
    pub fn new(cluster: Arc<dyn Cluster>, defaults: PolicyDefaults) -> Self {
        Self::from_parts(PooledCluster::unpooled(cluster), defaults)
    }

    /// Client over a fresh in-process cluster with default policies
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCluster::new()), PolicyDefaults::default())
    }

    /// Connect according to `config`.
    ///
    /// With `shared_connection` set, clients built from configurations with
    /// the same hosts and user share one cluster handle through `pool`, and
    /// `connect` runs only for the first of them.
    pub fn connect(
        config: &ClientConfig,
        pool: &Arc<ConnectionPool>,
        connect: impl FnOnce(&ClientConfig) -> Result<Arc<dyn Cluster>>,
    ) -> Result<Self> {
        config.validate()?;
        let defaults = config.policy_defaults()?;
        let cluster = if config.shared_connection {
            pool.acquire(&config.connection_alias(), || connect(config))?
        } else {
            PooledCluster::unpooled(connect(config)?)
        };
        info!(
            target: "aeroclient::client",
            hosts = ?config.hosts,
            shared = config.shared_connection,
            "Client connected"
        );
        Ok(Self::from_parts(cluster, defaults))
    }

    fn from_parts(cluster: PooledCluster, defaults: PolicyDefaults) -> Self {
        Client {
            shared: Arc::new(Shared {
                cluster,
                defaults,
                limits: Limits::default(),
            }),
        }
    }

    /// Replace the name and size limits used for local validation.
    ///
    /// Only takes effect on a client that has not been cloned yet.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.limits = limits;
        }
        self
    }

    /// Client-wide default policies
    pub fn defaults(&self) -> &PolicyDefaults {
        &self.shared.defaults
    }

    /// Pool alias of the underlying connection, if shared
    pub fn connection_alias(&self) -> Option<&str> {
        self.shared.cluster.alias()
    }

    pub(crate) fn cluster(&self) -> &dyn Cluster {
        &*self.shared.cluster
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn limits(&self) -> &Limits {
        &self.shared.limits
    }

    fn dispatch(&self, what: &str, base: &BasePolicy, request: &Request) -> Result<RawRecord> {
        let idempotent = !request.kind.is_write();
        debug!(
            target: "aeroclient::client",
            command = what,
            key = %request.key,
            "Dispatching record command"
        );
        with_retry(base, idempotent, what, |_| self.cluster().dispatch_single(request))
            .map_err(|e| if e.key().is_none() { e.with_key(&request.key) } else { e })
    }

    fn operate_batch(
        &self,
        ops: Vec<Operation>,
        meta: Option<&Value>,
        ctx: ValidationContext,
    ) -> Result<OperationBatch> {
        OperationBuilder::new(ops)
            .meta(meta)?
            .build(&ctx.with_limits(self.limits().clone()))
    }

    fn write_ops(
        &self,
        what: &str,
        key: &Key,
        ops: Vec<Operation>,
        meta: Option<&Value>,
        policy: Option<&Value>,
    ) -> Result<()> {
        let p: WritePolicy = resolve(&self.defaults().write, policy)?;
        let batch = self.operate_batch(ops, meta, ValidationContext::operate())?;
        let request = Request {
            key: key.clone(),
            kind: RequestKind::Operate(batch),
            settings: CommandSettings::from(&p),
        };
        self.dispatch(what, &p.base, &request).map(|_| ())
    }

    /// Read every bin of a record
    pub fn get(&self, key: &Key, policy: Option<&Value>) -> Result<Record> {
        self.read(key, vec![Operation::ReadAll], policy)
    }

    /// Read the named bins of a record
    pub fn select(&self, key: &Key, bins: &[&str], policy: Option<&Value>) -> Result<Record> {
        if bins.is_empty() {
            return Err(param_error!("bins to select cannot be empty"));
        }
        self.read(key, bins.iter().map(|b| Operation::read(*b)).collect(), policy)
    }

    fn read(&self, key: &Key, ops: Vec<Operation>, policy: Option<&Value>) -> Result<Record> {
        let p: ReadPolicy = resolve(&self.defaults().read, policy)?;
        let batch = self.operate_batch(ops, None, ValidationContext::batch_read())?;
        let settings = CommandSettings::from(&p);
        let send_key = settings.send_key;
        let request = Request {
            key: key.clone(),
            kind: RequestKind::Operate(batch),
            settings,
        };
        let raw = self.dispatch("get", &p.base, &request)?;
        Ok(assemble(raw, AssembleMode::Merged, key, send_key))
    }

    /// Record metadata, or `None` when the record does not exist
    pub fn exists(&self, key: &Key, policy: Option<&Value>) -> Result<Option<RecordMetadata>> {
        let p: ReadPolicy = resolve(&self.defaults().read, policy)?;
        let request = Request {
            key: key.clone(),
            kind: RequestKind::Exists,
            settings: CommandSettings::from(&p),
        };
        match self.dispatch("exists", &p.base, &request) {
            Ok(raw) => Ok(Some(RecordMetadata {
                generation: raw.generation,
                ttl: raw.ttl,
            })),
            Err(e) if e.code() == ResultCode::KeyNotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write bins. `meta` may carry `{"ttl": .., "gen": ..}`.
    pub fn put(
        &self,
        key: &Key,
        bins: &[(&str, Value)],
        meta: Option<&Value>,
        policy: Option<&Value>,
    ) -> Result<()> {
        if bins.is_empty() {
            return Err(param_error!("bins to put cannot be empty"));
        }
        let ops = bins
            .iter()
            .map(|(name, value)| Operation::write(*name, value.clone()))
            .collect();
        self.write_ops("put", key, ops, meta, policy)
    }

    /// Delete a record
    pub fn remove(&self, key: &Key, policy: Option<&Value>) -> Result<()> {
        let p: RemovePolicy = resolve(&self.defaults().remove, policy)?;
        let generation = (p.gen != GenerationPolicy::Ignore).then_some(p.generation);
        let request = Request {
            key: key.clone(),
            kind: RequestKind::Remove { generation },
            settings: CommandSettings::from(&p),
        };
        self.dispatch("remove", &p.base, &request).map(|_| ())
    }

    /// Reset a record's TTL; see [`Expiration::from_i64`] for sentinels
    pub fn touch(&self, key: &Key, ttl: i64, policy: Option<&Value>) -> Result<()> {
        let op = Operation::touch(Expiration::from_i64(ttl)?);
        self.write_ops("touch", key, vec![op], None, policy)
    }

    /// Append to a string or blob bin
    pub fn append(
        &self,
        key: &Key,
        bin: &str,
        value: impl Into<Value>,
        meta: Option<&Value>,
        policy: Option<&Value>,
    ) -> Result<()> {
        self.write_ops("append", key, vec![Operation::append(bin, value)], meta, policy)
    }

    /// Prepend to a string or blob bin
    pub fn prepend(
        &self,
        key: &Key,
        bin: &str,
        value: impl Into<Value>,
        meta: Option<&Value>,
        policy: Option<&Value>,
    ) -> Result<()> {
        self.write_ops("prepend", key, vec![Operation::prepend(bin, value)], meta, policy)
    }

    /// Add to an integer or float bin
    pub fn increment(
        &self,
        key: &Key,
        bin: &str,
        value: impl Into<Value>,
        meta: Option<&Value>,
        policy: Option<&Value>,
    ) -> Result<()> {
        self.write_ops("increment", key, vec![Operation::increment(bin, value)], meta, policy)
    }

    /// Delete bins from a record
    pub fn remove_bin(
        &self,
        key: &Key,
        bins: &[&str],
        meta: Option<&Value>,
        policy: Option<&Value>,
    ) -> Result<()> {
        if bins.is_empty() {
            return Err(param_error!("bins to remove cannot be empty"));
        }
        let ops = bins.iter().map(|b| Operation::delete_bin(*b)).collect();
        self.write_ops("remove_bin", key, ops, meta, policy)
    }

    /// Run operations atomically and merge results per bin
    pub fn operate(
        &self,
        key: &Key,
        ops: Vec<Operation>,
        meta: Option<&Value>,
        policy: Option<&Value>,
    ) -> Result<Record> {
        self.run_operate(key, ops, meta, policy, AssembleMode::Merged)
    }

    /// Run operations atomically and return one result per operation, in
    /// operation order
    pub fn operate_ordered(
        &self,
        key: &Key,
        ops: Vec<Operation>,
        meta: Option<&Value>,
        policy: Option<&Value>,
    ) -> Result<Record> {
        self.run_operate(key, ops, meta, policy, AssembleMode::Ordered)
    }

    fn run_operate(
        &self,
        key: &Key,
        ops: Vec<Operation>,
        meta: Option<&Value>,
        policy: Option<&Value>,
        mode: AssembleMode,
    ) -> Result<Record> {
        let p: OperatePolicy = resolve(&self.defaults().operate, policy)?;
        let batch = self.operate_batch(ops, meta, ValidationContext::operate())?;
        let mut settings = CommandSettings::from(&p);
        if mode == AssembleMode::Ordered {
            settings.respond_all_ops = true;
        }
        let send_key = settings.send_key;
        let request = Request {
            key: key.clone(),
            kind: RequestKind::Operate(batch),
            settings,
        };
        let raw = self.dispatch("operate", &p.base, &request)?;
        Ok(assemble(raw, mode, key, send_key))
    }

    /// Run a registered UDF against a record and return its result
    pub fn apply(
        &self,
        key: &Key,
        module: &str,
        function: &str,
        args: Vec<Value>,
        policy: Option<&Value>,
    ) -> Result<Value> {
        if module.is_empty() || function.is_empty() {
            return Err(param_error!("udf module and function names cannot be empty"));
        }
        let p: ApplyPolicy = resolve(&self.defaults().apply, policy)?;
        let request = Request {
            key: key.clone(),
            kind: RequestKind::Apply(UdfCall {
                module: module.to_string(),
                function: function.to_string(),
                args,
            }),
            settings: CommandSettings::from(&p),
        };
        let raw = self
            .dispatch("apply", &p.base, &request)
            .map_err(|e| e.with_subject(format!("{}.{}", module, function)))?;
        Ok(udf_result(raw))
    }

    /// Digest of a key without building a [`Key`]
    pub fn get_key_digest(
        &self,
        namespace: &str,
        set: &str,
        user_key: impl Into<Value>,
    ) -> Result<Digest> {
        if namespace.is_empty() {
            return Err(param_error!("namespace cannot be empty"));
        }
        Ok(compute_digest(namespace, set, &user_key.into())?)
    }

    /// Partition a key routes to
    pub fn get_key_partition_id(
        &self,
        namespace: &str,
        set: &str,
        user_key: impl Into<Value>,
    ) -> Result<u32> {
        let digest = self.get_key_digest(namespace, set, user_key)?;
        Ok(partition_id_for(&digest))
    }

    /// Run an info command and return its reply.
    ///
    /// Replies of the form `FAIL:<code>:<message>` or `ERROR:<code>:<message>`
    /// are turned into errors carrying that code.
    pub fn info(&self, command: &str, policy: Option<&Value>) -> Result<String> {
        if command.is_empty() {
            return Err(param_error!("info command cannot be empty"));
        }
        let p: InfoPolicy = resolve(&self.defaults().info, policy)?;
        debug!(target: "aeroclient::client", command, "Sending info command");
        let reply = self.cluster().info(command, &p)?;
        parse_info_reply(reply)
    }

    /// Nodes of the cluster; fails with `InvalidNode` when there are none
    pub fn get_nodes(&self) -> Result<Vec<NodeAddress>> {
        let nodes = self.cluster().nodes();
        if nodes.is_empty() {
            return Err(Error::new(ResultCode::InvalidNode, "cluster has no nodes"));
        }
        Ok(nodes)
    }

    /// Run an info command on one node, named as in [`Client::get_nodes`]
    pub fn info_node(
        &self,
        command: &str,
        node: &str,
        policy: Option<&Value>,
    ) -> Result<String> {
        if command.is_empty() || node.is_empty() {
            return Err(param_error!("info command and node name cannot be empty"));
        }
        let p: InfoPolicy = resolve(&self.defaults().info, policy)?;
        debug!(target: "aeroclient::client", command, node, "Sending info command to node");
        let reply = self.cluster().info_node(node, command, &p)?;
        parse_info_reply(reply)
    }

    /// Run an info command on every node; each node answers or fails on
    /// its own
    pub fn info_all(
        &self,
        command: &str,
        policy: Option<&Value>,
    ) -> Result<Vec<(NodeAddress, Result<String>)>> {
        if command.is_empty() {
            return Err(param_error!("info command cannot be empty"));
        }
        let p: InfoPolicy = resolve(&self.defaults().info, policy)?;
        Ok(self
            .get_nodes()?
            .into_iter()
            .map(|node| {
                let reply = self
                    .cluster()
                    .info_node(&node.name, command, &p)
                    .and_then(parse_info_reply);
                (node, reply)
            })
            .collect())
    }

    /// Delete every record of a set, or of the namespace when `set` is
    /// `None`, last updated before `before_nanos` (0 means now)
    pub fn truncate(
        &self,
        namespace: &str,
        set: Option<&str>,
        before_nanos: i64,
        policy: Option<&Value>,
    ) -> Result<()> {
        if namespace.is_empty() {
            return Err(param_error!("namespace cannot be empty"));
        }
        if before_nanos < 0 {
            return Err(param_error!(
                "truncate time must be non-negative, got {}",
                before_nanos
            ));
        }
        let mut command = format!("truncate:namespace={}", namespace);
        if let Some(set) = set {
            command.push_str(&format!(";set={}", set));
        }
        if before_nanos > 0 {
            command.push_str(&format!(";lut={}", before_nanos));
        }
        self.info(&command, policy).map(|_| ())
    }

    /// Create a secondary index on an integer bin
    pub fn index_integer_create(
        &self,
        namespace: &str,
        set: Option<&str>,
        bin: &str,
        name: &str,
        policy: Option<&Value>,
    ) -> Result<()> {
        self.index_create(
            namespace,
            set,
            bin,
            name,
            IndexCollection::Default,
            IndexDataType::Numeric,
            policy,
        )
    }

    /// Create a secondary index on a string bin
    pub fn index_string_create(
        &self,
        namespace: &str,
        set: Option<&str>,
        bin: &str,
        name: &str,
        policy: Option<&Value>,
    ) -> Result<()> {
        self.index_create(
            namespace,
            set,
            bin,
            name,
            IndexCollection::Default,
            IndexDataType::String,
            policy,
        )
    }

    /// Create a secondary index over collection elements
    #[allow(clippy::too_many_arguments)]
    pub fn index_create(
        &self,
        namespace: &str,
        set: Option<&str>,
        bin: &str,
        name: &str,
        collection: IndexCollection,
        data_type: IndexDataType,
        policy: Option<&Value>,
    ) -> Result<()> {
        check_index_args(namespace, bin, name, self.limits())?;
        let mut command = format!("sindex-create:ns={}", namespace);
        if let Some(set) = set {
            command.push_str(&format!(";set={}", set));
        }
        command.push_str(&format!(";indexname={}", name));
        if let Some(kind) = collection_type(collection) {
            command.push_str(&format!(";indextype={}", kind));
        }
        command.push_str(&format!(";indexdata={},{}", bin, data_type.as_str()));
        self.info(&command, policy)
            .map(|_| ())
            .map_err(|e| e.with_subject(name))
    }

    /// Drop a secondary index
    pub fn index_remove(&self, namespace: &str, name: &str, policy: Option<&Value>) -> Result<()> {
        if namespace.is_empty() || name.is_empty() {
            return Err(param_error!("namespace and index name cannot be empty"));
        }
        let command = format!("sindex-delete:ns={};indexname={}", namespace, name);
        self.info(&command, policy)
            .map(|_| ())
            .map_err(|e| e.with_subject(name))
    }
}

fn check_index_args(namespace: &str, bin: &str, name: &str, limits: &Limits) -> Result<()> {
    if namespace.is_empty() {
        return Err(param_error!("namespace cannot be empty"));
    }
    limits.validate_bin_name(bin)?;
    if name.is_empty() || name.len() > aeroclient_core::limits::MAX_INDEX_NAME_BYTES {
        return Err(param_error!(
            "index name must be 1 to {} bytes, got {}",
            aeroclient_core::limits::MAX_INDEX_NAME_BYTES,
            name.len()
        ));
    }
    Ok(())
}

fn collection_type(collection: IndexCollection) -> Option<&'static str> {
    match collection {
        IndexCollection::Default => None,
        IndexCollection::List => Some("list"),
        IndexCollection::MapKeys => Some("mapkeys"),
        IndexCollection::MapValues => Some("mapvalues"),
    }
}

pub(crate) fn parse_info_reply(reply: String) -> Result<String> {
    let failure = reply
        .strip_prefix("FAIL:")
        .or_else(|| reply.strip_prefix("ERROR:"));
    let Some(rest) = failure else {
        return Ok(reply);
    };
    let (code, message) = rest.split_once(':').unwrap_or((rest, ""));
    let code = code
        .trim()
        .parse::<i32>()
        .map(ResultCode::from_code)
        .unwrap_or(ResultCode::ServerError);
    Err(Error::new(code, message.trim().to_string()))
}

pub(crate) fn udf_result(raw: RawRecord) -> Value {
    raw.bins
        .into_iter()
        .find(|(name, _)| name == UDF_RESULT_BIN)
        .map(|(_, v)| v)
        .unwrap_or(Value::Nil)
}
