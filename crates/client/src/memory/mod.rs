//! In-process cluster
//!
//! [`MemoryCluster`] implements [`Cluster`] over a partitioned in-memory
//! store. It runs record operations, CDT and bit operations, filter
//! expressions, secondary-index and geo queries, registered UDFs,
//! background jobs, info commands and the security commands. It presents
//! itself as a single node. Tests use it to drive the client end to end and
//! to inject batch transport faults.

mod bits;
mod cdt;
mod exec;
mod expr;
mod info;
mod jobs;
mod scan;
mod security;
mod store;
mod udf;

pub use exec::{UdfFn, UdfRecord};

use crate::admin::{AdminCommand, AdminResponse};
use crate::partition::PartitionsStatus;
use crate::transport::{
    BackgroundRequest, BatchRequest, BatchResponse, Cluster, NodeAddress, RawRecord, Request,
    StreamItem, StreamRequest,
};
use aeroclient_core::{partition_id_for, Error, Result, ResultCode, Value};
use aeroclient_policy::{AdminPolicy, InfoPolicy};
use info::IndexDef;
use jobs::JobRecord;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use security::Security;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use store::Store;
use tracing::debug;
use udf::UdfModule;

/// Name the in-process node answers to
pub const MEMORY_NODE_NAME: &str = "BB9000000000001";

enum BatchFault {
    Fail(Error),
    InterruptAfter(usize, Error),
}

#[derive(Default)]
pub(crate) struct Inner {
    store: Store,
    /// Keyed by `(namespace, index name)`
    indexes: RwLock<BTreeMap<(String, String), IndexDef>>,
    security: Mutex<Security>,
    udfs: RwLock<FxHashMap<(String, String), Arc<UdfFn>>>,
    /// Keyed by file name, `module.lua`
    modules: RwLock<BTreeMap<String, UdfModule>>,
    jobs: Mutex<FxHashMap<u64, JobRecord>>,
    next_job: AtomicU64,
    batch_fault: Mutex<Option<BatchFault>>,
}

/// A cluster living in this process. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCluster")
            .field("indexes", &self.inner.indexes.read().len())
            .field("udfs", &self.inner.udfs.read().len())
            .field("modules", &self.inner.modules.read().len())
            .finish()
    }
}

impl MemoryCluster {
    /// Empty cluster with the predefined security roles
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `module.name`. The function runs while the
    /// record's partition is locked and must not call back into the cluster.
    ///
    /// Lists `module` in the module catalog unless a module of that name was
    /// uploaded already.
    pub fn register_udf<F>(&self, module: &str, name: &str, function: F)
    where
        F: Fn(&mut UdfRecord, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.inner
            .modules
            .write()
            .entry(udf::module_file(module))
            .or_insert_with(|| UdfModule::new(format!("-- {}", module).into_bytes(), "LUA"));
        self.inner
            .udfs
            .write()
            .insert((module.to_string(), name.to_string()), Arc::new(function));
    }

    fn node() -> NodeAddress {
        NodeAddress {
            name: MEMORY_NODE_NAME.to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }

    /// Fail the next batch before any record is processed
    pub fn fail_next_batch(&self, error: Error) {
        *self.inner.batch_fault.lock() = Some(BatchFault::Fail(error));
    }

    /// Let the next batch deliver `delivered` results, then fail it
    pub fn interrupt_batch_after(&self, delivered: usize, error: Error) {
        *self.inner.batch_fault.lock() = Some(BatchFault::InterruptAfter(delivered, error));
    }
}

impl Cluster for MemoryCluster {
    fn dispatch_single(&self, request: &Request) -> Result<RawRecord> {
        exec::execute(&self.inner, request)
    }

    fn dispatch_batch(
        &self,
        requests: &[BatchRequest],
        on_result: &(dyn Fn(BatchResponse) + Sync),
    ) -> Result<()> {
        let fault = self.inner.batch_fault.lock().take();
        let (limit, interrupted) = match fault {
            Some(BatchFault::Fail(e)) => return Err(e),
            Some(BatchFault::InterruptAfter(n, e)) => (n.min(requests.len()), Some(e)),
            None => (requests.len(), None),
        };
        let responses: Vec<BatchResponse> = requests[..limit]
            .iter()
            .map(|br| BatchResponse {
                index: br.index,
                digest: *br.request.key.digest(),
                result: exec::execute(&self.inner, &br.request),
            })
            .collect();

        // Deliver per "node", one thread each, the way a real cluster answers
        let (even, odd): (Vec<_>, Vec<_>) = responses
            .into_iter()
            .partition(|r| partition_id_for(&r.digest) % 2 == 0);
        std::thread::scope(|s| {
            for group in [even, odd] {
                s.spawn(move || group.into_iter().for_each(on_result));
            }
        });
        debug!(
            target: "aeroclient::memory",
            requests = requests.len(),
            delivered = limit,
            "Batch answered"
        );
        match interrupted {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn dispatch_scan(
        &self,
        request: &StreamRequest,
        partitions: &mut PartitionsStatus,
        on_item: &mut dyn FnMut(StreamItem) -> bool,
    ) -> Result<()> {
        scan::walk(&self.inner, request, partitions, on_item)
    }

    fn dispatch_background(&self, request: &BackgroundRequest) -> Result<u64> {
        jobs::run(&self.inner, request)
    }

    fn admin(&self, command: &AdminCommand, _policy: &AdminPolicy) -> Result<AdminResponse> {
        self.inner.security.lock().execute(command)
    }

    fn info(&self, command: &str, _policy: &InfoPolicy) -> Result<String> {
        Ok(info::handle(&self.inner, command))
    }

    fn nodes(&self) -> Vec<NodeAddress> {
        vec![Self::node()]
    }

    fn info_node(&self, node: &str, command: &str, policy: &InfoPolicy) -> Result<String> {
        if node != MEMORY_NODE_NAME {
            return Err(Error::new(
                ResultCode::InvalidNode,
                format!("no node named {}", node),
            ));
        }
        self.info(command, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use aeroclient_core::{Key, ResultCode};
    use aeroclient_operations::{
        CdtContext, ExpWriteFlags, ListOp, ListPolicy, Operation,
    };
    use aeroclient_policy::{CompiledExpression, Expr, PolicyDefaults};

    fn key(k: i64) -> Key {
        Key::new("test", "demo", k).unwrap()
    }

    fn client_over(cluster: &MemoryCluster) -> Client {
        Client::new(Arc::new(cluster.clone()), PolicyDefaults::default())
    }

    #[test]
    fn test_udf_reads_and_writes_record() {
        let cluster = MemoryCluster::new();
        cluster.register_udf("counter", "bump", |rec, args| {
            let by = args.first().and_then(Value::as_int).unwrap_or(1);
            let next = rec.get("n").and_then(Value::as_int).unwrap_or(0) + by;
            rec.set("n", next);
            Ok(Value::Int(next))
        });
        let c = client_over(&cluster);
        assert_eq!(
            c.apply(&key(1), "counter", "bump", vec![Value::Int(5)], None).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            c.apply(&key(1), "counter", "bump", vec![], None).unwrap(),
            Value::Int(6)
        );
        assert_eq!(c.get(&key(1), None).unwrap().generation(), 2);

        let err = c.apply(&key(1), "counter", "nope", vec![], None).unwrap_err();
        assert_eq!(err.code(), ResultCode::UdfNotFound);
        assert_eq!(err.subject(), Some("counter.nope"));
    }

    #[test]
    fn test_udf_error_becomes_bad_response() {
        let cluster = MemoryCluster::new();
        cluster.register_udf("m", "fail", |_, _| Err(Error::client("boom")));
        let err = client_over(&cluster)
            .apply(&key(2), "m", "fail", vec![], None)
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::UdfBadResponse);
        assert!(err.message().contains("boom"));
    }

    #[test]
    fn test_failed_operation_leaves_record_untouched() {
        let c = Client::in_memory();
        c.put(&key(3), &[("s", Value::from("text"))], None, None).unwrap();
        let ops = vec![
            Operation::write("other", 1),
            Operation::increment("s", 1),
        ];
        let err = c.operate(&key(3), ops, None, None).unwrap_err();
        assert_eq!(err.code(), ResultCode::BinTypeError);
        let rec = c.get(&key(3), None).unwrap();
        assert!(rec.bin("other").is_none());
        assert_eq!(rec.generation(), 1);
    }

    #[test]
    fn test_filter_expression_on_read() {
        let c = Client::in_memory();
        c.put(&key(4), &[("age", Value::Int(17))], None, None).unwrap();
        let adult = Value::List(vec![
            Value::from("gt"),
            Value::List(vec![Value::from("int_bin"), Value::from("age")]),
            Value::Int(18),
        ]);
        let policy = Value::map_from([("expressions", adult)]);
        let err = c.get(&key(4), Some(&policy)).unwrap_err();
        assert_eq!(err.code(), ResultCode::FilteredOut);
    }

    #[test]
    fn test_expression_write_flags() {
        let c = Client::in_memory();
        c.put(&key(5), &[("a", Value::Int(2))], None, None).unwrap();
        let doubled = CompiledExpression::from_expr(Expr::val(4)).unwrap();
        let op = |flags| Operation::ExpWrite {
            bin: "a".into(),
            expr: doubled.clone(),
            flags,
        };
        let err = c
            .operate(&key(5), vec![op(ExpWriteFlags::CREATE_ONLY)], None, None)
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::BinExists);
        c.operate(&key(5), vec![op(ExpWriteFlags::default())], None, None)
            .unwrap();
        assert_eq!(c.get(&key(5), None).unwrap().bin("a"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_hll_is_unsupported() {
        let c = Client::in_memory();
        c.put(&key(6), &[("a", Value::Int(1))], None, None).unwrap();
        let op = Operation::Hll {
            bin: "h".into(),
            op: aeroclient_operations::HllOp::GetCount,
        };
        let err = c.operate(&key(6), vec![op], None, None).unwrap_err();
        assert_eq!(err.code(), ResultCode::UnsupportedFeature);
    }

    #[test]
    fn test_list_op_through_operate() {
        let c = Client::in_memory();
        let append = |v: i64| Operation::List {
            bin: "l".into(),
            op: ListOp::Append {
                value: Value::Int(v),
                policy: ListPolicy::default(),
            },
            ctx: CdtContext::new(),
        };
        let rec = c
            .operate(&key(7), vec![append(1), append(2)], None, None)
            .unwrap();
        assert_eq!(rec.bin("l"), Some(&Value::Int(2)));
        let stored = c.get(&key(7), None).unwrap();
        assert_eq!(
            stored.bin("l"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn test_removed_module_unbinds_functions() {
        let cluster = MemoryCluster::new();
        cluster.register_udf("m", "one", |_, _| Ok(Value::Int(1)));
        let c = client_over(&cluster);
        assert_eq!(c.apply(&key(9), "m", "one", vec![], None).unwrap(), Value::Int(1));
        assert_eq!(c.info("udf-remove:filename=m.lua", None).unwrap(), "ok");
        let err = c.apply(&key(9), "m", "one", vec![], None).unwrap_err();
        assert_eq!(err.code(), ResultCode::UdfNotFound);
    }

    #[test]
    fn test_single_node() {
        let cluster = MemoryCluster::new();
        let nodes = cluster.nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, MEMORY_NODE_NAME);
        let policy = InfoPolicy::default();
        assert!(cluster.info_node(MEMORY_NODE_NAME, "build", &policy).is_ok());
        let err = cluster.info_node("nope", "build", &policy).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidNode);
    }

    #[test]
    fn test_info_namespaces() {
        let c = Client::in_memory();
        c.put(&key(8), &[("a", Value::Int(1))], None, None).unwrap();
        assert_eq!(c.info("namespaces", None).unwrap(), "test");
        assert_eq!(
            c.info("nope", None).unwrap_err().code(),
            ResultCode::ParameterError
        );
    }
}
