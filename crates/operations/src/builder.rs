//! Validated operation batches
//!
//! [`OperationBuilder`] collects operations in caller order, checks them
//! against a [`ValidationContext`] and produces an [`OperationBatch`] ready
//! to be sent as one atomic request. Nothing is reordered or de-duplicated.

use crate::decode::{decode_operations, Fields};
use crate::expiration::Expiration;
use crate::operation::Operation;
use aeroclient_core::{check_u32, param_error, Limits, Result, Value};
use tracing::debug;

/// Where a batch is going to be used
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Write operations are accepted
    pub allow_writes: bool,
    /// An empty operation list is accepted
    pub allow_empty: bool,
    /// Name and value limits
    pub limits: Limits,
}

impl ValidationContext {
    /// Single-record operate: reads and writes, at least one operation
    pub fn operate() -> Self {
        ValidationContext {
            allow_writes: true,
            allow_empty: false,
            limits: Limits::default(),
        }
    }

    /// Batch read entry: reads only; empty means all bins
    pub fn batch_read() -> Self {
        ValidationContext {
            allow_writes: false,
            allow_empty: true,
            limits: Limits::default(),
        }
    }

    /// Batch write entry: at least one operation
    pub fn batch_write() -> Self {
        ValidationContext {
            allow_writes: true,
            allow_empty: false,
            limits: Limits::default(),
        }
    }

    /// Replace the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// Ordered, validated operations plus record metadata
#[derive(Debug, Clone, PartialEq)]
pub struct OperationBatch {
    ops: Vec<Operation>,
    has_read: bool,
    has_write: bool,
    ttl: Expiration,
    generation: Option<u32>,
}

impl OperationBatch {
    /// Operations in caller order
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Consume into the operation list
    pub fn into_ops(self) -> Vec<Operation> {
        self.ops
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when there are no operations
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// At least one operation reads
    pub fn has_read(&self) -> bool {
        self.has_read
    }

    /// At least one operation writes
    pub fn has_write(&self) -> bool {
        self.has_write
    }

    /// TTL applied by the write
    pub fn ttl(&self) -> Expiration {
        self.ttl
    }

    /// Expected generation, if the write is conditional
    pub fn generation(&self) -> Option<u32> {
        self.generation
    }
}

/// Collects operations and record metadata
#[derive(Debug, Clone, Default)]
pub struct OperationBuilder {
    ops: Vec<Operation>,
    ttl: Option<Expiration>,
    generation: Option<u32>,
}

impl OperationBuilder {
    /// Start from an operation list
    pub fn new(ops: Vec<Operation>) -> Self {
        OperationBuilder {
            ops,
            ..Default::default()
        }
    }

    /// Start from the loose form
    pub fn from_value(ops: &Value) -> Result<Self> {
        Ok(Self::new(decode_operations(ops)?))
    }

    /// Add one operation at the end
    pub fn push(mut self, op: Operation) -> Self {
        self.ops.push(op);
        self
    }

    /// Set the TTL explicitly
    pub fn ttl(mut self, ttl: Expiration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Make the write conditional on the record generation
    pub fn generation(mut self, generation: u32) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Apply `{"ttl": .., "gen": ..}` record metadata.
    ///
    /// Both values must fit their unsigned 32-bit wire fields.
    pub fn meta(mut self, meta: Option<&Value>) -> Result<Self> {
        let Some(meta) = meta.filter(|m| !m.is_nil()) else {
            return Ok(self);
        };
        let f = Fields::new("meta", meta)?;
        if let Some(ttl) = f.opt_int("ttl")? {
            self.ttl = Some(Expiration::from_i64(ttl)?);
        }
        if let Some(gen) = f.opt_int("gen")? {
            self.generation = Some(check_u32("gen", gen)?);
        }
        Ok(self)
    }

    /// Validate and freeze
    pub fn build(self, ctx: &ValidationContext) -> Result<OperationBatch> {
        if self.ops.is_empty() && !ctx.allow_empty {
            return Err(param_error!("operation list cannot be empty"));
        }
        ctx.limits.validate_operation_count(self.ops.len())?;

        let mut has_read = false;
        let mut has_write = false;
        let mut touch_ttl = None;
        for op in &self.ops {
            op.validate(&ctx.limits)?;
            if op.is_write() {
                if !ctx.allow_writes {
                    return Err(param_error!(
                        "{} is a write and is not allowed in a read-only request",
                        op.name()
                    ));
                }
                has_write = true;
            } else {
                has_read = true;
            }
            if let Operation::Touch { ttl } = op {
                touch_ttl = Some(*ttl);
            }
        }

        let ttl = self.ttl.or(touch_ttl).unwrap_or_default();
        debug!(
            ops = self.ops.len(),
            has_read,
            has_write,
            ?ttl,
            generation = ?self.generation,
            "Built operation batch"
        );
        Ok(OperationBatch {
            ops: self.ops,
            has_read,
            has_write,
            ttl,
            generation: self.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_order_preserved() {
        let batch = OperationBuilder::new(vec![
            Operation::write("a", 1),
            Operation::increment("a", 5),
            Operation::read("a"),
            Operation::read("a"),
        ])
        .build(&ValidationContext::operate())
        .unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.ops()[1], Operation::increment("a", 5));
        assert!(batch.has_read() && batch.has_write());
    }

    #[test]
    fn test_empty_rejected_for_operate() {
        let err = OperationBuilder::default()
            .build(&ValidationContext::operate())
            .unwrap_err();
        assert!(err.is_param());
        assert!(OperationBuilder::default()
            .build(&ValidationContext::batch_read())
            .is_ok());
    }

    #[test]
    fn test_read_only_context_rejects_writes() {
        let err = OperationBuilder::new(vec![Operation::write("a", 1)])
            .build(&ValidationContext::batch_read())
            .unwrap_err();
        assert!(err.message().contains("write"));
    }

    #[test]
    fn test_touch_feeds_ttl() {
        let batch = OperationBuilder::new(vec![Operation::touch(Expiration::Seconds(60))])
            .build(&ValidationContext::operate())
            .unwrap();
        assert_eq!(batch.ttl(), Expiration::Seconds(60));

        let batch = OperationBuilder::new(vec![Operation::touch(Expiration::Seconds(60))])
            .ttl(Expiration::Never)
            .build(&ValidationContext::operate())
            .unwrap();
        assert_eq!(batch.ttl(), Expiration::Never);
    }

    #[test]
    fn test_meta_overflow() {
        let meta = Value::map_from([("ttl", Value::Int(1 << 33))]);
        assert!(OperationBuilder::default().meta(Some(&meta)).is_err());
        let meta = Value::map_from([("gen", Value::Int(-1))]);
        assert!(OperationBuilder::default().meta(Some(&meta)).is_err());
        let meta = Value::map_from([("gen", Value::Int(7)), ("ttl", Value::Int(-1))]);
        let batch = OperationBuilder::new(vec![Operation::write("a", 1)])
            .meta(Some(&meta))
            .unwrap()
            .build(&ValidationContext::operate())
            .unwrap();
        assert_eq!(batch.generation(), Some(7));
        assert_eq!(batch.ttl(), Expiration::Never);
    }

    #[test]
    fn test_operation_limit() {
        let ctx = ValidationContext::operate().with_limits(Limits::with_small_limits());
        let ops = (0..9).map(|i| Operation::read(format!("b{i}"))).collect();
        assert!(OperationBuilder::new(ops).build(&ctx).is_err());
    }

    proptest! {
        #[test]
        fn build_keeps_every_operation(bins in proptest::collection::vec("[a-z]{1,15}", 1..32)) {
            let ops: Vec<_> = bins.iter().map(Operation::read).collect();
            let batch = OperationBuilder::new(ops.clone())
                .build(&ValidationContext::operate())
                .unwrap();
            prop_assert_eq!(batch.into_ops(), ops);
        }
    }
}
