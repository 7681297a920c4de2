//! Policies for the cluster client
//!
//! This crate owns everything that decides *how* a command runs:
//! - policy families (read, write, operate, batch, scan, ...) and their
//!   enumerated settings
//! - the resolver that layers per-call overrides onto client defaults
//! - filter expressions and the legacy predicate lists compiled into them
//! - the `aeroclient.toml` client configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod expression;
pub mod fields;
pub mod policies;
pub mod predexp;
pub mod resolver;
pub mod types;

pub use config::{ClientConfig, PolicyTables, CONFIG_FILE_NAME};
pub use expression::{CmpOp, CompiledExpression, ExpType, Expr, ExpressionError};
pub use policies::{
    AdminPolicy, ApplyPolicy, BasePolicy, BatchApplyPolicy, BatchPolicy, BatchReadPolicy,
    BatchRemovePolicy, BatchWritePolicy, InfoPolicy, OperatePolicy, Policy, PolicyFamily,
    QueryPolicy, ReadPolicy, RemovePolicy, ScanPolicy, WritePolicy,
};
pub use predexp::compile_predexp;
pub use resolver::{resolve, PolicyDefaults, EXPRESSIONS_FIELD, PREDEXP_FIELD};
pub use types::{
    CommitLevel, GenerationPolicy, KeyPolicy, PolicyEnum, ReadModeAp, ReadModeSc,
    RecordExistsAction, Replica,
};
