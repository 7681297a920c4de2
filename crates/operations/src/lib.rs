//! Operate pipeline for the cluster client
//!
//! An operate request is an ordered list of [`Operation`]s executed as one
//! atomic transaction against one record. This crate provides:
//! - the operation sum type and its list, map, bit and HLL families
//! - CDT contexts for operating on nested containers
//! - return types for list/map selection
//! - decoding from the loose `{"op": .., "bin": ..}` map form
//! - [`OperationBuilder`], which validates and freezes a batch

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bin;
pub mod bit;
pub mod builder;
pub mod cdt;
pub mod decode;
pub mod expiration;
pub mod hll;
pub mod list;
pub mod map;
pub mod operation;
pub mod return_type;

pub use bin::BinName;
pub use bit::{BitOp, BitPolicy, BitRange, OverflowAction, ResizeFlags};
pub use builder::{OperationBatch, OperationBuilder, ValidationContext};
pub use cdt::{CdtContext, CtxCreate, CtxStep, ListOrder, MapOrder};
pub use decode::{decode_operation, decode_operations, Fields};
pub use expiration::Expiration;
pub use hll::{HllBits, HllOp, HllPolicy};
pub use list::{ListOp, ListPolicy, ListSelector, ListWriteFlags};
pub use map::{MapOp, MapPolicy, MapSelector, MapWriteFlags};
pub use operation::{ExpWriteFlags, Operation};
pub use return_type::{ReturnKind, ReturnType, INVERTED_FLAG};
