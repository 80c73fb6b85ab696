//! Shared vocabulary for the rowbridge crates.
//!
//! This crate holds the identifiers, row-store type descriptors, datums and
//! constants that both sides of the bridge agree on. It has no dependency on
//! Arrow; the mapping to columnar types lives in `rowbridge-codec`.

pub mod constants;
pub mod datum;
pub mod enum_dict;
pub mod ids;
pub mod row_type;
pub mod snapshot;
pub mod tuple_desc;

pub use constants::*;
pub use datum::Datum;
pub use enum_dict::{EnumDictionary, EnumKeyWidth, EnumMember};
pub use ids::{BlockNumber, ItemPointer, OffsetNumber, Oid, RelationId, TypeId};
pub use row_type::{RowType, TypeAlign, TypeStorage};
pub use snapshot::{Snapshot, TXN_ID_FROZEN, TXN_ID_NONE, TxnId};
pub use tuple_desc::{ColumnDesc, TupleDesc};
