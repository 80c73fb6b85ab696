//! Value conversion between row-store datums and Arrow arrays.
//!
//! The codec is a set of pure conversion functions, one per logical type and
//! direction:
//!
//! - fixed-width scalars are reinterpreted from their datum word;
//! - variable-length values are detoasted ([`varlena::detoast`]) into a
//!   contiguous buffer taken from the per-batch [`ScratchPool`];
//! - numerics go through the exact base-10000 decoder in [`numeric`];
//! - dates and timestamps shift between epochs ([`temporal`]);
//! - arrays are unpacked ([`array`]) and rebuilt as nested Arrow lists;
//! - enums are mapped through their member side vector.
//!
//! Representation choices are made once per column by [`mapping::bind_column`];
//! [`ColumnAppender`] then applies them value by value, and
//! [`encode::encode_value`] handles the reverse direction.

pub mod appender;
pub mod array;
pub mod encode;
pub mod enums;
pub mod mapping;
pub mod numeric;
pub mod pglz;
pub mod scratch;
pub mod temporal;
pub mod text;
pub mod varlena;

pub use appender::{ColumnAppender, DecodeContext};
pub use encode::encode_value;
pub use mapping::{ColumnKind, DecimalWidth, EnumCatalog, MappingOptions, NoEnums, bind_column};
pub use numeric::{NumericSign, NumericVar};
pub use scratch::ScratchPool;
pub use varlena::{CompressionMethod, NoToast, ToastFetcher, ToastPointer};
