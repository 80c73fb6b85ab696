//! Error types and result definitions for the rowbridge scan core.
//!
//! Every rowbridge crate returns [`Result<T>`], whose error variant is the
//! single [`Error`] enum defined here. Errors propagate with `?` across crate
//! boundaries, so a failure raised deep in the value codec surfaces unchanged
//! at the scan plan.
//!
//! # Error Categories
//!
//! - **Bind-time errors** ([`Error::UnsupportedType`]): a source column type has
//!   no columnar equivalent. Raised before execution starts.
//! - **Conversion errors** ([`Error::OverflowOnConvert`],
//!   [`Error::JaggedArrayInput`], [`Error::CorruptDatum`]): a single value could
//!   not be converted. Raised at the narrowest scope (one column, one value).
//! - **Cancellation** ([`Error::Cancelled`]): the scan was interrupted. Not a
//!   failure; callers check [`Error::is_cancellation`].
//! - **Wrapped library errors** ([`Error::Arrow`], [`Error::Io`]).
//! - **Internal errors** ([`Error::Internal`]): violated invariants.
//!
//! Predicate translation failure is deliberately absent: an untranslatable
//! filter is a routing decision handled by `rowbridge-expr`, not an error.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
