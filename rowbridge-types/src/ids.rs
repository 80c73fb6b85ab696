//! Identifiers used to address relations, blocks and row slots.

use std::fmt;

/// Object identifier in the row store's catalog.
pub type Oid = u32;

/// Identifier of a heap relation.
pub type RelationId = Oid;

/// Identifier of a row-store data type (used for enum types).
pub type TypeId = Oid;

/// Zero-based index of a block within a relation.
pub type BlockNumber = u32;

/// One-based index of a line pointer within a page.
pub type OffsetNumber = u16;

/// Physical address of a row version: block plus slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemPointer {
    pub block: BlockNumber,
    pub offset: OffsetNumber,
}

impl ItemPointer {
    #[inline]
    pub const fn new(block: BlockNumber, offset: OffsetNumber) -> Self {
        Self { block, offset }
    }
}

impl fmt::Display for ItemPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.block, self.offset)
    }
}
