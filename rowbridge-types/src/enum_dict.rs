use crate::ids::{Oid, TypeId};

/// One member of a row-store enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub oid: Oid,
    pub label: String,
}

/// Key width of the columnar dictionary for an enum column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumKeyWidth {
    U8,
    U16,
    U32,
}

/// Side vector relating row-store enum member ids to dictionary positions.
///
/// Members are kept in dictionary order (the enum's sort order), so the
/// position of a member in `members` is its dictionary index on the columnar
/// side. Lookups scan the vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDictionary {
    pub type_id: TypeId,
    pub type_name: String,
    members: Vec<EnumMember>,
}

impl EnumDictionary {
    pub fn new(type_id: TypeId, type_name: impl Into<String>, members: Vec<EnumMember>) -> Self {
        Self {
            type_id,
            type_name: type_name.into(),
            members,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[EnumMember] {
        &self.members
    }

    /// Dictionary index of the member whose id is `oid`.
    pub fn position_of(&self, oid: Oid) -> Option<usize> {
        self.members.iter().position(|m| m.oid == oid)
    }

    /// Member id at dictionary index `pos`.
    pub fn oid_at(&self, pos: usize) -> Option<Oid> {
        self.members.get(pos).map(|m| m.oid)
    }

    pub fn label_at(&self, pos: usize) -> Option<&str> {
        self.members.get(pos).map(|m| m.label.as_str())
    }

    /// Smallest unsigned key type able to index every member.
    pub fn key_width(&self) -> EnumKeyWidth {
        let n = self.members.len();
        if n <= u8::MAX as usize {
            EnumKeyWidth::U8
        } else if n <= u16::MAX as usize {
            EnumKeyWidth::U16
        } else {
            EnumKeyWidth::U32
        }
    }
}
