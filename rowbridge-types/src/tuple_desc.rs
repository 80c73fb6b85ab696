use crate::datum::Datum;
use crate::row_type::RowType;

/// One attribute of a relation's tuple descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDesc {
    pub name: String,
    pub ty: RowType,
    /// Value reported for tuples written before this column was added.
    pub missing_default: Option<Datum>,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, ty: RowType) -> Self {
        Self {
            name: name.into(),
            ty,
            missing_default: None,
        }
    }

    pub fn with_missing_default(mut self, value: Datum) -> Self {
        self.missing_default = Some(value);
        self
    }
}

/// Ordered attributes of a relation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TupleDesc {
    columns: Vec<ColumnDesc>,
}

impl TupleDesc {
    pub fn new(columns: Vec<ColumnDesc>) -> Self {
        Self { columns }
    }

    #[inline]
    pub fn natts(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn column(&self, idx: usize) -> Option<&ColumnDesc> {
        self.columns.get(idx)
    }

    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}
