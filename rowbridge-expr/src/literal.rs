/// A constant in a pushed-down predicate, in the columnar engine's value domain.
///
/// Dates are days and timestamps microseconds since the Unix epoch; decimals
/// are scaled integers. Conversion to the row store's domain happens while
/// compiling or translating the predicate against a concrete column type.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal { value: i128, scale: i8 },
    Utf8(String),
    Date32(i32),
    TimestampMicros(i64),
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "int",
            Literal::Float(_) => "float",
            Literal::Decimal { .. } => "decimal",
            Literal::Utf8(_) => "utf8",
            Literal::Date32(_) => "date",
            Literal::TimestampMicros(_) => "timestamp",
        }
    }
}

macro_rules! impl_from_for_literal {
    ($variant:ident, $($t:ty),*) => {
        $(
            impl From<$t> for Literal {
                fn from(v: $t) -> Self {
                    Literal::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_for_literal!(Int, i8, i16, i32, i64, u8, u16, u32);
impl_from_for_literal!(Float, f32, f64);
impl_from_for_literal!(Bool, bool);

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Utf8(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Utf8(v)
    }
}
