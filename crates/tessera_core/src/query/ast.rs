//! Parsed predicate form, before key paths are resolved against a schema.

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Constant(bool),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Comparison),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Comparison {
    pub lhs: Operand,
    pub op: CompareOp,
    pub rhs: Operand,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Path(PathExpr),
    Literal(Value),
    Arg { index: usize, offset: usize },
}

/// A dotted key path as written.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PathExpr {
    pub components: Vec<Component>,
    pub offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Component {
    Property(String),
    /// `@links.<object_type>.<property>`
    Links { object_type: String, property: String },
    /// `@count` / `@size`
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
    EndsWith,
    Contains,
    Like,
}

impl CompareOp {
    pub fn is_string_op(self) -> bool {
        matches!(
            self,
            Self::BeginsWith | Self::EndsWith | Self::Contains | Self::Like
        )
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}
