// Query execution: the `Scan` trait every relational operator implements,
// the value/predicate types terms are built from, and the three physical
// operators (select, project, product) plus the table-file leaf scan.

pub mod operators;
pub mod table_scan;

pub use operators::{ProductScan, ProjectScan, SelectScan};
pub use table_scan::TableScan;

use crate::error::{DbError, Result};
use crate::record::Schema;

fn not_updatable() -> DbError {
    DbError::Internal("scan does not support updates".to_string())
}

/// A row identifier: the block and slot a `TableScan` currently sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rid {
    pub blknum: i32,
    pub slot: i32,
}

impl Rid {
    pub fn new(blknum: i32, slot: i32) -> Self {
        Self { blknum, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.blknum, self.slot)
    }
}

/// A literal value: exactly one of `Int`/`Str` is ever constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Int(i32),
    Str(String),
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Either a literal `Constant` or a field reference, evaluated against a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Val(Constant),
    Field(String),
}

impl Expression {
    pub fn evaluate(&self, s: &mut dyn Scan) -> Result<Constant> {
        match self {
            Expression::Val(c) => Ok(c.clone()),
            Expression::Field(f) => s.get_val(f),
        }
    }

    pub fn applies_to(&self, sch: &Schema) -> bool {
        match self {
            Expression::Val(_) => true,
            Expression::Field(f) => sch.has_field(f),
        }
    }

    pub fn as_field_name(&self) -> Option<&str> {
        match self {
            Expression::Field(f) => Some(f),
            Expression::Val(_) => None,
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Val(c) => write!(f, "{c}"),
            Expression::Field(s) => write!(f, "{s}"),
        }
    }
}

/// An equality comparison between two expressions, e.g. `sname=SJones` or
/// `sid=did`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub lhs: Expression,
    pub rhs: Expression,
}

impl Term {
    pub fn new(lhs: Expression, rhs: Expression) -> Self {
        Self { lhs, rhs }
    }

    pub fn is_satisfied(&self, s: &mut dyn Scan) -> Result<bool> {
        let lhsval = self.lhs.evaluate(s)?;
        let rhsval = self.rhs.evaluate(s)?;
        Ok(lhsval == rhsval)
    }

    pub fn applies_to(&self, sch: &Schema) -> bool {
        self.lhs.applies_to(sch) && self.rhs.applies_to(sch)
    }

    /// If this term equates `fldname` with a constant, returns it; used by
    /// the planner to estimate selectivity and to drive index lookups.
    pub fn equates_with_constant(&self, fldname: &str) -> Option<&Constant> {
        match (&self.lhs, &self.rhs) {
            (Expression::Field(f), Expression::Val(c)) if f == fldname => Some(c),
            (Expression::Val(c), Expression::Field(f)) if f == fldname => Some(c),
            _ => None,
        }
    }

    /// If this term equates `fldname` with another field, returns its name.
    pub fn equates_with_field(&self, fldname: &str) -> Option<&str> {
        match (&self.lhs, &self.rhs) {
            (Expression::Field(f1), Expression::Field(f2)) if f1 == fldname => Some(f2),
            (Expression::Field(f1), Expression::Field(f2)) if f2 == fldname => Some(f1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.lhs, self.rhs)
    }
}

/// A conjunction of `Term`s; the empty predicate is always satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    terms: Vec<Term>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_term(t: Term) -> Self {
        Self { terms: vec![t] }
    }

    pub fn conjoin_with(&mut self, other: Predicate) {
        self.terms.extend(other.terms);
    }

    pub fn is_satisfied(&self, s: &mut dyn Scan) -> Result<bool> {
        for t in &self.terms {
            if !t.is_satisfied(s)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The sub-predicate of terms that apply entirely within `sch` (pushed
    /// down to a `SelectScan` directly over that schema).
    pub fn select_sub_pred(&self, sch: &Schema) -> Option<Predicate> {
        let newterms: Vec<Term> = self.terms.iter().filter(|t| t.applies_to(sch)).cloned().collect();
        if newterms.is_empty() {
            None
        } else {
            Some(Predicate { terms: newterms })
        }
    }

    /// The sub-predicate of terms that only apply once `sch1` and `sch2` are
    /// joined together (neither side alone satisfies them).
    pub fn join_sub_pred(&self, sch1: &Schema, sch2: &Schema) -> Option<Predicate> {
        let mut newsch = Schema::new();
        newsch.add_all(sch1);
        newsch.add_all(sch2);
        let newterms: Vec<Term> = self
            .terms
            .iter()
            .filter(|t| !t.applies_to(sch1) && !t.applies_to(sch2) && t.applies_to(&newsch))
            .cloned()
            .collect();
        if newterms.is_empty() {
            None
        } else {
            Some(Predicate { terms: newterms })
        }
    }

    pub fn equates_with_constant(&self, fldname: &str) -> Option<&Constant> {
        self.terms.iter().find_map(|t| t.equates_with_constant(fldname))
    }

    pub fn equates_with_field(&self, fldname: &str) -> Option<&str> {
        self.terms.iter().find_map(|t| t.equates_with_field(fldname))
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.terms.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", rendered.join(" and "))
    }
}

/// Every relational operator (table scan, select, project, product) and the
/// metadata-table cursors all implement this trait. The mutation methods
/// default to an error so a read-only operator (e.g. `ProjectScan` over a
/// computed field) need not implement them; `TableScan` and `SelectScan`
/// override them when the scan underneath is itself updatable.
pub trait Scan {
    fn before_first(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<bool>;
    fn get_int(&mut self, fldname: &str) -> Result<i32>;
    fn get_string(&mut self, fldname: &str) -> Result<String>;
    fn get_val(&mut self, fldname: &str) -> Result<Constant>;
    fn has_field(&self, fldname: &str) -> bool;
    fn close(&mut self) -> Result<()>;

    fn set_int(&mut self, _fldname: &str, _val: i32) -> Result<()> {
        Err(not_updatable())
    }
    fn set_string(&mut self, _fldname: &str, _val: &str) -> Result<()> {
        Err(not_updatable())
    }
    fn set_val(&mut self, _fldname: &str, _val: Constant) -> Result<()> {
        Err(not_updatable())
    }
    fn insert(&mut self) -> Result<()> {
        Err(not_updatable())
    }
    fn delete(&mut self) -> Result<()> {
        Err(not_updatable())
    }
    fn get_rid(&self) -> Result<Rid> {
        Err(not_updatable())
    }
    fn move_to_rid(&mut self, _rid: Rid) -> Result<()> {
        Err(not_updatable())
    }
}
