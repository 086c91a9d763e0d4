//! Expression tree produced by the parser.

use std::fmt;

/// Namespace pinned by an explicit-source prefix such as `rawinput:REVENUE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// External driver values (`rawinput:` or the legacy `driver:`).
    RawInput,
    /// Another domain's line items, e.g. `pl:NET_INCOME`.
    Domain(String),
}

impl Namespace {
    pub fn from_prefix(prefix: &str) -> Self {
        let lowered = prefix.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "rawinput" | "driver" => Namespace::RawInput,
            _ => Namespace::Domain(lowered),
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            Namespace::RawInput => "rawinput",
            Namespace::Domain(name) => name,
        }
    }
}

/// A named quantity read by a formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub namespace: Option<Namespace>,
    pub code: String,
    /// Signed offset applied to the context's time index. `REVENUE` and
    /// `REVENUE[t]` both carry 0.
    pub offset: i32,
}

impl Reference {
    pub fn bare(code: impl Into<String>) -> Self {
        Self { namespace: None, code: code.into(), offset: 0 }
    }

    pub fn lagged(code: impl Into<String>, offset: i32) -> Self {
        Self { namespace: None, code: code.into(), offset }
    }

    pub fn raw_input(code: impl Into<String>) -> Self {
        Self { namespace: Some(Namespace::RawInput), code: code.into(), offset: 0 }
    }

    pub fn in_domain(domain: &str, code: impl Into<String>) -> Self {
        Self { namespace: Some(Namespace::from_prefix(domain)), code: code.into(), offset: 0 }
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    /// True for references that may name another item of the same template.
    pub fn is_unqualified(&self) -> bool {
        self.namespace.is_none()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{}:", ns.prefix())?;
        }
        f.write_str(&self.code)?;
        match self.offset {
            0 => Ok(()),
            o if o > 0 => write!(f, "[t+{}]", o),
            o => write!(f, "[t{}]", o),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Opaque data for function arguments. Never a reference.
    Text(String),
    Reference(Reference),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Every reference in evaluation order, duplicates included.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Expr::Number(_) | Expr::Text(_) => {}
            Expr::Reference(r) => out.push(r),
            Expr::Unary { operand, .. } => operand.collect_references(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_references(out);
                rhs.collect_references(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
        }
    }
}
