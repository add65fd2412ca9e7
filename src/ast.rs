//! Abstract syntax tree for the C subset.
//!
//! One sum type per family (expression, statement, declaration); parents own
//! their children exclusively. Nodes carry no types — typing happens during
//! lowering. `CompUnit::dump` renders a stable indented tree used by tests
//! and by the driver's debug output.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Int,
    Char,
    Void,
}

/// A base type with an optional `const` qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpec {
    pub kind: TypeKind,
    pub is_const: bool,
}

impl TypeSpec {
    pub fn new(kind: TypeKind, is_const: bool) -> Self {
        Self { kind, is_const }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            f.write_str("const ")?;
        }
        match self.kind {
            TypeKind::Int => f.write_str("int"),
            TypeKind::Char => f.write_str("char"),
            TypeKind::Void => f.write_str("void"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
    BitNot,
    Inc,
    Dec,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Plus => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Inc => "++",
            UnaryOp::Dec => "--",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogAnd => "&&",
            BinaryOp::LogOr => "||",
        })
    }
}

/// A storage-location expression: a named variable, possibly subscripted.
/// Empty `indices` means a scalar reference.
#[derive(Debug, Clone)]
pub struct LVal {
    pub name: String,
    pub indices: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(i32),
    Char(u8),
    Str(String),
    LVal(LVal),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// Brace-enclosed initializer; only valid as a variable initializer.
    InitList(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// Expression statement; `None` is the empty statement `;`.
    Expr(Option<Expr>),
    Assign {
        lhs: LVal,
        rhs: Expr,
    },
    Block(Block),
    If {
        cond: Expr,
        then_stmt: Box<Stmt>,
        else_stmt: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<BlockItem>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
}

/// An item inside a block (or a `for` init clause): declaration or statement.
#[derive(Debug, Clone)]
pub enum BlockItem {
    Decl(VarDecl),
    Stmt(Stmt),
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub items: Vec<BlockItem>,
}

/// One declarator: name, array dimensions (empty = scalar), initializer.
#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub dims: Vec<Expr>,
    pub init: Option<Expr>,
}

/// One type keyword declaring one or more names.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub ty: TypeSpec,
    pub vars: Vec<VarDef>,
}

/// Function parameter. `is_array` models the decayed `T name[]` form; `dims`
/// holds the inner dimensions only (the unsized leading one is implied).
#[derive(Debug, Clone)]
pub struct FuncParam {
    pub ty: TypeSpec,
    pub name: String,
    pub is_array: bool,
    pub dims: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub return_type: TypeSpec,
    pub name: String,
    pub params: Vec<FuncParam>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub enum Unit {
    Func(FuncDef),
    Decl(VarDecl),
}

/// Root of one source file's AST.
#[derive(Debug, Clone, Default)]
pub struct CompUnit {
    pub units: Vec<Unit>,
}

impl CompUnit {
    /// Render the tree as an indented listing with a stable format.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str("CompUnit\n");
        for unit in &self.units {
            match unit {
                Unit::Func(f) => dump_func(&mut out, f, 1),
                Unit::Decl(d) => dump_var_decl(&mut out, d, 1),
            }
        }
        out
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn dump_func(out: &mut String, f: &FuncDef, depth: usize) {
    indent(out, depth);
    out.push_str(&format!("FuncDef {} {}\n", f.return_type, f.name));
    for p in &f.params {
        indent(out, depth + 1);
        let suffix = if p.is_array { "[]" } else { "" };
        out.push_str(&format!("FuncParam {} {}{}\n", p.ty, p.name, suffix));
        for d in &p.dims {
            dump_expr(out, d, depth + 2);
        }
    }
    dump_block(out, &f.body, depth + 1);
}

fn dump_var_decl(out: &mut String, d: &VarDecl, depth: usize) {
    indent(out, depth);
    out.push_str(&format!("VarDecl {}\n", d.ty));
    for var in &d.vars {
        indent(out, depth + 1);
        out.push_str(&format!("VarDef {}\n", var.name));
        for dim in &var.dims {
            dump_expr(out, dim, depth + 2);
        }
        if let Some(init) = &var.init {
            dump_expr(out, init, depth + 2);
        }
    }
}

fn dump_block(out: &mut String, b: &Block, depth: usize) {
    indent(out, depth);
    out.push_str("Block\n");
    for item in &b.items {
        match item {
            BlockItem::Decl(d) => dump_var_decl(out, d, depth + 1),
            BlockItem::Stmt(s) => dump_stmt(out, s, depth + 1),
        }
    }
}

fn dump_stmt(out: &mut String, s: &Stmt, depth: usize) {
    match s {
        Stmt::Expr(expr) => {
            indent(out, depth);
            out.push_str("ExprStmt\n");
            if let Some(e) = expr {
                dump_expr(out, e, depth + 1);
            }
        }
        Stmt::Assign { lhs, rhs } => {
            indent(out, depth);
            out.push_str("Assign\n");
            dump_lval(out, lhs, depth + 1);
            dump_expr(out, rhs, depth + 1);
        }
        Stmt::Block(b) => dump_block(out, b, depth),
        Stmt::If {
            cond,
            then_stmt,
            else_stmt,
        } => {
            indent(out, depth);
            out.push_str("If\n");
            dump_expr(out, cond, depth + 1);
            dump_stmt(out, then_stmt, depth + 1);
            if let Some(e) = else_stmt {
                dump_stmt(out, e, depth + 1);
            }
        }
        Stmt::While { cond, body } => {
            indent(out, depth);
            out.push_str("While\n");
            dump_expr(out, cond, depth + 1);
            dump_stmt(out, body, depth + 1);
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => {
            indent(out, depth);
            out.push_str("For\n");
            if let Some(init) = init {
                match init.as_ref() {
                    BlockItem::Decl(d) => dump_var_decl(out, d, depth + 1),
                    BlockItem::Stmt(s) => dump_stmt(out, s, depth + 1),
                }
            }
            if let Some(c) = cond {
                dump_expr(out, c, depth + 1);
            }
            if let Some(s) = step {
                dump_stmt(out, s, depth + 1);
            }
            dump_stmt(out, body, depth + 1);
        }
        Stmt::Return(value) => {
            indent(out, depth);
            out.push_str("Return\n");
            if let Some(v) = value {
                dump_expr(out, v, depth + 1);
            }
        }
        Stmt::Break => {
            indent(out, depth);
            out.push_str("Break\n");
        }
        Stmt::Continue => {
            indent(out, depth);
            out.push_str("Continue\n");
        }
    }
}

fn dump_lval(out: &mut String, lval: &LVal, depth: usize) {
    indent(out, depth);
    out.push_str(&format!("LVal({})\n", lval.name));
    for ix in &lval.indices {
        dump_expr(out, ix, depth + 1);
    }
}

fn dump_expr(out: &mut String, e: &Expr, depth: usize) {
    match e {
        Expr::Number(v) => {
            indent(out, depth);
            out.push_str(&format!("Number({v})\n"));
        }
        Expr::Char(c) => {
            indent(out, depth);
            out.push_str(&format!("Char('{}')\n", (*c as char).escape_default()));
        }
        Expr::Str(s) => {
            indent(out, depth);
            out.push_str(&format!("String(\"{}\")\n", s.escape_default()));
        }
        Expr::LVal(lval) => dump_lval(out, lval, depth),
        Expr::Unary { op, operand } => {
            indent(out, depth);
            out.push_str(&format!("Unary({op})\n"));
            dump_expr(out, operand, depth + 1);
        }
        Expr::Binary { op, lhs, rhs } => {
            indent(out, depth);
            out.push_str(&format!("Binary({op})\n"));
            dump_expr(out, lhs, depth + 1);
            dump_expr(out, rhs, depth + 1);
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            indent(out, depth);
            out.push_str("Ternary\n");
            dump_expr(out, cond, depth + 1);
            dump_expr(out, then_expr, depth + 1);
            dump_expr(out, else_expr, depth + 1);
        }
        Expr::Call { name, args } => {
            indent(out, depth);
            out.push_str(&format!("FuncCall({name})\n"));
            for a in args {
                dump_expr(out, a, depth + 1);
            }
        }
        Expr::InitList(items) => {
            indent(out, depth);
            out.push_str("InitList\n");
            for item in items {
                dump_expr(out, item, depth + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_is_stable() {
        let unit = CompUnit {
            units: vec![Unit::Decl(VarDecl {
                ty: TypeSpec::new(TypeKind::Int, false),
                vars: vec![VarDef {
                    name: "x".into(),
                    dims: vec![],
                    init: Some(Expr::Binary {
                        op: BinaryOp::Add,
                        lhs: Box::new(Expr::Number(1)),
                        rhs: Box::new(Expr::Number(2)),
                    }),
                }],
            })],
        };
        assert_eq!(
            unit.dump(),
            "CompUnit\n  VarDecl int\n    VarDef x\n      Binary(+)\n        Number(1)\n        Number(2)\n"
        );
    }
}
