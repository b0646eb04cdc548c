use crate::range::Range;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Expression nodes are reference-counted: lazy type references keep nodes
/// alive after analysis returns.
pub type ExprRef = Arc<Expr>;

/// A name token with its source range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Name {
    pub name: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: Range,
}

/// Statement grammar (abridged):
/// chunk    ::= {stat [';']}
/// stat     ::= 'local' namelist ['=' exprlist]
///            | 'local' 'function' Name funcbody
///            | varlist '=' exprlist
///            | functioncall
///            | 'function' funcname funcbody
///            | 'if' exp 'then' block {'elseif' exp 'then' block} ['else' block] 'end'
///            | 'while' exp 'do' block 'end'
///            | 'repeat' block 'until' exp
///            | 'do' block 'end'
///            | 'for' Name '=' exp ',' exp [',' exp] 'do' block 'end'
///            | 'for' namelist 'in' exprlist 'do' block 'end'
///            | 'return' [exprlist]
///            | 'break'
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Local {
        names: Vec<Name>,
        exprs: Vec<ExprRef>,
    },
    Assign {
        targets: Vec<ExprRef>,
        exprs: Vec<ExprRef>,
    },
    Call(ExprRef),
    Function {
        name: FuncName,
        local: bool,
        body: FuncBody,
    },
    If {
        clauses: Vec<CondClause>,
        else_block: Option<Block>,
    },
    While {
        cond: ExprRef,
        body: Block,
    },
    Repeat {
        body: Block,
        cond: ExprRef,
    },
    Do {
        body: Block,
    },
    NumericFor {
        var: Name,
        from: ExprRef,
        to: ExprRef,
        step: Option<ExprRef>,
        body: Block,
    },
    GenericFor {
        vars: Vec<Name>,
        exprs: Vec<ExprRef>,
        body: Block,
    },
    Return {
        exprs: Vec<ExprRef>,
    },
    Break,
}

/// Declaration target of `function a.b.c:m() end`: all path segments in
/// source order, the last one being the declared name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncName {
    pub segments: Vec<Name>,
    pub is_method: bool,
}

impl FuncName {
    pub fn last(&self) -> &Name {
        &self.segments[self.segments.len() - 1]
    }

    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1 && !self.is_method
    }
}

/// One `if`/`elseif` arm with the range it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondClause {
    pub cond: ExprRef,
    pub body: Block,
    pub range: Range,
}

/// Parameter list and body shared by function statements and expressions.
/// `range` spans `function` through `end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncBody {
    pub params: Vec<Name>,
    pub is_vararg: bool,
    pub block: Block,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Nil,
    True,
    False,
    Vararg,
    Number(f64),
    Str(String),
    Name(String),
    Function(FuncBody),
    Table(Vec<TableItem>),
    Binary {
        op: BinOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    Unary {
        op: UnOp,
        expr: ExprRef,
    },
    Member {
        base: ExprRef,
        indexer: Indexer,
        name: Name,
    },
    Index {
        base: ExprRef,
        index: ExprRef,
    },
    Call {
        callee: ExprRef,
        args: Vec<ExprRef>,
    },
    /// `f "literal"` call sugar
    StringCall {
        callee: ExprRef,
        arg: ExprRef,
    },
    /// `f {fields}` call sugar
    TableCall {
        callee: ExprRef,
        arg: ExprRef,
    },
}

impl ExprKind {
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            ExprKind::Call { .. } | ExprKind::StringCall { .. } | ExprKind::TableCall { .. }
        )
    }
}

impl Expr {
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Indexer {
    Dot,
    Colon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableItem {
    /// `key = value`
    Named { key: Name, value: ExprRef },
    /// `[key] = value`
    Bracket { key: ExprRef, value: ExprRef },
    /// positional `value`
    Item(ExprRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    Len,
}
