use crate::{error::CinderError, lexer::Token, parser::spans_table::SpanTable};
use lasso::{RodeoReader, Spur};
use std::fmt::Display;

/// Result of parsing one source file. Every later stage borrows this and
/// appends to `errors`; none of them mutate the items.
pub struct Ast {
    pub items: Vec<Item>,
    pub rodeo: RodeoReader,
    pub spans: SpanTable,
    pub errors: Vec<CinderError>,
}

impl Ast {
    pub fn max_id(&self) -> usize {
        self.spans.len()
    }

    pub fn has_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.severity() == crate::error::Severity::Error)
    }

    pub fn resolve(&self, spur: Spur) -> &str {
        self.rodeo.resolve(&spur)
    }
}

/// Index into the span table. Every AST node owns at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub(crate) usize);

impl Id {
    pub fn new(n: usize) -> Self {
        Id(n)
    }
}

impl From<Id> for usize {
    fn from(id: Id) -> Self {
        id.0
    }
}

/// An interned identifier together with the id of its occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Name {
    pub id: Id,
    pub spur: Spur,
}

#[derive(Debug, Clone)]
pub struct Attr(pub Name, pub Vec<(Id, Token)>);

#[derive(Debug, Clone)]
pub enum Attrs {
    Ok(Id, Vec<Attr>),
    None,
    Error(Id),
}

impl Attrs {
    pub fn get(&self, name: Option<Spur>) -> Vec<&Attr> {
        let name = match name {
            Some(spur) => spur,
            None => return vec![],
        };
        match self {
            Attrs::None | Attrs::Error(_) => vec![],
            Attrs::Ok(_, attrs) => attrs.iter().filter(|a| a.0.spur == name).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDim {
    Two,
    Three,
    Cube,
}

/// A `type name [n] [: SEMANTIC]` field inside a struct or cbuffer.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub ty: Name,
    pub name: Name,
    pub array: Option<(Id, u32)>,
    pub semantic: Option<Name>,
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub ty: Name,
    pub name: Name,
    pub semantic: Option<Name>,
}

#[derive(Debug)]
pub struct FunDecl {
    pub fun_id: Id,
    pub attrs: Attrs,
    /// `void` returns carry the id of the keyword and no name.
    pub ret: Option<Name>,
    pub ret_void_id: Option<Id>,
    pub name: Name,
    pub paren_id: Id,
    pub params: Vec<Param>,
    pub body: Stmt,
}

#[derive(Debug)]
pub enum Item {
    Struct {
        struct_id: Id,
        name: Name,
        fields: Vec<Field>,
    },
    CBuffer {
        cbuffer_id: Id,
        attrs: Attrs,
        name: Name,
        fields: Vec<Field>,
    },
    Texture {
        decl_id: Id,
        attrs: Attrs,
        dim: TextureDim,
        name: Name,
    },
    Sampler {
        decl_id: Id,
        attrs: Attrs,
        name: Name,
    },
    Fun(Box<FunDecl>),
    Error(Id),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Neq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

impl BinOpKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
            BinOpKind::Rem => "%",
            BinOpKind::Eq => "==",
            BinOpKind::Neq => "!=",
            BinOpKind::Less => "<",
            BinOpKind::LessEq => "<=",
            BinOpKind::Greater => ">",
            BinOpKind::GreaterEq => ">=",
            BinOpKind::And => "&&",
            BinOpKind::Or => "||",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOpKind::Eq
                | BinOpKind::Neq
                | BinOpKind::Less
                | BinOpKind::LessEq
                | BinOpKind::Greater
                | BinOpKind::GreaterEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOpKind::And | BinOpKind::Or)
    }
}

impl Display for BinOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpKind {
    Neg,
    Not,
}

impl UnOpKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnOpKind::Neg => "-",
            UnOpKind::Not => "!",
        }
    }
}

#[derive(Debug)]
pub enum Expr {
    Binary(Id, BinOpKind, Box<Expr>, Box<Expr>),
    Unary(Id, UnOpKind, Box<Expr>),
    Int(Id, i32),
    Float(Id, f32),
    Bool(Id, bool),
    Identifier(Name),
    Call(Id, Name, Vec<Expr>),
    Member(Id, Box<Expr>, Name),
    Index(Id, Box<Expr>, Box<Expr>),
    Error(Id),
}

impl Expr {
    pub fn get_id(&self) -> Id {
        match self {
            Expr::Binary(id, _, _, _)
            | Expr::Unary(id, _, _)
            | Expr::Int(id, _)
            | Expr::Float(id, _)
            | Expr::Bool(id, _)
            | Expr::Call(id, _, _)
            | Expr::Member(id, _, _)
            | Expr::Index(id, _, _)
            | Expr::Error(id) => *id,
            Expr::Identifier(name) => name.id,
        }
    }
}

#[derive(Debug)]
pub struct LocalVar {
    pub ty: Name,
    pub name: Name,
    pub array: Option<(Id, u32)>,
    pub init: Option<Expr>,
}

#[derive(Debug)]
pub enum Stmt {
    Block(Id, Vec<Stmt>),
    LocalVar(LocalVar),
    /// `lhs op= rhs`; plain `=` carries no op.
    Assign {
        eq_id: Id,
        op: Option<BinOpKind>,
        lhs: Expr,
        rhs: Expr,
    },
    If {
        if_id: Id,
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<(Id, Box<Stmt>)>,
    },
    For {
        for_id: Id,
        init: Box<Stmt>,
        cond: Expr,
        step: Box<Stmt>,
        body: Box<Stmt>,
    },
    Return(Id, Option<Expr>),
    Expr(Expr),
    Error(Id),
}

pub trait ItemVisitor {
    type Out;

    fn visit_item(&mut self, item: &Item) -> Self::Out {
        match item {
            Item::Struct {
                struct_id,
                name,
                fields,
            } => self.structure(*struct_id, *name, fields),
            Item::CBuffer {
                cbuffer_id,
                attrs,
                name,
                fields,
            } => self.cbuffer(*cbuffer_id, attrs, *name, fields),
            Item::Texture {
                decl_id,
                attrs,
                dim,
                name,
            } => self.texture(*decl_id, attrs, *dim, *name),
            Item::Sampler {
                decl_id,
                attrs,
                name,
            } => self.sampler(*decl_id, attrs, *name),
            Item::Fun(fun) => self.fun(fun),
            Item::Error(id) => self.item_error(*id),
        }
    }

    fn structure(&mut self, struct_id: Id, name: Name, fields: &[Field]) -> Self::Out;
    fn cbuffer(&mut self, cbuffer_id: Id, attrs: &Attrs, name: Name, fields: &[Field])
        -> Self::Out;
    fn texture(&mut self, decl_id: Id, attrs: &Attrs, dim: TextureDim, name: Name) -> Self::Out;
    fn sampler(&mut self, decl_id: Id, attrs: &Attrs, name: Name) -> Self::Out;
    fn fun(&mut self, fun: &FunDecl) -> Self::Out;
    fn item_error(&mut self, id: Id) -> Self::Out;
}

pub trait StmtVisitor {
    type Out;

    fn visit_stmt(&mut self, stmt: &Stmt) -> Self::Out {
        match stmt {
            Stmt::Block(id, stmts) => self.block(*id, stmts),
            Stmt::LocalVar(var) => self.local_var(var),
            Stmt::Assign {
                eq_id,
                op,
                lhs,
                rhs,
            } => self.assign(*eq_id, *op, lhs, rhs),
            Stmt::If {
                if_id,
                cond,
                then_branch,
                else_branch,
            } => self.if_stmt(
                *if_id,
                cond,
                then_branch,
                else_branch.as_ref().map(|(id, s)| (*id, &**s)),
            ),
            Stmt::For {
                for_id,
                init,
                cond,
                step,
                body,
            } => self.for_stmt(*for_id, init, cond, step, body),
            Stmt::Return(id, expr) => self.ret(*id, expr.as_ref()),
            Stmt::Expr(expr) => self.expr_stmt(expr),
            Stmt::Error(id) => self.stmt_error(*id),
        }
    }

    fn block(&mut self, id: Id, stmts: &[Stmt]) -> Self::Out;
    fn local_var(&mut self, var: &LocalVar) -> Self::Out;
    fn assign(&mut self, eq_id: Id, op: Option<BinOpKind>, lhs: &Expr, rhs: &Expr) -> Self::Out;
    fn if_stmt(
        &mut self,
        if_id: Id,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<(Id, &Stmt)>,
    ) -> Self::Out;
    fn for_stmt(&mut self, for_id: Id, init: &Stmt, cond: &Expr, step: &Stmt, body: &Stmt)
        -> Self::Out;
    fn ret(&mut self, id: Id, expr: Option<&Expr>) -> Self::Out;
    fn expr_stmt(&mut self, expr: &Expr) -> Self::Out;
    fn stmt_error(&mut self, id: Id) -> Self::Out;
}

pub trait ExprVisitor {
    type Out;

    fn visit_expr(&mut self, expr: &Expr) -> Self::Out {
        match expr {
            Expr::Binary(id, kind, left, right) => self.binary(*id, *kind, left, right),
            Expr::Unary(id, kind, operand) => self.unary(*id, *kind, operand),
            Expr::Int(id, i) => self.int(*id, *i),
            Expr::Float(id, f) => self.float(*id, *f),
            Expr::Bool(id, b) => self.boolean(*id, *b),
            Expr::Identifier(name) => self.identifier(*name),
            Expr::Call(id, name, args) => self.call(*id, *name, args),
            Expr::Member(id, expr, member) => self.member(*id, expr, *member),
            Expr::Index(id, expr, index) => self.index(*id, expr, index),
            Expr::Error(id) => self.expr_error(*id),
        }
    }

    fn binary(&mut self, id: Id, kind: BinOpKind, left: &Expr, right: &Expr) -> Self::Out;
    fn unary(&mut self, id: Id, kind: UnOpKind, operand: &Expr) -> Self::Out;
    fn int(&mut self, id: Id, i: i32) -> Self::Out;
    fn float(&mut self, id: Id, f: f32) -> Self::Out;
    fn boolean(&mut self, id: Id, b: bool) -> Self::Out;
    fn identifier(&mut self, name: Name) -> Self::Out;
    fn call(&mut self, id: Id, name: Name, args: &[Expr]) -> Self::Out;
    fn member(&mut self, id: Id, expr: &Expr, member: Name) -> Self::Out;
    fn index(&mut self, id: Id, expr: &Expr, index: &Expr) -> Self::Out;
    fn expr_error(&mut self, id: Id) -> Self::Out;
}
