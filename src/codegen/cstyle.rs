//! Statement and expression lowering shared by the two C-flavoured text
//! targets. The dialects differ only in resource access, intrinsic spelling
//! and declaration syntax; everything else is emitted identically so both
//! outputs stay deterministic.

use super::{float_lit, Context, Mangler, Writer};
use crate::{
    ast::{Expr, Id, LocalVar, Stmt},
    error::CinderError,
    name_resolution::{FunId, ResourceId, SymbolKind},
    type_resolution::{intrinsics::Intrinsic, CallTarget, MemberRef},
    types::{builtin, Type, TypeId},
};
use lasso::Spur;

pub(crate) trait Dialect {
    /// Spelling of a cbuffer member reference.
    fn uniform_access(&self, e: &mut Emitter<'_>, buffer: ResourceId, member: usize) -> String;

    /// Spelling of one intrinsic call; `Err` is `UnsupportedIntrinsic`.
    fn intrinsic(
        &self,
        e: &mut Emitter<'_>,
        call_id: Id,
        intrinsic: Intrinsic,
        args: Vec<String>,
    ) -> Result<String, CinderError>;

    /// Extra arguments appended to user-function calls (resource threading).
    fn call_extra_args(&self, e: &mut Emitter<'_>, fun: FunId) -> Vec<String> {
        let _ = (e, fun);
        vec![]
    }

    /// Override for locals the dialect had to relocate (stage-in structs).
    fn local_name(&self, e: &mut Emitter<'_>, symbol_name: Spur, id: Id) -> String {
        let _ = id;
        e.name(symbol_name)
    }
}

pub(crate) struct Emitter<'a> {
    pub cx: Context<'a>,
    pub mangler: Mangler,
}

impl<'a> Emitter<'a> {
    pub fn new(cx: Context<'a>, reserved: &'static [&'static str]) -> Self {
        Emitter {
            cx,
            mangler: Mangler::new(reserved),
        }
    }

    pub fn name(&mut self, spur: Spur) -> String {
        let text = self.cx.ast.rodeo.resolve(&spur).to_string();
        self.mangler.get(&text, spur)
    }

    pub fn span(&self, id: Id) -> logos::Span {
        self.cx.ast.spans[id].clone()
    }

    /// Source-style type spelling, shared by both dialects for everything
    /// that can appear in a local or field declaration.
    pub fn type_name(&mut self, ty: TypeId) -> String {
        match self.cx.types.get(ty) {
            Type::Struct(strukt) => {
                let name = strukt.name;
                self.name(name)
            }
            _ => self.cx.types.display(ty, &self.cx.ast.rodeo),
        }
    }

    fn internal(&self, what: &str) -> CinderError {
        CinderError::InternalError(format!("codegen reached an unexpected {}", what))
    }
}

/// Declared structs in dependency order: a struct is emitted after every
/// struct its fields reference, so both text targets compile without
/// forward declarations. Ties follow declaration order.
pub(crate) fn struct_order(cx: &Context<'_>) -> Vec<TypeId> {
    use crate::ast::Item;

    let declared: Vec<TypeId> = cx
        .ast
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Struct { name, .. } => cx.symbols.type_named(name.spur),
            _ => None,
        })
        .collect();

    fn visit(
        cx: &Context<'_>,
        declared: &[TypeId],
        ty: TypeId,
        seen: &mut Vec<TypeId>,
        order: &mut Vec<TypeId>,
    ) {
        if seen.contains(&ty) {
            return;
        }
        seen.push(ty);
        if let Type::Struct(strukt) = cx.types.get(ty) {
            for member in &strukt.members {
                let mut member_ty = member.ty;
                if let Type::Array(elem, _) = cx.types.get(member_ty) {
                    member_ty = *elem;
                }
                if declared.contains(&member_ty) {
                    visit(cx, declared, member_ty, seen, order);
                }
            }
        }
        if declared.contains(&ty) {
            order.push(ty);
        }
    }

    let mut seen = vec![];
    let mut order = vec![];
    for ty in &declared {
        visit(cx, &declared, *ty, &mut seen, &mut order);
    }
    order
}

pub(crate) fn write_expr<D: Dialect>(
    d: &D,
    e: &mut Emitter<'_>,
    expr: &Expr,
) -> Result<String, CinderError> {
    match expr {
        Expr::Int(id, value) => {
            let ty = e.cx.resolution.nodes[*id];
            Ok(if ty == builtin::FLOAT_ID {
                float_lit(*value as f32)
            } else if ty == builtin::UINT_ID {
                format!("{}u", value)
            } else {
                format!("{}", value)
            })
        }
        Expr::Float(_, value) => Ok(float_lit(*value)),
        Expr::Bool(_, value) => Ok(if *value { "true" } else { "false" }.to_string()),
        Expr::Identifier(name) => {
            let symbol_id = e
                .cx
                .symbols
                .use_of(name.id)
                .ok_or_else(|| e.internal("unresolved identifier"))?;
            let symbol = *e.cx.symbols.symbol(symbol_id);
            match symbol.kind {
                SymbolKind::Local => Ok(d.local_name(e, symbol.name, name.id)),
                SymbolKind::UniformMember { buffer, member } => {
                    Ok(d.uniform_access(e, buffer, member))
                }
                SymbolKind::Resource(_) => Ok(e.name(symbol.name)),
            }
        }
        Expr::Unary(_, kind, operand) => {
            let operand = write_expr(d, e, operand)?;
            Ok(format!("({}{})", kind.symbol(), operand))
        }
        Expr::Binary(_, kind, left, right) => {
            let left = write_expr(d, e, left)?;
            let right = write_expr(d, e, right)?;
            Ok(format!("({} {} {})", left, kind.symbol(), right))
        }
        Expr::Member(id, base, member) => {
            let base = write_expr(d, e, base)?;
            match e.cx.resolution.members.get(id) {
                Some(MemberRef::Field(_)) => Ok(format!("{}.{}", base, e.name(member.spur))),
                Some(MemberRef::Swizzle(swizzle)) => {
                    let letters: String = swizzle
                        .indices()
                        .iter()
                        .map(|i| ['x', 'y', 'z', 'w'][*i as usize])
                        .collect();
                    Ok(format!("{}.{}", base, letters))
                }
                None => Err(e.internal("unresolved member access")),
            }
        }
        Expr::Index(_, base, index) => {
            let base = write_expr(d, e, base)?;
            let index = write_expr(d, e, index)?;
            Ok(format!("{}[{}]", base, index))
        }
        Expr::Call(id, name, args) => {
            let mut arg_text = Vec::with_capacity(args.len());
            for arg in args {
                arg_text.push(write_expr(d, e, arg)?);
            }
            match e.cx.resolution.calls.get(id).copied() {
                Some(CallTarget::Construct(ty)) => {
                    Ok(format!("{}({})", e.type_name(ty), arg_text.join(", ")))
                }
                Some(CallTarget::Fun(fun)) => {
                    arg_text.extend(d.call_extra_args(e, fun));
                    let fun_name = e.name(e.cx.symbols.function(fun).name);
                    Ok(format!("{}({})", fun_name, arg_text.join(", ")))
                }
                Some(CallTarget::Intrinsic(intrinsic)) => {
                    d.intrinsic(e, *id, intrinsic, arg_text)
                }
                None => Err(e.internal(&format!(
                    "unresolved call to '{}'",
                    e.cx.resolve(name.spur)
                ))),
            }
        }
        Expr::Error(_) => Err(e.internal("error expression")),
    }
}

fn local_decl<D: Dialect>(
    d: &D,
    e: &mut Emitter<'_>,
    var: &LocalVar,
) -> Result<String, CinderError> {
    let base = e
        .cx
        .symbols
        .use_of(var.name.id)
        .map(|s| e.cx.symbols.symbol(s).ty)
        .unwrap_or(builtin::ERROR_ID);

    let (elem, suffix) = match e.cx.types.get(base) {
        Type::Array(elem, len) => (*elem, format!("[{}]", len)),
        _ => (base, String::new()),
    };

    let ty = e.type_name(elem);
    let name = e.name(var.name.spur);
    let mut text = format!("{} {}{}", ty, name, suffix);
    if let Some(init) = &var.init {
        text.push_str(" = ");
        text.push_str(&write_expr(d, e, init)?);
    }
    Ok(text)
}

/// Renders a statement without its trailing semicolon, for for-loop headers.
fn stmt_inline<D: Dialect>(
    d: &D,
    e: &mut Emitter<'_>,
    stmt: &Stmt,
) -> Result<String, CinderError> {
    match stmt {
        Stmt::LocalVar(var) => local_decl(d, e, var),
        Stmt::Assign {
            op, lhs, rhs, ..
        } => {
            let lhs = write_expr(d, e, lhs)?;
            let rhs = write_expr(d, e, rhs)?;
            match op {
                Some(op) => Ok(format!("{} {}= {}", lhs, op.symbol(), rhs)),
                None => Ok(format!("{} = {}", lhs, rhs)),
            }
        }
        Stmt::Expr(expr) => write_expr(d, e, expr),
        _ => Err(e.internal("statement in a for-loop header")),
    }
}

pub(crate) fn write_stmt<D: Dialect>(
    d: &D,
    e: &mut Emitter<'_>,
    w: &mut Writer,
    stmt: &Stmt,
) -> Result<(), CinderError> {
    match stmt {
        Stmt::Block(_, stmts) => {
            w.line("{");
            w.indent();
            for stmt in stmts {
                write_stmt(d, e, w, stmt)?;
            }
            w.dedent();
            w.line("}");
        }
        Stmt::LocalVar(var) => {
            let text = local_decl(d, e, var)?;
            w.line(&format!("{};", text));
        }
        Stmt::Assign { .. } | Stmt::Expr(_) => {
            let text = stmt_inline(d, e, stmt)?;
            w.line(&format!("{};", text));
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            let cond = write_expr(d, e, cond)?;
            w.line(&format!("if ({}) {{", cond));
            w.indent();
            write_branch(d, e, w, then_branch)?;
            w.dedent();
            match else_branch {
                Some((_, stmt)) => {
                    w.line("} else {");
                    w.indent();
                    write_branch(d, e, w, stmt)?;
                    w.dedent();
                    w.line("}");
                }
                None => w.line("}"),
            }
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            let init = stmt_inline(d, e, init)?;
            let cond = write_expr(d, e, cond)?;
            let step = stmt_inline(d, e, step)?;
            w.line(&format!("for ({}; {}; {}) {{", init, cond, step));
            w.indent();
            write_branch(d, e, w, body)?;
            w.dedent();
            w.line("}");
        }
        Stmt::Return(_, expr) => match expr {
            Some(expr) => {
                let text = write_expr(d, e, expr)?;
                w.line(&format!("return {};", text));
            }
            None => w.line("return;"),
        },
        Stmt::Error(_) => return Err(e.internal("error statement")),
    }
    Ok(())
}

/// Writes a branch body: blocks are flattened into the braces the caller
/// already opened.
pub(crate) fn write_branch<D: Dialect>(
    d: &D,
    e: &mut Emitter<'_>,
    w: &mut Writer,
    stmt: &Stmt,
) -> Result<(), CinderError> {
    match stmt {
        Stmt::Block(_, stmts) => {
            for stmt in stmts {
                write_stmt(d, e, w, stmt)?;
            }
            Ok(())
        }
        other => write_stmt(d, e, w, other),
    }
}
