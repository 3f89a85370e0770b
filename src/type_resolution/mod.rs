pub mod intrinsics;
pub mod stage;

use self::intrinsics::{signatures, Intrinsic};
use crate::{
    ast::{
        Ast, BinOpKind, Expr, ExprVisitor, Id, Item, LocalVar, Name, Stmt, StmtVisitor, UnOpKind,
    },
    error::{CinderError, ScopeErrorKind, TypeErrorKind},
    name_resolution::{FunId, SymbolKind, SymbolTable},
    parser::spans_table::SpanTable,
    types::{builtin, NodeTypes, ScalarKind, Type, TypeId, TypeTable},
};
use lasso::RodeoReader;
use std::collections::HashMap;

/// Resolves a type for every expression node and a target for every call and
/// member access. After this pass runs without errors the binder and the
/// generators may rely on every entry being present.
pub fn visit(ast: &mut Ast, symbols: &SymbolTable, types: &TypeTable) -> TypeResolution {
    let mut resolution = TypeResolution {
        nodes: NodeTypes::new(ast.max_id()),
        calls: HashMap::new(),
        members: HashMap::new(),
    };

    for item in &ast.items {
        let fun = match item {
            Item::Fun(fun) => fun,
            _ => continue,
        };
        let ret = symbols
            .function_named(fun.name.spur)
            .map(|id| symbols.function(id).ret)
            .unwrap_or(builtin::ERROR_ID);

        let mut checker = TypeChecker {
            symbols,
            types,
            rodeo: &ast.rodeo,
            spans: &ast.spans,
            errors: &mut ast.errors,
            nodes: &mut resolution.nodes,
            calls: &mut resolution.calls,
            members: &mut resolution.members,
            ret,
        };
        checker.visit_stmt(&fun.body);
    }

    stage::check(ast, symbols, types);

    resolution
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Fun(FunId),
    Intrinsic(Intrinsic),
    Construct(TypeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swizzle {
    pub components: [u8; 4],
    pub len: u8,
    pub has_repeat: bool,
}

impl Swizzle {
    pub fn indices(&self) -> &[u8] {
        &self.components[..self.len as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRef {
    Field(usize),
    Swizzle(Swizzle),
}

#[derive(Debug)]
pub struct TypeResolution {
    pub nodes: NodeTypes,
    pub calls: HashMap<Id, CallTarget>,
    pub members: HashMap<Id, MemberRef>,
}

/// `Some(negated)` when the expression is an integer literal, possibly
/// behind a unary minus; only these widen implicitly.
fn int_literal(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Int(_, _) => Some(false),
        Expr::Unary(_, UnOpKind::Neg, inner) => match &**inner {
            Expr::Int(_, _) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

struct TypeChecker<'a> {
    symbols: &'a SymbolTable,
    types: &'a TypeTable,
    rodeo: &'a RodeoReader,
    spans: &'a SpanTable,
    errors: &'a mut Vec<CinderError>,
    nodes: &'a mut NodeTypes,
    calls: &'a mut HashMap<Id, CallTarget>,
    members: &'a mut HashMap<Id, MemberRef>,
    ret: TypeId,
}

impl TypeChecker<'_> {
    fn display(&self, ty: TypeId) -> String {
        self.types.display(ty, self.rodeo)
    }

    fn type_error(&mut self, kind: TypeErrorKind, id: Id) -> TypeId {
        self.errors
            .push(CinderError::TypeError(kind, self.spans[id].clone()));
        builtin::ERROR_ID
    }

    fn set(&mut self, id: Id, ty: TypeId) -> TypeId {
        self.nodes[id] = ty;
        ty
    }

    /// Pure compatibility check used while candidates are still competing.
    fn compatible(&self, expr: &Expr, found: TypeId, want: TypeId) -> bool {
        if found == want || found == builtin::ERROR_ID || want == builtin::ERROR_ID {
            return true;
        }
        match int_literal(expr) {
            Some(negated) => {
                want == builtin::FLOAT_ID || (want == builtin::UINT_ID && !negated)
            }
            None => false,
        }
    }

    /// Checked coercion; on success the literal's node type is rewritten so
    /// the generators emit it with the widened type.
    fn coerce(&mut self, expr: &Expr, found: TypeId, want: TypeId) -> bool {
        if !self.compatible(expr, found, want) {
            return false;
        }
        if found != want && found != builtin::ERROR_ID && want != builtin::ERROR_ID {
            self.nodes[expr.get_id()] = want;
            if let Expr::Unary(_, _, inner) = expr {
                self.nodes[inner.get_id()] = want;
            }
        }
        true
    }

    /// The result type of a binary operator over already-typed operands, or
    /// `None` when the operands don't unify.
    fn binary_result(
        &mut self,
        kind: BinOpKind,
        left: &Expr,
        lt: TypeId,
        right: &Expr,
        rt: TypeId,
    ) -> Option<TypeId> {
        match kind {
            BinOpKind::Add | BinOpKind::Sub | BinOpKind::Div => self.unify_numeric(left, lt, right, rt),
            BinOpKind::Mul => self
                .unify_numeric(left, lt, right, rt)
                .or_else(|| self.vector_scalar(left, lt, right, rt)),
            BinOpKind::Rem => {
                let unified = self.unify_numeric(left, lt, right, rt)?;
                match self.types.scalar_kind(unified) {
                    Some(ScalarKind::Int) | Some(ScalarKind::UInt) => Some(unified),
                    _ => None,
                }
            }
            BinOpKind::Less | BinOpKind::LessEq | BinOpKind::Greater | BinOpKind::GreaterEq => {
                let unified = self.unify_numeric(left, lt, right, rt)?;
                match self.types.get(unified) {
                    Type::Scalar(_) => Some(builtin::BOOL_ID),
                    _ => None,
                }
            }
            BinOpKind::Eq | BinOpKind::Neq => {
                let unified = self.unify(left, lt, right, rt)?;
                match self.types.get(unified) {
                    Type::Scalar(_) | Type::Vector(_, _) => Some(builtin::BOOL_ID),
                    _ => None,
                }
            }
            BinOpKind::And | BinOpKind::Or => {
                if lt == builtin::BOOL_ID && rt == builtin::BOOL_ID {
                    Some(builtin::BOOL_ID)
                } else {
                    None
                }
            }
        }
    }

    fn unify(&mut self, left: &Expr, lt: TypeId, right: &Expr, rt: TypeId) -> Option<TypeId> {
        if lt == rt {
            return Some(lt);
        }
        if self.coerce(right, rt, lt) {
            return Some(lt);
        }
        if self.coerce(left, lt, rt) {
            return Some(rt);
        }
        None
    }

    fn unify_numeric(
        &mut self,
        left: &Expr,
        lt: TypeId,
        right: &Expr,
        rt: TypeId,
    ) -> Option<TypeId> {
        let unified = self.unify(left, lt, right, rt)?;
        if self.types.is_numeric(unified) {
            Some(unified)
        } else {
            None
        }
    }

    /// `vector * scalar` and `scalar * vector` of the same scalar kind.
    fn vector_scalar(
        &mut self,
        left: &Expr,
        lt: TypeId,
        right: &Expr,
        rt: TypeId,
    ) -> Option<TypeId> {
        let (vec_ty, scalar_expr, scalar_ty) = match (self.types.get(lt), self.types.get(rt)) {
            (Type::Vector(_, _), Type::Scalar(_)) => (lt, right, rt),
            (Type::Scalar(_), Type::Vector(_, _)) => (rt, left, lt),
            _ => return None,
        };
        let kind = self.types.scalar_kind(vec_ty)?;
        if !self.types.is_numeric(vec_ty) {
            return None;
        }
        if self.coerce(scalar_expr, scalar_ty, TypeTable::scalar(kind)) {
            Some(vec_ty)
        } else {
            None
        }
    }

    fn check_swizzle(&mut self, id: Id, base: TypeId, member: Name) -> TypeId {
        let (kind, arity) = match self.types.get(base) {
            Type::Vector(kind, n) => (*kind, *n),
            _ => {
                let kind = TypeErrorKind::UnknownField {
                    ty: self.display(base),
                    field: self.rodeo.resolve(&member.spur).to_string(),
                };
                return self.type_error(kind, id);
            }
        };

        let text = self.rodeo.resolve(&member.spur).to_string();
        let parsed = parse_swizzle(&text, arity);
        let swizzle = match parsed {
            Some(swizzle) => swizzle,
            None => {
                let kind = TypeErrorKind::BadSwizzle {
                    swizzle: text,
                    ty: self.display(base),
                };
                return self.type_error(kind, id);
            }
        };

        self.members.insert(id, MemberRef::Swizzle(swizzle));
        let ty = if swizzle.len == 1 {
            TypeTable::scalar(kind)
        } else {
            TypeTable::vector(kind, swizzle.len)
        };
        self.set(id, ty)
    }

    /// Verifies the left side of an assignment is a writable place.
    fn check_place(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier(name) => {
                let symbol = match self.symbols.use_of(name.id) {
                    Some(id) => self.symbols.symbol(id),
                    None => return,
                };
                match symbol.kind {
                    SymbolKind::Local => {}
                    SymbolKind::UniformMember { .. } | SymbolKind::Resource(_) => {
                        let kind = TypeErrorKind::NotAssignable(
                            self.rodeo.resolve(&name.spur).to_string(),
                        );
                        self.type_error(kind, name.id);
                    }
                }
            }
            Expr::Member(id, inner, _) => {
                if let Some(MemberRef::Swizzle(swizzle)) = self.members.get(id).copied() {
                    if swizzle.has_repeat {
                        self.type_error(TypeErrorKind::RepeatedSwizzleWrite, *id);
                    }
                }
                self.check_place(inner);
            }
            Expr::Index(_, inner, _) => self.check_place(inner),
            Expr::Error(_) => {}
            other => {
                let kind = TypeErrorKind::NotAssignable("this expression".to_string());
                self.type_error(kind, other.get_id());
            }
        }
    }

    fn check_call(&mut self, id: Id, name: Name, args: &[Expr]) -> TypeId {
        let arg_types: Vec<TypeId> = args.iter().map(|a| self.visit_expr(a)).collect();
        if arg_types.contains(&builtin::ERROR_ID) {
            return self.set(id, builtin::ERROR_ID);
        }

        if let Some(ty) = self.symbols.type_named(name.spur) {
            return self.check_constructor(id, ty, args, &arg_types);
        }

        let mut candidates: Vec<(CallTarget, Vec<TypeId>, TypeId)> = vec![];
        if let Some(fun_id) = self.symbols.function_named(name.spur) {
            let info = self.symbols.function(fun_id);
            candidates.push((CallTarget::Fun(fun_id), info.params.clone(), info.ret));
        }
        if let Some(intrinsic) = Intrinsic::from_name(self.rodeo.resolve(&name.spur)) {
            for sig in signatures(intrinsic) {
                candidates.push((CallTarget::Intrinsic(intrinsic), sig.params, sig.ret));
            }
        }

        if candidates.is_empty() {
            self.errors.push(CinderError::ScopeError(
                ScopeErrorKind::UndeclaredIdentifier(self.rodeo.resolve(&name.spur).to_string()),
                self.spans[name.id].clone(),
            ));
            return self.set(id, builtin::ERROR_ID);
        }

        let matching: Vec<&(CallTarget, Vec<TypeId>, TypeId)> = candidates
            .iter()
            .filter(|(_, params, _)| {
                params.len() == args.len()
                    && args
                        .iter()
                        .zip(arg_types.iter())
                        .zip(params.iter())
                        .all(|((arg, found), want)| self.compatible(arg, *found, *want))
            })
            .collect();

        match matching.len() {
            0 => {
                let args_text = arg_types
                    .iter()
                    .map(|t| self.display(*t))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.errors.push(CinderError::NoMatchingOverload {
                    name: self.rodeo.resolve(&name.spur).to_string(),
                    args: args_text,
                    span: self.spans[id].clone(),
                });
                self.set(id, builtin::ERROR_ID)
            }
            1 => {
                let target = matching[0].0;
                let params = matching[0].1.clone();
                let ret = matching[0].2;
                for ((arg, found), want) in args.iter().zip(arg_types.iter()).zip(params.iter()) {
                    self.coerce(arg, *found, *want);
                }
                self.calls.insert(id, target);
                self.set(id, ret)
            }
            n => {
                self.errors.push(CinderError::AmbiguousCall {
                    name: self.rodeo.resolve(&name.spur).to_string(),
                    candidates: n,
                    span: self.spans[id].clone(),
                });
                self.set(id, builtin::ERROR_ID)
            }
        }
    }

    fn check_constructor(
        &mut self,
        id: Id,
        ty: TypeId,
        args: &[Expr],
        arg_types: &[TypeId],
    ) -> TypeId {
        match self.types.get(ty).clone() {
            Type::Vector(kind, n) => {
                let scalar = TypeTable::scalar(kind);

                // A single scalar splats across all components.
                if args.len() == 1 {
                    if let Type::Scalar(_) = self.types.get(arg_types[0]) {
                        if self.coerce(&args[0], arg_types[0], scalar)
                            || arg_types[0] == scalar
                        {
                            self.calls.insert(id, CallTarget::Construct(ty));
                            return self.set(id, ty);
                        }
                    }
                }

                let mut total = 0u32;
                for (arg, found) in args.iter().zip(arg_types.iter()) {
                    match self.types.get(*found) {
                        Type::Scalar(k) => {
                            if *k != kind && !self.coerce(arg, *found, scalar) {
                                let kind = TypeErrorKind::Expected {
                                    expected: self.display(scalar),
                                    found: self.display(*found),
                                };
                                return self.set_error(id, kind, arg.get_id());
                            }
                            total += 1;
                        }
                        Type::Vector(k, len) if *k == kind => total += *len as u32,
                        _ => {
                            let kind = TypeErrorKind::Expected {
                                expected: self.display(scalar),
                                found: self.display(*found),
                            };
                            return self.set_error(id, kind, arg.get_id());
                        }
                    }
                }

                if total != n as u32 {
                    let kind = TypeErrorKind::BadConstructor {
                        ty: self.display(ty),
                        expected: n as u32,
                        found: total,
                    };
                    return self.set_error(id, kind, id);
                }

                self.calls.insert(id, CallTarget::Construct(ty));
                self.set(id, ty)
            }
            Type::Scalar(kind) => {
                if args.len() == 1 && self.types.is_numeric(arg_types[0])
                    && matches!(self.types.get(arg_types[0]), Type::Scalar(_))
                    && kind != ScalarKind::Bool
                {
                    self.calls.insert(id, CallTarget::Construct(ty));
                    self.set(id, ty)
                } else {
                    let found = arg_types
                        .first()
                        .map(|t| self.display(*t))
                        .unwrap_or_else(|| "void".to_string());
                    let kind = TypeErrorKind::Expected {
                        expected: self.display(ty),
                        found,
                    };
                    self.set_error(id, kind, id)
                }
            }
            Type::Matrix { cols, rows } => {
                let column = TypeTable::vector(ScalarKind::Float, rows);
                if args.len() == cols as usize && arg_types.iter().all(|t| *t == column) {
                    self.calls.insert(id, CallTarget::Construct(ty));
                    self.set(id, ty)
                } else {
                    let kind = TypeErrorKind::BadConstructor {
                        ty: self.display(ty),
                        expected: cols as u32,
                        found: args.len() as u32,
                    };
                    self.set_error(id, kind, id)
                }
            }
            _ => {
                let kind = TypeErrorKind::NotCallable(self.display(ty));
                self.set_error(id, kind, id)
            }
        }
    }

    fn set_error(&mut self, node: Id, kind: TypeErrorKind, at: Id) -> TypeId {
        self.type_error(kind, at);
        self.set(node, builtin::ERROR_ID)
    }
}

fn parse_swizzle(text: &str, arity: u8) -> Option<Swizzle> {
    if text.is_empty() || text.len() > 4 {
        return None;
    }

    let set: &[char] = if "xyzw".contains(text.chars().next().unwrap()) {
        &['x', 'y', 'z', 'w']
    } else {
        &['r', 'g', 'b', 'a']
    };

    let mut components = [0u8; 4];
    let mut seen = [false; 4];
    let mut has_repeat = false;

    for (i, ch) in text.chars().enumerate() {
        let index = set.iter().position(|c| *c == ch)? as u8;
        if index >= arity {
            return None;
        }
        if seen[index as usize] {
            has_repeat = true;
        }
        seen[index as usize] = true;
        components[i] = index;
    }

    Some(Swizzle {
        components,
        len: text.len() as u8,
        has_repeat,
    })
}

impl StmtVisitor for TypeChecker<'_> {
    type Out = ();

    fn block(&mut self, _id: Id, stmts: &[Stmt]) -> Self::Out {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn local_var(&mut self, var: &LocalVar) -> Self::Out {
        let declared = match self.symbols.use_of(var.name.id) {
            Some(id) => self.symbols.symbol(id).ty,
            None => builtin::ERROR_ID,
        };
        self.nodes[var.name.id] = declared;

        if let Some(init) = &var.init {
            let found = self.visit_expr(init);
            if found != builtin::ERROR_ID
                && declared != builtin::ERROR_ID
                && !self.coerce(init, found, declared)
            {
                let kind = TypeErrorKind::AssignMismatch {
                    from: self.display(found),
                    to: self.display(declared),
                };
                self.type_error(kind, init.get_id());
            }
        }
    }

    fn assign(&mut self, eq_id: Id, op: Option<BinOpKind>, lhs: &Expr, rhs: &Expr) -> Self::Out {
        let lt = self.visit_expr(lhs);
        let rt = self.visit_expr(rhs);
        self.check_place(lhs);

        if lt == builtin::ERROR_ID || rt == builtin::ERROR_ID {
            return;
        }

        match op {
            Some(op) => match self.binary_result(op, lhs, lt, rhs, rt) {
                Some(result) if result == lt => {}
                _ => {
                    let kind = TypeErrorKind::BinaryMismatch {
                        op: op.symbol(),
                        left: self.display(lt),
                        right: self.display(rt),
                    };
                    self.type_error(kind, eq_id);
                }
            },
            None => {
                if !self.coerce(rhs, rt, lt) {
                    let kind = TypeErrorKind::AssignMismatch {
                        from: self.display(rt),
                        to: self.display(lt),
                    };
                    self.type_error(kind, eq_id);
                }
            }
        }
    }

    fn if_stmt(
        &mut self,
        _if_id: Id,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<(Id, &Stmt)>,
    ) -> Self::Out {
        self.check_condition(cond);
        self.visit_stmt(then_branch);
        if let Some((_, stmt)) = else_branch {
            self.visit_stmt(stmt);
        }
    }

    fn for_stmt(
        &mut self,
        _for_id: Id,
        init: &Stmt,
        cond: &Expr,
        step: &Stmt,
        body: &Stmt,
    ) -> Self::Out {
        self.visit_stmt(init);
        self.check_condition(cond);
        self.visit_stmt(step);
        self.visit_stmt(body);
    }

    fn ret(&mut self, id: Id, expr: Option<&Expr>) -> Self::Out {
        if self.ret == builtin::ERROR_ID {
            if let Some(expr) = expr {
                self.visit_expr(expr);
            }
            return;
        }

        match expr {
            Some(expr) => {
                let found = self.visit_expr(expr);
                if found != builtin::ERROR_ID && !self.coerce(expr, found, self.ret) {
                    let kind = TypeErrorKind::ReturnMismatch {
                        expected: self.display(self.ret),
                        found: self.display(found),
                    };
                    self.type_error(kind, expr.get_id());
                }
            }
            None => {
                if self.ret != builtin::VOID_ID {
                    let kind = TypeErrorKind::ReturnMismatch {
                        expected: self.display(self.ret),
                        found: "void".to_string(),
                    };
                    self.type_error(kind, id);
                }
            }
        }
    }

    fn expr_stmt(&mut self, expr: &Expr) -> Self::Out {
        self.visit_expr(expr);
    }

    fn stmt_error(&mut self, _id: Id) -> Self::Out {}
}

impl TypeChecker<'_> {
    fn check_condition(&mut self, cond: &Expr) {
        let ty = self.visit_expr(cond);
        if ty != builtin::BOOL_ID && ty != builtin::ERROR_ID {
            let kind = TypeErrorKind::NonBoolCondition(self.display(ty));
            self.type_error(kind, cond.get_id());
        }
    }
}

impl ExprVisitor for TypeChecker<'_> {
    type Out = TypeId;

    fn binary(&mut self, id: Id, kind: BinOpKind, left: &Expr, right: &Expr) -> Self::Out {
        let lt = self.visit_expr(left);
        let rt = self.visit_expr(right);

        if lt == builtin::ERROR_ID || rt == builtin::ERROR_ID {
            return self.set(id, builtin::ERROR_ID);
        }

        match self.binary_result(kind, left, lt, right, rt) {
            Some(ty) => self.set(id, ty),
            None => {
                let err = TypeErrorKind::BinaryMismatch {
                    op: kind.symbol(),
                    left: self.display(lt),
                    right: self.display(rt),
                };
                self.set_error(id, err, id)
            }
        }
    }

    fn unary(&mut self, id: Id, kind: UnOpKind, operand: &Expr) -> Self::Out {
        let ty = self.visit_expr(operand);
        if ty == builtin::ERROR_ID {
            return self.set(id, builtin::ERROR_ID);
        }

        let ok = match kind {
            UnOpKind::Neg => self.types.is_numeric(ty),
            UnOpKind::Not => ty == builtin::BOOL_ID,
        };

        if ok {
            self.set(id, ty)
        } else {
            let err = TypeErrorKind::UnaryMismatch {
                op: kind.symbol(),
                operand: self.display(ty),
            };
            self.set_error(id, err, id)
        }
    }

    fn int(&mut self, id: Id, _i: i32) -> Self::Out {
        self.set(id, builtin::INT_ID)
    }

    fn float(&mut self, id: Id, _f: f32) -> Self::Out {
        self.set(id, builtin::FLOAT_ID)
    }

    fn boolean(&mut self, id: Id, _b: bool) -> Self::Out {
        self.set(id, builtin::BOOL_ID)
    }

    fn identifier(&mut self, name: Name) -> Self::Out {
        let ty = match self.symbols.use_of(name.id) {
            Some(id) => self.symbols.symbol(id).ty,
            None => builtin::ERROR_ID,
        };
        self.set(name.id, ty)
    }

    fn call(&mut self, id: Id, name: Name, args: &[Expr]) -> Self::Out {
        self.check_call(id, name, args)
    }

    fn member(&mut self, id: Id, expr: &Expr, member: Name) -> Self::Out {
        let base = self.visit_expr(expr);
        if base == builtin::ERROR_ID {
            return self.set(id, builtin::ERROR_ID);
        }

        if let Type::Struct(strukt) = self.types.get(base) {
            return match strukt.member_index(member.spur) {
                Some(index) => {
                    let ty = strukt.members[index].ty;
                    self.members.insert(id, MemberRef::Field(index));
                    self.set(id, ty)
                }
                None => {
                    let kind = TypeErrorKind::UnknownField {
                        ty: self.display(base),
                        field: self.rodeo.resolve(&member.spur).to_string(),
                    };
                    self.set_error(id, kind, member.id)
                }
            };
        }

        self.check_swizzle(id, base, member)
    }

    fn index(&mut self, id: Id, expr: &Expr, index: &Expr) -> Self::Out {
        let base = self.visit_expr(expr);
        let idx = self.visit_expr(index);

        if base == builtin::ERROR_ID || idx == builtin::ERROR_ID {
            return self.set(id, builtin::ERROR_ID);
        }

        match self.types.scalar_kind(idx) {
            Some(ScalarKind::Int) | Some(ScalarKind::UInt)
                if matches!(self.types.get(idx), Type::Scalar(_)) => {}
            _ => {
                let kind = TypeErrorKind::NonIntegerIndex(self.display(idx));
                return self.set_error(id, kind, index.get_id());
            }
        }

        let element = match self.types.get(base) {
            Type::Array(elem, _) => *elem,
            Type::Vector(kind, _) => TypeTable::scalar(*kind),
            Type::Matrix { rows, .. } => TypeTable::vector(ScalarKind::Float, *rows),
            _ => {
                let kind = TypeErrorKind::NotIndexable(self.display(base));
                return self.set_error(id, kind, id);
            }
        };
        self.set(id, element)
    }

    fn expr_error(&mut self, id: Id) -> Self::Out {
        self.set(id, builtin::ERROR_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, name_resolution, parser};

    fn check(src: &str) -> (Ast, TypeResolution) {
        let mut ast = parser::parse(lexer::lex(src));
        let (symbols, types) = name_resolution::visit(&mut ast);
        let resolution = visit(&mut ast, &symbols, &types);
        (ast, resolution)
    }

    fn type_errors(ast: &Ast) -> Vec<String> {
        ast.errors
            .iter()
            .filter(|e| matches!(e, CinderError::TypeError(_, _)))
            .map(|e| format!("{}", e))
            .collect()
    }

    #[test]
    fn binary_mismatch_reports_exactly_one_error() {
        let (ast, _) = check("void f() { float4 a = float4(1.0, 2.0, 3.0, 4.0); bool b = true; float4 c = a + b; }");
        let errors = type_errors(&ast);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("float4"));
        assert!(errors[0].contains("bool"));
        assert!(errors[0].contains('+'));
    }

    #[test]
    fn integer_literal_widens_to_float() {
        let (ast, _) = check("void f() { float x = 1; float y = x + 2; }");
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
    }

    #[test]
    fn int_variable_does_not_widen() {
        let (ast, _) = check("void f() { int i = 1; float x = i; }");
        assert_eq!(type_errors(&ast).len(), 1);
    }

    #[test]
    fn swizzle_typing() {
        let (ast, _) = check(
            "void f() { float4 v = float4(1.0, 2.0, 3.0, 4.0); float3 a = v.xyz; float s = v.w; float2 r = v.rg; }",
        );
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
    }

    #[test]
    fn out_of_range_swizzle_is_an_error() {
        let (ast, _) = check("void f() { float2 v = float2(1.0, 2.0); float s = v.z; }");
        assert_eq!(type_errors(&ast).len(), 1);
    }

    #[test]
    fn repeated_swizzle_read_ok_write_rejected() {
        let (ast, _) = check(
            "void f() { float4 v = float4(1.0, 2.0, 3.0, 4.0); float2 a = v.xx; v.xx = a; }",
        );
        let errors = type_errors(&ast);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("repeated"));
    }

    #[test]
    fn unknown_field_is_reported() {
        let (ast, _) = check("struct S { float x; }\nvoid f(S s) { float y = s.nope; }");
        assert_eq!(type_errors(&ast).len(), 1);
    }

    #[test]
    fn no_matching_overload() {
        let (ast, _) = check("void f() { float x = dot(1.0, 2.0); }");
        assert!(ast
            .errors
            .iter()
            .any(|e| matches!(e, CinderError::NoMatchingOverload { .. })));
    }

    #[test]
    fn all_literal_min_is_ambiguous() {
        let (ast, _) = check("void f() { float x = min(1, 2); }");
        assert!(ast
            .errors
            .iter()
            .any(|e| matches!(e, CinderError::AmbiguousCall { .. })));
    }

    #[test]
    fn user_function_call_resolves() {
        let (ast, resolution) = check(
            "float half_of(float x) { return x / 2.0; }\nvoid f() { float y = half_of(4.0); }",
        );
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        assert!(resolution
            .calls
            .values()
            .any(|t| matches!(t, CallTarget::Fun(_))));
    }

    #[test]
    fn constructor_component_count_is_checked() {
        let (ast, _) = check("void f() { float4 v = float4(1.0, 2.0, 3.0); }");
        let errors = type_errors(&ast);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("4 components"));
    }

    #[test]
    fn vector_scalar_multiply() {
        let (ast, _) = check(
            "void f() { float3 v = float3(1.0, 2.0, 3.0); float3 a = v * 2.0; float3 b = 2.0 * v; float3 c = v * 2; }",
        );
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
    }

    #[test]
    fn uniforms_are_not_assignable() {
        let (ast, _) = check("cbuffer P { float4 tint; }\nvoid f() { tint = float4(0.0, 0.0, 0.0, 0.0); }");
        let errors = type_errors(&ast);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("not assignable"));
    }

    #[test]
    fn condition_must_be_bool() {
        let (ast, _) = check("void f() { if (1.0) { } }");
        assert_eq!(type_errors(&ast).len(), 1);
    }

    #[test]
    fn return_type_is_checked() {
        let (ast, _) = check("float f() { return true; }");
        assert_eq!(type_errors(&ast).len(), 1);
    }

    #[test]
    fn matrix_vector_mul_types() {
        let (ast, _) = check(
            "cbuffer P { float4x4 mvp; }\nfloat4 f(float4 v) { return mul(mvp, v); }",
        );
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
    }
}
