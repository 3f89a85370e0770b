use crate::{
    ast::{
        Ast, Attr, Attrs, Expr, ExprVisitor, Field, FunDecl, Id, Item, Name, Stmt, StmtVisitor,
        TextureDim,
    },
    error::{CinderError, ScopeErrorKind, StageContractErrorKind, SyntaxErrorKind},
    lexer::Token,
    types::{builtin, Semantic, StructMember, StructType, Type, TypeId, TypeTable},
};
use lasso::{RodeoReader, Spur};
use std::collections::HashMap;

/// Two-pass symbol resolution. Pass 1 registers every top-level name so
/// forward references resolve; pass 2 walks function bodies and binds each
/// identifier occurrence to a symbol.
pub fn visit(ast: &mut Ast) -> (SymbolTable, TypeTable) {
    let mut types = TypeTable::new();
    let mut nr = NameResolution {
        table: SymbolTable::default(),
        scopes: ScopeArena::new(),
        struct_decls: HashMap::new(),
        types: &mut types,
        rodeo: &ast.rodeo,
        spans: &ast.spans,
        errors: &mut ast.errors,
    };

    nr.register_builtin_type_names();
    nr.register_items(&ast.items);
    nr.check_struct_cycles(&ast.items);
    for item in &ast.items {
        if let Item::Fun(fun) = item {
            nr.visit_fun_body(fun);
        }
    }

    (nr.table, types)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Function parameters and block locals.
    Local,
    /// A cbuffer field, addressed as a bare global identifier.
    UniformMember { buffer: ResourceId, member: usize },
    /// A texture or sampler global.
    Resource(ResourceId),
}

#[derive(Debug, Clone, Copy)]
pub struct Symbol {
    pub name: Spur,
    pub kind: SymbolKind,
    pub ty: TypeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    CBuffer,
    Texture(TextureDim),
    Sampler,
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub name: Spur,
    pub decl_id: Id,
    pub kind: ResourceKind,
    pub ty: TypeId,
    pub explicit_binding: Option<u32>,
    pub explicit_set: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Vertex,
    Fragment,
    Compute,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::Fragment => "fragment",
            Stage::Compute => "compute",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunInfo {
    pub name: Spur,
    pub decl_id: Id,
    pub item_index: usize,
    pub params: Vec<TypeId>,
    pub ret: TypeId,
    pub stage: Option<Stage>,
    pub workgroup_size: Option<[u32; 3]>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    uses: HashMap<Id, SymbolId>,
    pub resources: Vec<Resource>,
    pub functions: Vec<FunInfo>,
    type_names: HashMap<Spur, TypeId>,
}

impl SymbolTable {
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    /// The symbol an identifier occurrence resolved to.
    pub fn use_of(&self, id: Id) -> Option<SymbolId> {
        self.uses.get(&id).copied()
    }

    pub fn resource(&self, id: ResourceId) -> &Resource {
        &self.resources[id.0]
    }

    pub fn function(&self, id: FunId) -> &FunInfo {
        &self.functions[id.0]
    }

    pub fn function_named(&self, name: Spur) -> Option<FunId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FunId)
    }

    pub fn type_named(&self, name: Spur) -> Option<TypeId> {
        self.type_names.get(&name).copied()
    }

    fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        self.symbols.push(symbol);
        SymbolId(self.symbols.len() - 1)
    }
}

/// Scopes live in an arena indexed by handle, each holding a parent index;
/// resolution walks outward through enclosing scopes, innermost first.
struct ScopeArena {
    scopes: Vec<Scope>,
    current: usize,
}

struct Scope {
    parent: Option<usize>,
    symbols: HashMap<Spur, SymbolId>,
}

impl ScopeArena {
    fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                symbols: HashMap::new(),
            }],
            current: 0,
        }
    }

    fn push(&mut self) {
        self.scopes.push(Scope {
            parent: Some(self.current),
            symbols: HashMap::new(),
        });
        self.current = self.scopes.len() - 1;
    }

    fn pop(&mut self) {
        self.current = self.scopes[self.current]
            .parent
            .expect("popped the file scope");
    }

    fn insert(&mut self, name: Spur, id: SymbolId) {
        self.scopes[self.current].symbols.insert(name, id);
    }

    fn find(&self, name: Spur) -> Option<SymbolId> {
        let mut index = Some(self.current);
        while let Some(i) = index {
            if let Some(id) = self.scopes[i].symbols.get(&name) {
                return Some(*id);
            }
            index = self.scopes[i].parent;
        }
        None
    }

    fn find_in_file_scope(&self, name: Spur) -> Option<SymbolId> {
        self.scopes[0].symbols.get(&name).copied()
    }
}

struct NameResolution<'ast> {
    table: SymbolTable,
    scopes: ScopeArena,
    /// Struct declaration occurrence (name id) -> registered type.
    struct_decls: HashMap<Id, TypeId>,
    types: &'ast mut TypeTable,
    rodeo: &'ast RodeoReader,
    spans: &'ast crate::parser::spans_table::SpanTable,
    errors: &'ast mut Vec<CinderError>,
}

impl NameResolution<'_> {
    fn register_builtin_type_names(&mut self) {
        use builtin::*;
        let pairs: &[(&str, TypeId)] = &[
            ("bool", BOOL_ID),
            ("int", INT_ID),
            ("uint", UINT_ID),
            ("float", FLOAT_ID),
            ("bool2", BVEC_ID[2]),
            ("bool3", BVEC_ID[3]),
            ("bool4", BVEC_ID[4]),
            ("int2", IVEC_ID[2]),
            ("int3", IVEC_ID[3]),
            ("int4", IVEC_ID[4]),
            ("uint2", UVEC_ID[2]),
            ("uint3", UVEC_ID[3]),
            ("uint4", UVEC_ID[4]),
            ("float2", FVEC_ID[2]),
            ("float3", FVEC_ID[3]),
            ("float4", FVEC_ID[4]),
            ("float2x2", MAT2_ID),
            ("float3x3", MAT3_ID),
            ("float4x4", MAT4_ID),
        ];
        for (name, id) in pairs {
            if let Some(spur) = self.rodeo.get(name) {
                self.table.type_names.insert(spur, *id);
            }
        }
    }

    fn register_items(&mut self, items: &[Item]) {
        // Struct names first so fields may reference structs declared later.
        for item in items {
            if let Item::Struct { name, .. } = item {
                if self.table.type_names.contains_key(&name.spur) {
                    self.duplicate(*name);
                    continue;
                }
                let id = self.types.register_struct(StructType {
                    name: name.spur,
                    members: vec![],
                });
                self.table.type_names.insert(name.spur, id);
                self.struct_decls.insert(name.id, id);
            }
        }

        for (index, item) in items.iter().enumerate() {
            match item {
                Item::Struct { name, fields, .. } => self.fill_struct(*name, fields),
                Item::CBuffer {
                    attrs,
                    name,
                    fields,
                    cbuffer_id,
                } => self.register_cbuffer(*cbuffer_id, attrs, *name, fields),
                Item::Texture {
                    decl_id,
                    attrs,
                    dim,
                    name,
                } => self.register_resource(
                    *decl_id,
                    attrs,
                    *name,
                    ResourceKind::Texture(*dim),
                    texture_type_id(*dim),
                ),
                Item::Sampler {
                    decl_id,
                    attrs,
                    name,
                } => self.register_resource(
                    *decl_id,
                    attrs,
                    *name,
                    ResourceKind::Sampler,
                    builtin::SAMPLER_ID,
                ),
                Item::Fun(fun) => self.register_fun(index, fun),
                Item::Error(_) => {}
            }
        }

    }

    fn duplicate(&mut self, name: Name) {
        self.errors.push(CinderError::ScopeError(
            ScopeErrorKind::DuplicateDeclaration(self.rodeo.resolve(&name.spur).to_string()),
            self.spans[name.id].clone(),
        ));
    }

    fn resolve_type_name(&mut self, name: Name) -> TypeId {
        match self.table.type_names.get(&name.spur) {
            Some(id) => *id,
            None => {
                self.errors.push(CinderError::ScopeError(
                    ScopeErrorKind::UndeclaredType(self.rodeo.resolve(&name.spur).to_string()),
                    self.spans[name.id].clone(),
                ));
                builtin::ERROR_ID
            }
        }
    }

    fn resolve_field_type(&mut self, field: &Field) -> TypeId {
        let base = self.resolve_type_name(field.ty);
        match field.array {
            Some((_, len)) if base != builtin::ERROR_ID => {
                self.types.intern(Type::Array(base, len))
            }
            _ => base,
        }
    }

    fn resolve_semantic(&mut self, name: Name) -> Option<Semantic> {
        let text = self.rodeo.resolve(&name.spur);
        match Semantic::parse(text) {
            Some(semantic) => Some(semantic),
            None => {
                self.errors.push(CinderError::StageContractError(
                    StageContractErrorKind::UnknownSemantic(text.to_string()),
                    self.spans[name.id].clone(),
                ));
                None
            }
        }
    }

    fn build_members(&mut self, fields: &[Field], with_semantics: bool) -> Vec<StructMember> {
        fields
            .iter()
            .map(|field| {
                let ty = self.resolve_field_type(field);
                let semantic = match (with_semantics, field.semantic) {
                    (true, Some(name)) => self.resolve_semantic(name),
                    _ => None,
                };
                StructMember {
                    name: field.name.spur,
                    ty,
                    semantic,
                }
            })
            .collect()
    }

    fn fill_struct(&mut self, name: Name, fields: &[Field]) {
        let id = match self.struct_decls.get(&name.id) {
            Some(id) => *id,
            // Duplicate declaration, already reported.
            None => return,
        };
        let members = self.build_members(fields, true);
        self.types.set_struct_members(id, members);
    }

    fn check_struct_cycles(&mut self, items: &[Item]) {
        for item in items {
            let name = match item {
                Item::Struct { name, .. } => *name,
                _ => continue,
            };
            let id = match self.struct_decls.get(&name.id) {
                Some(id) => *id,
                None => continue,
            };
            if self.struct_reaches(id, id, 0) {
                self.errors.push(CinderError::ScopeError(
                    ScopeErrorKind::RecursiveStruct(self.rodeo.resolve(&name.spur).to_string()),
                    self.spans[name.id].clone(),
                ));
                self.types.set_struct_members(id, vec![]);
            }
        }
    }

    fn struct_reaches(&self, needle: TypeId, haystack: TypeId, depth: u32) -> bool {
        if depth > 64 {
            return true;
        }
        let members = match self.types.get(haystack) {
            Type::Struct(strukt) => strukt.members.clone(),
            Type::Array(elem, _) => return self.struct_reaches(needle, *elem, depth + 1),
            _ => return false,
        };
        members
            .iter()
            .any(|m| m.ty == needle || self.struct_reaches(needle, m.ty, depth + 1))
    }

    fn register_cbuffer(&mut self, cbuffer_id: Id, attrs: &Attrs, name: Name, fields: &[Field]) {
        let members = self.build_members(fields, false);
        let ty = self.types.register_struct(StructType {
            name: name.spur,
            members: members.clone(),
        });

        let (explicit_binding, explicit_set) = self.binding_attrs(attrs);
        let buffer = ResourceId(self.table.resources.len());
        self.table.resources.push(Resource {
            name: name.spur,
            decl_id: cbuffer_id,
            kind: ResourceKind::CBuffer,
            ty,
            explicit_binding,
            explicit_set,
        });

        // Each field becomes a file-scope symbol, HLSL style.
        for (index, member) in members.iter().enumerate() {
            if self.scopes.find_in_file_scope(member.name).is_some() {
                self.duplicate(fields[index].name);
                continue;
            }
            let symbol = self.table.add_symbol(Symbol {
                name: member.name,
                kind: SymbolKind::UniformMember {
                    buffer,
                    member: index,
                },
                ty: member.ty,
            });
            self.scopes.insert(member.name, symbol);
            self.table.uses.insert(fields[index].name.id, symbol);
        }
    }

    fn register_resource(
        &mut self,
        decl_id: Id,
        attrs: &Attrs,
        name: Name,
        kind: ResourceKind,
        ty: TypeId,
    ) {
        if self.scopes.find_in_file_scope(name.spur).is_some() {
            self.duplicate(name);
            return;
        }

        let (explicit_binding, explicit_set) = self.binding_attrs(attrs);
        let resource = ResourceId(self.table.resources.len());
        self.table.resources.push(Resource {
            name: name.spur,
            decl_id,
            kind,
            ty,
            explicit_binding,
            explicit_set,
        });

        let symbol = self.table.add_symbol(Symbol {
            name: name.spur,
            kind: SymbolKind::Resource(resource),
            ty,
        });
        self.scopes.insert(name.spur, symbol);
        self.table.uses.insert(name.id, symbol);
    }

    fn register_fun(&mut self, item_index: usize, fun: &FunDecl) {
        if self.table.function_named(fun.name.spur).is_some() {
            self.duplicate(fun.name);
            return;
        }

        let ret = match fun.ret {
            Some(name) => self.resolve_type_name(name),
            None => builtin::VOID_ID,
        };
        let params = fun
            .params
            .iter()
            .map(|p| self.resolve_type_name(p.ty))
            .collect();

        let (stage, workgroup_size) = self.stage_attrs(&fun.attrs);

        self.table.functions.push(FunInfo {
            name: fun.name.spur,
            decl_id: fun.fun_id,
            item_index,
            params,
            ret,
            stage,
            workgroup_size,
        });
    }

    /// Reads `#[binding(n)]` / `#[set(n)]` off a resource declaration.
    fn binding_attrs(&mut self, attrs: &Attrs) -> (Option<u32>, Option<u32>) {
        let mut binding = None;
        let mut set = None;

        if let Attrs::Ok(_, list) = attrs {
            for attr in list {
                let name = self.rodeo.resolve(&attr.0.spur);
                match name {
                    "binding" => binding = self.attr_int_arg(attr),
                    "set" => set = self.attr_int_arg(attr),
                    _ => self.unknown_attr(attr),
                }
            }
        }

        (binding, set)
    }

    fn stage_attrs(&mut self, attrs: &Attrs) -> (Option<Stage>, Option<[u32; 3]>) {
        let mut stage = None;
        let mut workgroup = None;

        if let Attrs::Ok(_, list) = attrs {
            for attr in list {
                let name = self.rodeo.resolve(&attr.0.spur);
                match name {
                    "vertex" => stage = Some(Stage::Vertex),
                    "fragment" => stage = Some(Stage::Fragment),
                    "compute" => {
                        stage = Some(Stage::Compute);
                        workgroup = self.attr_workgroup_args(attr);
                    }
                    _ => self.unknown_attr(attr),
                }
            }
        }

        (stage, workgroup)
    }

    fn unknown_attr(&mut self, attr: &Attr) {
        self.errors.push(CinderError::SyntaxError(
            SyntaxErrorKind::MalformedAttribute(format!(
                "unknown attribute '{}'",
                self.rodeo.resolve(&attr.0.spur)
            )),
            self.spans[attr.0.id].clone(),
        ));
    }

    fn attr_int_arg(&mut self, attr: &Attr) -> Option<u32> {
        match attr.1[..] {
            [_, (_, Token::Int(n)), _] if n >= 0 => Some(n as u32),
            _ => {
                self.errors.push(CinderError::SyntaxError(
                    SyntaxErrorKind::MalformedAttribute(format!(
                        "'{}' expects one non-negative integer argument",
                        self.rodeo.resolve(&attr.0.spur)
                    )),
                    self.spans[attr.0.id].clone(),
                ));
                None
            }
        }
    }

    fn attr_workgroup_args(&mut self, attr: &Attr) -> Option<[u32; 3]> {
        match attr.1[..] {
            [_, (_, Token::Int(x)), (_, Token::Comma), (_, Token::Int(y)), (_, Token::Comma), (_, Token::Int(z)), _]
                if x > 0 && y > 0 && z > 0 =>
            {
                Some([x as u32, y as u32, z as u32])
            }
            [] => None,
            _ => {
                self.errors.push(CinderError::SyntaxError(
                    SyntaxErrorKind::MalformedAttribute(
                        "'compute' expects three positive integers: #[compute(x, y, z)]"
                            .to_string(),
                    ),
                    self.spans[attr.0.id].clone(),
                ));
                None
            }
        }
    }

    fn visit_fun_body(&mut self, fun: &FunDecl) {
        self.scopes.push();
        for param in &fun.params {
            let ty = match self.table.type_names.get(&param.ty.spur) {
                Some(id) => *id,
                // Already reported during registration.
                None => builtin::ERROR_ID,
            };
            let symbol = self.table.add_symbol(Symbol {
                name: param.name.spur,
                kind: SymbolKind::Local,
                ty,
            });
            self.scopes.insert(param.name.spur, symbol);
            self.table.uses.insert(param.name.id, symbol);
        }
        self.visit_stmt(&fun.body);
        self.scopes.pop();
    }
}

fn texture_type_id(dim: TextureDim) -> TypeId {
    match dim {
        TextureDim::Two => builtin::TEX2D_ID,
        TextureDim::Three => builtin::TEX3D_ID,
        TextureDim::Cube => builtin::TEXCUBE_ID,
    }
}

impl StmtVisitor for NameResolution<'_> {
    type Out = ();

    fn block(&mut self, _id: Id, stmts: &[Stmt]) -> Self::Out {
        self.scopes.push();
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn local_var(&mut self, var: &crate::ast::LocalVar) -> Self::Out {
        if let Some(init) = &var.init {
            self.visit_expr(init);
        }

        let base = self.resolve_type_name(var.ty);
        let ty = match var.array {
            Some((_, len)) if base != builtin::ERROR_ID => {
                self.types.intern(Type::Array(base, len))
            }
            _ => base,
        };

        let symbol = self.table.add_symbol(Symbol {
            name: var.name.spur,
            kind: SymbolKind::Local,
            ty,
        });
        self.scopes.insert(var.name.spur, symbol);
        self.table.uses.insert(var.name.id, symbol);
    }

    fn assign(
        &mut self,
        _eq_id: Id,
        _op: Option<crate::ast::BinOpKind>,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Self::Out {
        self.visit_expr(lhs);
        self.visit_expr(rhs);
    }

    fn if_stmt(
        &mut self,
        _if_id: Id,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<(Id, &Stmt)>,
    ) -> Self::Out {
        self.visit_expr(cond);
        self.scopes.push();
        self.visit_stmt(then_branch);
        self.scopes.pop();
        if let Some((_, stmt)) = else_branch {
            self.scopes.push();
            self.visit_stmt(stmt);
            self.scopes.pop();
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
        // The induction variable lives in its own scope wrapping the body.
        self.scopes.push();
        self.visit_stmt(init);
        self.visit_expr(cond);
        self.visit_stmt(step);
        self.visit_stmt(body);
        self.scopes.pop();
    }

    fn ret(&mut self, _id: Id, expr: Option<&Expr>) -> Self::Out {
        if let Some(expr) = expr {
            self.visit_expr(expr);
        }
    }

    fn expr_stmt(&mut self, expr: &Expr) -> Self::Out {
        self.visit_expr(expr);
    }

    fn stmt_error(&mut self, _id: Id) -> Self::Out {}
}

impl ExprVisitor for NameResolution<'_> {
    type Out = ();

    fn binary(
        &mut self,
        _id: Id,
        _kind: crate::ast::BinOpKind,
        left: &Expr,
        right: &Expr,
    ) -> Self::Out {
        self.visit_expr(left);
        self.visit_expr(right);
    }

    fn unary(&mut self, _id: Id, _kind: crate::ast::UnOpKind, operand: &Expr) -> Self::Out {
        self.visit_expr(operand);
    }

    fn int(&mut self, _id: Id, _i: i32) -> Self::Out {}
    fn float(&mut self, _id: Id, _f: f32) -> Self::Out {}
    fn boolean(&mut self, _id: Id, _b: bool) -> Self::Out {}

    fn identifier(&mut self, name: Name) -> Self::Out {
        match self.scopes.find(name.spur) {
            Some(symbol) => {
                self.table.uses.insert(name.id, symbol);
            }
            None => {
                self.errors.push(CinderError::ScopeError(
                    ScopeErrorKind::UndeclaredIdentifier(
                        self.rodeo.resolve(&name.spur).to_string(),
                    ),
                    self.spans[name.id].clone(),
                ));
                // Declare it with an error type so one typo reports once.
                let symbol = self.table.add_symbol(Symbol {
                    name: name.spur,
                    kind: SymbolKind::Local,
                    ty: builtin::ERROR_ID,
                });
                self.scopes.insert(name.spur, symbol);
                self.table.uses.insert(name.id, symbol);
            }
        }
    }

    fn call(&mut self, _id: Id, _name: Name, args: &[Expr]) -> Self::Out {
        // Callee resolution happens during type resolution, where user
        // functions, constructors and intrinsics are all visible.
        for arg in args {
            self.visit_expr(arg);
        }
    }

    fn member(&mut self, _id: Id, expr: &Expr, _member: Name) -> Self::Out {
        self.visit_expr(expr);
    }

    fn index(&mut self, _id: Id, expr: &Expr, index: &Expr) -> Self::Out {
        self.visit_expr(expr);
        self.visit_expr(index);
    }

    fn expr_error(&mut self, _id: Id) -> Self::Out {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};

    fn resolve(src: &str) -> (Ast, SymbolTable, TypeTable) {
        let mut ast = parser::parse(lexer::lex(src));
        let (symbols, types) = visit(&mut ast);
        (ast, symbols, types)
    }

    #[test]
    fn forward_reference_between_structs() {
        let (ast, _, _) =
            resolve("struct A { B inner; }\nstruct B { float x; }\nvoid f() { }");
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
    }

    #[test]
    fn recursive_struct_is_reported() {
        let (ast, _, _) = resolve("struct A { A inner; }");
        assert!(ast
            .errors
            .iter()
            .any(|e| matches!(
                e,
                CinderError::ScopeError(ScopeErrorKind::RecursiveStruct(_), _)
            )));
    }

    #[test]
    fn cbuffer_fields_are_global_symbols() {
        let (ast, _, _) = resolve("cbuffer P { float4 tint; }\nfloat4 f() { return tint; }");
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
    }

    #[test]
    fn shadowing_resolves_innermost_first() {
        let src = "void f() { float x = 1.0; { float x = 2.0; float y = x; } }";
        let (ast, symbols, _) = resolve(src);
        assert!(ast.errors.is_empty());
        // Three locals were declared; the read of `x` resolves to the inner one.
        let distinct: std::collections::HashSet<_> = symbols.uses.values().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn undeclared_identifier_is_reported_once() {
        let (ast, _, _) = resolve("void f() { float a = ghost; float b = ghost; }");
        let count = ast
            .errors
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    CinderError::ScopeError(ScopeErrorKind::UndeclaredIdentifier(_), _)
                )
            })
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn stage_and_binding_attributes() {
        let src = "#[set(1), binding(3)]\nTexture2D albedo;\n#[compute(8, 8, 1)]\nvoid main(uint3 id : SV_DispatchThreadID) { }";
        let (ast, symbols, _) = resolve(src);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        assert_eq!(symbols.resources[0].explicit_binding, Some(3));
        assert_eq!(symbols.resources[0].explicit_set, Some(1));
        assert_eq!(symbols.functions[0].stage, Some(Stage::Compute));
        assert_eq!(symbols.functions[0].workgroup_size, Some([8, 8, 1]));
    }

    #[test]
    fn duplicate_global_is_reported() {
        let (ast, _, _) = resolve("Texture2D a;\nTexture2D a;");
        assert!(ast.errors.iter().any(|e| matches!(
            e,
            CinderError::ScopeError(ScopeErrorKind::DuplicateDeclaration(_), _)
        )));
    }
}
