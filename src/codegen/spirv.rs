//! SPIR-V backend built on `rspirv`'s data-representation builder. One
//! module carries every entry point; each entry gets a `void main` wrapper
//! that moves values between IO variables and the user function, which is
//! emitted as a plain callable function.
//!
//! Binding model: uniform buffers in descriptor set 0, combined
//! texture-samplers in set 1. Standalone samplers have no presence here;
//! `sample(t, s, uv)` loads the combined image for `t`.

use super::{Context, GeneratedCode, TargetOutput};
use crate::{
    ast::{
        BinOpKind, Expr, ExprVisitor, Id, Item, LocalVar, Name, Param, Stmt, StmtVisitor,
        TextureDim, UnOpKind,
    },
    binding::BindingTable,
    error::CinderError,
    name_resolution::{FunId, ResourceId, ResourceKind, Stage, SymbolId, SymbolKind, SymbolTable},
    type_resolution::{intrinsics::Intrinsic, CallTarget, MemberRef, TypeResolution},
    types::{builtin, ScalarKind, Semantic, Type, TypeId, TypeTable},
};
use rspirv::{
    dr::{self, Builder},
    spirv::{self, StorageClass},
};
use std::collections::{BTreeSet, HashMap};

// GLSL.std.450 extended instruction numbers.
const GLSL_FABS: u32 = 4;
const GLSL_SABS: u32 = 5;
const GLSL_FLOOR: u32 = 8;
const GLSL_FRACT: u32 = 10;
const GLSL_POW: u32 = 26;
const GLSL_SQRT: u32 = 31;
const GLSL_INVERSE_SQRT: u32 = 32;
const GLSL_FMIN: u32 = 37;
const GLSL_UMIN: u32 = 38;
const GLSL_SMIN: u32 = 39;
const GLSL_FMAX: u32 = 40;
const GLSL_UMAX: u32 = 41;
const GLSL_SMAX: u32 = 42;
const GLSL_FCLAMP: u32 = 43;
const GLSL_FMIX: u32 = 46;
const GLSL_LENGTH: u32 = 66;
const GLSL_CROSS: u32 = 68;
const GLSL_NORMALIZE: u32 = 69;

pub fn generate(
    ast: &crate::ast::Ast,
    symbols: &SymbolTable,
    types: &TypeTable,
    resolution: &TypeResolution,
    table: &BindingTable,
) -> Result<TargetOutput, CinderError> {
    let cx = Context {
        ast,
        symbols,
        types,
        resolution,
    };

    let mut gen = SpirvGen {
        cx,
        table,
        code: Builder::new(),
        glsl: 0,
        type_cache: HashMap::new(),
        uniform_vars: HashMap::new(),
        combined_vars: HashMap::new(),
        fun_ids: HashMap::new(),
        locals: HashMap::new(),
        terminated: false,
    };

    gen.code.set_version(1, 3);
    gen.code.capability(spirv::Capability::Shader);
    gen.glsl = gen.code.ext_inst_import("GLSL.std.450");
    gen.code
        .memory_model(spirv::AddressingModel::Logical, spirv::MemoryModel::GLSL450);

    gen.declare_resources()?;

    let reachable = gen.reachable_functions();
    for fun in &reachable {
        let id = gen.code.id();
        gen.fun_ids.insert(*fun, id);
    }
    for fun in &reachable {
        gen.write_function(*fun)?;
    }

    for (index, info) in symbols.functions.iter().enumerate() {
        if info.stage.is_some() {
            gen.write_entry(FunId(index))?;
        }
    }

    let module = gen.code.module();
    use rspirv::binary::Assemble;
    Ok(TargetOutput {
        code: GeneratedCode::Words(module.assemble()),
        manifest: table.manifest(symbols, &ast.rodeo),
    })
}

fn be(err: dr::Error) -> CinderError {
    CinderError::InternalError(format!("spirv builder error: {}", err))
}

struct SpirvGen<'a> {
    cx: Context<'a>,
    table: &'a BindingTable,
    code: Builder,
    glsl: u32,
    type_cache: HashMap<TypeId, u32>,
    uniform_vars: HashMap<ResourceId, u32>,
    combined_vars: HashMap<ResourceId, u32>,
    fun_ids: HashMap<FunId, u32>,
    locals: HashMap<SymbolId, (u32, TypeId)>,
    terminated: bool,
}

/// A pointer to a place plus the type behind it.
#[derive(Clone, Copy)]
struct Place {
    ptr: u32,
    ty: TypeId,
    storage: StorageClass,
}

impl SpirvGen<'_> {
    fn internal(&self, what: &str) -> CinderError {
        CinderError::InternalError(format!("spirv backend reached an unexpected {}", what))
    }

    fn node_ty(&self, id: Id) -> TypeId {
        self.cx.resolution.nodes[id]
    }

    fn scalar_kind(&self, ty: TypeId) -> ScalarKind {
        self.cx
            .types
            .scalar_kind(ty)
            .unwrap_or(ScalarKind::Float)
    }

    fn spirv_type(&mut self, ty: TypeId) -> u32 {
        if let Some(id) = self.type_cache.get(&ty) {
            return *id;
        }
        let spirv_id = match self.cx.types.get(ty).clone() {
            Type::Error => 0,
            Type::Void => self.code.type_void(),
            Type::Scalar(ScalarKind::Bool) => self.code.type_bool(),
            Type::Scalar(ScalarKind::Int) => self.code.type_int(32, 1),
            Type::Scalar(ScalarKind::UInt) => self.code.type_int(32, 0),
            Type::Scalar(ScalarKind::Float) => self.code.type_float(32),
            Type::Vector(kind, n) => {
                let component = self.spirv_type(TypeTable::scalar(kind));
                self.code.type_vector(component, n as u32)
            }
            Type::Matrix { cols, rows } => {
                let column = self.spirv_type(TypeTable::vector(ScalarKind::Float, rows));
                self.code.type_matrix(column, cols as u32)
            }
            Type::Struct(strukt) => {
                let members: Vec<u32> =
                    strukt.members.iter().map(|m| self.spirv_type(m.ty)).collect();
                self.code.type_struct(members)
            }
            Type::Array(elem, len) => {
                let elem_id = self.spirv_type(elem);
                let uint = self.spirv_type(builtin::UINT_ID);
                let len_id = self.code.constant_u32(uint, len);
                self.code.type_array(elem_id, len_id)
            }
            Type::Texture(dim) => {
                let float = self.spirv_type(builtin::FLOAT_ID);
                let dim = match dim {
                    TextureDim::Two => spirv::Dim::Dim2D,
                    TextureDim::Three => spirv::Dim::Dim3D,
                    TextureDim::Cube => spirv::Dim::DimCube,
                };
                let image = self.code.type_image(
                    float,
                    dim,
                    0,
                    0,
                    0,
                    1,
                    spirv::ImageFormat::Unknown,
                    None,
                );
                self.code.type_sampled_image(image)
            }
            Type::Sampler => self.code.type_sampler(),
        };
        self.type_cache.insert(ty, spirv_id);
        spirv_id
    }

    fn pointer(&mut self, storage: StorageClass, ty: TypeId) -> u32 {
        let pointee = self.spirv_type(ty);
        self.code.type_pointer(None, storage, pointee)
    }

    fn const_u32(&mut self, value: u32) -> u32 {
        let uint = self.spirv_type(builtin::UINT_ID);
        self.code.constant_u32(uint, value)
    }

    /// Declares uniform-buffer and combined texture-sampler variables with
    /// descriptor-set and binding decorations from the binding table.
    fn declare_resources(&mut self) -> Result<(), CinderError> {
        for entry in &self.table.entries {
            let resource = self.cx.symbols.resource(entry.resource);
            match resource.kind {
                ResourceKind::CBuffer => {
                    let struct_id = self.uniform_struct_type(resource.ty)?;
                    let ptr = self.code.type_pointer(None, StorageClass::Uniform, struct_id);
                    let var = self.code.variable(ptr, None, StorageClass::Uniform, None);
                    self.decorate_binding(var, entry.set, entry.slot);
                    self.uniform_vars.insert(entry.resource, var);
                }
                ResourceKind::Texture(_) => {
                    let ptr = self.pointer(StorageClass::UniformConstant, resource.ty);
                    let var = self
                        .code
                        .variable(ptr, None, StorageClass::UniformConstant, None);
                    self.decorate_binding(var, entry.set, entry.slot);
                    self.combined_vars.insert(entry.resource, var);
                }
                ResourceKind::Sampler => {}
            }
        }
        Ok(())
    }

    fn decorate_binding(&mut self, var: u32, set: Option<u32>, slot: u32) {
        self.code.decorate(
            var,
            spirv::Decoration::DescriptorSet,
            &[dr::Operand::LiteralInt32(set.unwrap_or(0))],
        );
        self.code.decorate(
            var,
            spirv::Decoration::Binding,
            &[dr::Operand::LiteralInt32(slot)],
        );
    }

    /// A `Block`-decorated struct with std140 offsets for uniform storage.
    fn uniform_struct_type(&mut self, ty: TypeId) -> Result<u32, CinderError> {
        let strukt = match self.cx.types.get(ty) {
            Type::Struct(strukt) => strukt.clone(),
            _ => return Err(self.internal("uniform buffer without struct type")),
        };
        let struct_id = self.spirv_type(ty);
        self.code.decorate(struct_id, spirv::Decoration::Block, []);

        let (offsets, _) = self.cx.types.member_offsets(&strukt);
        for (index, (member, offset)) in strukt.members.iter().zip(offsets.iter()).enumerate() {
            self.code.member_decorate(
                struct_id,
                index as u32,
                spirv::Decoration::Offset,
                &[dr::Operand::LiteralInt32(*offset)],
            );
            let mut member_ty = member.ty;
            if let Type::Array(elem, _) = self.cx.types.get(member_ty) {
                let elem = *elem;
                let elem_size = self.cx.types.layout(elem).0;
                let stride = ((elem_size + 15) / 16) * 16;
                let array_id = self.spirv_type(member_ty);
                self.code.decorate(
                    array_id,
                    spirv::Decoration::ArrayStride,
                    &[dr::Operand::LiteralInt32(stride)],
                );
                member_ty = elem;
            }
            if matches!(self.cx.types.get(member_ty), Type::Matrix { .. }) {
                self.code.member_decorate(
                    struct_id,
                    index as u32,
                    spirv::Decoration::ColMajor,
                    [],
                );
                self.code.member_decorate(
                    struct_id,
                    index as u32,
                    spirv::Decoration::MatrixStride,
                    &[dr::Operand::LiteralInt32(16)],
                );
            }
        }
        Ok(struct_id)
    }

    /// Functions reachable from any entry point, in declaration order.
    fn reachable_functions(&self) -> Vec<FunId> {
        let mut calls_of: Vec<BTreeSet<FunId>> = vec![];
        for info in &self.cx.symbols.functions {
            let mut collector = CallCollector {
                resolution: self.cx.resolution,
                calls: BTreeSet::new(),
            };
            if let Item::Fun(fun) = &self.cx.ast.items[info.item_index] {
                collector.visit_stmt(&fun.body);
            }
            calls_of.push(collector.calls);
        }

        let mut reachable = BTreeSet::new();
        let mut stack: Vec<FunId> = self
            .cx
            .symbols
            .functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.stage.is_some())
            .map(|(i, _)| FunId(i))
            .collect();
        while let Some(fun) = stack.pop() {
            if !reachable.insert(fun) {
                continue;
            }
            stack.extend(calls_of[fun.0].iter().copied());
        }

        let mut ordered: Vec<FunId> = reachable.into_iter().collect();
        ordered.sort_by_key(|f| f.0);
        ordered
    }

    fn write_function(&mut self, fun_id: FunId) -> Result<(), CinderError> {
        let info = self.cx.symbols.function(fun_id).clone();
        let fun = match &self.cx.ast.items[info.item_index] {
            Item::Fun(fun) => fun,
            _ => return Err(self.internal("function item")),
        };

        let ret = self.spirv_type(info.ret);
        let param_types: Vec<u32> = info.params.iter().map(|t| self.spirv_type(*t)).collect();
        let fn_type = self.code.type_function(ret, param_types.clone());

        let id = self.fun_ids[&fun_id];
        self.code
            .begin_function(ret, Some(id), spirv::FunctionControl::NONE, fn_type)
            .map_err(be)?;

        let mut param_values = vec![];
        for ty in &param_types {
            param_values.push(self.code.function_parameter(*ty).map_err(be)?);
        }

        self.code.begin_block(None).map_err(be)?;
        self.terminated = false;
        self.locals.clear();

        // Every local lives in a Function-storage variable declared in the
        // entry block; parameters are copied in so they stay assignable.
        for ((param, value), ty) in fun.params.iter().zip(param_values).zip(info.params.iter()) {
            let symbol = match self.cx.symbols.use_of(param.name.id) {
                Some(symbol) => symbol,
                None => continue,
            };
            let ptr_ty = self.pointer(StorageClass::Function, *ty);
            let var = self.code.variable(ptr_ty, None, StorageClass::Function, None);
            self.code.store(var, value, None, []).map_err(be)?;
            self.locals.insert(symbol, (var, *ty));
        }

        let mut decls = LocalCollector {
            symbols: self.cx.symbols,
            vars: vec![],
        };
        decls.visit_stmt(&fun.body);
        for (symbol, ty) in decls.vars {
            let ptr_ty = self.pointer(StorageClass::Function, ty);
            let var = self.code.variable(ptr_ty, None, StorageClass::Function, None);
            self.locals.insert(symbol, (var, ty));
        }

        self.write_stmt(&fun.body)?;

        if !self.terminated {
            if info.ret == builtin::VOID_ID {
                self.code.ret().map_err(be)?;
            } else {
                let ret_ty = self.spirv_type(info.ret);
                let undef = self.code.undef(ret_ty, None);
                self.code.ret_value(undef).map_err(be)?;
            }
        }
        self.code.end_function().map_err(be)?;
        Ok(())
    }

    // ---- statements ----

    fn write_stmt(&mut self, stmt: &Stmt) -> Result<(), CinderError> {
        match stmt {
            Stmt::Block(_, stmts) => {
                for stmt in stmts {
                    if self.terminated {
                        break;
                    }
                    self.write_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::LocalVar(var) => self.write_local(var),
            Stmt::Assign {
                op, lhs, rhs, ..
            } => self.write_assign(*op, lhs, rhs),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => self.write_if(cond, then_branch, else_branch.as_ref().map(|(_, s)| &**s)),
            Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => self.write_for(init, cond, step, body),
            Stmt::Return(_, expr) => {
                match expr {
                    Some(expr) => {
                        let value = self.expr(expr)?;
                        self.code.ret_value(value).map_err(be)?;
                    }
                    None => self.code.ret().map_err(be)?,
                }
                self.terminated = true;
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.expr(expr)?;
                Ok(())
            }
            Stmt::Error(_) => Err(self.internal("error statement")),
        }
    }

    fn write_local(&mut self, var: &LocalVar) -> Result<(), CinderError> {
        if let Some(init) = &var.init {
            let value = self.expr(init)?;
            let symbol = self
                .cx
                .symbols
                .use_of(var.name.id)
                .ok_or_else(|| self.internal("unresolved local"))?;
            let (ptr, _) = self.locals[&symbol];
            self.code.store(ptr, value, None, []).map_err(be)?;
        }
        Ok(())
    }

    fn write_assign(
        &mut self,
        op: Option<BinOpKind>,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<(), CinderError> {
        let mut value = self.expr(rhs)?;
        if let Some(op) = op {
            let current = self.expr(lhs)?;
            let ty = self.node_ty(lhs.get_id());
            value = self.binary_op(op, ty, ty, current, value)?;
        }

        // Multi-component swizzle stores merge into the full vector.
        if let Expr::Member(id, base, _) = lhs {
            if let Some(MemberRef::Swizzle(swizzle)) = self.cx.resolution.members.get(id) {
                if swizzle.len > 1 {
                    let swizzle = *swizzle;
                    let place = self
                        .place_pointer(base)?
                        .ok_or_else(|| self.internal("swizzle store on a non-place"))?;
                    let vec_ty = self.spirv_type(place.ty);
                    let old = self.code.load(vec_ty, None, place.ptr, None, []).map_err(be)?;
                    let arity = match self.cx.types.get(place.ty) {
                        Type::Vector(_, n) => *n,
                        _ => return Err(self.internal("swizzle store on a non-vector")),
                    };
                    let mut mapping = vec![];
                    for component in 0..arity {
                        let replaced = swizzle
                            .indices()
                            .iter()
                            .position(|i| *i == component);
                        match replaced {
                            Some(j) => mapping.push(arity as u32 + j as u32),
                            None => mapping.push(component as u32),
                        }
                    }
                    let merged = self
                        .code
                        .vector_shuffle(vec_ty, None, old, value, mapping)
                        .map_err(be)?;
                    self.code.store(place.ptr, merged, None, []).map_err(be)?;
                    return Ok(());
                }
            }
        }

        let place = self
            .place_pointer(lhs)?
            .ok_or_else(|| self.internal("assignment to a non-place"))?;
        self.code.store(place.ptr, value, None, []).map_err(be)?;
        Ok(())
    }

    fn write_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> Result<(), CinderError> {
        let cond_value = self.expr(cond)?;
        let then_label = self.code.id();
        let else_label = self.code.id();
        let merge_label = self.code.id();

        let else_target = if else_branch.is_some() {
            else_label
        } else {
            merge_label
        };

        self.code
            .selection_merge(merge_label, spirv::SelectionControl::NONE)
            .map_err(be)?;
        self.code
            .branch_conditional(cond_value, then_label, else_target, [])
            .map_err(be)?;

        self.code.begin_block(Some(then_label)).map_err(be)?;
        self.terminated = false;
        self.write_stmt(then_branch)?;
        if !self.terminated {
            self.code.branch(merge_label).map_err(be)?;
        }

        if let Some(else_branch) = else_branch {
            self.code.begin_block(Some(else_label)).map_err(be)?;
            self.terminated = false;
            self.write_stmt(else_branch)?;
            if !self.terminated {
                self.code.branch(merge_label).map_err(be)?;
            }
        }

        self.code.begin_block(Some(merge_label)).map_err(be)?;
        self.terminated = false;
        Ok(())
    }

    fn write_for(
        &mut self,
        init: &Stmt,
        cond: &Expr,
        step: &Stmt,
        body: &Stmt,
    ) -> Result<(), CinderError> {
        self.write_stmt(init)?;

        let header = self.code.id();
        let check = self.code.id();
        let body_label = self.code.id();
        let continue_label = self.code.id();
        let merge = self.code.id();

        self.code.branch(header).map_err(be)?;

        self.code.begin_block(Some(header)).map_err(be)?;
        self.code
            .loop_merge(merge, continue_label, spirv::LoopControl::NONE, [])
            .map_err(be)?;
        self.code.branch(check).map_err(be)?;

        self.code.begin_block(Some(check)).map_err(be)?;
        self.terminated = false;
        let cond_value = self.expr(cond)?;
        self.code
            .branch_conditional(cond_value, body_label, merge, [])
            .map_err(be)?;

        self.code.begin_block(Some(body_label)).map_err(be)?;
        self.terminated = false;
        self.write_stmt(body)?;
        if !self.terminated {
            self.code.branch(continue_label).map_err(be)?;
        }

        self.code.begin_block(Some(continue_label)).map_err(be)?;
        self.terminated = false;
        self.write_stmt(step)?;
        self.code.branch(header).map_err(be)?;

        self.code.begin_block(Some(merge)).map_err(be)?;
        self.terminated = false;
        Ok(())
    }

    // ---- places ----

    /// Builds an access chain for an assignable (or loadable) place, or
    /// `None` when the expression isn't one.
    fn place_pointer(&mut self, expr: &Expr) -> Result<Option<Place>, CinderError> {
        match expr {
            Expr::Identifier(name) => {
                let symbol_id = match self.cx.symbols.use_of(name.id) {
                    Some(id) => id,
                    None => return Ok(None),
                };
                let symbol = *self.cx.symbols.symbol(symbol_id);
                match symbol.kind {
                    SymbolKind::Local => match self.locals.get(&symbol_id) {
                        Some((ptr, ty)) => Ok(Some(Place {
                            ptr: *ptr,
                            ty: *ty,
                            storage: StorageClass::Function,
                        })),
                        None => Ok(None),
                    },
                    SymbolKind::UniformMember { buffer, member } => {
                        let var = match self.uniform_vars.get(&buffer) {
                            Some(var) => *var,
                            None => return Err(self.internal("unbound uniform buffer")),
                        };
                        let index = self.const_u32(member as u32);
                        let ptr_ty = self.pointer(StorageClass::Uniform, symbol.ty);
                        let ptr = self
                            .code
                            .access_chain(ptr_ty, None, var, [index])
                            .map_err(be)?;
                        Ok(Some(Place {
                            ptr,
                            ty: symbol.ty,
                            storage: StorageClass::Uniform,
                        }))
                    }
                    SymbolKind::Resource(_) => Ok(None),
                }
            }
            Expr::Member(id, base, _) => {
                let place = match self.place_pointer(base)? {
                    Some(place) => place,
                    None => return Ok(None),
                };
                match self.cx.resolution.members.get(id) {
                    Some(MemberRef::Field(index)) => {
                        let ty = self.node_ty(*id);
                        let index = self.const_u32(*index as u32);
                        let ptr_ty = self.pointer(place.storage, ty);
                        let ptr = self
                            .code
                            .access_chain(ptr_ty, None, place.ptr, [index])
                            .map_err(be)?;
                        Ok(Some(Place {
                            ptr,
                            ty,
                            storage: place.storage,
                        }))
                    }
                    Some(MemberRef::Swizzle(swizzle)) if swizzle.len == 1 => {
                        let ty = self.node_ty(*id);
                        let index = self.const_u32(swizzle.components[0] as u32);
                        let ptr_ty = self.pointer(place.storage, ty);
                        let ptr = self
                            .code
                            .access_chain(ptr_ty, None, place.ptr, [index])
                            .map_err(be)?;
                        Ok(Some(Place {
                            ptr,
                            ty,
                            storage: place.storage,
                        }))
                    }
                    _ => Ok(None),
                }
            }
            Expr::Index(id, base, index) => {
                let place = match self.place_pointer(base)? {
                    Some(place) => place,
                    None => return Ok(None),
                };
                let index_value = self.expr(index)?;
                let ty = self.node_ty(*id);
                let ptr_ty = self.pointer(place.storage, ty);
                let ptr = self
                    .code
                    .access_chain(ptr_ty, None, place.ptr, [index_value])
                    .map_err(be)?;
                Ok(Some(Place {
                    ptr,
                    ty,
                    storage: place.storage,
                }))
            }
            _ => Ok(None),
        }
    }

    // ---- expressions ----

    fn expr(&mut self, expr: &Expr) -> Result<u32, CinderError> {
        match expr {
            Expr::Int(id, value) => {
                let ty = self.node_ty(*id);
                let spirv_ty = self.spirv_type(ty);
                Ok(if ty == builtin::FLOAT_ID {
                    self.code.constant_f32(spirv_ty, *value as f32)
                } else {
                    self.code.constant_u32(spirv_ty, *value as u32)
                })
            }
            Expr::Float(id, value) => {
                let spirv_ty = self.spirv_type(self.node_ty(*id));
                Ok(self.code.constant_f32(spirv_ty, *value))
            }
            Expr::Bool(id, value) => {
                let spirv_ty = self.spirv_type(self.node_ty(*id));
                Ok(if *value {
                    self.code.constant_true(spirv_ty)
                } else {
                    self.code.constant_false(spirv_ty)
                })
            }
            Expr::Identifier(name) => {
                match self.place_pointer(expr)? {
                    Some(place) => {
                        let ty = self.spirv_type(place.ty);
                        self.code.load(ty, None, place.ptr, None, []).map_err(be)
                    }
                    None => Err(self.internal(&format!(
                        "identifier '{}' outside a loadable context",
                        self.cx.resolve(name.spur)
                    ))),
                }
            }
            Expr::Unary(id, kind, operand) => {
                let value = self.expr(operand)?;
                let ty = self.node_ty(*id);
                let spirv_ty = self.spirv_type(ty);
                match kind {
                    UnOpKind::Neg => match self.scalar_kind(ty) {
                        ScalarKind::Float => {
                            self.code.f_negate(spirv_ty, None, value).map_err(be)
                        }
                        _ => self.code.s_negate(spirv_ty, None, value).map_err(be),
                    },
                    UnOpKind::Not => self.code.logical_not(spirv_ty, None, value).map_err(be),
                }
            }
            Expr::Binary(id, kind, left, right) => {
                let lhs = self.expr(left)?;
                let rhs = self.expr(right)?;
                let operand_ty = self.node_ty(left.get_id());
                let rhs_ty = self.node_ty(right.get_id());
                if operand_ty != rhs_ty {
                    // vector * scalar
                    return self.vector_scalar_mul(*id, operand_ty, rhs_ty, lhs, rhs);
                }
                self.binary_op(*kind, operand_ty, self.node_ty(*id), lhs, rhs)
            }
            Expr::Member(id, base, _) => {
                if let Some(place) = self.place_pointer(expr)? {
                    let ty = self.spirv_type(place.ty);
                    return self.code.load(ty, None, place.ptr, None, []).map_err(be);
                }
                let base_value = self.expr(base)?;
                let ty = self.node_ty(*id);
                let spirv_ty = self.spirv_type(ty);
                match self.cx.resolution.members.get(id).copied() {
                    Some(MemberRef::Field(index)) => self
                        .code
                        .composite_extract(spirv_ty, None, base_value, [index as u32])
                        .map_err(be),
                    Some(MemberRef::Swizzle(swizzle)) => {
                        if swizzle.len == 1 {
                            self.code
                                .composite_extract(
                                    spirv_ty,
                                    None,
                                    base_value,
                                    [swizzle.components[0] as u32],
                                )
                                .map_err(be)
                        } else {
                            let components: Vec<u32> = swizzle
                                .indices()
                                .iter()
                                .map(|i| *i as u32)
                                .collect();
                            self.code
                                .vector_shuffle(
                                    spirv_ty,
                                    None,
                                    base_value,
                                    base_value,
                                    components,
                                )
                                .map_err(be)
                        }
                    }
                    None => Err(self.internal("unresolved member access")),
                }
            }
            Expr::Index(id, base, _) => {
                if let Some(place) = self.place_pointer(expr)? {
                    let ty = self.spirv_type(place.ty);
                    return self.code.load(ty, None, place.ptr, None, []).map_err(be);
                }
                // Index into a temporary: spill it to a variable first.
                let base_ty = self.node_ty(base.get_id());
                let base_value = self.expr(base)?;
                let ptr_ty = self.pointer(StorageClass::Function, base_ty);
                let var = self
                    .code
                    .variable(ptr_ty, None, StorageClass::Function, None);
                self.code.store(var, base_value, None, []).map_err(be)?;
                let index_value = match expr {
                    Expr::Index(_, _, index) => self.expr(index)?,
                    _ => unreachable!(),
                };
                let elem_ty = self.node_ty(*id);
                let elem_ptr_ty = self.pointer(StorageClass::Function, elem_ty);
                let ptr = self
                    .code
                    .access_chain(elem_ptr_ty, None, var, [index_value])
                    .map_err(be)?;
                let elem_spirv = self.spirv_type(elem_ty);
                self.code.load(elem_spirv, None, ptr, None, []).map_err(be)
            }
            Expr::Call(id, name, args) => self.call(*id, *name, args),
            Expr::Error(_) => Err(self.internal("error expression")),
        }
    }

    fn vector_scalar_mul(
        &mut self,
        id: Id,
        left_ty: TypeId,
        right_ty: TypeId,
        lhs: u32,
        rhs: u32,
    ) -> Result<u32, CinderError> {
        let result_ty = self.node_ty(id);
        let spirv_ty = self.spirv_type(result_ty);
        let (vector, scalar, scalar_ty) = match self.cx.types.get(left_ty) {
            Type::Vector(_, _) => (lhs, rhs, right_ty),
            _ => (rhs, lhs, left_ty),
        };
        match self.scalar_kind(scalar_ty) {
            ScalarKind::Float => self
                .code
                .vector_times_scalar(spirv_ty, None, vector, scalar)
                .map_err(be),
            _ => {
                let arity = match self.cx.types.get(result_ty) {
                    Type::Vector(_, n) => *n,
                    _ => return Err(self.internal("vector-scalar mul on a non-vector")),
                };
                let splat = self
                    .code
                    .composite_construct(spirv_ty, None, vec![scalar; arity as usize])
                    .map_err(be)?;
                self.code.i_mul(spirv_ty, None, vector, splat).map_err(be)
            }
        }
    }

    fn binary_op(
        &mut self,
        kind: BinOpKind,
        operand_ty: TypeId,
        result_ty: TypeId,
        lhs: u32,
        rhs: u32,
    ) -> Result<u32, CinderError> {
        use ScalarKind::*;
        let result = self.spirv_type(result_ty);
        let scalar = self.scalar_kind(operand_ty);
        let bool_ty = self.spirv_type(builtin::BOOL_ID);

        if matches!(kind, BinOpKind::Eq | BinOpKind::Neq) {
            return self.equality(kind, operand_ty, lhs, rhs);
        }

        let c = &mut self.code;
        let value = match (kind, scalar) {
            (BinOpKind::Add, Float) => c.f_add(result, None, lhs, rhs),
            (BinOpKind::Add, _) => c.i_add(result, None, lhs, rhs),
            (BinOpKind::Sub, Float) => c.f_sub(result, None, lhs, rhs),
            (BinOpKind::Sub, _) => c.i_sub(result, None, lhs, rhs),
            (BinOpKind::Mul, Float) => c.f_mul(result, None, lhs, rhs),
            (BinOpKind::Mul, _) => c.i_mul(result, None, lhs, rhs),
            (BinOpKind::Div, Float) => c.f_div(result, None, lhs, rhs),
            (BinOpKind::Div, UInt) => c.u_div(result, None, lhs, rhs),
            (BinOpKind::Div, _) => c.s_div(result, None, lhs, rhs),
            (BinOpKind::Rem, UInt) => c.u_mod(result, None, lhs, rhs),
            (BinOpKind::Rem, _) => c.s_rem(result, None, lhs, rhs),
            (BinOpKind::And, _) => c.logical_and(result, None, lhs, rhs),
            (BinOpKind::Or, _) => c.logical_or(result, None, lhs, rhs),
            (BinOpKind::Less, Float) => c.f_ord_less_than(bool_ty, None, lhs, rhs),
            (BinOpKind::Less, UInt) => c.u_less_than(bool_ty, None, lhs, rhs),
            (BinOpKind::Less, _) => c.s_less_than(bool_ty, None, lhs, rhs),
            (BinOpKind::LessEq, Float) => c.f_ord_less_than_equal(bool_ty, None, lhs, rhs),
            (BinOpKind::LessEq, UInt) => c.u_less_than_equal(bool_ty, None, lhs, rhs),
            (BinOpKind::LessEq, _) => c.s_less_than_equal(bool_ty, None, lhs, rhs),
            (BinOpKind::Greater, Float) => c.f_ord_greater_than(bool_ty, None, lhs, rhs),
            (BinOpKind::Greater, UInt) => c.u_greater_than(bool_ty, None, lhs, rhs),
            (BinOpKind::Greater, _) => c.s_greater_than(bool_ty, None, lhs, rhs),
            (BinOpKind::GreaterEq, Float) => {
                c.f_ord_greater_than_equal(bool_ty, None, lhs, rhs)
            }
            (BinOpKind::GreaterEq, UInt) => c.u_greater_than_equal(bool_ty, None, lhs, rhs),
            (BinOpKind::GreaterEq, _) => c.s_greater_than_equal(bool_ty, None, lhs, rhs),
            (BinOpKind::Eq, _) | (BinOpKind::Neq, _) => unreachable!("handled above"),
        };
        value.map_err(be)
    }

    /// `==`/`!=` over scalars and vectors; vector comparisons reduce with
    /// OpAll/OpAny.
    fn equality(
        &mut self,
        kind: BinOpKind,
        operand_ty: TypeId,
        lhs: u32,
        rhs: u32,
    ) -> Result<u32, CinderError> {
        let scalar = self.scalar_kind(operand_ty);
        let bool_ty = self.spirv_type(builtin::BOOL_ID);
        let arity = match self.cx.types.get(operand_ty) {
            Type::Vector(_, n) => Some(*n as u32),
            _ => None,
        };
        let component = match arity {
            Some(n) => {
                let bool_scalar = self.code.type_bool();
                self.code.type_vector(bool_scalar, n)
            }
            None => bool_ty,
        };

        let c = &mut self.code;
        let compared = match scalar {
            ScalarKind::Float => {
                if kind == BinOpKind::Eq {
                    c.f_ord_equal(component, None, lhs, rhs)
                } else {
                    c.f_ord_not_equal(component, None, lhs, rhs)
                }
            }
            ScalarKind::Bool => {
                if kind == BinOpKind::Eq {
                    c.logical_equal(component, None, lhs, rhs)
                } else {
                    c.logical_not_equal(component, None, lhs, rhs)
                }
            }
            _ => {
                if kind == BinOpKind::Eq {
                    c.i_equal(component, None, lhs, rhs)
                } else {
                    c.i_not_equal(component, None, lhs, rhs)
                }
            }
        }
        .map_err(be)?;

        if arity.is_some() {
            if kind == BinOpKind::Eq {
                self.code.all(bool_ty, None, compared).map_err(be)
            } else {
                self.code.any(bool_ty, None, compared).map_err(be)
            }
        } else {
            Ok(compared)
        }
    }

    fn call(&mut self, id: Id, _name: Name, args: &[Expr]) -> Result<u32, CinderError> {
        let target = self
            .cx
            .resolution
            .calls
            .get(&id)
            .copied()
            .ok_or_else(|| self.internal("unresolved call"))?;

        match target {
            CallTarget::Construct(ty) => self.construct(ty, args),
            CallTarget::Fun(fun) => {
                let mut values = vec![];
                for arg in args {
                    values.push(self.expr(arg)?);
                }
                let callee = *self
                    .fun_ids
                    .get(&fun)
                    .ok_or_else(|| self.internal("call to an unemitted function"))?;
                let ret = self.spirv_type(self.cx.symbols.function(fun).ret);
                self.code
                    .function_call(ret, None, callee, values)
                    .map_err(be)
            }
            CallTarget::Intrinsic(intrinsic) => self.intrinsic(id, intrinsic, args),
        }
    }

    fn construct(&mut self, ty: TypeId, args: &[Expr]) -> Result<u32, CinderError> {
        let spirv_ty = self.spirv_type(ty);
        match self.cx.types.get(ty).clone() {
            Type::Vector(_, n) => {
                let mut values = vec![];
                for arg in args {
                    values.push(self.expr(arg)?);
                }
                if values.len() == 1
                    && matches!(
                        self.cx.types.get(self.node_ty(args[0].get_id())),
                        Type::Scalar(_)
                    )
                    && n > 1
                {
                    let splat = vec![values[0]; n as usize];
                    return self
                        .code
                        .composite_construct(spirv_ty, None, splat)
                        .map_err(be);
                }
                self.code
                    .composite_construct(spirv_ty, None, values)
                    .map_err(be)
            }
            Type::Matrix { .. } => {
                let mut values = vec![];
                for arg in args {
                    values.push(self.expr(arg)?);
                }
                self.code
                    .composite_construct(spirv_ty, None, values)
                    .map_err(be)
            }
            Type::Scalar(kind) => {
                let value = self.expr(&args[0])?;
                let from = self.scalar_kind(self.node_ty(args[0].get_id()));
                let c = &mut self.code;
                match (from, kind) {
                    (a, b) if a == b => Ok(value),
                    (ScalarKind::Int, ScalarKind::Float) => {
                        c.convert_s_to_f(spirv_ty, None, value).map_err(be)
                    }
                    (ScalarKind::UInt, ScalarKind::Float) => {
                        c.convert_u_to_f(spirv_ty, None, value).map_err(be)
                    }
                    (ScalarKind::Float, ScalarKind::Int) => {
                        c.convert_f_to_s(spirv_ty, None, value).map_err(be)
                    }
                    (ScalarKind::Float, ScalarKind::UInt) => {
                        c.convert_f_to_u(spirv_ty, None, value).map_err(be)
                    }
                    _ => c.bitcast(spirv_ty, None, value).map_err(be),
                }
            }
            _ => Err(self.internal("constructor for a non-constructible type")),
        }
    }

    fn ext(&mut self, result_ty: u32, inst: u32, operands: &[u32]) -> Result<u32, CinderError> {
        let set = self.glsl;
        let mut ops: Vec<dr::Operand> = Vec::with_capacity(operands.len() + 2);
        ops.push(dr::Operand::IdRef(set));
        ops.push(dr::Operand::LiteralExtInstInteger(inst));
        ops.extend(operands.iter().map(|o| dr::Operand::IdRef(*o)));
        let result_id = self.code.id();
        let instruction = dr::Instruction::new(
            spirv::Op::ExtInst,
            Some(result_ty),
            Some(result_id),
            ops,
        );
        self.code
            .insert_into_block(rspirv::dr::InsertPoint::End, instruction)
            .map_err(be)?;
        Ok(result_id)
    }

    fn intrinsic(
        &mut self,
        id: Id,
        intrinsic: Intrinsic,
        args: &[Expr],
    ) -> Result<u32, CinderError> {
        let result_ty = self.node_ty(id);
        let spirv_ty = self.spirv_type(result_ty);

        if intrinsic == Intrinsic::Sample {
            let resource = match &args[0] {
                Expr::Identifier(name) => self
                    .cx
                    .symbols
                    .use_of(name.id)
                    .map(|s| self.cx.symbols.symbol(s).kind),
                _ => None,
            };
            let resource = match resource {
                Some(SymbolKind::Resource(resource)) => resource,
                _ => return Err(self.internal("sample() of a non-resource")),
            };
            let var = *self
                .combined_vars
                .get(&resource)
                .ok_or_else(|| self.internal("sample() of an unbound texture"))?;
            let texture_ty = self.cx.symbols.resource(resource).ty;
            let sampled_ty = self.spirv_type(texture_ty);
            let loaded = self.code.load(sampled_ty, None, var, None, []).map_err(be)?;
            let coords = self.expr(&args[2])?;
            return self
                .code
                .image_sample_implicit_lod(spirv_ty, None, loaded, coords, None, [])
                .map_err(be);
        }

        if matches!(intrinsic, Intrinsic::DdxCoarse | Intrinsic::DdyCoarse) {
            return Err(CinderError::UnsupportedIntrinsic {
                name: intrinsic.name().to_string(),
                target: "spirv",
                span: self.cx.ast.spans[id].clone(),
            });
        }

        let mut values = vec![];
        for arg in args {
            values.push(self.expr(arg)?);
        }

        let arg_kind = self.scalar_kind(self.node_ty(args[0].get_id()));
        match intrinsic {
            Intrinsic::Abs => {
                let inst = if arg_kind == ScalarKind::Float {
                    GLSL_FABS
                } else {
                    GLSL_SABS
                };
                self.ext(spirv_ty, inst, &values)
            }
            Intrinsic::Min => {
                let inst = match arg_kind {
                    ScalarKind::Float => GLSL_FMIN,
                    ScalarKind::UInt => GLSL_UMIN,
                    _ => GLSL_SMIN,
                };
                self.ext(spirv_ty, inst, &values)
            }
            Intrinsic::Max => {
                let inst = match arg_kind {
                    ScalarKind::Float => GLSL_FMAX,
                    ScalarKind::UInt => GLSL_UMAX,
                    _ => GLSL_SMAX,
                };
                self.ext(spirv_ty, inst, &values)
            }
            Intrinsic::Clamp => self.ext(spirv_ty, GLSL_FCLAMP, &values),
            Intrinsic::Saturate => {
                let float = self.spirv_type(builtin::FLOAT_ID);
                let zero = self.code.constant_f32(float, 0.0);
                let one = self.code.constant_f32(float, 1.0);
                let (lo, hi) = match self.cx.types.get(result_ty) {
                    Type::Vector(_, n) => {
                        let n = *n as usize;
                        let lo = self
                            .code
                            .composite_construct(spirv_ty, None, vec![zero; n])
                            .map_err(be)?;
                        let hi = self
                            .code
                            .composite_construct(spirv_ty, None, vec![one; n])
                            .map_err(be)?;
                        (lo, hi)
                    }
                    _ => (zero, one),
                };
                self.ext(spirv_ty, GLSL_FCLAMP, &[values[0], lo, hi])
            }
            Intrinsic::Lerp => self.ext(spirv_ty, GLSL_FMIX, &values),
            Intrinsic::Dot => self
                .code
                .dot(spirv_ty, None, values[0], values[1])
                .map_err(be),
            Intrinsic::Cross => self.ext(spirv_ty, GLSL_CROSS, &values),
            Intrinsic::Normalize => self.ext(spirv_ty, GLSL_NORMALIZE, &values),
            Intrinsic::Length => self.ext(spirv_ty, GLSL_LENGTH, &values),
            Intrinsic::Sqrt => self.ext(spirv_ty, GLSL_SQRT, &values),
            Intrinsic::Rsqrt => self.ext(spirv_ty, GLSL_INVERSE_SQRT, &values),
            Intrinsic::Pow => self.ext(spirv_ty, GLSL_POW, &values),
            Intrinsic::Floor => self.ext(spirv_ty, GLSL_FLOOR, &values),
            Intrinsic::Frac => self.ext(spirv_ty, GLSL_FRACT, &values),
            Intrinsic::Mul => {
                let right_ty = self.node_ty(args[1].get_id());
                if matches!(self.cx.types.get(right_ty), Type::Matrix { .. }) {
                    self.code
                        .matrix_times_matrix(spirv_ty, None, values[0], values[1])
                        .map_err(be)
                } else {
                    self.code
                        .matrix_times_vector(spirv_ty, None, values[0], values[1])
                        .map_err(be)
                }
            }
            Intrinsic::Sample | Intrinsic::DdxCoarse | Intrinsic::DdyCoarse => {
                unreachable!("handled above")
            }
        }
    }

    // ---- entry points ----

    fn write_entry(&mut self, fun_id: FunId) -> Result<(), CinderError> {
        let info = self.cx.symbols.function(fun_id).clone();
        let stage = info.stage.expect("entry has a stage");
        let fun_params: Vec<Param> = match &self.cx.ast.items[info.item_index] {
            Item::Fun(fun) => fun.params.clone(),
            _ => return Err(self.internal("function item")),
        };

        let mut interface: Vec<u32> = vec![];
        let mut input_location = 0u32;

        // Input variables per parameter: struct params get one variable per
        // member, bare params one variable, system values a builtin.
        enum InputVar {
            Struct(Vec<u32>),
            Plain(u32),
        }
        let mut inputs = vec![];
        for (param, ty) in fun_params.iter().zip(info.params.iter()) {
            match self.cx.types.get(*ty).clone() {
                Type::Struct(strukt) => {
                    let mut members = vec![];
                    for member in &strukt.members {
                        let var = self.input_var(
                            stage,
                            member.semantic,
                            member.ty,
                            &mut input_location,
                        )?;
                        interface.push(var);
                        members.push(var);
                    }
                    inputs.push(InputVar::Struct(members));
                }
                _ => {
                    let semantic = param
                        .semantic
                        .and_then(|s| Semantic::parse(self.cx.resolve(s.spur)));
                    let var = self.input_var(stage, semantic, *ty, &mut input_location)?;
                    interface.push(var);
                    inputs.push(InputVar::Plain(var));
                }
            }
        }

        // Output variables from the return type.
        let mut outputs: Vec<(u32, TypeId)> = vec![];
        let mut output_location = 0u32;
        let ret_struct = match self.cx.types.get(info.ret).clone() {
            Type::Struct(strukt) => Some(strukt),
            _ => None,
        };
        match stage {
            Stage::Vertex | Stage::Fragment => {
                if let Some(strukt) = &ret_struct {
                    for member in &strukt.members {
                        let var = self.output_var(member.semantic, member.ty, &mut output_location)?;
                        interface.push(var);
                        outputs.push((var, member.ty));
                    }
                } else if info.ret != builtin::VOID_ID {
                    let var = self.output_var(
                        Some(Semantic::Target(0)),
                        info.ret,
                        &mut output_location,
                    )?;
                    interface.push(var);
                    outputs.push((var, info.ret));
                }
            }
            Stage::Compute => {}
        }

        // void main() wrapper.
        let void = self.code.type_void();
        let wrapper_type = self.code.type_function(void, vec![]);
        let wrapper = self
            .code
            .begin_function(void, None, spirv::FunctionControl::NONE, wrapper_type)
            .map_err(be)?;
        self.code.begin_block(None).map_err(be)?;
        self.terminated = false;

        let mut call_args = vec![];
        for (input, ty) in inputs.iter().zip(info.params.iter()) {
            match input {
                InputVar::Plain(var) => {
                    let spirv_ty = self.spirv_type(*ty);
                    let value = self.code.load(spirv_ty, None, *var, None, []).map_err(be)?;
                    call_args.push(value);
                }
                InputVar::Struct(members) => {
                    let strukt = match self.cx.types.get(*ty).clone() {
                        Type::Struct(strukt) => strukt,
                        _ => unreachable!(),
                    };
                    let mut values = vec![];
                    for (member, var) in strukt.members.iter().zip(members) {
                        let member_ty = self.spirv_type(member.ty);
                        let value =
                            self.code.load(member_ty, None, *var, None, []).map_err(be)?;
                        values.push(value);
                    }
                    let struct_ty = self.spirv_type(*ty);
                    let value = self
                        .code
                        .composite_construct(struct_ty, None, values)
                        .map_err(be)?;
                    call_args.push(value);
                }
            }
        }

        let callee = self.fun_ids[&fun_id];
        let ret_spirv = self.spirv_type(info.ret);
        let result = self
            .code
            .function_call(ret_spirv, None, callee, call_args)
            .map_err(be)?;

        if ret_struct.is_some() {
            for (index, (var, member_ty)) in outputs.iter().enumerate() {
                let member_spirv = self.spirv_type(*member_ty);
                let value = self
                    .code
                    .composite_extract(member_spirv, None, result, [index as u32])
                    .map_err(be)?;
                self.code.store(*var, value, None, []).map_err(be)?;
            }
        } else if let Some((var, _)) = outputs.first() {
            self.code.store(*var, result, None, []).map_err(be)?;
        }

        self.code.ret().map_err(be)?;
        self.code.end_function().map_err(be)?;

        let model = match stage {
            Stage::Vertex => spirv::ExecutionModel::Vertex,
            Stage::Fragment => spirv::ExecutionModel::Fragment,
            Stage::Compute => spirv::ExecutionModel::GLCompute,
        };
        let entry_name = self.cx.resolve(info.name).to_string();
        self.code.entry_point(model, wrapper, entry_name, &interface);

        match stage {
            Stage::Fragment => {
                self.code
                    .execution_mode(wrapper, spirv::ExecutionMode::OriginUpperLeft, &[]);
            }
            Stage::Compute => {
                let [x, y, z] = info.workgroup_size.unwrap_or([1, 1, 1]);
                self.code
                    .execution_mode(wrapper, spirv::ExecutionMode::LocalSize, &[x, y, z]);
            }
            Stage::Vertex => {}
        }

        Ok(())
    }

    fn input_var(
        &mut self,
        stage: Stage,
        semantic: Option<Semantic>,
        ty: TypeId,
        location: &mut u32,
    ) -> Result<u32, CinderError> {
        let ptr = self.pointer(StorageClass::Input, ty);
        let var = self.code.variable(ptr, None, StorageClass::Input, None);

        let builtin_kind = match semantic {
            Some(Semantic::Position) if stage == Stage::Fragment => {
                Some(spirv::BuiltIn::FragCoord)
            }
            Some(Semantic::VertexId) => Some(spirv::BuiltIn::VertexIndex),
            Some(Semantic::InstanceId) => Some(spirv::BuiltIn::InstanceIndex),
            Some(Semantic::DispatchThreadId) => Some(spirv::BuiltIn::GlobalInvocationId),
            _ => None,
        };

        match builtin_kind {
            Some(kind) => {
                self.code.decorate(
                    var,
                    spirv::Decoration::BuiltIn,
                    &[dr::Operand::BuiltIn(kind)],
                );
            }
            None => {
                self.code.decorate(
                    var,
                    spirv::Decoration::Location,
                    &[dr::Operand::LiteralInt32(*location)],
                );
                *location += 1;
            }
        }
        Ok(var)
    }

    fn output_var(
        &mut self,
        semantic: Option<Semantic>,
        ty: TypeId,
        location: &mut u32,
    ) -> Result<u32, CinderError> {
        let ptr = self.pointer(StorageClass::Output, ty);
        let var = self.code.variable(ptr, None, StorageClass::Output, None);

        match semantic {
            Some(Semantic::Position) => {
                self.code.decorate(
                    var,
                    spirv::Decoration::BuiltIn,
                    &[dr::Operand::BuiltIn(spirv::BuiltIn::Position)],
                );
            }
            Some(Semantic::Target(n)) => {
                self.code.decorate(
                    var,
                    spirv::Decoration::Location,
                    &[dr::Operand::LiteralInt32(n as u32)],
                );
            }
            _ => {
                self.code.decorate(
                    var,
                    spirv::Decoration::Location,
                    &[dr::Operand::LiteralInt32(*location)],
                );
                *location += 1;
            }
        }
        Ok(var)
    }
}

/// Collects user-function call targets for the reachability walk.
struct CallCollector<'a> {
    resolution: &'a TypeResolution,
    calls: BTreeSet<FunId>,
}

impl StmtVisitor for CallCollector<'_> {
    type Out = ();

    fn block(&mut self, _id: Id, stmts: &[Stmt]) -> Self::Out {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn local_var(&mut self, var: &LocalVar) -> Self::Out {
        if let Some(init) = &var.init {
            self.visit_expr(init);
        }
    }

    fn assign(&mut self, _eq_id: Id, _op: Option<BinOpKind>, lhs: &Expr, rhs: &Expr) -> Self::Out {
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
        self.visit_expr(cond);
        self.visit_stmt(step);
        self.visit_stmt(body);
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

impl ExprVisitor for CallCollector<'_> {
    type Out = ();

    fn binary(&mut self, _id: Id, _kind: BinOpKind, left: &Expr, right: &Expr) -> Self::Out {
        self.visit_expr(left);
        self.visit_expr(right);
    }

    fn unary(&mut self, _id: Id, _kind: UnOpKind, operand: &Expr) -> Self::Out {
        self.visit_expr(operand);
    }

    fn int(&mut self, _id: Id, _i: i32) -> Self::Out {}
    fn float(&mut self, _id: Id, _f: f32) -> Self::Out {}
    fn boolean(&mut self, _id: Id, _b: bool) -> Self::Out {}
    fn identifier(&mut self, _name: Name) -> Self::Out {}

    fn call(&mut self, id: Id, _name: Name, args: &[Expr]) -> Self::Out {
        if let Some(CallTarget::Fun(fun)) = self.resolution.calls.get(&id) {
            self.calls.insert(*fun);
        }
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

/// Collects the locals declared anywhere in a function body so their
/// variables can be created in the entry block.
struct LocalCollector<'a> {
    symbols: &'a SymbolTable,
    vars: Vec<(SymbolId, TypeId)>,
}

impl StmtVisitor for LocalCollector<'_> {
    type Out = ();

    fn block(&mut self, _id: Id, stmts: &[Stmt]) -> Self::Out {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn local_var(&mut self, var: &LocalVar) -> Self::Out {
        if let Some(symbol) = self.symbols.use_of(var.name.id) {
            self.vars.push((symbol, self.symbols.symbol(symbol).ty));
        }
    }

    fn assign(
        &mut self,
        _eq_id: Id,
        _op: Option<BinOpKind>,
        _lhs: &Expr,
        _rhs: &Expr,
    ) -> Self::Out {
    }

    fn if_stmt(
        &mut self,
        _if_id: Id,
        _cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<(Id, &Stmt)>,
    ) -> Self::Out {
        self.visit_stmt(then_branch);
        if let Some((_, stmt)) = else_branch {
            self.visit_stmt(stmt);
        }
    }

    fn for_stmt(
        &mut self,
        _for_id: Id,
        init: &Stmt,
        _cond: &Expr,
        _step: &Stmt,
        body: &Stmt,
    ) -> Self::Out {
        self.visit_stmt(init);
        self.visit_stmt(body);
    }

    fn ret(&mut self, _id: Id, _expr: Option<&Expr>) -> Self::Out {}
    fn expr_stmt(&mut self, _expr: &Expr) -> Self::Out {}
    fn stmt_error(&mut self, _id: Id) -> Self::Out {}
}

#[cfg(test)]
mod tests {
    use crate::{binding, lexer, name_resolution, parser, type_resolution};

    fn words_of(src: &str) -> Vec<u32> {
        let mut ast = parser::parse(lexer::lex(src));
        let (symbols, types) = name_resolution::visit(&mut ast);
        let resolution = type_resolution::visit(&mut ast, &symbols, &types);
        assert!(!ast.has_errors(), "{:?}", ast.errors);
        let bindings = binding::assign(&mut ast, &symbols, &resolution).unwrap();
        let output =
            super::generate(&ast, &symbols, &types, &resolution, &bindings.spirv).unwrap();
        match output.code {
            super::GeneratedCode::Words(words) => words,
            _ => unreachable!(),
        }
    }

    const SHADER: &str = "cbuffer Params { float4x4 mvp; float4 tint; }\nTexture2D albedo;\nSamplerState samp;\nstruct VSIn { float3 position : POSITION; float2 uv : TEXCOORD0; }\nstruct VSOut { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[vertex]\nVSOut vs_main(VSIn input) { VSOut output; output.position = mul(mvp, float4(input.position, 1.0)); output.uv = input.uv; return output; }\n#[fragment]\nfloat4 fs_main(VSOut input) { if (input.uv.x > 0.5) { return sample(albedo, samp, input.uv) * tint; } return tint; }";

    #[test]
    fn emitted_module_reparses() {
        let words = words_of(SHADER);
        // Magic number first, then the version we target.
        assert_eq!(words[0], 0x0723_0203);
        let module = rspirv::dr::load_words(&words).expect("emitted SPIR-V must re-parse");
        assert_eq!(module.entry_points.len(), 2);
    }

    #[test]
    fn module_is_deterministic() {
        assert_eq!(words_of(SHADER), words_of(SHADER));
    }

    #[test]
    fn compute_module_has_local_size() {
        let src = "#[compute(8, 8, 1)]\nvoid cs_main(uint3 id : SV_DispatchThreadID) { }";
        let words = words_of(src);
        let module = rspirv::dr::load_words(&words).unwrap();
        assert_eq!(module.entry_points.len(), 1);
        assert_eq!(module.execution_modes.len(), 1);
    }

    #[test]
    fn loop_shader_reparses() {
        let src = "struct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { float acc = 0.0; for (int i = 0; i < 4; i += 1) { acc += input.uv.x; } return float4(acc, acc, acc, 1.0); }";
        let words = words_of(src);
        rspirv::dr::load_words(&words).unwrap();
    }
}
