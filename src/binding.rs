use crate::{
    ast::{Ast, Expr, ExprVisitor, Id, Item, Name, Stmt, StmtVisitor},
    error::CinderError,
    name_resolution::{FunId, Resource, ResourceId, ResourceKind, Stage, SymbolKind, SymbolTable},
    type_resolution::{CallTarget, TypeResolution},
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

/// Deterministic binding-slot assignment for every global resource reachable
/// from a pipeline-stage entry point. Returns `None` when explicit
/// annotations collide; the conflict halts generation for the unit.
pub fn assign(
    ast: &mut Ast,
    symbols: &SymbolTable,
    resolution: &TypeResolution,
) -> Option<Bindings> {
    let usage = UsageMap::build(ast, symbols, resolution);

    // Unreferenced resources get a warning and no slot.
    for (index, resource) in symbols.resources.iter().enumerate() {
        let id = ResourceId(index);
        if !usage.stages.contains_key(&id) {
            ast.errors.push(CinderError::UnusedResource(
                ast.rodeo.resolve(&resource.name).to_string(),
                ast.spans[resource.decl_id].clone(),
            ));
        }
    }

    let mut build = |model: BindModel| match BindingTable::assign(model, symbols, &usage) {
        Ok(table) => Some(table),
        Err(err) => {
            let span = ast.spans[err.decl_id].clone();
            ast.errors.push(CinderError::BindingConflict {
                slot: err.slot,
                first: ast.rodeo.resolve(&err.first).to_string(),
                second: ast.rodeo.resolve(&err.second).to_string(),
                span,
            });
            None
        }
    };

    let hlsl = build(BindModel::SEPARATE)?;
    let msl = build(BindModel::SEPARATE)?;
    let spirv = build(BindModel::COMBINED)?;

    Some(Bindings {
        hlsl,
        msl,
        spirv,
        fun_resources: usage.per_fun,
    })
}

/// How a target shapes its binding namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindModel {
    /// Textures and samplers fuse into combined texture-sampler slots;
    /// standalone samplers disappear from the table.
    pub combined: bool,
    /// Slots live inside descriptor sets.
    pub set_based: bool,
}

impl BindModel {
    pub const SEPARATE: BindModel = BindModel {
        combined: false,
        set_based: false,
    };
    pub const COMBINED: BindModel = BindModel {
        combined: true,
        set_based: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BindKind {
    UniformBuffer,
    Texture,
    Sampler,
    CombinedSampler,
}

impl BindKind {
    pub fn name(&self) -> &'static str {
        match self {
            BindKind::UniformBuffer => "uniform-buffer",
            BindKind::Texture => "texture",
            BindKind::Sampler => "sampler",
            BindKind::CombinedSampler => "combined-sampler",
        }
    }

    /// Default descriptor set in the set-based model.
    fn default_set(&self) -> u32 {
        match self {
            BindKind::UniformBuffer => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BindingEntry {
    pub resource: ResourceId,
    pub kind: BindKind,
    pub stages: Vec<Stage>,
    pub slot: u32,
    pub set: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct BindingTable {
    pub entries: Vec<BindingEntry>,
}

struct Conflict {
    decl_id: Id,
    slot: u32,
    first: lasso::Spur,
    second: lasso::Spur,
}

impl BindingTable {
    pub fn entry(&self, resource: ResourceId) -> Option<&BindingEntry> {
        self.entries.iter().find(|e| e.resource == resource)
    }

    /// Assignment order: resources sorted by declaration order then kind;
    /// explicit slots are pinned first, the rest fill the lowest free slot
    /// of their space, ascending.
    fn assign(
        model: BindModel,
        symbols: &SymbolTable,
        usage: &UsageMap,
    ) -> Result<BindingTable, Conflict> {
        let mut ordered: Vec<(ResourceId, &Resource, BindKind)> = symbols
            .resources
            .iter()
            .enumerate()
            .filter_map(|(index, resource)| {
                let id = ResourceId(index);
                if !usage.stages.contains_key(&id) {
                    return None;
                }
                let kind = match (resource.kind, model.combined) {
                    (ResourceKind::CBuffer, _) => BindKind::UniformBuffer,
                    (ResourceKind::Texture(_), false) => BindKind::Texture,
                    (ResourceKind::Texture(_), true) => BindKind::CombinedSampler,
                    (ResourceKind::Sampler, false) => BindKind::Sampler,
                    // Folded into the textures they sample with.
                    (ResourceKind::Sampler, true) => return None,
                };
                Some((id, resource, kind))
            })
            .collect();
        ordered.sort_by_key(|(id, _, kind)| (*id, *kind));

        // Space key: kind for register-style targets, set for set-based.
        let space = |kind: BindKind, set: Option<u32>| -> (u32, u32) {
            if model.set_based {
                (set.unwrap_or_else(|| kind.default_set()), 0)
            } else {
                (0, kind as u32)
            }
        };

        let mut taken: BTreeMap<(u32, u32), BTreeMap<u32, lasso::Spur>> = BTreeMap::new();
        let mut entries = vec![];

        for (id, resource, kind) in &ordered {
            let set = if model.set_based {
                Some(resource.explicit_set.unwrap_or_else(|| kind.default_set()))
            } else {
                None
            };
            if let Some(slot) = resource.explicit_binding {
                let slots = taken.entry(space(*kind, set)).or_default();
                if let Some(first) = slots.get(&slot) {
                    return Err(Conflict {
                        decl_id: resource.decl_id,
                        slot,
                        first: *first,
                        second: resource.name,
                    });
                }
                slots.insert(slot, resource.name);
                entries.push(BindingEntry {
                    resource: *id,
                    kind: *kind,
                    stages: usage.stages[id].iter().copied().collect(),
                    slot,
                    set,
                });
            }
        }

        for (id, resource, kind) in &ordered {
            if resource.explicit_binding.is_some() {
                continue;
            }
            let set = if model.set_based {
                Some(resource.explicit_set.unwrap_or_else(|| kind.default_set()))
            } else {
                None
            };
            let slots = taken.entry(space(*kind, set)).or_default();
            let mut slot = 0u32;
            while slots.contains_key(&slot) {
                slot += 1;
            }
            slots.insert(slot, resource.name);
            entries.push(BindingEntry {
                resource: *id,
                kind: *kind,
                stages: usage.stages[id].iter().copied().collect(),
                slot,
                set,
            });
        }

        // Declaration order, the order generators emit declarations in.
        entries.sort_by_key(|e| e.resource);
        Ok(BindingTable { entries })
    }

    pub fn manifest(&self, symbols: &SymbolTable, rodeo: &lasso::RodeoReader) -> Vec<ManifestEntry> {
        let mut entries: Vec<ManifestEntry> = self
            .entries
            .iter()
            .map(|e| ManifestEntry {
                name: rodeo.resolve(&symbols.resource(e.resource).name).to_string(),
                kind: e.kind,
                stages: e.stages.clone(),
                slot: e.slot,
                set: e.set,
            })
            .collect();
        entries.sort_by(|a, b| {
            (a.set, a.kind, a.slot)
                .cmp(&(b.set, b.kind, b.slot))
        });
        entries
    }
}

/// One line of the binding manifest handed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub kind: BindKind,
    pub stages: Vec<Stage>,
    pub slot: u32,
    pub set: Option<u32>,
}

impl Display for ManifestEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages = self
            .stages
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join("|");
        match self.set {
            Some(set) => write!(
                f,
                "{} {} set={} slot={} stages={}",
                self.name,
                self.kind.name(),
                set,
                self.slot,
                stages
            ),
            None => write!(
                f,
                "{} {} slot={} stages={}",
                self.name,
                self.kind.name(),
                self.slot,
                stages
            ),
        }
    }
}

#[derive(Debug)]
pub struct Bindings {
    pub hlsl: BindingTable,
    pub msl: BindingTable,
    pub spirv: BindingTable,
    /// Per function, the resources it references transitively, in
    /// declaration order. Backends that pass resources as arguments use it.
    fun_resources: Vec<Vec<ResourceId>>,
}

impl Bindings {
    pub fn resources_used_by(&self, fun: FunId) -> &[ResourceId] {
        &self.fun_resources[fun.0]
    }
}

/// Which resources each function touches and which stages reach each
/// resource, computed over the call graph.
struct UsageMap {
    per_fun: Vec<Vec<ResourceId>>,
    stages: BTreeMap<ResourceId, BTreeSet<Stage>>,
}

impl UsageMap {
    fn build(ast: &Ast, symbols: &SymbolTable, resolution: &TypeResolution) -> UsageMap {
        // Direct references and calls per function.
        let mut direct: Vec<(BTreeSet<ResourceId>, BTreeSet<FunId>)> = vec![];
        for info in &symbols.functions {
            let mut walker = RefWalker {
                symbols,
                resolution,
                resources: BTreeSet::new(),
                calls: BTreeSet::new(),
            };
            if let Item::Fun(fun) = &ast.items[info.item_index] {
                walker.visit_stmt(&fun.body);
            }
            direct.push((walker.resources, walker.calls));
        }

        // Transitive closure, cycle-tolerant.
        let mut per_fun: Vec<Vec<ResourceId>> = Vec::with_capacity(direct.len());
        for index in 0..direct.len() {
            let mut seen_funs = BTreeSet::new();
            let mut resources = BTreeSet::new();
            let mut stack = vec![FunId(index)];
            while let Some(fun) = stack.pop() {
                if !seen_funs.insert(fun) {
                    continue;
                }
                let (res, calls) = &direct[fun.0];
                resources.extend(res.iter().copied());
                stack.extend(calls.iter().copied());
            }
            per_fun.push(resources.into_iter().collect());
        }

        let mut stages: BTreeMap<ResourceId, BTreeSet<Stage>> = BTreeMap::new();
        for (index, info) in symbols.functions.iter().enumerate() {
            let stage = match info.stage {
                Some(stage) => stage,
                None => continue,
            };
            for resource in &per_fun[index] {
                stages.entry(*resource).or_default().insert(stage);
            }
        }

        UsageMap { per_fun, stages }
    }
}

struct RefWalker<'a> {
    symbols: &'a SymbolTable,
    resolution: &'a TypeResolution,
    resources: BTreeSet<ResourceId>,
    calls: BTreeSet<FunId>,
}

impl StmtVisitor for RefWalker<'_> {
    type Out = ();

    fn block(&mut self, _id: Id, stmts: &[Stmt]) -> Self::Out {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn local_var(&mut self, var: &crate::ast::LocalVar) -> Self::Out {
        if let Some(init) = &var.init {
            self.visit_expr(init);
        }
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

impl ExprVisitor for RefWalker<'_> {
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
        if let Some(symbol) = self.symbols.use_of(name.id) {
            match self.symbols.symbol(symbol).kind {
                SymbolKind::UniformMember { buffer, .. } => {
                    self.resources.insert(buffer);
                }
                SymbolKind::Resource(resource) => {
                    self.resources.insert(resource);
                }
                SymbolKind::Local => {}
            }
        }
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, name_resolution, parser, type_resolution};

    fn bind(src: &str) -> (Ast, SymbolTable, Option<Bindings>) {
        let mut ast = parser::parse(lexer::lex(src));
        let (symbols, types) = name_resolution::visit(&mut ast);
        let resolution = type_resolution::visit(&mut ast, &symbols, &types);
        let bindings = assign(&mut ast, &symbols, &resolution);
        (ast, symbols, bindings)
    }

    const TWO_TEXTURES: &str = "Texture2D albedo;\nTexture2D normal_map;\nSamplerState samp;\nstruct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return sample(albedo, samp, input.uv) + sample(normal_map, samp, input.uv); }";

    #[test]
    fn textures_get_slots_in_declaration_order() {
        let (ast, _, bindings) = bind(TWO_TEXTURES);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        let bindings = bindings.unwrap();

        let hlsl: Vec<_> = bindings
            .hlsl
            .entries
            .iter()
            .map(|e| (e.kind, e.slot))
            .collect();
        assert_eq!(
            hlsl,
            vec![
                (BindKind::Texture, 0),
                (BindKind::Texture, 1),
                (BindKind::Sampler, 0)
            ]
        );

        // Combined model: textures fuse with samplers, the sampler vanishes.
        let spirv: Vec<_> = bindings
            .spirv
            .entries
            .iter()
            .map(|e| (e.kind, e.slot, e.set))
            .collect();
        assert_eq!(
            spirv,
            vec![
                (BindKind::CombinedSampler, 0, Some(1)),
                (BindKind::CombinedSampler, 1, Some(1)),
            ]
        );
    }

    #[test]
    fn explicit_binding_is_pinned_in_every_target() {
        let src = "#[binding(3)]\nTexture2D albedo;\nTexture2D extra;\nSamplerState samp;\nstruct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return sample(albedo, samp, input.uv) + sample(extra, samp, input.uv); }";
        let (ast, symbols, bindings) = bind(src);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        let bindings = bindings.unwrap();

        for table in [&bindings.hlsl, &bindings.msl, &bindings.spirv].iter() {
            let albedo = table.entries.iter().find(|e| {
                ast.rodeo.resolve(&symbols.resource(e.resource).name) == "albedo"
            });
            assert_eq!(albedo.unwrap().slot, 3);
            // The unannotated texture takes the lowest free slot.
            let extra = table.entries.iter().find(|e| {
                ast.rodeo.resolve(&symbols.resource(e.resource).name) == "extra"
            });
            assert_eq!(extra.unwrap().slot, 0);
        }
    }

    #[test]
    fn conflicting_explicit_bindings_halt_the_unit() {
        let src = "#[binding(2)]\nTexture2D a;\n#[binding(2)]\nTexture2D b;\nSamplerState samp;\nstruct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return sample(a, samp, input.uv) + sample(b, samp, input.uv); }";
        let (ast, _, bindings) = bind(src);
        assert!(bindings.is_none());
        assert!(ast
            .errors
            .iter()
            .any(|e| matches!(e, CinderError::BindingConflict { .. })));
    }

    #[test]
    fn unreferenced_resource_warns_and_gets_no_slot() {
        let src = "Texture2D ghost;\nstruct VSOut { float4 position : SV_Position; }\n#[vertex]\nVSOut vs_main() { VSOut o; o.position = float4(0.0, 0.0, 0.0, 1.0); return o; }";
        let (ast, _, bindings) = bind(src);
        let bindings = bindings.unwrap();
        assert!(bindings.hlsl.entries.is_empty());
        assert!(ast
            .errors
            .iter()
            .any(|e| matches!(e, CinderError::UnusedResource(_, _))));
        assert!(!ast.has_errors());
    }

    #[test]
    fn assignment_is_deterministic() {
        let (_, _, first) = bind(TWO_TEXTURES);
        let (_, _, second) = bind(TWO_TEXTURES);
        let fmt = |b: &Bindings| format!("{:?}{:?}{:?}", b.hlsl, b.msl, b.spirv);
        assert_eq!(fmt(&first.unwrap()), fmt(&second.unwrap()));
    }

    #[test]
    fn resources_reached_through_helper_functions() {
        let src = "Texture2D albedo;\nSamplerState samp;\nfloat4 fetch(float2 uv) { return sample(albedo, samp, uv); }\nstruct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return fetch(input.uv); }";
        let (ast, _, bindings) = bind(src);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        assert_eq!(bindings.unwrap().hlsl.entries.len(), 2);
    }

    #[test]
    fn cbuffer_binds_in_set_zero_for_the_combined_model() {
        let src = "cbuffer Params { float4x4 mvp; }\nstruct VSOut { float4 position : SV_Position; }\n#[vertex]\nVSOut vs_main(float3 p : POSITION) { VSOut o; o.position = mul(mvp, float4(p, 1.0)); return o; }";
        let (ast, _, bindings) = bind(src);
        assert!(ast.errors.is_empty(), "{:?}", ast.errors);
        let bindings = bindings.unwrap();
        let entry = &bindings.spirv.entries[0];
        assert_eq!(entry.kind, BindKind::UniformBuffer);
        assert_eq!(entry.set, Some(0));
        assert_eq!(entry.slot, 0);
    }
}
