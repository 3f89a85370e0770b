//! Metal-style text backend. Resources bind through per-kind argument
//! indices on the entry point; helper functions receive the resources they
//! touch as trailing parameters because MSL has no file-scope resources.

use super::{
    cstyle::{self, Dialect, Emitter},
    Context, GeneratedCode, TargetOutput, Writer,
};
use crate::{
    ast::{Ast, Id, Item, Param, TextureDim},
    binding::{BindKind, Bindings},
    error::CinderError,
    name_resolution::{
        FunId, FunInfo, ResourceId, ResourceKind, Stage, SymbolId, SymbolTable,
    },
    type_resolution::{intrinsics::Intrinsic, TypeResolution},
    types::{Semantic, Type, TypeId, TypeTable},
};
use std::collections::HashMap;

const RESERVED: &[&str] = &[
    "alignas", "alignof", "and", "asm", "auto", "bitand", "bitor", "bool", "break", "case",
    "catch", "char", "class", "compl", "const", "constant", "constexpr", "continue", "decltype",
    "default", "delete", "device", "do", "double", "else", "enum", "explicit", "extern", "false",
    "float", "for", "fragment", "friend", "goto", "half", "if", "inline", "int", "kernel",
    "long", "metal", "mutable", "namespace", "new", "noexcept", "not", "nullptr", "operator",
    "or", "private", "protected", "public", "register", "return", "sampler", "short", "signed",
    "sizeof", "static", "struct", "switch", "template", "texture", "this", "thread",
    "threadgroup", "throw", "true", "try", "typedef", "typeid", "typename", "uint", "union",
    "unsigned", "using", "vertex", "virtual", "void", "volatile", "while",
];

/// How a struct participates in the pipeline, which decides its field
/// attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    VertexInput,
    Varying,
    FragmentOutput,
    Plain,
}

struct Msl<'a> {
    bindings: &'a Bindings,
    cbuffer_types: HashMap<ResourceId, String>,
    renames: HashMap<SymbolId, String>,
}

impl Dialect for Msl<'_> {
    fn uniform_access(&self, e: &mut Emitter<'_>, buffer: ResourceId, member: usize) -> String {
        let resource = e.cx.symbols.resource(buffer);
        let member_spur = match e.cx.types.get(resource.ty) {
            Type::Struct(strukt) => strukt.members[member].name,
            _ => unreachable!("cbuffer resource without a struct type"),
        };
        let buffer_name = e.name(resource.name);
        format!("{}.{}", buffer_name, e.name(member_spur))
    }

    fn intrinsic(
        &self,
        e: &mut Emitter<'_>,
        call_id: Id,
        intrinsic: Intrinsic,
        args: Vec<String>,
    ) -> Result<String, CinderError> {
        Ok(match intrinsic {
            Intrinsic::Sample => format!("{}.sample({}, {})", args[0], args[1], args[2]),
            Intrinsic::Mul => format!("({} * {})", args[0], args[1]),
            Intrinsic::Lerp => format!("mix({})", args.join(", ")),
            Intrinsic::Frac => format!("fract({})", args.join(", ")),
            Intrinsic::DdxCoarse | Intrinsic::DdyCoarse => {
                return Err(CinderError::UnsupportedIntrinsic {
                    name: intrinsic.name().to_string(),
                    target: "msl",
                    span: e.span(call_id),
                })
            }
            other => format!("{}({})", other.name(), args.join(", ")),
        })
    }

    fn call_extra_args(&self, e: &mut Emitter<'_>, fun: FunId) -> Vec<String> {
        self.bindings
            .resources_used_by(fun)
            .iter()
            .map(|r| {
                let name = e.cx.symbols.resource(*r).name;
                e.name(name)
            })
            .collect()
    }

    fn local_name(&self, e: &mut Emitter<'_>, symbol_name: lasso::Spur, id: Id) -> String {
        if let Some(symbol) = e.cx.symbols.use_of(id) {
            if let Some(renamed) = self.renames.get(&symbol) {
                return renamed.clone();
            }
        }
        e.name(symbol_name)
    }
}

pub fn generate(
    ast: &Ast,
    symbols: &SymbolTable,
    types: &TypeTable,
    resolution: &TypeResolution,
    bindings: &Bindings,
) -> Result<TargetOutput, CinderError> {
    let cx = Context {
        ast,
        symbols,
        types,
        resolution,
    };
    let mut e = Emitter::new(cx, RESERVED);
    let mut w = Writer::new();

    w.line("#include <metal_stdlib>");
    w.blank();
    w.line("using namespace metal;");
    w.blank();

    let roles = struct_roles(&cx);
    for ty in cstyle::struct_order(&cx) {
        let role = roles.get(&ty).copied().unwrap_or(Role::Plain);
        write_struct(&mut e, &mut w, ty, role);
        w.blank();
    }

    // cbuffer layouts become plain structs; the buffer itself is passed by
    // reference into every function that reads it.
    let mut cbuffer_types = HashMap::new();
    for (index, resource) in symbols.resources.iter().enumerate() {
        if resource.kind != ResourceKind::CBuffer {
            continue;
        }
        let id = ResourceId(index);
        let base = format!("{}_t", cx.resolve(resource.name));
        let type_name = e.mangler.fresh(&base);
        write_cbuffer_struct(&mut e, &mut w, resource.ty, &type_name);
        w.blank();
        cbuffer_types.insert(id, type_name);
    }

    let mut d = Msl {
        bindings,
        cbuffer_types,
        renames: HashMap::new(),
    };

    // Stage-in structs for vertex entries that take bare attribute params.
    let mut stage_in: HashMap<usize, StageIn> = HashMap::new();
    for (index, info) in symbols.functions.iter().enumerate() {
        if info.stage != Some(Stage::Vertex) {
            continue;
        }
        if let Some(synth) = synthesize_stage_in(&mut e, &mut d, info) {
            write_stage_in_struct(&mut e, &mut w, &synth);
            w.blank();
            stage_in.insert(index, synth);
        }
    }

    let helpers: Vec<(usize, &FunInfo)> = symbols
        .functions
        .iter()
        .enumerate()
        .filter(|(_, f)| f.stage.is_none())
        .collect();
    for (index, info) in &helpers {
        let signature = helper_signature(&d, &mut e, FunId(*index), *info)?;
        w.line(&format!("{};", signature));
    }
    if !helpers.is_empty() {
        w.blank();
    }

    for (index, info) in symbols.functions.iter().enumerate() {
        match info.stage {
            None => {
                let signature = helper_signature(&d, &mut e, FunId(index), info)?;
                write_body(&d, &mut e, &mut w, info, &signature)?;
            }
            Some(stage) => {
                let signature =
                    entry_signature(&d, &mut e, FunId(index), info, stage, stage_in.get(&index))?;
                write_body(&d, &mut e, &mut w, info, &signature)?;
            }
        }
        w.blank();
    }

    Ok(TargetOutput {
        code: GeneratedCode::Text(w.finish()),
        manifest: bindings.msl.manifest(symbols, &ast.rodeo),
    })
}

fn struct_roles(cx: &Context<'_>) -> HashMap<TypeId, Role> {
    let mut roles = HashMap::new();
    let mut claim = |ty: TypeId, role: Role| {
        roles.entry(ty).or_insert(role);
    };

    for info in &cx.symbols.functions {
        let stage = match info.stage {
            Some(stage) => stage,
            None => continue,
        };
        match stage {
            Stage::Vertex => {
                for param in &info.params {
                    if matches!(cx.types.get(*param), Type::Struct(_)) {
                        claim(*param, Role::VertexInput);
                    }
                }
                claim(info.ret, Role::Varying);
            }
            Stage::Fragment => {
                for param in &info.params {
                    if matches!(cx.types.get(*param), Type::Struct(_)) {
                        claim(*param, Role::Varying);
                    }
                }
                if matches!(cx.types.get(info.ret), Type::Struct(_)) {
                    claim(info.ret, Role::FragmentOutput);
                }
            }
            Stage::Compute => {}
        }
    }

    roles
}

/// Field attribute for one member of a pipeline IO struct. Varying
/// locations skip the position field, matching the SPIR-V location rule.
fn field_attribute(role: Role, semantic: Option<Semantic>, index: usize, location: &mut u32) -> String {
    match role {
        Role::VertexInput => format!(" [[attribute({})]]", index),
        Role::Varying => match semantic {
            Some(Semantic::Position) => " [[position]]".to_string(),
            _ => {
                let attr = format!(" [[user(locn{})]]", location);
                *location += 1;
                attr
            }
        },
        Role::FragmentOutput => match semantic {
            Some(Semantic::Target(n)) => format!(" [[color({})]]", n),
            _ => String::new(),
        },
        Role::Plain => String::new(),
    }
}

fn write_struct(e: &mut Emitter<'_>, w: &mut Writer, ty: TypeId, role: Role) {
    let strukt = match e.cx.types.get(ty) {
        Type::Struct(strukt) => strukt.clone(),
        _ => return,
    };
    let name = e.name(strukt.name);
    w.line(&format!("struct {} {{", name));
    w.indent();
    let mut location = 0u32;
    for (index, member) in strukt.members.iter().enumerate() {
        let (elem, suffix) = match e.cx.types.get(member.ty) {
            Type::Array(elem, len) => (*elem, format!("[{}]", len)),
            _ => (member.ty, String::new()),
        };
        let attr = field_attribute(role, member.semantic, index, &mut location);
        let line = format!(
            "{} {}{}{};",
            e.type_name(elem),
            e.name(member.name),
            suffix,
            attr
        );
        w.line(&line);
    }
    w.dedent();
    w.line("};");
}

fn write_cbuffer_struct(e: &mut Emitter<'_>, w: &mut Writer, ty: TypeId, type_name: &str) {
    let strukt = match e.cx.types.get(ty) {
        Type::Struct(strukt) => strukt.clone(),
        _ => return,
    };
    w.line(&format!("struct {} {{", type_name));
    w.indent();
    for member in &strukt.members {
        let (elem, suffix) = match e.cx.types.get(member.ty) {
            Type::Array(elem, len) => (*elem, format!("[{}]", len)),
            _ => (member.ty, String::new()),
        };
        let line = format!("{} {}{};", e.type_name(elem), e.name(member.name), suffix);
        w.line(&line);
    }
    w.dedent();
    w.line("};");
}

/// A synthesized `[[stage_in]]` struct for bare vertex attribute params.
struct StageIn {
    type_name: String,
    var_name: String,
    /// Field name and type per relocated parameter, in parameter order.
    fields: Vec<(String, TypeId)>,
}

fn synthesize_stage_in(e: &mut Emitter<'_>, d: &mut Msl<'_>, info: &FunInfo) -> Option<StageIn> {
    let fun = match &e.cx.ast.items[info.item_index] {
        Item::Fun(fun) => fun,
        _ => return None,
    };

    let mut fields = vec![];
    let mut relocated: Vec<(&Param, TypeId)> = vec![];
    for (param, ty) in fun.params.iter().zip(info.params.iter()) {
        if matches!(e.cx.types.get(*ty), Type::Struct(_)) || is_system_param(e, param) {
            continue;
        }
        relocated.push((param, *ty));
    }
    if relocated.is_empty() {
        return None;
    }

    let entry_name = e.name(info.name);
    let type_name = e.mangler.fresh(&format!("{}_in", entry_name));
    let var_name = e.mangler.fresh("stage_in");

    for (param, ty) in relocated {
        let field = e.name(param.name.spur);
        if let Some(symbol) = e.cx.symbols.use_of(param.name.id) {
            d.renames
                .insert(symbol, format!("{}.{}", var_name, field));
        }
        fields.push((field, ty));
    }

    Some(StageIn {
        type_name,
        var_name,
        fields,
    })
}

fn write_stage_in_struct(e: &mut Emitter<'_>, w: &mut Writer, stage_in: &StageIn) {
    w.line(&format!("struct {} {{", stage_in.type_name));
    w.indent();
    for (index, (field, ty)) in stage_in.fields.iter().enumerate() {
        let line = format!(
            "{} {} [[attribute({})]];",
            e.type_name(*ty),
            field,
            index
        );
        w.line(&line);
    }
    w.dedent();
    w.line("};");
}

fn is_system_param(e: &Emitter<'_>, param: &Param) -> bool {
    matches!(
        param
            .semantic
            .and_then(|s| Semantic::parse(e.cx.resolve(s.spur))),
        Some(Semantic::VertexId) | Some(Semantic::InstanceId) | Some(Semantic::DispatchThreadId)
    )
}

fn system_attribute(semantic: Semantic) -> &'static str {
    match semantic {
        Semantic::VertexId => "[[vertex_id]]",
        Semantic::InstanceId => "[[instance_id]]",
        Semantic::DispatchThreadId => "[[thread_position_in_grid]]",
        _ => unreachable!("not a system value"),
    }
}

fn texture_type(dim: TextureDim) -> &'static str {
    match dim {
        TextureDim::Two => "texture2d<float>",
        TextureDim::Three => "texture3d<float>",
        TextureDim::Cube => "texturecube<float>",
    }
}

/// Resource parameter text, with `[[...]]` binding attributes only on entry
/// points.
fn resource_params(
    d: &Msl<'_>,
    e: &mut Emitter<'_>,
    fun: FunId,
    with_attributes: bool,
) -> Vec<String> {
    let mut params = vec![];
    for resource_id in d.bindings.resources_used_by(fun) {
        let resource = e.cx.symbols.resource(*resource_id);
        let name = e.name(resource.name);
        let decl = match resource.kind {
            ResourceKind::CBuffer => {
                format!("constant {}& {}", d.cbuffer_types[resource_id], name)
            }
            ResourceKind::Texture(dim) => format!("{} {}", texture_type(dim), name),
            ResourceKind::Sampler => format!("sampler {}", name),
        };
        if with_attributes {
            let entry = d
                .bindings
                .msl
                .entry(*resource_id)
                .expect("entry resources are always bound");
            let attr = match entry.kind {
                BindKind::UniformBuffer => format!(" [[buffer({})]]", entry.slot),
                BindKind::Texture => format!(" [[texture({})]]", entry.slot),
                BindKind::Sampler => format!(" [[sampler({})]]", entry.slot),
                BindKind::CombinedSampler => String::new(),
            };
            params.push(format!("{}{}", decl, attr));
        } else {
            params.push(decl);
        }
    }
    params
}

fn helper_signature(
    d: &Msl<'_>,
    e: &mut Emitter<'_>,
    fun_id: FunId,
    info: &FunInfo,
) -> Result<String, CinderError> {
    let fun = match &e.cx.ast.items[info.item_index] {
        Item::Fun(fun) => fun,
        _ => return Err(CinderError::InternalError("function item expected".into())),
    };

    let mut params: Vec<String> = fun
        .params
        .iter()
        .zip(info.params.iter())
        .map(|(param, ty)| format!("{} {}", e.type_name(*ty), e.name(param.name.spur)))
        .collect();
    params.extend(resource_params(d, e, fun_id, false));

    let ret = e.type_name(info.ret);
    let name = e.name(info.name);
    Ok(format!("{} {}({})", ret, name, params.join(", ")))
}

fn entry_signature(
    d: &Msl<'_>,
    e: &mut Emitter<'_>,
    fun_id: FunId,
    info: &FunInfo,
    stage: Stage,
    stage_in: Option<&StageIn>,
) -> Result<String, CinderError> {
    let fun = match &e.cx.ast.items[info.item_index] {
        Item::Fun(fun) => fun,
        _ => return Err(CinderError::InternalError("function item expected".into())),
    };

    let qualifier = match stage {
        Stage::Vertex => "vertex",
        Stage::Fragment => "fragment",
        Stage::Compute => "kernel",
    };

    let mut params = vec![];
    if let Some(stage_in) = stage_in {
        params.push(format!(
            "{} {} [[stage_in]]",
            stage_in.type_name, stage_in.var_name
        ));
    }

    for (param, ty) in fun.params.iter().zip(info.params.iter()) {
        if matches!(e.cx.types.get(*ty), Type::Struct(_)) {
            params.push(format!(
                "{} {} [[stage_in]]",
                e.type_name(*ty),
                e.name(param.name.spur)
            ));
        } else if is_system_param(e, param) {
            let semantic = param
                .semantic
                .and_then(|s| Semantic::parse(e.cx.resolve(s.spur)))
                .expect("system param was just matched");
            params.push(format!(
                "{} {} {}",
                e.type_name(*ty),
                e.name(param.name.spur),
                system_attribute(semantic)
            ));
        }
        // Bare attribute params were relocated into the stage-in struct.
    }

    params.extend(resource_params(d, e, fun_id, true));

    let ret = e.type_name(info.ret);
    let name = e.name(info.name);
    Ok(format!(
        "{} {} {}({})",
        qualifier,
        ret,
        name,
        params.join(", ")
    ))
}

fn write_body(
    d: &Msl<'_>,
    e: &mut Emitter<'_>,
    w: &mut Writer,
    info: &FunInfo,
    signature: &str,
) -> Result<(), CinderError> {
    let fun = match &e.cx.ast.items[info.item_index] {
        Item::Fun(fun) => fun,
        _ => return Err(CinderError::InternalError("function item expected".into())),
    };
    w.line(&format!("{} {{", signature));
    w.indent();
    cstyle::write_branch(d, e, w, &fun.body)?;
    w.dedent();
    w.line("}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{binding, lexer, name_resolution, parser, type_resolution};

    fn msl_of(src: &str) -> Result<String, crate::error::CinderError> {
        let mut ast = parser::parse(lexer::lex(src));
        let (symbols, types) = name_resolution::visit(&mut ast);
        let resolution = type_resolution::visit(&mut ast, &symbols, &types);
        assert!(!ast.has_errors(), "{:?}", ast.errors);
        let bindings = binding::assign(&mut ast, &symbols, &resolution).unwrap();
        let output = super::generate(&ast, &symbols, &types, &resolution, &bindings)?;
        match output.code {
            super::GeneratedCode::Text(text) => Ok(text),
            _ => unreachable!(),
        }
    }

    const SHADER: &str = "cbuffer Params { float4x4 mvp; float4 tint; }\nTexture2D albedo;\nSamplerState samp;\nstruct VSIn { float3 position : POSITION; float2 uv : TEXCOORD0; }\nstruct VSOut { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[vertex]\nVSOut vs_main(VSIn input) { VSOut output; output.position = mul(mvp, float4(input.position, 1.0)); output.uv = input.uv; return output; }\n#[fragment]\nfloat4 fs_main(VSOut input) { return sample(albedo, samp, input.uv) * tint; }";

    #[test]
    fn header_and_stage_qualifiers() {
        let text = msl_of(SHADER).unwrap();
        assert!(text.starts_with("#include <metal_stdlib>"), "{}", text);
        assert!(text.contains("using namespace metal;"), "{}", text);
        assert!(
            text.contains("vertex VSOut vs_main(VSIn input [[stage_in]]"),
            "{}",
            text
        );
        assert!(
            text.contains("fragment float4 fs_main(VSOut input [[stage_in]]"),
            "{}",
            text
        );
    }

    #[test]
    fn io_struct_attributes() {
        let text = msl_of(SHADER).unwrap();
        assert!(text.contains("float4 position [[position]];"), "{}", text);
        assert!(text.contains("float2 uv [[user(locn0)]];"), "{}", text);
        assert!(text.contains("float3 position [[attribute(0)]];"), "{}", text);
    }

    #[test]
    fn resources_become_entry_arguments() {
        let text = msl_of(SHADER).unwrap();
        assert!(
            text.contains("constant Params_t& Params [[buffer(0)]]"),
            "{}",
            text
        );
        assert!(
            text.contains("texture2d<float> albedo [[texture(0)]]"),
            "{}",
            text
        );
        assert!(text.contains("sampler samp [[sampler(0)]]"), "{}", text);
        assert!(text.contains("Params.tint"), "{}", text);
    }

    #[test]
    fn intrinsic_renames() {
        let src = "struct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { float t = frac(lerp(0.0, 1.0, input.uv.x)); return float4(t, t, t, 1.0); }";
        let text = msl_of(src).unwrap();
        assert!(text.contains("fract(mix(0.0, 1.0, input.uv.x))"), "{}", text);
    }

    #[test]
    fn mul_becomes_operator() {
        let text = msl_of(SHADER).unwrap();
        assert!(
            text.contains("(Params.mvp * float4(input.position, 1.0))"),
            "{}",
            text
        );
    }

    #[test]
    fn coarse_derivatives_are_unsupported() {
        let src = "struct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { float d = ddx_coarse(input.uv.x); return float4(d, d, d, 1.0); }";
        let err = msl_of(src).unwrap_err();
        assert!(matches!(
            err,
            crate::error::CinderError::UnsupportedIntrinsic { target: "msl", .. }
        ));
    }

    #[test]
    fn helper_functions_thread_resources_through() {
        let src = "Texture2D albedo;\nSamplerState samp;\nfloat4 fetch(float2 uv) { return sample(albedo, samp, uv); }\nstruct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return fetch(input.uv); }";
        let text = msl_of(src).unwrap();
        assert!(
            text.contains("float4 fetch(float2 uv, texture2d<float> albedo, sampler samp)"),
            "{}",
            text
        );
        assert!(text.contains("fetch(input.uv, albedo, samp)"), "{}", text);
    }

    #[test]
    fn bare_vertex_params_get_a_stage_in_struct() {
        let src = "struct VSOut { float4 position : SV_Position; }\n#[vertex]\nVSOut vs_main(float3 p : POSITION) { VSOut o; o.position = float4(p, 1.0); return o; }";
        let text = msl_of(src).unwrap();
        assert!(text.contains("struct vs_main_in {"), "{}", text);
        assert!(text.contains("float3 p [[attribute(0)]];"), "{}", text);
        assert!(
            text.contains("vertex VSOut vs_main(vs_main_in stage_in [[stage_in]])"),
            "{}",
            text
        );
        assert!(text.contains("float4(stage_in.p, 1.0)"), "{}", text);
    }
}
