//! Direct3D-style text backend. Register-slot binding model with separate
//! texture and sampler objects; matrices stay column-major and `mul` maps
//! straight through.

use super::{
    cstyle::{self, Dialect, Emitter},
    Context, GeneratedCode, TargetOutput, Writer,
};
use crate::{
    ast::{Ast, Item, Param},
    binding::BindingTable,
    error::CinderError,
    name_resolution::{FunInfo, ResourceId, Stage, SymbolTable},
    type_resolution::{intrinsics::Intrinsic, TypeResolution},
    types::{Semantic, Type, TypeId, TypeTable},
};
use std::collections::HashMap;

/// Identifiers that cannot be used verbatim in the generated source.
const RESERVED: &[&str] = &[
    "AppendStructuredBuffer", "Buffer", "ByteAddressBuffer", "ConstantBuffer", "RWBuffer",
    "RWStructuredBuffer", "RWTexture2D", "SamplerComparisonState", "SamplerState",
    "StructuredBuffer", "Texture1D", "Texture2D", "Texture2DArray", "Texture3D", "TextureCube",
    "asm", "bool", "break", "case", "cbuffer", "centroid", "class", "column_major", "compile",
    "const", "continue", "default", "discard", "do", "double", "else", "extern", "false", "float",
    "for", "groupshared", "half", "if", "in", "inline", "inout", "int", "interface", "linear",
    "matrix", "namespace", "nointerpolation", "noperspective", "out", "packoffset", "pass",
    "point", "precise", "register", "return", "row_major", "sample", "sampler", "shared",
    "snorm", "static", "string", "struct", "switch", "tbuffer", "technique", "texture", "true",
    "typedef", "uniform", "unorm", "unsigned", "uint", "vector", "void", "volatile", "while",
];

struct Hlsl;

impl Dialect for Hlsl {
    fn uniform_access(&self, e: &mut Emitter<'_>, buffer: ResourceId, member: usize) -> String {
        // cbuffer members are file-scope identifiers in HLSL as well.
        let spur = match e.cx.types.get(e.cx.symbols.resource(buffer).ty) {
            Type::Struct(strukt) => strukt.members[member].name,
            _ => unreachable!("cbuffer resource without a struct type"),
        };
        e.name(spur)
    }

    fn intrinsic(
        &self,
        e: &mut Emitter<'_>,
        call_id: crate::ast::Id,
        intrinsic: Intrinsic,
        args: Vec<String>,
    ) -> Result<String, CinderError> {
        let _ = call_id;
        let _ = e;
        Ok(match intrinsic {
            Intrinsic::Sample => format!("{}.Sample({}, {})", args[0], args[1], args[2]),
            Intrinsic::Mul => format!("mul({}, {})", args[0], args[1]),
            other => format!("{}({})", other.name(), args.join(", ")),
        })
    }
}

pub fn generate(
    ast: &Ast,
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
    let mut e = Emitter::new(cx, RESERVED);
    let d = Hlsl;
    let mut w = Writer::new();

    let resource_ids: HashMap<crate::ast::Id, ResourceId> = symbols
        .resources
        .iter()
        .enumerate()
        .map(|(index, r)| (r.decl_id, ResourceId(index)))
        .collect();

    for ty in cstyle::struct_order(&cx) {
        write_struct(&mut e, &mut w, ty);
        w.blank();
    }

    for item in &ast.items {
        match item {
            Item::CBuffer { cbuffer_id, .. } => {
                let resource = resource_ids[cbuffer_id];
                write_cbuffer(&mut e, &mut w, table, resource);
                w.blank();
            }
            Item::Texture { decl_id, dim, .. } => {
                let resource = resource_ids[decl_id];
                let ty = match dim {
                    crate::ast::TextureDim::Two => "Texture2D",
                    crate::ast::TextureDim::Three => "Texture3D",
                    crate::ast::TextureDim::Cube => "TextureCube",
                };
                write_resource(&mut e, &mut w, table, resource, ty, 't');
            }
            Item::Sampler { decl_id, .. } => {
                let resource = resource_ids[decl_id];
                write_resource(&mut e, &mut w, table, resource, "SamplerState", 's');
            }
            _ => {}
        }
    }
    w.blank();

    // Prototypes keep call order independent of declaration order.
    let helpers: Vec<&FunInfo> = symbols
        .functions
        .iter()
        .filter(|f| f.stage.is_none())
        .collect();
    for info in &helpers {
        let signature = fun_signature(&d, &mut e, *info)?;
        w.line(&format!("{};", signature));
    }
    if !helpers.is_empty() {
        w.blank();
    }

    for info in &symbols.functions {
        write_fun(&d, &mut e, &mut w, info)?;
        w.blank();
    }

    Ok(TargetOutput {
        code: GeneratedCode::Text(w.finish()),
        manifest: table.manifest(symbols, &ast.rodeo),
    })
}

fn semantic_suffix(semantic: Option<Semantic>) -> String {
    match semantic {
        Some(semantic) => format!(" : {}", semantic.hlsl_name()),
        None => String::new(),
    }
}

fn field_decl(e: &mut Emitter<'_>, ty: TypeId, name: lasso::Spur, semantic: Option<Semantic>) -> String {
    let (elem, suffix) = match e.cx.types.get(ty) {
        Type::Array(elem, len) => (*elem, format!("[{}]", len)),
        _ => (ty, String::new()),
    };
    format!(
        "{} {}{}{};",
        e.type_name(elem),
        e.name(name),
        suffix,
        semantic_suffix(semantic)
    )
}

fn write_struct(e: &mut Emitter<'_>, w: &mut Writer, ty: TypeId) {
    let strukt = match e.cx.types.get(ty) {
        Type::Struct(strukt) => strukt.clone(),
        _ => return,
    };
    let name = e.name(strukt.name);
    w.line(&format!("struct {} {{", name));
    w.indent();
    for member in &strukt.members {
        let line = field_decl(e, member.ty, member.name, member.semantic);
        w.line(&line);
    }
    w.dedent();
    w.line("};");
}

fn write_cbuffer(e: &mut Emitter<'_>, w: &mut Writer, table: &BindingTable, resource: ResourceId) {
    let info = e.cx.symbols.resource(resource);
    let strukt = match e.cx.types.get(info.ty) {
        Type::Struct(strukt) => strukt.clone(),
        _ => return,
    };
    let name = e.name(info.name);
    match table.entry(resource) {
        Some(entry) => w.line(&format!(
            "cbuffer {} : register(b{}) {{",
            name, entry.slot
        )),
        None => w.line(&format!("cbuffer {} {{", name)),
    }
    w.indent();
    for member in &strukt.members {
        let line = field_decl(e, member.ty, member.name, None);
        w.line(&line);
    }
    w.dedent();
    w.line("};");
}

fn write_resource(
    e: &mut Emitter<'_>,
    w: &mut Writer,
    table: &BindingTable,
    resource: ResourceId,
    ty: &str,
    register: char,
) {
    let name = e.name(e.cx.symbols.resource(resource).name);
    match table.entry(resource) {
        Some(entry) => w.line(&format!(
            "{} {} : register({}{});",
            ty, name, register, entry.slot
        )),
        None => w.line(&format!("{} {};", ty, name)),
    }
}

fn param_decl(e: &mut Emitter<'_>, param: &Param, ty: TypeId) -> String {
    let semantic = param
        .semantic
        .and_then(|s| Semantic::parse(e.cx.resolve(s.spur)));
    format!(
        "{} {}{}",
        e.type_name(ty),
        e.name(param.name.spur),
        semantic_suffix(semantic)
    )
}

fn fun_signature(
    _d: &Hlsl,
    e: &mut Emitter<'_>,
    info: &FunInfo,
) -> Result<String, CinderError> {
    let fun = match &e.cx.ast.items[info.item_index] {
        Item::Fun(fun) => fun,
        _ => return Err(CinderError::InternalError("function item expected".into())),
    };

    let params: Vec<String> = fun
        .params
        .iter()
        .zip(info.params.iter())
        .map(|(param, ty)| param_decl(e, param, *ty))
        .collect();

    // A fragment entry returning float4 carries the implicit target semantic.
    let ret_semantic = if info.stage == Some(Stage::Fragment)
        && !matches!(e.cx.types.get(info.ret), Type::Struct(_))
    {
        " : SV_Target"
    } else {
        ""
    };

    let ret = e.type_name(info.ret);
    let name = e.name(info.name);
    Ok(format!(
        "{} {}({}){}",
        ret,
        name,
        params.join(", "),
        ret_semantic
    ))
}

fn write_fun(
    d: &Hlsl,
    e: &mut Emitter<'_>,
    w: &mut Writer,
    info: &FunInfo,
) -> Result<(), CinderError> {
    let fun = match &e.cx.ast.items[info.item_index] {
        Item::Fun(fun) => fun,
        _ => return Err(CinderError::InternalError("function item expected".into())),
    };

    if let (Some(Stage::Compute), Some([x, y, z])) = (info.stage, info.workgroup_size) {
        w.line(&format!("[numthreads({}, {}, {})]", x, y, z));
    }

    let signature = fun_signature(d, e, info)?;
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

    fn hlsl_of(src: &str) -> String {
        let mut ast = parser::parse(lexer::lex(src));
        let (symbols, types) = name_resolution::visit(&mut ast);
        let resolution = type_resolution::visit(&mut ast, &symbols, &types);
        assert!(!ast.has_errors(), "{:?}", ast.errors);
        let bindings = binding::assign(&mut ast, &symbols, &resolution).unwrap();
        let output =
            super::generate(&ast, &symbols, &types, &resolution, &bindings.hlsl).unwrap();
        match output.code {
            super::GeneratedCode::Text(text) => text,
            _ => unreachable!(),
        }
    }

    const SHADER: &str = "cbuffer Params { float4x4 mvp; float4 tint; }\nTexture2D albedo;\nSamplerState samp;\nstruct VSIn { float3 position : POSITION; float2 uv : TEXCOORD0; }\nstruct VSOut { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[vertex]\nVSOut vs_main(VSIn input) { VSOut output; output.position = mul(mvp, float4(input.position, 1.0)); output.uv = input.uv; return output; }\n#[fragment]\nfloat4 fs_main(VSOut input) { return sample(albedo, samp, input.uv) * tint; }";

    #[test]
    fn registers_and_declarations() {
        let text = hlsl_of(SHADER);
        assert!(text.contains("cbuffer Params : register(b0) {"), "{}", text);
        assert!(text.contains("Texture2D albedo : register(t0);"), "{}", text);
        assert!(text.contains("SamplerState samp : register(s0);"), "{}", text);
        assert!(text.contains("struct VSOut {"), "{}", text);
        assert!(text.contains("float4 position : SV_Position;"), "{}", text);
    }

    #[test]
    fn sample_and_mul_lowering() {
        let text = hlsl_of(SHADER);
        assert!(text.contains("albedo.Sample(samp, input.uv)"), "{}", text);
        assert!(
            text.contains("mul(mvp, float4(input.position, 1.0))"),
            "{}",
            text
        );
    }

    #[test]
    fn fragment_entry_gets_target_semantic() {
        let text = hlsl_of(SHADER);
        assert!(text.contains("float4 fs_main(VSOut input) : SV_Target {"), "{}", text);
    }

    #[test]
    fn compute_entry_gets_numthreads() {
        let src = "#[compute(8, 8, 1)]\nvoid cs_main(uint3 id : SV_DispatchThreadID) { }";
        let text = hlsl_of(src);
        assert!(text.contains("[numthreads(8, 8, 1)]"), "{}", text);
        assert!(
            text.contains("void cs_main(uint3 id : SV_DispatchThreadID) {"),
            "{}",
            text
        );
    }

    #[test]
    fn reserved_identifier_is_mangled() {
        let src = "struct VSOut { float4 position : SV_Position; }\n#[vertex]\nVSOut vs_main() { VSOut o; float4 matrix = float4(0.0, 0.0, 0.0, 1.0); o.position = matrix; return o; }";
        let text = hlsl_of(src);
        assert!(text.contains("float4 matrix_0"), "{}", text);
        assert!(!text.contains("float4 matrix "), "{}", text);
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(hlsl_of(SHADER), hlsl_of(SHADER));
    }
}
