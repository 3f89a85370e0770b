use cinder::{
    binding::BindKind,
    codegen::{GeneratedCode, Target},
    compile,
    error::CinderError,
};
use std::{fs, path::PathBuf};

fn shader_dir() -> PathBuf {
    let mut dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    dir.push("tests/shaders");
    dir
}

fn fixture(name: &str) -> String {
    fs::read_to_string(shader_dir().join(name)).unwrap()
}

#[test]
fn fixtures_compile_for_every_target() {
    let mut names: Vec<_> = shader_dir()
        .read_dir()
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_str().unwrap().to_string())
        .filter(|name| name.ends_with(".cin"))
        .collect();
    names.sort();
    assert!(!names.is_empty());

    for name in names {
        let source = fixture(&name);
        let unit = compile(&source, &name, &Target::ALL);
        assert!(!unit.has_errors(), "{}: {:?}", name, unit.diagnostics);
        assert_eq!(unit.outputs.len(), 3, "{}", name);

        // The binary target must re-parse cleanly.
        let spirv = unit.output(Target::Spirv).unwrap();
        match &spirv.code {
            GeneratedCode::Words(words) => {
                rspirv::dr::load_words(words)
                    .unwrap_or_else(|e| panic!("{}: emitted SPIR-V does not re-parse: {}", name, e));
            }
            _ => panic!("spirv target must produce words"),
        }
    }
}

#[test]
fn compilation_is_idempotent() {
    let source = fixture("triangle.cin");
    let first = compile(&source, "triangle.cin", &Target::ALL);
    let second = compile(&source, "triangle.cin", &Target::ALL);

    assert_eq!(first.outputs.len(), second.outputs.len());
    for ((target_a, output_a), (target_b, output_b)) in
        first.outputs.iter().zip(second.outputs.iter())
    {
        assert_eq!(target_a, target_b);
        assert_eq!(output_a, output_b);
    }
    let render = |unit: &cinder::CompileUnit| {
        unit.diagnostics
            .iter()
            .map(|d| format!("{}", d))
            .collect::<Vec<_>>()
    };
    assert_eq!(render(&first), render(&second));
}

#[test]
fn type_mismatch_reports_one_error_and_suppresses_all_targets() {
    let source = "struct VSOut { float4 position : SV_Position; }\n#[vertex]\nVSOut vs_main() { VSOut o; bool flag = true; o.position = float4(1.0, 1.0, 1.0, 1.0) + flag; return o; }";
    let unit = compile(source, "bad.cin", &Target::ALL);

    let type_errors: Vec<_> = unit
        .diagnostics
        .iter()
        .filter(|e| matches!(e, CinderError::TypeError(_, _)))
        .collect();
    assert_eq!(type_errors.len(), 1, "{:?}", unit.diagnostics);
    let message = format!("{}", type_errors[0]);
    assert!(message.contains("float4"));
    assert!(message.contains("bool"));
    assert!(message.contains('+'));
    assert!(unit.outputs.is_empty());
}

#[test]
fn vertex_only_semantic_on_fragment_input_yields_no_output() {
    let source = "struct PSIn { float3 normal : NORMAL; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return float4(input.normal, 1.0); }";
    let unit = compile(source, "bad.cin", &Target::ALL);

    assert!(unit
        .diagnostics
        .iter()
        .any(|e| matches!(e, CinderError::StageContractError(_, _))));
    assert!(unit.outputs.is_empty());
}

#[test]
fn stage_io_is_not_a_bindable_resource() {
    let source = "struct VSOut { float4 position : SV_Position; }\n#[vertex]\nVSOut vs_main() { VSOut o; o.position = float4(0.0, 0.0, 0.0, 1.0); return o; }";
    let unit = compile(source, "io.cin", &Target::ALL);

    assert!(!unit.has_errors(), "{:?}", unit.diagnostics);
    assert_eq!(unit.outputs.len(), 3);
    for (target, output) in &unit.outputs {
        assert!(
            output.manifest.is_empty(),
            "{}: stage IO leaked into the binding manifest: {:?}",
            target,
            output.manifest
        );
    }
}

#[test]
fn texture_slots_follow_the_target_binding_model() {
    let source = "Texture2D albedo;\nTexture2D detail;\nSamplerState samp;\nstruct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return sample(albedo, samp, input.uv) + sample(detail, samp, input.uv); }";
    let unit = compile(source, "textures.cin", &Target::ALL);
    assert!(!unit.has_errors(), "{:?}", unit.diagnostics);

    // Separate model: textures take t0/t1 and the sampler its own slot.
    let hlsl = &unit.output(Target::Hlsl).unwrap().manifest;
    let texture_slots: Vec<u32> = hlsl
        .iter()
        .filter(|m| m.kind == BindKind::Texture)
        .map(|m| m.slot)
        .collect();
    assert_eq!(texture_slots, vec![0, 1]);
    assert!(hlsl.iter().any(|m| m.kind == BindKind::Sampler));

    // Combined model: one combined slot per texture, no standalone sampler.
    let spirv = &unit.output(Target::Spirv).unwrap().manifest;
    let combined: Vec<(u32, Option<u32>)> = spirv
        .iter()
        .filter(|m| m.kind == BindKind::CombinedSampler)
        .map(|m| (m.slot, m.set))
        .collect();
    assert_eq!(combined, vec![(0, Some(1)), (1, Some(1))]);
    assert!(spirv.iter().all(|m| m.kind != BindKind::Sampler));
}

#[test]
fn explicit_binding_is_honored_by_every_target() {
    let source = "#[binding(2)]\nTexture2D albedo;\nSamplerState samp;\nstruct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return sample(albedo, samp, input.uv); }";
    let unit = compile(source, "explicit.cin", &Target::ALL);
    assert!(!unit.has_errors(), "{:?}", unit.diagnostics);

    for (target, output) in &unit.outputs {
        let albedo = output
            .manifest
            .iter()
            .find(|m| m.name == "albedo")
            .unwrap_or_else(|| panic!("{}: albedo missing from manifest", target));
        assert_eq!(albedo.slot, 2, "{}", target);
    }
}

#[test]
fn unsupported_intrinsic_only_fails_its_own_target() {
    let source = "struct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { float d = ddx_coarse(input.uv.x); return float4(d, d, d, 1.0); }";
    let unit = compile(source, "coarse.cin", &Target::ALL);

    // HLSL has the intrinsic, the other two targets report and drop out.
    assert!(unit.output(Target::Hlsl).is_some());
    assert!(unit.output(Target::Msl).is_none());
    assert!(unit.output(Target::Spirv).is_none());

    let unsupported: Vec<_> = unit
        .diagnostics
        .iter()
        .filter_map(|e| match e {
            CinderError::UnsupportedIntrinsic { target, .. } => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(unsupported, vec!["msl", "spirv"]);
}

#[test]
fn binding_conflict_halts_the_unit() {
    let source = "#[binding(1)]\nTexture2D a;\n#[binding(1)]\nTexture2D b;\nSamplerState samp;\nstruct PSIn { float4 position : SV_Position; float2 uv : TEXCOORD0; }\n#[fragment]\nfloat4 fs_main(PSIn input) { return sample(a, samp, input.uv) + sample(b, samp, input.uv); }";
    let unit = compile(source, "conflict.cin", &Target::ALL);

    assert!(unit.outputs.is_empty());
    assert!(unit
        .diagnostics
        .iter()
        .any(|e| matches!(e, CinderError::BindingConflict { slot: 1, .. })));
}

#[test]
fn diagnostics_carry_source_positions() {
    let source = "struct Broken { float4 }\n@";
    let unit = compile(source, "spans.cin", &Target::ALL);
    assert!(unit.has_errors());
    for diagnostic in &unit.diagnostics {
        assert!(diagnostic.span().is_some(), "{}", diagnostic);
    }
}

#[test]
fn manifest_lines_render_name_kind_stage_and_slot() {
    let source = fixture("triangle.cin");
    let unit = compile(&source, "triangle.cin", &Target::ALL);
    let hlsl = &unit.output(Target::Hlsl).unwrap().manifest;

    let lines: Vec<String> = hlsl.iter().map(|m| format!("{}", m)).collect();
    assert!(
        lines
            .iter()
            .any(|l| l == "Transform uniform-buffer slot=0 stages=vertex|fragment"),
        "{:?}",
        lines
    );
    assert!(
        lines.iter().any(|l| l == "albedo texture slot=0 stages=fragment"),
        "{:?}",
        lines
    );
    assert!(
        lines
            .iter()
            .any(|l| l == "albedo_sampler sampler slot=0 stages=fragment"),
        "{:?}",
        lines
    );
}
