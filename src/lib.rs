pub mod ast;
pub mod binding;
pub mod codegen;
pub mod debug_print;
pub mod error;
pub mod lexer;
pub mod name_resolution;
pub mod parser;
pub mod type_resolution;
pub mod types;

use codegen::{GeneratedCode, Target, TargetOutput};
use codespan_reporting::{
    files::SimpleFile,
    term::{
        self,
        termcolor::{ColorChoice, StandardStream},
        Config,
    },
};
use error::CinderError;
use std::{fs, path::Path};

/// The complete result of compiling one source file across the requested
/// targets. Diagnostics keep the order they were produced in; outputs are
/// present only for targets whose generation succeeded.
pub struct CompileUnit {
    pub file: String,
    pub diagnostics: Vec<CinderError>,
    pub outputs: Vec<(Target, TargetOutput)>,
}

impl CompileUnit {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|e| e.severity() == error::Severity::Error)
    }

    pub fn output(&self, target: Target) -> Option<&TargetOutput> {
        self.outputs
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, output)| output)
    }
}

/// Runs the full pipeline: lex, parse, resolve, bind, then one generator per
/// requested target. Semantic errors suppress binding and generation; a
/// failing generator never blocks its siblings.
pub fn compile(source: &str, file: &str, targets: &[Target]) -> CompileUnit {
    let lexer = lexer::lex(source);
    let mut ast = parser::parse(lexer);
    let (symbols, types) = name_resolution::visit(&mut ast);
    let resolution = type_resolution::visit(&mut ast, &symbols, &types);

    if ast.has_errors() {
        return CompileUnit {
            file: file.to_string(),
            diagnostics: ast.errors,
            outputs: vec![],
        };
    }

    let bindings = match binding::assign(&mut ast, &symbols, &resolution) {
        Some(bindings) => bindings,
        None => {
            return CompileUnit {
                file: file.to_string(),
                diagnostics: ast.errors,
                outputs: vec![],
            }
        }
    };

    let mut outputs = vec![];
    for target in targets {
        let result = match target {
            Target::Hlsl => {
                codegen::hlsl::generate(&ast, &symbols, &types, &resolution, &bindings.hlsl)
            }
            Target::Msl => codegen::msl::generate(&ast, &symbols, &types, &resolution, &bindings),
            Target::Spirv => {
                codegen::spirv::generate(&ast, &symbols, &types, &resolution, &bindings.spirv)
            }
        };
        match result {
            Ok(output) => outputs.push((*target, output)),
            Err(err) => ast.errors.push(err),
        }
    }

    CompileUnit {
        file: file.to_string(),
        diagnostics: ast.errors,
        outputs,
    }
}

pub fn compile_file(path: &Path, targets: &[Target]) -> Result<CompileUnit, CinderError> {
    let source = fs::read_to_string(path)?;
    Ok(compile(
        &source,
        path.to_str().unwrap_or("<non-utf8 path>"),
        targets,
    ))
}

/// Renders diagnostics to stderr with source context.
pub fn emit_diagnostics(file_name: &str, source: &str, errors: &[CinderError]) {
    let file = SimpleFile::new(file_name, source);
    let writer = StandardStream::stderr(ColorChoice::Auto);
    let config = Config::default();
    for err in errors {
        term::emit(&mut writer.lock(), &config, &file, &err.report()).ok();
    }
}

pub fn write_spirv_binary(spirv: &[u32], path: &Path) -> Result<(), CinderError> {
    let mut bytes = Vec::with_capacity(spirv.len() * 4);
    for word in spirv {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    fs::write(path, bytes)?;
    Ok(())
}

pub fn disassemble_spirv(spirv: &[u32]) -> Result<String, CinderError> {
    use rspirv::binary::Disassemble;
    let module = rspirv::dr::load_words(spirv)
        .map_err(|e| CinderError::InternalError(format!("spirv reload failed: {}", e)))?;
    Ok(module.disassemble())
}

#[cfg(feature = "validation")]
pub fn validate_spirv(spirv: &[u32]) -> Result<(), String> {
    use spirv_tools::val::{self, Validator};
    let validator = val::create(None);
    validator
        .validate(spirv, Some(val::ValidatorOptions::default()))
        .map_err(|e| format!("{}", e))
}

/// Writes every generated output next to `out_dir/stem.*`: target sources
/// plus one `.manifest` per target.
pub fn write_outputs(unit: &CompileUnit, stem: &str, out_dir: &Path) -> Result<(), CinderError> {
    for (target, output) in &unit.outputs {
        let source_path = out_dir.join(format!("{}.{}", stem, target.extension()));
        match &output.code {
            GeneratedCode::Text(text) => fs::write(&source_path, text)?,
            GeneratedCode::Words(words) => write_spirv_binary(words, &source_path)?,
        }

        let manifest_path = out_dir.join(format!("{}.{}.manifest", stem, target.name()));
        let lines: Vec<String> = output.manifest.iter().map(|m| format!("{}", m)).collect();
        fs::write(&manifest_path, format!("{}\n", lines.join("\n")))?;
    }
    Ok(())
}
