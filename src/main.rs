use cinder::{codegen::Target, compile, debug_print, emit_diagnostics, error::CinderError};
use std::{fs, path::PathBuf, process::exit};
use structopt::StructOpt;

/// Cinder shader cross-compiler. Use -h for help.
#[derive(StructOpt, Debug, Clone)]
struct Opt {
    /// Input shader file
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Output directory, defaults to the input file's directory
    #[structopt(long, short, parse(from_os_str))]
    out_dir: Option<PathBuf>,

    /// Targets to generate: hlsl, msl, spirv. All three when omitted
    #[structopt(long, short)]
    target: Vec<String>,

    /// Print the SPIR-V disassembly to stdout
    #[structopt(long, short)]
    disassemble: bool,

    /// Debug print the AST
    #[structopt(long, short)]
    print: bool,

    /// Validate the SPIR-V output (needs the `validation` feature)
    #[structopt(long, short)]
    validate: bool,
}

fn parse_targets(names: &[String]) -> Result<Vec<Target>, String> {
    if names.is_empty() {
        return Ok(Target::ALL.to_vec());
    }
    names
        .iter()
        .map(|name| match name.as_str() {
            "hlsl" => Ok(Target::Hlsl),
            "msl" => Ok(Target::Msl),
            "spirv" => Ok(Target::Spirv),
            other => Err(format!("unknown target '{}'", other)),
        })
        .collect()
}

fn main() {
    let opt = Opt::from_args();

    let targets = match parse_targets(&opt.target) {
        Ok(targets) => targets,
        Err(message) => {
            eprintln!("{}", message);
            exit(2);
        }
    };

    let source = match fs::read_to_string(&opt.input) {
        Ok(source) => source,
        Err(err) => {
            emit_diagnostics("", "", &[CinderError::IoError(err)]);
            exit(1);
        }
    };

    let file_name = opt.input.to_str().unwrap_or("<non-utf8 path>").to_string();

    if opt.print {
        let ast = cinder::parser::parse(cinder::lexer::lex(&source));
        println!("{}", debug_print::visit(&ast));
    }

    let unit = compile(&source, &file_name, &targets);
    emit_diagnostics(&file_name, &source, &unit.diagnostics);
    if unit.has_errors() {
        exit(1);
    }

    if opt.disassemble {
        if let Some(output) = unit.output(Target::Spirv) {
            if let cinder::codegen::GeneratedCode::Words(words) = &output.code {
                match cinder::disassemble_spirv(words) {
                    Ok(text) => println!("{}", text),
                    Err(err) => eprintln!("{}", err),
                }
            }
        }
    }

    if opt.validate {
        #[cfg(feature = "validation")]
        {
            if let Some(output) = unit.output(Target::Spirv) {
                if let cinder::codegen::GeneratedCode::Words(words) = &output.code {
                    if let Err(err) = cinder::validate_spirv(words) {
                        eprintln!("spirv validation failed: {}", err);
                        exit(1);
                    }
                }
            }
        }
        #[cfg(not(feature = "validation"))]
        eprintln!("cinder was built without the 'validation' feature, skipping");
    }

    let out_dir = opt
        .out_dir
        .clone()
        .or_else(|| opt.input.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = opt
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("shader")
        .to_string();

    if let Err(err) = cinder::write_outputs(&unit, &stem, &out_dir) {
        emit_diagnostics(&file_name, &source, &[err]);
        exit(1);
    }
}
