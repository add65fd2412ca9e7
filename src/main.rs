//! Command-line driver.
//!
//! `minicc <input.c> <output>` compiles one source file. An output ending in
//! `.ll` gets textual LLVM IR; anything else is compiled to an object file
//! and linked into a host executable. All stage diagnostics go to stderr and
//! any error exits nonzero.

use std::{env, fs, path::PathBuf, process};

use anyhow::{bail, Context};
use inkwell::context::Context as LlvmContext;
use tracing::info;

use minicc::{
    codegen::{host_triple, Codegen},
    link::link_exe,
    CompileError, Lexer, Parser,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.len() != 2 {
        eprintln!("Usage: minicc <input.c> <output.ll|output-exe>");
        process::exit(1);
    }
    let input = PathBuf::from(&args[0]);
    let output = PathBuf::from(&args[1]);

    let source = fs::read_to_string(&input).with_context(|| format!("reading {:?}", input))?;
    let file_name = input.to_string_lossy().into_owned();

    let mut parser = Parser::new(Lexer::new(file_name.clone(), &source));
    let unit = parser.parse();
    for diag in parser.diagnostics() {
        eprintln!("{diag}");
    }
    if parser.has_errors() {
        bail!(CompileError::Syntax(parser.diagnostics().len()));
    }

    let module_name = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".into());
    let ctx = LlvmContext::create();
    let mut cg = Codegen::new(&ctx, &module_name, &file_name);
    let verified = cg.emit_unit(&unit);
    for diag in cg.diagnostics() {
        eprintln!("{diag}");
    }
    verified?;
    if cg.has_errors() {
        bail!(CompileError::Semantic(cg.diagnostics().len()));
    }

    if output.extension().is_some_and(|ext| ext == "ll") {
        cg.write_ir_to_file(&output)?;
        info!(output = %output.display(), "wrote textual IR");
        println!("Wrote {}", output.display());
        return Ok(());
    }

    let triple = host_triple();
    let obj = output.with_extension("o");
    cg.write_object(&triple, &obj)?;
    link_exe(&obj, &output)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perm = fs::metadata(&output)?.permissions();
        perm.set_mode(0o755);
        fs::set_permissions(&output, perm)?;
    }

    println!("Built {}", output.display());
    Ok(())
}
