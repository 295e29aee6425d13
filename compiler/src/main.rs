//! `lethec`: command-line driver for [`lethe_compiler::Engine`].
//!
//! Since the tokenizer/parser are a host concern (spec §1), this binary's
//! only input format is a serialized AST: a JSON document holding an
//! [`lethe_compiler::ast::Ast`] arena plus the id of its root `Program`
//! node, produced by whatever front end a host builds on top of
//! [`lethe_compiler::builder`]. Output is a bincode-encoded
//! [`lethe_host::Image`], written to a file or stdout.

use clap::Parser;
use lethe_compiler::ast::{Ast, NodeId};
use lethe_compiler::config::CompilerConfig;
use lethe_compiler::Engine;
use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "lethec", about = "Compiles a serialized Lethe AST to a bytecode image")]
struct Cli {
    /// Path to the serialized AST (JSON: `{"ast": ..., "root": ...}`).
    ast: PathBuf,

    /// Optional TOML config (inline limits, optimization flags, native bindings).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the compiled image (bincode). Defaults to stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Deserialize)]
struct AstDocument {
    ast: Ast,
    root: NodeId,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match fs::read_to_string(path).and_then(|s| {
            CompilerConfig::from_toml_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        }) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: reading config {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => CompilerConfig::new(),
    };

    let document = match fs::read_to_string(&cli.ast) {
        Ok(text) => match serde_json::from_str::<AstDocument>(&text) {
            Ok(doc) => doc,
            Err(err) => {
                eprintln!("error: parsing {}: {err}", cli.ast.display());
                return ExitCode::FAILURE;
            }
        },
        Err(err) => {
            eprintln!("error: reading {}: {err}", cli.ast.display());
            return ExitCode::FAILURE;
        }
    };

    let mut ast = document.ast;
    let mut engine = Engine::new(config);

    match engine.compile(&mut ast, document.root) {
        Ok(image) => {
            let bytes = match image.to_bytes() {
                Ok(b) => b,
                Err(err) => {
                    eprintln!("error: encoding image: {err}");
                    return ExitCode::FAILURE;
                }
            };
            let result = match &cli.out {
                Some(path) => fs::write(path, &bytes),
                None => io::stdout().write_all(&bytes),
            };
            if let Err(err) = result {
                eprintln!("error: writing output: {err}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(diagnostics) => {
            for diagnostic in &diagnostics {
                eprintln!("{diagnostic}");
            }
            ExitCode::FAILURE
        }
    }
}
