use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use tcm_core::assembler::assembler::Assembler;
use tcm_core::symbols::symbols::SymbolTable;

/// Assemble a program into 4-byte instruction records
#[derive(Parser, Debug)]
#[command(name = "tcmasm", author, version, about, long_about = None)]
struct Args {
    /// Program source file
    input: PathBuf,

    /// Output image path (defaults to the input with a .bin extension)
    #[arg(short, long = "out", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print a listing of the assembled program
    #[arg(short, long)]
    list: bool,
}

fn main() {
    let env = env_logger::Env::default().filter_or("TCM_LOG", "warn");
    env_logger::init_from_env(env);

    if let Err(err) = run(Args::parse()) {
        eprintln!("tcmasm: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let symbols = SymbolTable::new();
    let program = Assembler::new(&symbols)
        .assemble(&source)
        .with_context(|| format!("failed to assemble {}", args.input.display()))?;

    if args.list {
        print!("{}", program.listing());
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&output, program.to_image())
        .with_context(|| format!("failed to write {}", output.display()))?;

    Ok(())
}

fn default_output_path(input: &Path) -> PathBuf {
    let mut out = input.to_path_buf();
    out.set_extension("bin");
    out
}
