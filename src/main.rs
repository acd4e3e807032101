mod console;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use console::console::StdConsole;
use tcm_core::assembler::assembler::Assembler;
use tcm_core::engine::engine::Engine;
use tcm_core::symbols::symbols::SymbolTable;

/// Assemble a program and run it on the byte machine
#[derive(Parser, Debug)]
#[command(name = "tcm", author, version, about, long_about = None)]
struct Args {
    /// Program source file
    file: PathBuf,

    /// Show assembler and engine diagnostics (same as TCM_LOG=debug)
    #[arg(short, long)]
    log: bool,

    /// Print the assembled program listing before running it
    #[arg(long)]
    dump: bool,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.log { "debug" } else { "warn" };
    let env = env_logger::Env::default()
        .filter_or("TCM_LOG", default_level)
        .write_style_or("TCM_LOG_STYLE", "auto");
    env_logger::init_from_env(env);

    if let Err(err) = run(&args) {
        eprintln!("tcm: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let symbols = SymbolTable::new();
    let program = Assembler::new(&symbols)
        .assemble(&source)
        .with_context(|| format!("failed to assemble {}", args.file.display()))?;
    info!("assembled {} instructions from {}", program.len(), args.file.display());

    if args.dump {
        print!("{}", program.listing());
    }

    let mut engine = Engine::new(program, &symbols, StdConsole::new());
    let outcome = engine.run().with_context(|| {
        let index = engine.machine.ip;
        match engine.program().source_line(index) {
            Some(line) => format!("runtime error at instruction {index} (line {line})"),
            None => format!("runtime error at instruction {index}"),
        }
    })?;
    info!("program ended: {outcome:?}");

    Ok(())
}
