//! The assembler binary. Takes a source file and an architecture formula,
//! assembles it against a freshly allocated simulated store, and dumps one
//! of a few intermediate or final representations.
//!
//! Run with `--help` for more info.

use clap::{Parser, ValueEnum};

use rv_edu_sim::arch::{ExtensionAssembler, ExtensionFormula, JsonExtensionProvider};
use rv_edu_sim::parser::{assemble, LineLexer};
use rv_edu_sim::store::SimulatedStore;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// The input assembly file.
    file: Option<String>,
    /// Comma-separated extension formula, e.g. "rv32i,rv32m".
    #[arg(short, long, default_value = "rv32i,rv32m")]
    arch: String,
    /// What to print.
    #[arg(value_enum, short, long, default_value_t = Output::Ast)]
    out: Output,
    /// Size, in bytes, of the simulated memory backing the store.
    #[arg(long, default_value_t = 1 << 20)]
    memory_size: usize,
    /// Print the bundled extension names and exit.
    #[arg(long, default_value_t = false)]
    list_extensions: bool,
    /// Turn on verbose (debug-level) logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Output {
    /// The lexed lines (labels, mnemonic, operands) before assembly.
    Lines,
    /// The final instruction AST, one node per address.
    Ast,
    /// The resolved symbol table (labels and `.equ` constants).
    Symbols,
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .without_time()
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_extensions {
        for name in ["rv32i", "rv64i", "rv32m", "rv64m"] {
            println!("{name}");
        }
        return;
    }

    let Some(file) = args.file else {
        eprintln!("error: a source file is required unless --list-extensions is given");
        std::process::exit(2);
    };

    let input = String::from_utf8(std::fs::read(&file).expect("file should be readable"))
        .expect("input characters should be utf8");

    let provider = JsonExtensionProvider::bundled();
    let formula = ExtensionFormula::parse(&args.arch, &args.arch);
    let architecture = ExtensionAssembler::new(&provider)
        .assemble(&formula)
        .unwrap_or_else(|e| panic!("failed to assemble architecture {:?}: {e}", args.arch));

    let mut store = SimulatedStore::new(&architecture, args.memory_size);

    match args.out {
        Output::Lines => {
            let (lines, errors) = LineLexer::lex_source(&input);
            for line in &lines {
                println!("{:?}", line.labels);
                if let Some(mnemonic) = &line.mnemonic {
                    print!("  {}", mnemonic.text());
                    for op in &line.operands {
                        print!(" {}", op.text());
                    }
                    println!();
                }
            }
            for e in &errors {
                eprintln!("{e}");
            }
        }
        Output::Symbols => {
            let program = assemble(&input, &mut store);
            for (name, value) in &program.symbols {
                println!("{name} = {value}");
            }
            report(&program.errors);
        }
        Output::Ast => {
            let program = assemble(&input, &mut store);
            for (address, node) in &program.instructions {
                println!("{address:#010x}: {node:?}");
            }
            report(&program.errors);
        }
    }
}

fn report(errors: &rv_edu_sim::error::CompileErrorList) {
    let mut blocked = false;
    for e in errors.iter() {
        eprintln!("{e}");
        blocked |= e.severity.blocks_execution();
    }
    if blocked {
        std::process::exit(1);
    }
}
