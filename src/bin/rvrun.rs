//! The interpreter binary. Assembles a source file and runs it to
//! completion: starting at the lowest instruction address, each step
//! fetches the node at the current `pc`, executes it (which advances or
//! redirects `pc` itself as a side effect), and stops the first time `pc`
//! no longer names an assembled instruction.
//!
//! Run with `--help` for more info.

use clap::Parser;

use rv_edu_sim::arch::{ExtensionAssembler, ExtensionFormula, JsonExtensionProvider, MemoryValue};
use rv_edu_sim::parser::assemble;
use rv_edu_sim::store::SimulatedStore;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// The input assembly file.
    file: String,
    /// Comma-separated extension formula, e.g. "rv32i,rv32m".
    #[arg(short, long, default_value = "rv32i,rv32m")]
    arch: String,
    /// Size, in bytes, of the simulated memory backing the store.
    #[arg(long, default_value_t = 1 << 20)]
    memory_size: usize,
    /// Abort with an error if execution runs past this many steps without
    /// falling off the end of the program, guarding against accidental
    /// infinite loops (e.g. a label used as its own unconditional branch
    /// target).
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u64,
    /// Turn on verbose (debug-level) logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
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

    let input = String::from_utf8(std::fs::read(&args.file).expect("file should be readable"))
        .expect("input characters should be utf8");

    let provider = JsonExtensionProvider::bundled();
    let formula = ExtensionFormula::parse(&args.arch, &args.arch);
    let architecture = ExtensionAssembler::new(&provider)
        .assemble(&formula)
        .unwrap_or_else(|e| panic!("failed to assemble architecture {:?}: {e}", args.arch));

    let mut store = SimulatedStore::new(&architecture, args.memory_size);
    let program = assemble(&input, &mut store);

    let mut failed = false;
    for e in program.errors.iter() {
        eprintln!("{e}");
        failed |= e.severity.blocks_execution();
    }
    if failed {
        std::process::exit(1);
    }

    let Some(entry) = program.entry else {
        println!("(no instructions to run)");
        return;
    };

    let pc_width = store.register_width("pc").unwrap_or(32);
    store
        .put_register("pc", MemoryValue::from_unsigned(entry, pc_width, store.endianness()))
        .expect("pc is a register every architecture declares");

    let mut steps = 0u64;
    loop {
        let pc = store
            .get_register("pc")
            .expect("pc is a register every architecture declares")
            .to_unsigned(store.endianness())
            .expect("pc fits in its own width");
        let Some(node) = program.instructions.get(&pc) else {
            break;
        };
        if let Err(e) = node.get_value(&mut store) {
            eprintln!("runtime error at {pc:#010x}: {e}");
            std::process::exit(1);
        }
        steps += 1;
        if steps > args.max_steps {
            eprintln!("execution exceeded --max-steps ({}) without halting", args.max_steps);
            std::process::exit(1);
        }
    }

    println!("halted after {steps} instruction(s)");
    for unit in &architecture.units {
        for reg in &unit.registers {
            let value = store.get_register(&reg.id).expect("declared register is readable");
            let unsigned = value.to_unsigned(store.endianness()).unwrap_or(0);
            println!("{:<8} = {:#018x}", reg.id, unsigned);
        }
    }
}
