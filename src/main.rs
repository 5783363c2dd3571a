//! Runs a module on the reference stack VM.
//!
//! # Usage
//! ```text
//! stackvm <module.bin>
//! ```
//!
//! Program output goes to stdout. Load errors and runtime faults are logged and
//! exit with status 1.

use stackvm::bytecode::program::ModuleReader;
use stackvm::bytecode::version::{CURRENT_VERSION, VersionPolicy};
use stackvm::bytecode::vm::VM;
use stackvm::utils::log;
use stackvm::{error, info};
use std::env;
use std::io;
use std::process;

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        print_usage(&args[0]);
        process::exit(0);
    }

    if args.len() != 2 {
        print_usage(args.first().map(String::as_str).unwrap_or("stackvm"));
        process::exit(1);
    }

    let reader = ModuleReader::new(VersionPolicy::new(CURRENT_VERSION));
    let loaded = match reader.read_file(&args[1]) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to load module: {e}");
            process::exit(1);
        }
    };

    let mut vm = VM::from_module(loaded);
    let stdout = io::stdout();
    if let Err(e) = vm.run(&mut stdout.lock()) {
        error!("{e}");
        process::exit(1);
    }
}

const USAGE: &str = "\
Stack VM

USAGE:
    {program} <module.bin>

ARGS:
    <module.bin>    Module file produced by the assembler

OPTIONS:
    -h, --help      Print this help message
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
