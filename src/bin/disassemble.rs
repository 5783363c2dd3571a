//! Module disassembler CLI.
//!
//! Prints the module version, declared program size and one line per decoded
//! instruction to stdout.
//!
//! # Usage
//! ```text
//! disassemble <module.bin>
//! ```

use stackvm::bytecode::disassembler::Disassembler;
use stackvm::bytecode::version::{CURRENT_VERSION, VersionPolicy};
use stackvm::utils::log;
use stackvm::{error, info, warn};
use std::env;
use std::process;

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        print_usage(&args[0]);
        process::exit(0);
    }

    if args.len() != 2 {
        print_usage(args.first().map(String::as_str).unwrap_or("disassemble"));
        process::exit(1);
    }

    let disassembler = Disassembler::new(VersionPolicy::new(CURRENT_VERSION));
    let disassembly = match disassembler.disassemble_file(&args[1]) {
        Ok(d) => d,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    println!("{disassembly}");

    if disassembly.has_errors() {
        warn!("Module contains bytes that are not valid instructions");
    }
}

const USAGE: &str = "\
Stack VM Disassembler

USAGE:
    {program} <module.bin>

ARGS:
    <module.bin>    Module file to decode

OPTIONS:
    -h, --help      Print this help message
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
