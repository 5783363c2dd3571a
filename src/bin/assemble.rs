//! Assembly to module compiler CLI.
//!
//! # Usage
//! ```text
//! assemble <input.asm> <output.bin>
//! ```
//!
//! Exits with status 1 on assembly or I/O failure. Assembly errors are reported
//! with the offending source line and a caret under the token.

use stackvm::bytecode::assembler::assemble_file;
use stackvm::bytecode::errors::VMError;
use stackvm::bytecode::program::{HEADER_LEN, ModuleWriter};
use stackvm::bytecode::version::CURRENT_VERSION;
use stackvm::utils::log;
use stackvm::{error, info};
use std::env;
use std::path::Path;
use std::process;

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        print_usage(&args[0]);
        process::exit(0);
    }

    if args.len() != 3 {
        print_usage(args.first().map(String::as_str).unwrap_or("assemble"));
        process::exit(1);
    }

    let input_path = &args[1];
    let output_path = &args[2];

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    // Assembly errors are already logged with a source diagnostic.
    let code = match assemble_file(input_path) {
        Ok(code) => code,
        Err(e @ VMError::IoError { .. }) => {
            error!("{e}");
            process::exit(1);
        }
        Err(_) => process::exit(1),
    };

    if let Err(e) = ModuleWriter::new(CURRENT_VERSION).write_file(output_path, &code) {
        error!("Failed to write module: {}", e);
        process::exit(1);
    }

    info!(
        "Assembled {} -> {} ({} bytes, version {})",
        input_path,
        output_path,
        HEADER_LEN + code.len(),
        CURRENT_VERSION
    );
}

const USAGE: &str = "\
Stack VM Assembler

USAGE:
    {program} <input.asm> <output.bin>

ARGS:
    <input.asm>     Assembly source file to compile
    <output.bin>    Module file to create or overwrite

OPTIONS:
    -h, --help      Print this help message

ENVIRONMENT:
    STACKVM_LOG              Minimum log level (info, warn, error)
    STACKVM_LOG_TIMESTAMP    Set to 0 to hide timestamps
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
