//! Bytecode virtual machine driver.
//!
//! Assembles a program and runs it on a fresh machine.
//!
//! # Usage
//! ```text
//! stackvm <input> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input`: Assembly source file, or the name of a built-in sample
//!
//! # Options
//! - `-t, --trace`: Print every executed instruction to stderr
//! - `-d, --disasm`: Print the assembled bytecode listing instead of running
//! - `-l, --list`: List the built-in samples

use stackvm::assembler::{assemble_file, assemble_source};
use stackvm::console::StdConsole;
use stackvm::disassembler;
use stackvm::program::Program;
use stackvm::vm::VM;
use stackvm::{error, info};
use std::env;
use std::path::Path;
use std::process;

/// Built-in sample programs, assembled on demand by name.
const SAMPLES: &[(&str, &str)] = &[
    ("hello", include_str!("../demos/hello.asm")),
    ("arith", include_str!("../demos/arith.asm")),
    ("countdown", include_str!("../demos/countdown.asm")),
    ("factorial", include_str!("../demos/factorial.asm")),
    ("globals", include_str!("../demos/globals.asm")),
    ("echo", include_str!("../demos/echo.asm")),
];

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    if args[1] == "--list" || args[1] == "-l" {
        list_samples();
        return;
    }

    let input = &args[1];
    let mut trace = false;
    let mut disasm = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--trace" | "-t" => trace = true,
            "--disasm" | "-d" => disasm = true,
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let program = load_program(input).unwrap_or_else(|| process::exit(1));

    if disasm {
        print!("{}", disassembler::disassemble_to_string(program.as_bytes()));
        return;
    }

    let mut vm = VM::new(program);
    vm.set_trace(trace);
    let mut console = StdConsole;
    if let Err(fault) = vm.run(&mut console) {
        error!("Fault: {}", fault);
        process::exit(1);
    }
    info!(
        "Executed {} instructions",
        vm.instructions_executed()
    );
}

/// Resolves the input as a sample name first, then as a file path.
fn load_program(input: &str) -> Option<Program> {
    if let Some((_, source)) = SAMPLES.iter().find(|(name, _)| name == &input) {
        return match assemble_source(source) {
            Ok(program) => Some(program),
            Err(e) => {
                error!("Sample `{}` failed to assemble: {}", input, e);
                None
            }
        };
    }

    if !Path::new(input).exists() {
        error!(
            "No such file or sample: {} (try --list for the built-in samples)",
            input
        );
        return None;
    }

    // assemble_file already printed a diagnostic on failure
    assemble_file(input).ok()
}

fn list_samples() {
    println!("Built-in samples:");
    for (name, _) in SAMPLES {
        println!("    {name}");
    }
}

const USAGE: &str = "\
Bytecode Virtual Machine

USAGE:
    {program} <input> [OPTIONS]

ARGS:
    <input>    Assembly source file, or a built-in sample name

OPTIONS:
    -t, --trace     Print every executed instruction to stderr
    -d, --disasm    Print the bytecode listing instead of running
    -l, --list      List the built-in samples
    -h, --help      Print this help message

EXAMPLES:
    # Run a built-in sample
    {program} factorial

    # Run a source file with instruction tracing
    {program} program.asm -t

    # Show the assembled bytecode
    {program} program.asm -d
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
