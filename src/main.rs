//! RV64IM virtual machine runner.
//!
//! Loads a raw little-endian program image at offset `0x1000`, wires up a
//! print syscall and runs to completion.
//!
//! # Usage
//! ```text
//! rv64vm <image.bin> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `image.bin`: Program image to load at the VM's load offset
//!
//! # Options
//! - `-q, --quiet`: Only log errors
//!
//! # Syscalls
//! - `0`: exit with the status in `a0`
//! - `1`: print the NUL-terminated string at `a0` to stdout
//!
//! The process exits with the VM's exit code.

use rv64vm::utils::log::{self, Level};
use rv64vm::virtual_machine::vm::Vm;
use rv64vm::{error, info};
use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let image_path = &args[1];
    let mut quiet = false;

    for arg in &args[2..] {
        match arg.as_str() {
            "--quiet" | "-q" => quiet = true,
            other => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    log::init(if quiet { Level::Error } else { Level::Info });

    let image = match fs::read(image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read {}: {}", image_path, e);
            process::exit(1);
        }
    };

    let mut vm = Vm::new();
    vm.set_panic_callback(|message| error!("vm fault: {message}"));
    vm.set_system_call(1, |vm| {
        let ptr = vm.get_pointer_param(0);
        print!("{}", vm.get_string_pointer(ptr));
        ptr
    });

    if !vm.load_from_bytes(&image) {
        eprintln!(
            "Failed to load {}: image is empty or larger than the arena ({} bytes)",
            image_path,
            image.len()
        );
        process::exit(1);
    }

    info!("loaded {} ({} bytes)", image_path, image.len());
    vm.run();
    info!("vm halted with exit code {}", vm.get_exit_code());

    process::exit(vm.get_exit_code() as i32);
}

const USAGE: &str = "\
RV64IM Virtual Machine

USAGE:
    {program} <image.bin> [OPTIONS]

ARGS:
    <image.bin>    Program image, loaded at offset 0x1000

OPTIONS:
    -q, --quiet    Only log errors
    -h, --help     Print this help message

EXAMPLES:
    # Run an image and propagate its exit code
    {program} program.bin
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
