//! Compiled-file CLI.
//!
//! Assembles a textual listing into a `!RBIX` compiled file, or disassembles
//! an existing compiled file.
//!
//! # Usage
//! ```text
//! rbc <input.rbs> [OPTIONS]
//! rbc --disasm <input.rbc>
//! ```
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.rbc`)
//! - `-d, --disasm <file>`: Print the header and instructions of a compiled file
//!
//! # Examples
//! ```text
//! rbc method.rbs
//! rbc method.rbs -o cache/method.rbc
//! rbc --disasm cache/method.rbc
//! ```

use rbc::bytecode::assembler::{ListingLiteral, assemble_file};
use rbc::compiled_file::compiled_method::CompiledMethod;
use rbc::compiled_file::file::{DumpOutcome, dump, load};
use rbc::compiled_file::value::{Symbol, Value};
use rbc::config::Config;
use rbc::utils::log::set_min_level;
use rbc::{error, info, warn};
use std::env;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let config = Config::from_env();
    set_min_level(config.log_level);

    if matches!(args[1].as_str(), "--disasm" | "-d") {
        let Some(input) = args.get(2) else {
            error!("{} requires an argument", args[1]);
            process::exit(1);
        };
        if args.len() > 3 {
            error!("Unexpected argument: {}\n", args[3]);
            print_usage(&args[0]);
            process::exit(1);
        }
        disassemble_file(input, &config);
        return;
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let input = Path::new(input_path);
    let stem = input.file_stem().unwrap_or_default().to_string_lossy().into_owned();
    let output_path = output_path.unwrap_or_else(|| {
        let parent = input.parent().unwrap_or(Path::new("."));
        parent
            .join(format!("{stem}.rbc"))
            .to_string_lossy()
            .into_owned()
    });

    if let Some(parent) = Path::new(&output_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    // assemble_file already printed a located diagnostic
    let Ok(listing) = assemble_file(input_path) else {
        process::exit(1);
    };

    let literals = listing
        .literals
        .into_iter()
        .map(|literal| match literal {
            ListingLiteral::String(bytes) => Value::String(bytes),
            ListingLiteral::Symbol(bytes) => Value::Symbol(Symbol::new(bytes)),
        })
        .collect();

    let method = CompiledMethod::new(stem.as_str(), listing.iseq)
        .with_literals(literals)
        .with_file(input_path.as_str());

    match dump(&method, &output_path) {
        Ok(DumpOutcome::Written { bytes }) => {
            info!("Compiled {} -> {} ({} bytes)", input_path, output_path, bytes);
        }
        Ok(DumpOutcome::Skipped) => {
            warn!("{} was not writable; nothing written", output_path);
        }
        Err(e) => {
            error!("Failed to write output file: {}", e);
            process::exit(1);
        }
    }
}

fn disassemble_file(path: &str, config: &Config) {
    let file = load(path, config).unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1)
    });
    let method = file.method().unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1)
    });

    println!("magic:      {}", file.magic());
    println!("version:    {}", file.version());
    println!("checksum:   {}", file.checksum());
    if let Some(name) = method.name() {
        println!("name:       {name}");
    }
    if let Some(source) = method.file() {
        println!("file:       {source}");
    }
    if let Some(stack_size) = method.stack_size() {
        println!("stack size: {stack_size}");
    }

    let literals = method.literals();
    if !literals.is_empty() {
        println!("literals:");
        for (index, literal) in literals.iter().enumerate() {
            println!("  [{index}] {}", describe_literal(literal));
        }
    }

    match method.disassemble() {
        Ok(listing) => {
            println!("code:");
            print!(
                "{}",
                listing.render(|index| method.literal(index).map(describe_literal))
            );
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}

fn describe_literal(value: &Value) -> String {
    match value {
        Value::String(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
        Value::Symbol(symbol) => symbol.to_string(),
        Value::Integer(n) => n.to_string(),
        Value::BigInteger(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        other => other.kind_name().to_string(),
    }
}

const USAGE: &str = "\
Compiled File Tool

USAGE:
    {program} <input.rbs> [OPTIONS]
    {program} --disasm <input.rbc>

ARGS:
    <input.rbs>    Instruction listing to assemble

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.rbc)
    -d, --disasm <file>     Print the header and instructions of a compiled file
    -h, --help              Print this help message

ENVIRONMENT:
    RBC_LOG                 Log level: debug, info, warn, error (default info)
    RBC_MAX_DEPTH           Maximum marshal nesting depth (default 512)
    RBC_VERIFY_CHECKSUM     Set to 0 to skip checksum verification

EXAMPLES:
    # Assemble to the default output name
    {program} method.rbs

    # Assemble with explicit output
    {program} method.rbs -o cache/method.rbc

    # Inspect a compiled file
    {program} --disasm cache/method.rbc
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
