/// KernelTron - Kernel Interpreter CLI
use kerneltron::backend::types::Value;
use kerneltron::backend::Interp;
use kerneltron::repl;
use kerneltron::sexpr;
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("KernelTron v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    kerneltron [OPTIONS] <INPUT>");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help           Print this help message");
    eprintln!("    -v, --version        Print version information");
    eprintln!("    --sexpr              Print parsed expressions instead of evaluating");
    eprintln!("    --repl               Start interactive REPL");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    <INPUT>              Input Kernel file (use '-' for stdin)");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    KERNELPATH           Colon-separated extra search paths for load");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    kerneltron program.k");
    eprintln!("    kerneltron --repl");
    eprintln!("    cat program.k | kerneltron -");
}

fn print_version() {
    println!("KernelTron {}", VERSION);
}

struct Options {
    input: Option<String>,
    show_sexpr: bool,
    repl_mode: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut input = None;
    let mut show_sexpr = false;
    let mut repl_mode = false;

    for arg in &args[1..] {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                process::exit(0);
            }
            "--sexpr" => {
                show_sexpr = true;
            }
            "--repl" => {
                repl_mode = true;
            }
            arg if arg.starts_with('-') && arg != "-" => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => {
                if input.is_some() {
                    return Err("Multiple input files specified".to_string());
                }
                input = Some(arg.to_string());
            }
        }
    }

    Ok(Options {
        input,
        show_sexpr,
        repl_mode,
    })
}

fn read_input(input: &str) -> Result<String, String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| format!("Failed to read from stdin: {}", e))?;
        Ok(buffer)
    } else {
        let path = Path::new(input);
        if !path.exists() {
            return Err(format!("Input file not found: {}", input));
        }
        fs::read_to_string(path).map_err(|e| format!("Failed to read file '{}': {}", input, e))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let options = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if options.repl_mode {
        let interp = match Interp::new() {
            Ok(interp) => interp,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        };
        if let Err(e) = repl::run(&interp) {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
        return;
    }

    let Some(input) = options.input else {
        eprintln!("Error: Missing input file");
        eprintln!();
        print_usage();
        process::exit(1);
    };

    let content = match read_input(&input) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let source_name = if input == "-" { None } else { Some(input.as_str()) };
    let exprs = match sexpr::parse_str(&content, source_name) {
        Ok(exprs) => exprs,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if options.show_sexpr {
        for expr in exprs {
            println!("{}", expr);
        }
        return;
    }

    let interp = match Interp::new() {
        Ok(interp) => interp,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    let env = match interp.extended_environment() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = interp.run_program(exprs, &env);
    if matches!(&*result, Value::Error(_)) {
        process::exit(1);
    }
}
