//! the back-end driver binary. takes an IR file, a syntax and target
//! selection, and optimization flags, and prints IR or assembly.
//!
//! run with `--help` for more info.

use vc::back::*;
use vc::middle::{self, licm};

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input IR file
    file: String,
    /// the output format
    #[arg(value_enum, short, long, default_value_t = Output::Asm)]
    out: Output,
    /// assembler syntax
    #[arg(value_enum, short, long, default_value_t = SyntaxArg::Att)]
    syntax: SyntaxArg,
    /// code generation target
    #[arg(value_enum, short, long, default_value_t = TargetArg::X64)]
    target: TargetArg,
    /// turn on optimizations
    #[arg(short = 'O', default_value_t = false)]
    optimize: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Output {
    /// the IR after optimizations
    Ir,
    /// the resulting assembly code
    Asm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum SyntaxArg {
    Att,
    Intel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum TargetArg {
    X86,
    X64,
}

fn main() {
    use Output::*;
    let args = Args::parse();

    let input = String::from_utf8(std::fs::read(&args.file).expect("file should be readable"))
        .expect("input characters should be utf8");

    let mut module = middle::parse_module(&input).unwrap_or_else(|e| {
        eprintln!("{}: {e}", args.file);
        std::process::exit(1);
    });
    if args.optimize {
        licm::run(&mut module);
    }

    match args.out {
        Ir => {
            for f in &module.funcs {
                for inst in &f.body {
                    println!("{inst}");
                }
            }
        }
        Asm => {
            let syntax = match args.syntax {
                SyntaxArg::Att => Syntax::Att,
                SyntaxArg::Intel => Syntax::Intel,
            };
            let target = match args.target {
                TargetArg::X86 => Target::X86,
                TargetArg::X64 => Target::X64,
            };
            let mut cg = Codegen::new(syntax, target);
            cg.emit_module(&mut module).unwrap_or_else(|e| {
                eprintln!("{}: {e}", args.file);
                std::process::exit(1);
            });
            print!("{}", cg.finish());
        }
    }
}
