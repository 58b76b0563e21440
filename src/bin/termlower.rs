// src/bin/termlower.rs

//! Command-line front door: read the textual abstract dialect, lower it for
//! a target and print the result.
//!
//! ```bash
//! termlower input.eir --target wasm32 --stats
//! cat input.eir | RUST_LOG=debug termlower --emit lowered
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use termlower::ir::parser::parse_module;
use termlower::{ConversionDriver, LoweringSession, TargetInfo, TermKind};

#[derive(Parser)]
#[command(name = "termlower", version, about = "Lower the abstract term dialect to word-level IR")]
struct Cli {
    /// Input file; standard input when absent
    file: Option<PathBuf>,

    /// `x86_64`, `wasm32` or a full target triple
    #[arg(long, default_value = "x86_64")]
    target: String,

    /// Which dialect to print
    #[arg(long, value_enum, default_value = "lowered")]
    emit: Emit,

    /// Print session statistics to stderr
    #[arg(long)]
    stats: bool,

    /// Print the target encoding parameters and exit
    #[arg(long)]
    dump_target: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// The parsed input, unchanged
    Abstract,
    /// The converted module
    Lowered,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    // Function-level errors already render their cause chain.
    if let Err(err) = run(&cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let target = match cli.target.as_str() {
        "x86_64" => TargetInfo::x86_64(),
        "wasm32" => TargetInfo::wasm32(),
        triple => TargetInfo::from_triple(triple)?,
    };
    if cli.dump_target {
        dump_target(&target);
        return Ok(());
    }

    let (name, text) = match &cli.file {
        Some(path) => {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("module")
                .to_string();
            (name, fs::read_to_string(path)?)
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            ("stdin".to_string(), buffer)
        }
    };

    let module = parse_module(&name, &text)?;
    if cli.emit == Emit::Abstract {
        print!("{module}");
        return Ok(());
    }

    let arena = Bump::new();
    let session = LoweringSession::new(&arena);
    let lowered = ConversionDriver::new(&target).run_with_session(module, &session)?;
    print!("{lowered}");
    if cli.stats {
        eprintln!("{}", session.stats());
    }
    Ok(())
}

fn dump_target(target: &TargetInfo) {
    let imm = target.immediate_layout();
    let header = target.header_layout();
    println!("triple:        {}", target.triple());
    println!("pointer width: {}", target.pointer_size_in_bits());
    println!("packed floats: {}", target.requires_packed_floats());
    println!("box tag:       {:#x}", target.box_tag());
    println!("literal tag:   {:#x}", target.literal_tag());
    println!("list tag/mask: {:#x}/{:#x}", target.list_tag(), target.list_mask());
    println!(
        "immediate:     tag {:#x}/{:#x}, kind << {}, value << {} mask {:#x}",
        imm.tag, imm.tag_mask, imm.kind_shift, imm.value.shift, imm.value.mask
    );
    println!(
        "header:        kind << {}, arity << {} mask {:#x}",
        header.kind_shift, header.arity.shift, header.arity.mask
    );
    println!("nil:           {:#x}", target.nil_value());
    println!("none:          {:#x}", target.none_value());
    println!("true:          {:#x}", target.encode_immediate(TermKind::Atom, 1));
    println!("false:         {:#x}", target.encode_immediate(TermKind::Atom, 0));
}
