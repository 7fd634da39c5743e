// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! Call-graph front-end: dumps the depth-annotated function listing, renders
//! the inline call graph, and prints per-depth coverage statistics.

use clap::{Parser, ValueEnum};
use dwarfscope::callgraph::{build_graph, coverage_stats};
use dwarfscope::dwarf::find_all_funcs;
use std::collections::HashSet;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, ExitCode, Stdio};
use std::sync::atomic::Ordering;
use std::{fs, io};

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Format {
    Dot,
    Svg,
    Png,
    Jpg,
}

impl Format {
    fn ext(self) -> &'static str {
        match self {
            Format::Dot => "dot",
            Format::Svg => "svg",
            Format::Png => "png",
            Format::Jpg => "jpg",
        }
    }
}

#[derive(Parser)]
#[command(
    name = "callgraph",
    about = "Extract the static inline call graph from DWARF debug info"
)]
struct Args {
    /// ELF file with DWARF debug info.
    #[arg(short = 'f', default_value = "a.out", value_name = "PATH")]
    file: PathBuf,

    /// Generate the call graph (written to callgraph.<ext>).
    #[arg(short = 'c')]
    callgraph: bool,

    /// Output format. Formats other than dot are rendered with the external
    /// `dot` tool.
    #[arg(long, value_enum, default_value = "dot")]
    format: Format,

    /// Limit the function depth to show; 0 means no limit.
    #[arg(short = 'l', default_value_t = 0, value_name = "N")]
    max_level: u64,

    /// Verbose log (dumps the function listing).
    #[arg(short = 'v')]
    verbose: bool,

    /// Show coverage stats as CSV.
    #[arg(long)]
    stat: bool,

    /// File with one covered function name per line.
    #[arg(long = "coveredfile", value_name = "PATH")]
    covered_file: Option<PathBuf>,
}

fn read_covered(path: &PathBuf) -> io::Result<HashSet<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

fn render(dot: &[u8], format: Format) -> io::Result<()> {
    let out_name = format!("callgraph.{}", format.ext());
    if format == Format::Dot {
        return fs::write(out_name, dot);
    }

    let mut child = Command::new("dot")
        .arg(format!("-T{}", format.ext()))
        .arg("-o")
        .arg(&out_name)
        .stdin(Stdio::piped())
        .spawn()?;
    child
        .stdin
        .take()
        .expect("stdin was requested as piped")
        .write_all(dot)?;
    let status = child.wait()?;
    if !status.success() {
        return Err(io::Error::other(format!("dot exited with {status}")));
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.verbose {
        dwarfscope::dbglog::ENABLED.store(true, Ordering::Relaxed);
    }

    let funcs = match find_all_funcs(&args.file) {
        Ok(funcs) => funcs,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if args.verbose {
        for func in funcs.iter() {
            let indent = " ".repeat(func.depth.saturating_sub(1) as usize);
            println!("{indent}0x{:x} {}: {}", func.offset, func.name, func.depth);
        }
    }

    let covered = match &args.covered_file {
        Some(path) => match read_covered(path) {
            Ok(covered) => covered,
            Err(e) => {
                eprintln!("failed to read {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => HashSet::new(),
    };

    if args.callgraph {
        let graph = build_graph(&funcs, &covered, args.max_level);
        let mut dot = Vec::new();
        if let Err(e) = graph.write_dot(&mut dot).and_then(|_| render(&dot, args.format)) {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }

    if args.stat && !covered.is_empty() {
        println!("Depth,Covered,Total,Percent");
        for stats in coverage_stats(&funcs, &covered, args.max_level) {
            println!(
                "{},{},{},{}%",
                stats.depth,
                stats.covered,
                stats.total,
                stats.percent()
            );
        }
    }

    ExitCode::SUCCESS
}
