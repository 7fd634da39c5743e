// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! `addr2line`-style front-end: reads program counters from the command line
//! or stdin and prints their inline backtraces.

use clap::Parser;
use dwarfscope::{addr2line, find_all_pcs, Frame};
use std::fmt::Write as _;
use std::io::{self, BufRead as _, Write as _};
use std::num::ParseIntError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

/// PCs handed to one worker at a time.
const BATCH: usize = 100;

#[derive(Parser)]
#[command(
    name = "addr2line",
    about = "Resolve program counters to source locations using DWARF debug info"
)]
struct Args {
    /// Object file with DWARF debug info.
    #[arg(short = 'e', default_value = "a.out", value_name = "PATH")]
    exe: PathBuf,

    /// Print the address before each resolution, like --addresses in
    /// gnu|llvm addr2line.
    #[arg(short = 'a')]
    addresses: bool,

    /// Print function names, like --functions in gnu|llvm addr2line.
    #[arg(short = 'f')]
    functions: bool,

    /// Print inlined frames, like --inlines in gnu|llvm addr2line.
    #[arg(short = 'i')]
    inlines: bool,

    /// Resolve every PC found in the DWARF line program.
    #[arg(long)]
    all: bool,

    /// Resolve every coverage-instrumented PC instead.
    #[arg(long = "all-trace-pc")]
    all_trace_pc: bool,

    /// Verbose debug logging.
    #[arg(short = 'v')]
    verbose: bool,

    /// Hex program counters, with or without 0x prefix. When absent (and no
    /// --all flag is given), PCs are read one per line from stdin.
    #[arg(value_name = "PC")]
    pcs: Vec<String>,
}

fn parse_pc(text: &str) -> Result<u64, ParseIntError> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(text, 16)
}

fn render_frames(frames: &[Frame], args: &Args) -> String {
    let mut out = String::new();
    if frames.is_empty() {
        return out;
    }
    if args.addresses {
        let _ = writeln!(out, "0x{:x}", frames[0].pc);
    }
    for frame in frames {
        if !args.inlines && frame.inline {
            continue;
        }
        if args.functions {
            let _ = writeln!(out, "{}", frame.func);
        }
        let _ = writeln!(out, "{}:{}", frame.file, frame.line);
    }
    out
}

/// Interactive mode: one PC per stdin line; per-PC failures are logged to
/// stderr and do not abort.
fn run_stdin(args: &Args) -> ExitCode {
    let stdin = io::stdin();
    let stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let pc = match parse_pc(&line) {
            Ok(pc) => pc,
            Err(e) => {
                eprintln!("failed to parse {line}: {e}");
                continue;
            }
        };
        match addr2line(&args.exe, pc) {
            Ok(frames) => {
                let mut out = stdout.lock();
                let _ = out.write_all(render_frames(&frames, args).as_bytes());
            }
            Err(e) => eprintln!("failed to symbolize 0x{pc:x}: {e}"),
        }
    }

    ExitCode::SUCCESS
}

/// Batch mode: a worker per core pulls chunks of PCs; the first error aborts.
fn run_batch(args: &Args, pcs: &[u64]) -> ExitCode {
    let workers = thread::available_parallelism()
        .map(|x| x.get())
        .unwrap_or(1);
    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let stdout = io::stdout();

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let start = next.fetch_add(BATCH, Ordering::Relaxed);
                if start >= pcs.len() || failed.load(Ordering::Relaxed) {
                    break;
                }
                for &pc in &pcs[start..(start + BATCH).min(pcs.len())] {
                    match addr2line(&args.exe, pc) {
                        Ok(frames) => {
                            let rendered = render_frames(&frames, args);
                            let mut out = stdout.lock();
                            let _ = out.write_all(rendered.as_bytes());
                        }
                        Err(e) => {
                            eprintln!("failed to symbolize 0x{pc:x}: {e}");
                            failed.store(true, Ordering::Relaxed);
                            return;
                        }
                    }
                }
            });
        }
    });

    if failed.load(Ordering::Relaxed) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.verbose {
        dwarfscope::dbglog::ENABLED.store(true, Ordering::Relaxed);
    }

    if !args.all && !args.all_trace_pc && args.pcs.is_empty() {
        return run_stdin(&args);
    }

    let pcs = if args.all || args.all_trace_pc {
        match find_all_pcs(&args.exe, args.all_trace_pc) {
            Ok(pcs) => pcs,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let mut pcs = Vec::with_capacity(args.pcs.len());
        for text in &args.pcs {
            match parse_pc(text) {
                Ok(pc) => pcs.push(pc),
                Err(e) => eprintln!("failed to parse {text}: {e}"),
            }
        }
        pcs
    };

    run_batch(&args, &pcs)
}
