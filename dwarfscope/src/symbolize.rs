// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! Address-to-frame assembly: splices the line table with the
//! inlined-subroutine tree into an inline-expanded backtrace.

use crate::{coverpoints, dwarf, lines, VirtAddr};
use std::path::Path;

/// Result type shorthand.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the symbolization entry points.
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("DWARF error: {}", .0)]
    Dwarf(#[from] dwarf::Error),

    #[error("coverage scan error: {}", .0)]
    Coverpoints(#[from] coverpoints::Error),
}

/// One frame of an inline-expanded backtrace.
///
/// Frames are ordered innermost first: the deepest inlined callee leads, the
/// physical function closes the list. Each frame names the function executing
/// at that level, while its file and line describe the call site of the next
/// inlined level (for the innermost frame: the exact source line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The queried PC for the innermost frame; the entry offset of the
    /// corresponding DWARF record for the others.
    pub pc: VirtAddr,
    /// Function name, `"??"` when the address resolves to no subprogram.
    pub func: String,
    /// Source file.
    pub file: String,
    /// Line number.
    pub line: u64,
    /// Whether the function at this level was inlined.
    pub inline: bool,
}

/// Resolves a PC to its inline backtrace, innermost frame first.
pub fn addr2line(path: &Path, pc: VirtAddr) -> Result<Vec<Frame>> {
    let cu = dwarf::compile_unit_by_addr(path, pc)?;

    let mut frames = Vec::new();
    if let Some(sp) = dwarf::subprogram_by_addr(path, pc)? {
        frames.push(Frame {
            pc: sp.offset,
            func: sp.name.clone(),
            file: sp.decl_file.clone(),
            line: sp.decl_line,
            inline: sp.inline,
        });

        let subroutines = dwarf::subroutines_by_subprogram(path, &cu, &sp)?;
        for sub in subroutines.iter() {
            if sub.ranges_contain(pc) {
                frames.push(Frame {
                    pc: sub.offset,
                    func: sub.name.clone(),
                    file: sub.call_file.clone(),
                    line: sub.call_line,
                    inline: true,
                });
            }
        }
    }

    // Deeper entries have higher offsets, so this puts the innermost
    // inline instance first and the physical subprogram last.
    frames.sort_by(|a, b| b.pc.cmp(&a.pc));

    let entry = lines::line_entry_by_addr(path, pc)?;
    frames.insert(
        0,
        Frame {
            pc,
            func: String::new(),
            file: entry.file,
            line: entry.line,
            inline: false,
        },
    );

    // The line entry knows the exact location inside the deepest function;
    // each subroutine entry knows the call site of the level below it.
    // Pairing every location with the name (and inline flag) of the next
    // level, then dropping the last frame, yields the standard backtrace.
    for i in 0..frames.len() - 1 {
        frames[i].func = frames[i + 1].func.clone();
        frames[i].inline = frames[i + 1].inline;
    }

    if frames.len() == 1 {
        frames[0].func = "??".into();
        return Ok(frames);
    }
    frames.pop();

    Ok(frames)
}

/// Enumerates program counters of the object.
///
/// With `filter_trace_pcs` set, only coverage-instrumented PCs (both helper
/// classes) are returned; otherwise every distinct line-program address is.
/// The result is sorted ascending.
pub fn find_all_pcs(path: &Path, filter_trace_pcs: bool) -> Result<Vec<VirtAddr>> {
    if filter_trace_pcs {
        let points = coverpoints::find_all_cover_points(path)?;
        let mut pcs = points.trace_pc;
        pcs.extend_from_slice(&points.trace_cmp);
        pcs.sort_unstable();
        Ok(pcs)
    } else {
        Ok(lines::all_line_addrs(path)?)
    }
}
