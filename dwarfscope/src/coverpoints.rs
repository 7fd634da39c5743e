// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! Discovery of coverage points: program counters that call the
//! `__sanitizer_cov_trace_*` instrumentation helpers.
//!
//! Relocatable objects are scanned through their `.text` relocations, where
//! the call targets are still symbolic. Linked executables are scanned by
//! walking the `.text` bytes for call opcodes and decoding each candidate's
//! branch target. Running a full disassembler over whole objects would be far
//! too slow for this.

use crate::arch::{arch_spec, ArchSpec};
use crate::{cache, debug, objfile, VirtAddr};
use std::collections::HashSet;
use std::path::Path;

/// Result type shorthand.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Errors that can occur during coverage-point discovery.
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported object file architecture")]
    UnsupportedArch,

    #[error("No `.text` section in the object file")]
    TextSectionNotFound,

    #[error("No `__sanitizer_cov_trace_pc` symbol in the object file")]
    NoTracePcSymbol,

    #[error("objfile error")]
    Objfile(#[from] objfile::Error),
}

const TRACE_PREFIX: &str = "__sanitizer_cov_trace_";
const TRACE_PC: &str = "__sanitizer_cov_trace_pc";

/// Program counters of all coverage trampoline calls in an object, split
/// into plain trace-pc calls and comparison-helper calls.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoverPoints {
    /// PCs calling `__sanitizer_cov_trace_pc`.
    pub trace_pc: Vec<VirtAddr>,
    /// PCs calling one of the `__sanitizer_cov_trace_*` comparison helpers.
    pub trace_cmp: Vec<VirtAddr>,
}

/// What the symbol table tells us about the trace helpers.
struct TracePcInfo {
    trace_pc: VirtAddr,
    trace_cmp: HashSet<VirtAddr>,
    trace_pc_idx: HashSet<usize>,
    trace_cmp_idx: HashSet<usize>,
}

/// Collects trace-helper symbols, keeping both their raw table indices (for
/// relocation matching) and, for symbols defined inside `.text`, their
/// addresses (for decoded-target matching).
fn trace_pc_info(reader: &objfile::Reader<'_>, text: &objfile::Section<'_>) -> Option<TracePcInfo> {
    if !reader.has_symbols() {
        return None;
    }

    let text_range = text.va_range();
    let mut info = TracePcInfo {
        trace_pc: 0,
        trace_cmp: HashSet::new(),
        trace_pc_idx: HashSet::new(),
        trace_cmp_idx: HashSet::new(),
    };

    for sym in reader.symbols() {
        if !sym.name.starts_with(TRACE_PREFIX) {
            continue;
        }
        let defined_in_text =
            sym.addr >= text_range.start && sym.addr + sym.size <= text_range.end;
        if sym.name == TRACE_PC {
            info.trace_pc_idx.insert(sym.index);
            if defined_in_text {
                info.trace_pc = sym.addr;
            }
        } else {
            info.trace_cmp_idx.insert(sym.index);
            if defined_in_text {
                info.trace_cmp.insert(sym.addr);
            }
        }
    }

    Some(info)
}

/// Finds all coverage points in the object at `path`.
///
/// The scan strategy is selected by the presence of `.text` relocations
/// (`.rela.text`): when present the relocations carry the call targets in
/// symbolic form, otherwise the machine code itself is decoded.
pub fn find_all_cover_points(path: &Path) -> Result<CoverPoints> {
    let obj = cache::object_for(path)?;
    let reader = obj.parse()?;

    let arch = reader.arch().ok_or(Error::UnsupportedArch)?;
    let spec = arch_spec(arch);

    let text_relocs = reader.relocations(b".text");
    let has_rela = reader.has_section(b".rela.text")
        || text_relocs.as_ref().is_some_and(|r| !r.is_empty());

    if has_rela {
        scan_relocations(&reader, spec, &text_relocs.unwrap_or_default())
    } else {
        scan_text(&reader, spec)
    }
}

/// Relocation-driven scan for relocatable objects.
fn scan_relocations(
    reader: &objfile::Reader<'_>,
    spec: &ArchSpec,
    relocs: &[objfile::Reloc],
) -> Result<CoverPoints> {
    let text = reader
        .load_section(b".text")?
        .ok_or(Error::TextSectionNotFound)?;
    let info = trace_pc_info(reader, &text);
    if info.is_none() {
        debug!("no symbol table; attributing every call relocation to trace_pc");
    }

    let mut points = CoverPoints::default();
    for reloc in relocs {
        if reloc.r_type != Some(spec.call_reloc) {
            continue;
        }
        let pc = reloc.offset.wrapping_sub(spec.rela_offset);

        match &info {
            Some(info) => match reloc.symbol {
                Some(idx) if info.trace_pc_idx.contains(&idx) => points.trace_pc.push(pc),
                Some(idx) if info.trace_cmp_idx.contains(&idx) => points.trace_cmp.push(pc),
                _ => (),
            },
            // Without a symbol table there is nothing to discriminate on.
            None => points.trace_pc.push(pc),
        }
    }

    Ok(points)
}

/// Opcode-driven scan for linked executables.
fn scan_text(reader: &objfile::Reader<'_>, spec: &ArchSpec) -> Result<CoverPoints> {
    let text = reader
        .load_section(b".text")?
        .ok_or(Error::TextSectionNotFound)?;
    let info = trace_pc_info(reader, &text).ok_or(Error::NoTracePcSymbol)?;
    if info.trace_pc == 0 {
        return Err(Error::NoTracePcSymbol);
    }

    let data: &[u8] = &text;
    let mut points = CoverPoints::default();

    for (i, &opcode) in data.iter().enumerate() {
        if opcode != spec.opcodes[0] && opcode != spec.opcodes[1] {
            continue;
        }
        let Some(start) = i.checked_sub(spec.opcode_offset) else {
            continue;
        };
        if start + spec.call_len > data.len() {
            continue;
        }

        let pc = text.virt_addr() + start as u64;
        let target = (spec.target)(spec, &data[start..start + spec.call_len], pc, opcode);
        if target == info.trace_pc {
            points.trace_pc.push(pc);
        } else if info.trace_cmp.contains(&target) {
            points.trace_cmp.push(pc);
        }
    }

    Ok(points)
}
