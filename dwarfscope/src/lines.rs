// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-unit line-program caches: the file table and the address-keyed map of
//! line entries, with nearest-PC lookup.
//!
//! The DWARF line table does not guarantee a row for every PC, so lookups
//! that miss fall back to the closest preceding row, which is the
//! authoritative source mapping for that address.

use crate::cache::caches;
use crate::dwarf::{self, CompileUnit, Error, Result, R};
use crate::VirtAddr;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One row of the DWARF line program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    /// Program counter of the row.
    pub address: VirtAddr,
    /// Resolved source file path; empty for end-of-sequence rows.
    pub file: String,
    /// Line number, 0 if unknown.
    pub line: u64,
    /// Column number, 0 meaning the left edge.
    pub column: u64,
    /// Recommended breakpoint location flag.
    pub is_stmt: bool,
    /// Marks the first byte past a sequence of instructions.
    pub end_sequence: bool,
}

/// Address-keyed line entries of one unit plus the sorted secondary index
/// used for nearest-PC lookups.
pub(crate) struct LineTable {
    pub(crate) entries: HashMap<VirtAddr, LineEntry>,
    pub(crate) sorted_addrs: Vec<VirtAddr>,
}

/// Builds the resolved file table of a unit.
///
/// Index 0 is the sentinel for "no file" and always maps to the empty string;
/// real files start at index 1. File and directory names are joined into one
/// path, with relative directories anchored at the unit's compilation
/// directory.
pub(crate) fn build_line_files(
    dwarf: &gimli::Dwarf<R<'_>>,
    unit: &gimli::Unit<R<'_>>,
    cu: &CompileUnit,
) -> Result<Vec<String>> {
    let program = unit
        .line_program
        .as_ref()
        .ok_or(Error::MissingLineProgram(cu.offset))?;
    let header = program.header();

    let count = header.file_names().len() as u64;
    let last = if header.encoding().version >= 5 {
        count.saturating_sub(1)
    } else {
        count
    };

    let mut files = vec![String::new()];
    for index in 1..=last {
        let entry = header
            .file(index)
            .ok_or(Error::InvalidFileIndex(index))?;

        let name = dwarf
            .attr_string(unit, entry.path_name())?
            .to_string_lossy()
            .into_owned();
        if name.starts_with('/') {
            files.push(name);
            continue;
        }

        let dir = match entry.directory(header) {
            Some(value) => dwarf
                .attr_string(unit, value)?
                .to_string_lossy()
                .into_owned(),
            None => String::new(),
        };

        let mut full = String::new();
        if !dir.starts_with('/') && !cu.comp_dir.is_empty() {
            full.push_str(&cu.comp_dir);
            if !full.ends_with('/') {
                full.push('/');
            }
        }
        if !dir.is_empty() {
            full.push_str(&dir);
            if !full.ends_with('/') {
                full.push('/');
            }
        }
        full.push_str(&name);
        files.push(full);
    }

    Ok(files)
}

/// Resolves a file index against a unit's file table.
///
/// Index 0 yields an empty string rather than an error: DWARF uses it to mean
/// "no file".
pub(crate) fn filename_by_index(files: &[String], index: u64) -> Result<String> {
    if index == 0 {
        return Ok(String::new());
    }
    files
        .get(index as usize)
        .cloned()
        .ok_or(Error::InvalidFileIndex(index))
}

fn build_line_table(
    unit: &gimli::Unit<R<'_>>,
    cu: &CompileUnit,
    files: &[String],
) -> Result<LineTable> {
    let program = unit
        .line_program
        .clone()
        .ok_or(Error::MissingLineProgram(cu.offset))?;

    let mut entries = HashMap::new();
    let mut rows = program.rows();
    while let Some((_, row)) = rows.next_row()? {
        let entry = if row.end_sequence() {
            LineEntry {
                address: row.address(),
                file: String::new(),
                line: 0,
                column: 0,
                is_stmt: false,
                end_sequence: true,
            }
        } else {
            LineEntry {
                address: row.address(),
                file: filename_by_index(files, row.file_index())?,
                line: row.line().map(|x| x.get()).unwrap_or(0),
                column: match row.column() {
                    gimli::ColumnType::LeftEdge => 0,
                    gimli::ColumnType::Column(x) => x.get(),
                },
                is_stmt: row.is_stmt(),
                end_sequence: false,
            }
        };
        entries.insert(entry.address, entry);
    }

    let mut sorted_addrs: Vec<VirtAddr> = entries.keys().copied().collect();
    sorted_addrs.sort_unstable();

    Ok(LineTable {
        entries,
        sorted_addrs,
    })
}

/// Cached line table of a unit.
pub(crate) fn table_for(path: &Path, cu: &CompileUnit) -> Result<Arc<LineTable>> {
    caches()
        .line_tables
        .get_or_try_insert_with((path.to_path_buf(), cu.offset), || {
            let handle = dwarf::handle_for(path)?;
            let ctx = handle.context()?;
            let unit = ctx.unit_at(cu.offset)?;
            let files = caches().line_files.get_or_try_insert_with(
                (path.to_path_buf(), cu.offset),
                || build_line_files(&ctx.dwarf, &unit, cu),
            )?;
            build_line_table(&unit, cu, &files)
        })
}

/// Finds the line entry for `pc`, falling back to the closest preceding row.
pub fn line_entry_by_addr(path: &Path, pc: VirtAddr) -> Result<LineEntry> {
    let cu = dwarf::compile_unit_by_addr(path, pc)?;
    let table = table_for(path, &cu)?;

    if let Some(entry) = table.entries.get(&pc) {
        return Ok(entry.clone());
    }

    let idx = table.sorted_addrs.partition_point(|&addr| addr <= pc);
    if idx == 0 {
        return Err(Error::NoLineEntryForAddress(pc));
    }
    let addr = table.sorted_addrs[idx - 1];
    Ok(table.entries[&addr].clone())
}

/// Collects every distinct line-program address of the file, sorted.
pub(crate) fn all_line_addrs(path: &Path) -> Result<Vec<VirtAddr>> {
    let cus = dwarf::find_all_compile_units(path)?;
    let mut pcs = Vec::new();
    for cu in cus.iter() {
        let table = table_for(path, cu)?;
        pcs.extend_from_slice(&table.sorted_addrs);
    }
    pcs.sort_unstable();
    pcs.dedup();
    Ok(pcs)
}
