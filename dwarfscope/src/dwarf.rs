// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! DWARF traversal: compile-unit index and subprogram / inlined-subroutine
//! parsing.
//!
//! All query results are plain owned records ([`CompileUnit`], [`Func`])
//! detached from the underlying [`gimli`] reader types, which makes them
//! cacheable process-wide and shareable across threads. The gimli view of a
//! file is rebuilt on demand from the cached [`Handle`]; that is cheap since
//! the expensive products (decompressed sections, derived indices) are all
//! memoised.

// Compiler complains about using the gimli constants in match patterns.
#![allow(non_upper_case_globals)]

use crate::cache::{self, caches};
use crate::{debug, lines, objfile, AnyError, VirtAddr};
use gimli::constants::*;
use gimli::AttributeValue as AV;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Shorthand for the [`gimli`] reader type that we use everywhere.
///
/// Until BE binaries come back into favor we simply hard-code LE at
/// compile time, getting rid of a ton of unnecessary branching.
pub(crate) type R<'dwarf> = gimli::EndianSlice<'dwarf, gimli::LittleEndian>;

/// Result type shorthand.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Errors that can occur during DWARF parsing.
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Reader currently doesn't support big endian binaries")]
    BigEndian,

    #[error("Object has no `.debug_info` data")]
    MissingDebugInfo,

    #[error("Found unexpected tag {} on top level", .0)]
    UnexpectedTopLevelTag(gimli::DwTag),

    #[error("Inlined subroutine lacks the required `{}` attribute", .0)]
    MissingCallAttr(&'static str),

    #[error("File contains an invalid file index value `{}`", .0)]
    InvalidFileIndex(u64),

    #[error("Unit at offset {:#x} has no line program", .0)]
    MissingLineProgram(u64),

    #[error("No unit starts at offset {:#x}", .0)]
    BadUnitOffset(u64),

    #[error("No compile unit covers address {:#x}", .0)]
    NoUnitForAddress(VirtAddr),

    #[error("No line entry found for address {:#x}", .0)]
    NoLineEntryForAddress(VirtAddr),

    #[error("objfile error")]
    Objfile(#[from] objfile::Error),

    #[error(transparent)]
    Other(AnyError),
}

/// Conversion of [`gimli`] errors into ours.
///
/// We erase the type here to prevent leaking [`gimli`] library types into our
/// public interface. If code needs to special-case based on particular gimli
/// errors, we should instead lift them into custom error variants.
impl From<gimli::Error> for Error {
    fn from(e: gimli::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

/// Cached per-file DWARF handle: the mapped object plus its (possibly
/// decompressed) debug sections, decoupled from the object's section table.
pub struct Handle {
    obj: Arc<objfile::File>,
    sections: gimli::DwarfSections<objfile::SectionSlot>,
}

impl Handle {
    fn load(obj: Arc<objfile::File>) -> Result<Self> {
        let mut has_debug_info = false;

        let sections = {
            let reader = obj.parse()?;
            if !reader.is_little_endian() {
                return Err(Error::BigEndian);
            }

            gimli::DwarfSections::load(|id| {
                let slot = reader.section_slot(id.name().as_bytes())?;
                if id == gimli::SectionId::DebugInfo && !slot.is_empty() {
                    has_debug_info = true;
                }
                Ok::<_, objfile::Error>(slot)
            })?
        };

        if !has_debug_info {
            return Err(Error::MissingDebugInfo);
        }

        Ok(Handle { obj, sections })
    }

    /// Builds the borrowed gimli view for one query.
    pub(crate) fn context(&self) -> Result<Context<'_>> {
        let dwarf = self
            .sections
            .borrow(|slot| R::new(self.obj.slot_bytes(slot), gimli::LittleEndian));

        let mut headers = Vec::new();
        let mut iter = dwarf.units();
        while let Some(header) = iter.next()? {
            headers.push(header);
        }

        Ok(Context { dwarf, headers })
    }
}

/// Opens (or re-uses) the DWARF handle for `path`.
pub(crate) fn handle_for(path: &Path) -> Result<Arc<Handle>> {
    caches()
        .dwarf
        .get_or_try_insert_with(path.to_path_buf(), || {
            Handle::load(cache::object_for(path)?)
        })
}

/// Borrowed view of a [`Handle`] used while serving a single query.
pub(crate) struct Context<'h> {
    pub(crate) dwarf: gimli::Dwarf<R<'h>>,
    headers: Vec<gimli::UnitHeader<R<'h>>>,
}

/// Unwraps the start offset of a unit into a generic [`u64`].
fn unit_start(header: &gimli::UnitHeader<R<'_>>) -> u64 {
    header
        .offset()
        .as_debug_info_offset()
        .expect("we only collect units from .debug_info")
        .0 as u64
}

impl<'h> Context<'h> {
    pub(crate) fn headers(&self) -> &[gimli::UnitHeader<R<'h>>] {
        &self.headers
    }

    /// Decodes the unit whose header starts at the given `.debug_info` offset.
    pub(crate) fn unit_at(&self, offset: u64) -> Result<gimli::Unit<R<'h>>> {
        let header = self
            .headers
            .binary_search_by_key(&offset, unit_start)
            .map(|idx| &self.headers[idx])
            .map_err(|_| Error::BadUnitOffset(offset))?;

        Ok(self.dwarf.unit(*header)?)
    }
}

/// One `.debug_info` compile unit with executable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileUnit {
    /// Source path of the unit (`DW_AT_name`).
    pub name: String,
    /// Compilation directory (`DW_AT_comp_dir`), empty if absent.
    pub comp_dir: String,
    /// Half-open PC ranges covered by the unit. Never empty.
    pub ranges: Vec<Range<VirtAddr>>,
    /// `.debug_info` offset of the unit header.
    pub offset: u64,
}

/// Distinguishes the two function-like DWARF entries we materialise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    /// `DW_TAG_subprogram`: a physical function.
    Subprogram,
    /// `DW_TAG_inlined_subroutine`: an inlined instance with a call site.
    InlinedSubroutine,
}

/// Function record extracted from the entry tree of a compile unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Func {
    /// Which DWARF tag this record was parsed from.
    pub kind: FuncKind,
    /// Function name, resolved through `DW_AT_abstract_origin` if needed.
    pub name: String,
    /// Half-open PC ranges. Records with no ranges are dropped from listings.
    pub ranges: Vec<Range<VirtAddr>>,
    /// Declaration file, empty if unknown.
    pub decl_file: String,
    /// Declaration line, 0 if unknown.
    pub decl_line: u64,
    /// Call-site file (inlined subroutines only).
    pub call_file: String,
    /// Call-site line (inlined subroutines only).
    pub call_line: u64,
    /// Call-site column, 0 if absent.
    pub call_column: u64,
    /// Whether this is an inline instance (always true for subroutines; true
    /// for subprograms carrying `DW_AT_inline`).
    pub inline: bool,
    /// Global `.debug_info` offset of the entry.
    pub offset: u64,
    /// `.debug_info` offset of the owning unit header.
    pub unit: u64,
    /// Nesting depth within the unit tree; subprograms sit at depth 1.
    pub depth: u64,
}

impl Func {
    /// Checks whether `pc` falls into the convex hull of the PC ranges.
    ///
    /// Holes between ranges are deliberately accepted; see the containing
    /// module documentation for the trade-off.
    pub fn hull_contains(&self, pc: VirtAddr) -> bool {
        match (self.ranges.first(), self.ranges.last()) {
            (Some(first), Some(last)) => first.start <= pc && pc < last.end,
            _ => false,
        }
    }

    /// Checks whether any individual PC range contains `pc`.
    pub fn ranges_contain(&self, pc: VirtAddr) -> bool {
        self.ranges.iter().any(|r| r.contains(&pc))
    }
}

/// Lists all compile units of the file that contribute executable code.
///
/// Units without a name or without PC ranges are skipped. Any non
/// `DW_TAG_compile_unit` entry on the top level is treated as a malformed
/// file. The result is sorted by unit offset and cached per path.
pub fn find_all_compile_units(path: &Path) -> Result<Arc<Vec<CompileUnit>>> {
    caches()
        .units
        .get_or_try_insert_with(path.to_path_buf(), || {
            let handle = handle_for(path)?;
            let ctx = handle.context()?;
            collect_compile_units(&ctx)
        })
}

fn collect_compile_units(ctx: &Context<'_>) -> Result<Vec<CompileUnit>> {
    let mut units = Vec::with_capacity(ctx.headers().len());

    for header in ctx.headers() {
        let offset = unit_start(header);
        let unit = ctx.dwarf.unit(*header)?;

        let mut cursor = unit.entries();
        let Some((_, root)) = cursor.next_dfs()? else {
            continue;
        };
        if root.tag() != DW_TAG_compile_unit {
            return Err(Error::UnexpectedTopLevelTag(root.tag()));
        }

        let Some(name) = unit.name else {
            debug!("skipping unnamed unit @ {offset:#x}");
            continue;
        };
        let name = name.to_string_lossy().into_owned();
        let comp_dir = unit
            .comp_dir
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut ranges = Vec::new();
        let mut iter = ctx.dwarf.unit_ranges(&unit)?;
        while let Some(range) = iter.next()? {
            if range.begin < range.end {
                ranges.push(range.begin..range.end);
            }
        }
        if ranges.is_empty() {
            continue;
        }

        units.push(CompileUnit {
            name,
            comp_dir,
            ranges,
            offset,
        });
    }

    units.sort_by_key(|cu| cu.offset);
    Ok(units)
}

/// Locates the compile unit whose PC ranges contain the given address.
pub fn compile_unit_by_addr(path: &Path, pc: VirtAddr) -> Result<CompileUnit> {
    let cus = find_all_compile_units(path)?;

    let mut ranges: Vec<(VirtAddr, VirtAddr, usize)> = Vec::new();
    for (idx, cu) in cus.iter().enumerate() {
        for r in &cu.ranges {
            ranges.push((r.start, r.end, idx));
        }
    }
    ranges.sort_unstable_by_key(|&(_, end, _)| end);

    let idx = ranges.partition_point(|&(start, _, _)| start <= pc);
    if idx == 0 {
        return Err(Error::NoUnitForAddress(pc));
    }
    let (start, end, cu_idx) = ranges[idx - 1];
    if !(start <= pc && pc < end) {
        return Err(Error::NoUnitForAddress(pc));
    }

    Ok(cus[cu_idx].clone())
}

/// Per-unit parsing context. The file table is resolved lazily because many
/// entries never reference one.
struct UnitCtx<'a, 'h> {
    path: &'a Path,
    dwarf: &'a gimli::Dwarf<R<'h>>,
    unit: &'a gimli::Unit<R<'h>>,
    cu: &'a CompileUnit,
    files: Option<Arc<Vec<String>>>,
}

impl<'a, 'h> UnitCtx<'a, 'h> {
    fn new(
        path: &'a Path,
        dwarf: &'a gimli::Dwarf<R<'h>>,
        unit: &'a gimli::Unit<R<'h>>,
        cu: &'a CompileUnit,
    ) -> Self {
        UnitCtx {
            path,
            dwarf,
            unit,
            cu,
            files: None,
        }
    }

    fn filename_by_index(&mut self, index: u64) -> Result<String> {
        if self.files.is_none() {
            let files = caches().line_files.get_or_try_insert_with(
                (self.path.to_path_buf(), self.cu.offset),
                || lines::build_line_files(self.dwarf, self.unit, self.cu),
            )?;
            self.files = Some(files);
        }

        let files = self.files.as_ref().expect("just initialised");
        lines::filename_by_index(files, index)
    }

    fn die_ranges(
        &self,
        entry: &gimli::DebuggingInformationEntry<'_, '_, R<'h>>,
    ) -> Result<Vec<Range<VirtAddr>>> {
        let mut out = Vec::new();
        let mut iter = self.dwarf.die_ranges(self.unit, entry)?;
        while let Some(range) = iter.next()? {
            if range.begin < range.end {
                out.push(range.begin..range.end);
            }
        }
        Ok(out)
    }

    /// Global `.debug_info` offset of a DIE within this unit.
    fn global_offset(&self, entry: &gimli::DebuggingInformationEntry<'_, '_, R<'h>>) -> u64 {
        self.cu.offset + entry.offset().0 as u64
    }

    fn attr_str(&self, value: AV<R<'h>>) -> Option<String> {
        self.dwarf
            .attr_string(self.unit, value)
            .ok()
            .map(|x| x.to_string_lossy().into_owned())
    }
}

/// Extracts a file-table index from an attribute value.
fn file_index(value: AV<R<'_>>) -> Option<u64> {
    match value {
        AV::FileIndex(idx) => Some(idx),
        other => other.udata_value(),
    }
}

/// Resolves an abstract-origin reference to `(name, decl_file_index)`.
///
/// References are followed exactly once, never transitively. Cross-unit
/// references contribute nothing; the caller then falls back to the concrete
/// entry's own attributes.
fn resolve_origin(
    ucx: &UnitCtx<'_, '_>,
    value: AV<R<'_>>,
) -> Result<Option<(Option<String>, Option<u64>)>> {
    let offset = match value {
        AV::UnitRef(offset) => Some(offset),
        AV::DebugInfoRef(offset) => offset.to_unit_offset(&ucx.unit.header),
        _ => None,
    };
    let Some(offset) = offset else {
        return Ok(None);
    };

    let entry = ucx.unit.entry(offset)?;
    let mut name = None;
    let mut decl_file = None;

    let mut attrs = entry.attrs();
    while let Some(attr) = attrs.next()? {
        match attr.name() {
            DW_AT_name => name = ucx.attr_str(attr.value()),
            DW_AT_decl_file => decl_file = file_index(attr.value()),
            _ => (),
        }
    }

    Ok(Some((name, decl_file)))
}

/// Attributes shared by subprograms and inlined subroutines.
#[derive(Default)]
struct CommonAttrs {
    name: Option<String>,
    origin_name: Option<String>,
    origin_file: Option<u64>,
    decl_file: Option<u64>,
    decl_line: u64,
    inline: bool,
}

impl CommonAttrs {
    /// Resolves the declaration file the way the name is resolved: the origin
    /// wins if it yields something, the concrete entry is the fallback.
    fn resolve_decl_file(&self, ucx: &mut UnitCtx<'_, '_>) -> Result<String> {
        let mut decl_file = match self.origin_file {
            Some(idx) => ucx.filename_by_index(idx)?,
            None => String::new(),
        };
        if decl_file.is_empty() {
            if let Some(idx) = self.decl_file {
                decl_file = ucx.filename_by_index(idx)?;
            }
        }
        Ok(decl_file)
    }

    fn resolve_name(self) -> Option<String> {
        self.origin_name.or(self.name)
    }
}

fn common_attrs<'h>(
    ucx: &UnitCtx<'_, 'h>,
    entry: &gimli::DebuggingInformationEntry<'_, '_, R<'h>>,
) -> Result<CommonAttrs> {
    let mut out = CommonAttrs::default();
    let mut origin = None;

    let mut attrs = entry.attrs();
    while let Some(attr) = attrs.next()? {
        match attr.name() {
            DW_AT_name => out.name = ucx.attr_str(attr.value()),
            DW_AT_abstract_origin => origin = Some(attr.value()),
            DW_AT_decl_file => out.decl_file = file_index(attr.value()),
            DW_AT_decl_line => out.decl_line = attr.value().udata_value().unwrap_or(0),
            DW_AT_inline => out.inline = true,
            _ => (),
        }
    }

    if let Some(origin) = origin {
        if let Some((name, file)) = resolve_origin(ucx, origin)? {
            out.origin_name = name;
            out.origin_file = file;
        }
    }

    Ok(out)
}

/// Parses a `DW_TAG_subprogram` entry into a [`Func`].
///
/// Returns [`None`] when no name is reachable, which the callers treat as
/// "drop this entry".
fn parse_subprogram<'h>(
    ucx: &mut UnitCtx<'_, 'h>,
    entry: &gimli::DebuggingInformationEntry<'_, '_, R<'h>>,
    depth: u64,
) -> Result<Option<Func>> {
    let attrs = common_attrs(ucx, entry)?;
    let decl_file = attrs.resolve_decl_file(ucx)?;
    let ranges = ucx.die_ranges(entry)?;
    let offset = ucx.global_offset(entry);
    let decl_line = attrs.decl_line;
    let inline = attrs.inline;

    let Some(name) = attrs.resolve_name() else {
        return Ok(None);
    };

    Ok(Some(Func {
        kind: FuncKind::Subprogram,
        name,
        ranges,
        decl_file,
        decl_line,
        call_file: String::new(),
        call_line: 0,
        call_column: 0,
        inline,
        offset,
        unit: ucx.cu.offset,
        depth,
    }))
}

/// Parses a `DW_TAG_inlined_subroutine` entry into a [`Func`].
///
/// `DW_AT_call_file` and `DW_AT_call_line` are required; their absence marks
/// the entry as malformed. `DW_AT_call_column` defaults to 0.
fn parse_subroutine<'h>(
    ucx: &mut UnitCtx<'_, 'h>,
    entry: &gimli::DebuggingInformationEntry<'_, '_, R<'h>>,
    depth: u64,
) -> Result<Option<Func>> {
    let mut call_file_idx = None;
    let mut call_line = None;
    let mut call_column = 0;

    let mut attrs_iter = entry.attrs();
    while let Some(attr) = attrs_iter.next()? {
        match attr.name() {
            DW_AT_call_file => call_file_idx = file_index(attr.value()),
            DW_AT_call_line => call_line = attr.value().udata_value(),
            DW_AT_call_column => call_column = attr.value().udata_value().unwrap_or(0),
            _ => (),
        }
    }

    let call_file_idx = call_file_idx.ok_or(Error::MissingCallAttr("DW_AT_call_file"))?;
    let call_line = call_line.ok_or(Error::MissingCallAttr("DW_AT_call_line"))?;
    let call_file = ucx.filename_by_index(call_file_idx)?;

    let attrs = common_attrs(ucx, entry)?;
    let decl_file = attrs.resolve_decl_file(ucx)?;
    let ranges = ucx.die_ranges(entry)?;
    let offset = ucx.global_offset(entry);
    let decl_line = attrs.decl_line;

    let Some(name) = attrs.resolve_name() else {
        return Ok(None);
    };

    Ok(Some(Func {
        kind: FuncKind::InlinedSubroutine,
        name,
        ranges,
        decl_file,
        decl_line,
        call_file,
        call_line,
        call_column,
        inline: true,
        offset,
        unit: ucx.cu.offset,
        depth,
    }))
}

/// Streams one unit's subtree in pre-order, collecting every subprogram and
/// inlined subroutine with its nesting depth. Lexical blocks and all other
/// tags still contribute to depth accounting but are not emitted.
fn collect_unit_funcs(ucx: &mut UnitCtx<'_, '_>) -> Result<Vec<Func>> {
    let mut funcs = Vec::new();
    let mut cursor = ucx.unit.entries();
    let mut depth: isize = 0;

    // Skip the unit root itself.
    if cursor.next_dfs()?.is_none() {
        return Ok(funcs);
    }

    while let Some((delta, entry)) = cursor.next_dfs()? {
        depth += delta;
        match entry.tag() {
            DW_TAG_subprogram => {
                if let Some(f) = parse_subprogram(ucx, entry, depth.max(0) as u64)? {
                    funcs.push(f);
                }
            }
            DW_TAG_inlined_subroutine => {
                // An inlined subroutine without an abstract origin carries no
                // usable identity; skip it like the rest of the tree noise.
                if entry.attr_value(DW_AT_abstract_origin)?.is_some() {
                    if let Some(f) = parse_subroutine(ucx, entry, depth.max(0) as u64)? {
                        funcs.push(f);
                    }
                }
            }
            _ => (),
        }
    }

    funcs.retain(|f| !f.ranges.is_empty());
    Ok(funcs)
}

/// Cached per-unit function listing.
pub(crate) fn funcs_for_unit(path: &Path, cu: &CompileUnit) -> Result<Arc<Vec<Func>>> {
    caches()
        .unit_funcs
        .get_or_try_insert_with((path.to_path_buf(), cu.offset), || {
            let handle = handle_for(path)?;
            let ctx = handle.context()?;
            let unit = ctx.unit_at(cu.offset)?;
            let mut ucx = UnitCtx::new(path, &ctx.dwarf, &unit, cu);
            collect_unit_funcs(&mut ucx)
        })
}

/// Lists the functions of the compile unit covering `pc`.
pub fn find_all_funcs_by_addr(path: &Path, pc: VirtAddr) -> Result<Arc<Vec<Func>>> {
    let cu = compile_unit_by_addr(path, pc)?;
    funcs_for_unit(path, &cu)
}

/// Lists every subprogram and inlined subroutine in the file.
///
/// Units are parsed in parallel, one work item per unit, but the result is
/// deterministic: per-unit sequences are concatenated in unit-offset order,
/// and within each unit the DWARF pre-order is preserved. The first worker
/// error aborts the whole operation.
pub fn find_all_funcs(path: &Path) -> Result<Arc<Vec<Func>>> {
    caches()
        .funcs
        .get_or_try_insert_with(path.to_path_buf(), || {
            let cus = find_all_compile_units(path)?;
            let handle = handle_for(path)?;
            let ctx = handle.context()?;

            let workers = thread::available_parallelism()
                .map(|x| x.get())
                .unwrap_or(1)
                .min(cus.len().max(1));
            let next = AtomicUsize::new(0);
            let slots: Mutex<Vec<Option<Result<Vec<Func>>>>> =
                Mutex::new((0..cus.len()).map(|_| None).collect());

            thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(cu) = cus.get(i) else {
                            break;
                        };

                        let result = (|| {
                            let unit = ctx.unit_at(cu.offset)?;
                            let mut ucx = UnitCtx::new(path, &ctx.dwarf, &unit, cu);
                            collect_unit_funcs(&mut ucx)
                        })();

                        let failed = result.is_err();
                        slots.lock().expect("worker lock poisoned")[i] = Some(result);
                        if failed {
                            break;
                        }
                    });
                }
            });

            let slots = slots.into_inner().expect("worker lock poisoned");
            let mut funcs = Vec::new();
            let mut first_err = None;
            for (cu, slot) in cus.iter().zip(slots) {
                match slot {
                    Some(Ok(cu_funcs)) if first_err.is_none() => {
                        let shared = caches()
                            .unit_funcs
                            .insert_if_absent((path.to_path_buf(), cu.offset), Arc::new(cu_funcs));
                        funcs.extend(shared.iter().cloned());
                    }
                    Some(Err(e)) if first_err.is_none() => first_err = Some(e),
                    _ => (),
                }
            }

            match first_err {
                Some(e) => Err(e),
                None => Ok(funcs),
            }
        })
}

/// Finds the subprogram whose range hull contains `pc` within the unit
/// covering that address. Returns [`None`] if the unit has no such
/// subprogram (e.g. padding between functions).
pub fn subprogram_by_addr(path: &Path, pc: VirtAddr) -> Result<Option<Func>> {
    let funcs = find_all_funcs_by_addr(path, pc)?;
    Ok(funcs
        .iter()
        .find(|f| f.kind == FuncKind::Subprogram && f.hull_contains(pc))
        .cloned())
}

/// Lists the inlined subroutines nested (possibly through lexical blocks)
/// inside the given subprogram, in pre-order. Cached per
/// `(path, unit, subprogram)`.
pub fn subroutines_by_subprogram(
    path: &Path,
    cu: &CompileUnit,
    sp: &Func,
) -> Result<Arc<Vec<Func>>> {
    caches()
        .subroutines
        .get_or_try_insert_with((path.to_path_buf(), cu.offset, sp.offset), || {
            let handle = handle_for(path)?;
            let ctx = handle.context()?;
            let unit = ctx.unit_at(cu.offset)?;
            let mut ucx = UnitCtx::new(path, &ctx.dwarf, &unit, cu);
            collect_subroutines(&mut ucx, sp)
        })
}

fn collect_subroutines(ucx: &mut UnitCtx<'_, '_>, sp: &Func) -> Result<Vec<Func>> {
    let unit_offset = gimli::UnitOffset((sp.offset - ucx.cu.offset) as usize);
    let mut cursor = ucx.unit.entries_at_offset(unit_offset)?;

    // First entry is the subprogram itself.
    if cursor.next_dfs()?.is_none() {
        return Ok(Vec::new());
    }

    let mut funcs = Vec::new();
    let mut rel: isize = 0;
    while let Some((delta, entry)) = cursor.next_dfs()? {
        rel += delta;
        if rel <= 0 {
            break;
        }
        match entry.tag() {
            // A nested subprogram starts a new physical function; its inline
            // tree belongs to it, not to `sp`.
            DW_TAG_subprogram => break,
            DW_TAG_inlined_subroutine => {
                if entry.attr_value(DW_AT_abstract_origin)?.is_some() {
                    let depth = sp.depth + rel as u64;
                    if let Some(f) = parse_subroutine(ucx, entry, depth)? {
                        if !f.ranges.is_empty() {
                            funcs.push(f);
                        }
                    }
                }
            }
            _ => (),
        }
    }

    Ok(funcs)
}
