// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixture builders: small ELF objects synthesized in memory with
//! `gimli::write` / `object::write` and dropped into a temp dir.

#![allow(dead_code)]

use gimli::write::{Address, AttributeValue, DwarfUnit, EndianVec, LineProgram, LineString, Sections};
use gimli::{Encoding, Format, LineEncoding, LittleEndian};
use object::write::{Object, Relocation, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, RelocationFlags, SectionKind, SymbolFlags, SymbolKind,
    SymbolScope,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// Writes fixture bytes into a fresh temp dir; keep the guard alive while the
/// file is in use.
pub fn write_fixture(name: &str, bytes: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    (dir, path)
}

/// x86-64 object whose `.text` carries direct calls into the trace helpers
/// and no relocations, forcing the opcode-scan path.
///
/// Layout (`.text` at VA 0):
///   0x00b: e8 f0 00 00 00    call 0x100   <__sanitizer_cov_trace_pc>
///   0x020: e8 1b 01 00 00    call 0x140   <__sanitizer_cov_trace_cmp4>
///   0x030: e8 cb 00 00 00    call 0x100   <__sanitizer_cov_trace_pc>
pub fn x86_call_object() -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);

    let mut code = vec![0x90u8; 0x200];
    code[0x0b..0x10].copy_from_slice(&[0xe8, 0xf0, 0x00, 0x00, 0x00]);
    code[0x20..0x25].copy_from_slice(&[0xe8, 0x1b, 0x01, 0x00, 0x00]);
    code[0x30..0x35].copy_from_slice(&[0xe8, 0xcb, 0x00, 0x00, 0x00]);
    code[0x100] = 0xc3;
    code[0x140] = 0xc3;
    obj.append_section_data(text, &code, 16);

    for (name, value) in [
        ("__sanitizer_cov_trace_pc", 0x100),
        ("__sanitizer_cov_trace_cmp4", 0x140),
    ] {
        obj.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value,
            size: 8,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
    }

    obj.write().unwrap()
}

/// AArch64 object without relocations whose `.text` carries `BL`
/// instructions, forcing the opcode-scan path.
///
/// Layout (`.text` at VA 0):
///   0x010: 3c 00 00 94    bl 0x100   <__sanitizer_cov_trace_pc>
///   0x020: 38 00 00 94    bl 0x100   <__sanitizer_cov_trace_pc>
///   0x030: 44 00 00 94    bl 0x140   <__sanitizer_cov_trace_cmp4>
pub fn aarch64_call_object() -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Aarch64, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);

    let mut code = vec![0u8; 0x200];
    code[0x10..0x14].copy_from_slice(&[0x3c, 0x00, 0x00, 0x94]);
    code[0x20..0x24].copy_from_slice(&[0x38, 0x00, 0x00, 0x94]);
    code[0x30..0x34].copy_from_slice(&[0x44, 0x00, 0x00, 0x94]);
    // ret
    code[0x100..0x104].copy_from_slice(&[0xc0, 0x03, 0x5f, 0xd6]);
    code[0x140..0x144].copy_from_slice(&[0xc0, 0x03, 0x5f, 0xd6]);
    obj.append_section_data(text, &code, 4);

    for (name, value) in [
        ("__sanitizer_cov_trace_pc", 0x100),
        ("__sanitizer_cov_trace_cmp4", 0x140),
    ] {
        obj.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value,
            size: 8,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
    }

    obj.write().unwrap()
}

/// AArch64 relocatable object with one `R_AARCH64_CALL26` against an
/// undefined `__sanitizer_cov_trace_pc` at `r_offset` 0x34, plus one non-call
/// relocation that must be ignored.
pub fn aarch64_rela_object() -> Vec<u8> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Aarch64, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    obj.append_section_data(text, &vec![0u8; 0x100], 4);

    let trace_pc = obj.add_symbol(Symbol {
        name: b"__sanitizer_cov_trace_pc".to_vec(),
        value: 0,
        size: 0,
        kind: SymbolKind::Text,
        scope: SymbolScope::Unknown,
        weak: false,
        section: SymbolSection::Undefined,
        flags: SymbolFlags::None,
    });

    obj.add_relocation(
        text,
        Relocation {
            offset: 0x34,
            symbol: trace_pc,
            addend: 0,
            flags: RelocationFlags::Elf {
                r_type: object::elf::R_AARCH64_CALL26,
            },
        },
    )
    .unwrap();
    obj.add_relocation(
        text,
        Relocation {
            offset: 0x50,
            symbol: trace_pc,
            addend: 0,
            flags: RelocationFlags::Elf {
                r_type: object::elf::R_AARCH64_ABS64,
            },
        },
    )
    .unwrap();

    obj.write().unwrap()
}

/// x86-64 object carrying a DWARF 4 unit with this shape:
///
/// ```text
/// DW_TAG_compile_unit        "a.c", comp_dir "/src", [0x1000, 0x1200)
///   DW_TAG_subprogram        abstract "middle"  (DW_AT_inline)
///   DW_TAG_subprogram        abstract "inner"   (DW_AT_inline)
///   DW_TAG_subprogram        "outer"  [0x1000, 0x1100), decl a.c:3
///     DW_TAG_inlined_subroutine  -> "middle" [0x1040, 0x1080), call a.c:10
///       DW_TAG_lexical_block
///         DW_TAG_inlined_subroutine  -> "inner" [0x1050, 0x1070), call a.c:20
///   DW_TAG_subprogram        "undefined_helper" (declaration, no ranges)
/// ```
///
/// Line rows: 0x1000 a.c:5, 0x1058 b.c:42, 0x1100 a.c:50, end at 0x1200.
pub fn inline_dwarf_object() -> Vec<u8> {
    let encoding = Encoding {
        format: Format::Dwarf32,
        version: 4,
        address_size: 8,
    };
    let mut dwarf = DwarfUnit::new(encoding);

    let mut program = LineProgram::new(
        encoding,
        LineEncoding::default(),
        LineString::String(b"/src".to_vec()),
        LineString::String(b"a.c".to_vec()),
        None,
    );
    let dir = program.default_directory();
    let file_a = program.add_file(LineString::String(b"a.c".to_vec()), dir, None);
    let file_b = program.add_file(LineString::String(b"b.c".to_vec()), dir, None);

    program.begin_sequence(Some(Address::Constant(0x1000)));
    for (offset, file, line) in [(0u64, file_a, 5u64), (0x58, file_b, 42), (0x100, file_a, 50)] {
        program.row().address_offset = offset;
        program.row().file = file;
        program.row().line = line;
        program.generate_row();
    }
    program.end_sequence(0x200);
    dwarf.unit.line_program = program;

    let root = dwarf.unit.root();
    {
        let cu = dwarf.unit.get_mut(root);
        cu.set(gimli::DW_AT_name, AttributeValue::String(b"a.c".to_vec()));
        cu.set(
            gimli::DW_AT_comp_dir,
            AttributeValue::String(b"/src".to_vec()),
        );
        cu.set(
            gimli::DW_AT_low_pc,
            AttributeValue::Address(Address::Constant(0x1000)),
        );
        cu.set(gimli::DW_AT_high_pc, AttributeValue::Udata(0x200));
    }

    let abs_middle = dwarf.unit.add(root, gimli::DW_TAG_subprogram);
    {
        let die = dwarf.unit.get_mut(abs_middle);
        die.set(
            gimli::DW_AT_name,
            AttributeValue::String(b"middle".to_vec()),
        );
        die.set(gimli::DW_AT_decl_file, AttributeValue::FileIndex(Some(file_a)));
        die.set(gimli::DW_AT_decl_line, AttributeValue::Udata(8));
        die.set(
            gimli::DW_AT_inline,
            AttributeValue::Inline(gimli::DW_INL_inlined),
        );
    }

    let abs_inner = dwarf.unit.add(root, gimli::DW_TAG_subprogram);
    {
        let die = dwarf.unit.get_mut(abs_inner);
        die.set(gimli::DW_AT_name, AttributeValue::String(b"inner".to_vec()));
        die.set(gimli::DW_AT_decl_file, AttributeValue::FileIndex(Some(file_a)));
        die.set(gimli::DW_AT_decl_line, AttributeValue::Udata(18));
        die.set(
            gimli::DW_AT_inline,
            AttributeValue::Inline(gimli::DW_INL_inlined),
        );
    }

    let outer = dwarf.unit.add(root, gimli::DW_TAG_subprogram);
    {
        let die = dwarf.unit.get_mut(outer);
        die.set(gimli::DW_AT_name, AttributeValue::String(b"outer".to_vec()));
        die.set(
            gimli::DW_AT_low_pc,
            AttributeValue::Address(Address::Constant(0x1000)),
        );
        die.set(gimli::DW_AT_high_pc, AttributeValue::Udata(0x100));
        die.set(gimli::DW_AT_decl_file, AttributeValue::FileIndex(Some(file_a)));
        die.set(gimli::DW_AT_decl_line, AttributeValue::Udata(3));
    }

    let middle = dwarf.unit.add(outer, gimli::DW_TAG_inlined_subroutine);
    {
        let die = dwarf.unit.get_mut(middle);
        die.set(
            gimli::DW_AT_abstract_origin,
            AttributeValue::UnitRef(abs_middle),
        );
        die.set(
            gimli::DW_AT_low_pc,
            AttributeValue::Address(Address::Constant(0x1040)),
        );
        die.set(gimli::DW_AT_high_pc, AttributeValue::Udata(0x40));
        die.set(gimli::DW_AT_call_file, AttributeValue::FileIndex(Some(file_a)));
        die.set(gimli::DW_AT_call_line, AttributeValue::Udata(10));
        die.set(gimli::DW_AT_call_column, AttributeValue::Udata(4));
    }

    let block = dwarf.unit.add(middle, gimli::DW_TAG_lexical_block);

    let inner = dwarf.unit.add(block, gimli::DW_TAG_inlined_subroutine);
    {
        let die = dwarf.unit.get_mut(inner);
        die.set(
            gimli::DW_AT_abstract_origin,
            AttributeValue::UnitRef(abs_inner),
        );
        die.set(
            gimli::DW_AT_low_pc,
            AttributeValue::Address(Address::Constant(0x1050)),
        );
        die.set(gimli::DW_AT_high_pc, AttributeValue::Udata(0x20));
        die.set(gimli::DW_AT_call_file, AttributeValue::FileIndex(Some(file_a)));
        die.set(gimli::DW_AT_call_line, AttributeValue::Udata(20));
    }

    let decl = dwarf.unit.add(root, gimli::DW_TAG_subprogram);
    {
        let die = dwarf.unit.get_mut(decl);
        die.set(
            gimli::DW_AT_name,
            AttributeValue::String(b"undefined_helper".to_vec()),
        );
        die.set(gimli::DW_AT_declaration, AttributeValue::Flag(true));
    }

    let mut sections = Sections::new(EndianVec::new(LittleEndian));
    dwarf.write(&mut sections).unwrap();

    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    obj.append_section_data(text, &[0u8; 16], 16);

    sections
        .for_each(|id, data| {
            if !data.slice().is_empty() {
                let sec = obj.add_section(Vec::new(), id.name().as_bytes().to_vec(), SectionKind::Debug);
                obj.append_section_data(sec, data.slice(), 1);
            }
            Ok::<(), ()>(())
        })
        .unwrap();

    obj.write().unwrap()
}
