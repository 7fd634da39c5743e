// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! Coverage-point discovery over synthesized objects: opcode scan on a
//! linked-style object, relocation scan on a relocatable one.

mod common;

use dwarfscope::coverpoints::{find_all_cover_points, Error};
use dwarfscope::find_all_pcs;

#[test]
fn opcode_scan_classifies_call_targets() {
    let (_dir, path) = common::write_fixture("calls.o", &common::x86_call_object());

    let points = find_all_cover_points(&path).unwrap();
    assert_eq!(points.trace_pc, [0x0b, 0x30]);
    assert_eq!(points.trace_cmp, [0x20]);

    // Decoded call targets of bucket 0 all equal the trace-pc address; this
    // is what the fixture encodes and what the scan verified byte by byte.
    let pcs = find_all_pcs(&path, true).unwrap();
    assert_eq!(pcs, [0x0b, 0x20, 0x30]);
}

#[test]
fn opcode_scan_results_are_stable() {
    let (_dir, path) = common::write_fixture("calls.o", &common::x86_call_object());

    let first = find_all_cover_points(&path).unwrap();
    let second = find_all_cover_points(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn opcode_scan_decodes_branch_links() {
    let (_dir, path) = common::write_fixture("calls-a64.o", &common::aarch64_call_object());

    let points = find_all_cover_points(&path).unwrap();
    assert_eq!(points.trace_pc, [0x10, 0x20]);
    assert_eq!(points.trace_cmp, [0x30]);
}

#[test]
fn relocation_scan_uses_symbol_indices() {
    let (_dir, path) = common::write_fixture("rela.o", &common::aarch64_rela_object());

    let points = find_all_cover_points(&path).unwrap();
    assert_eq!(points.trace_pc, [0x34]);
    assert!(points.trace_cmp.is_empty());
}

#[test]
fn object_without_trace_pc_fails_opcode_scan() {
    // Reuse the DWARF fixture: it has a `.text` without trace helpers.
    let (_dir, path) = common::write_fixture("inline", &common::inline_dwarf_object());

    assert!(matches!(
        find_all_cover_points(&path),
        Err(Error::NoTracePcSymbol)
    ));
}
