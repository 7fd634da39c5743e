// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-architecture call-instruction geometry.
//!
//! The coverage scanner does not need a full disassembler: on both supported
//! architectures a direct call to a known helper is a single fixed-length
//! instruction whose discriminating opcode byte sits at a fixed offset, so a
//! byte scan plus a tiny target decoder is sufficient (and much faster than
//! disassembling whole objects).

use crate::objfile::Arch;
use crate::VirtAddr;

/// Call-instruction geometry and target decoding for one machine.
pub struct ArchSpec {
    /// Size of a direct call instruction, in bytes.
    pub call_len: usize,
    /// Byte distance from the relocation `r_offset` back to the instruction
    /// start.
    pub rela_offset: u64,
    /// Offset of the discriminating opcode byte within the instruction.
    pub opcode_offset: usize,
    /// The opcode bytes that mark a direct call.
    pub opcodes: [u8; 2],
    /// ELF relocation type used for PC-relative calls on this machine.
    pub call_reloc: u32,
    /// Decodes the call target from the raw instruction bytes.
    pub target: fn(&ArchSpec, &[u8], VirtAddr, u8) -> VirtAddr,
}

/// `call rel32`: the 32-bit displacement follows the `E8` opcode and is
/// relative to the next instruction.
fn x86_64_call_target(spec: &ArchSpec, insn: &[u8], pc: VirtAddr, _opcode: u8) -> VirtAddr {
    let disp = i32::from_le_bytes(
        insn[1..5]
            .try_into()
            .expect("call instruction shorter than its declared length"),
    );
    pc.wrapping_add(disp as i64 as u64)
        .wrapping_add(spec.call_len as u64)
}

/// `BL`: the branch offset lives in the low bits of the little-endian word
/// and is scaled by the instruction size. The `0x97` opcode byte marks a
/// backwards branch and extends the sign.
fn aarch64_call_target(spec: &ArchSpec, insn: &[u8], pc: VirtAddr, opcode: u8) -> VirtAddr {
    let word = u32::from_le_bytes(
        insn[..4]
            .try_into()
            .expect("call instruction shorter than its declared length"),
    );
    let mut offset = u64::from(word) & ((1 << 24) - 1);
    if opcode == spec.opcodes[1] {
        offset |= 0xffff_ffff_ff00_0000;
    }
    pc.wrapping_add(offset.wrapping_mul(4))
}

static X86_64: ArchSpec = ArchSpec {
    call_len: 5,
    rela_offset: 1,
    opcode_offset: 0,
    opcodes: [0xe8, 0xe8],
    call_reloc: object::elf::R_X86_64_PLT32,
    target: x86_64_call_target,
};

static AARCH64: ArchSpec = ArchSpec {
    call_len: 4,
    rela_offset: 0,
    opcode_offset: 3,
    opcodes: [0x94, 0x97],
    call_reloc: object::elf::R_AARCH64_CALL26,
    target: aarch64_call_target,
};

/// Looks up the descriptor for a machine.
pub fn arch_spec(arch: Arch) -> &'static ArchSpec {
    match arch {
        Arch::X86_64 => &X86_64,
        Arch::Aarch64 => &AARCH64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_64_forward_and_backward() {
        let spec = arch_spec(Arch::X86_64);

        // call +0xf0 at pc 0x0b lands at 0x100.
        let insn = [0xe8, 0xf0, 0x00, 0x00, 0x00];
        assert_eq!((spec.target)(spec, &insn, 0x0b, 0xe8), 0x100);

        // call -0x66 at pc 0x40100b lands at 0x400faa.
        let insn = [0xe8, 0x9a, 0xff, 0xff, 0xff];
        assert_eq!((spec.target)(spec, &insn, 0x40100b, 0xe8), 0x400faa);
    }

    #[test]
    fn aarch64_forward() {
        let spec = arch_spec(Arch::Aarch64);

        // bl +0x48d instructions.
        let insn = [0x8d, 0x04, 0x00, 0x94];
        assert_eq!((spec.target)(spec, &insn, 0x1000, 0x94), 0x1000 + 4 * 0x48d);
    }

    #[test]
    fn aarch64_backward_sign_extends() {
        let spec = arch_spec(Arch::Aarch64);

        // bl -9 instructions.
        let insn = [0xf7, 0xff, 0xff, 0x97];
        assert_eq!((spec.target)(spec, &insn, 0x654, 0x97), 0x654 - 4 * 9);
    }
}
