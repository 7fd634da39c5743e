// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod arch;
mod cache;
pub mod callgraph;
pub mod coverpoints;
pub mod dbglog;
pub mod dwarf;
pub mod lines;
pub mod objfile;
pub mod symbolize;

pub use coverpoints::{find_all_cover_points, CoverPoints};
pub use dwarf::{find_all_funcs, Func};
pub use symbolize::{addr2line, find_all_pcs, Frame};

/// Type-erased error type.
///
/// We primarily use this to hand out errors from third-party libraries where
/// lifting them into distinct error variants didn't make sense because no
/// consumer cares about differentiating between different error variants.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// Virtual address in the ELF address space.
pub type VirtAddr = u64;
