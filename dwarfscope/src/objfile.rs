// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! High-level abstractions for working with ELF object files.

use crate::{AnyError, VirtAddr};

use std::io::Read as _;
use std::{fs, io, ops, path};

use flate2::read::ZlibDecoder;
use memmap2::Mmap;
use object::{Object as _, ObjectSection as _, ObjectSymbol as _};
use zstd::stream::read::Decoder as ZstdDecoder;

/// Result type shorthand.
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Errors that can occur during object file parsing.
#[non_exhaustive]
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("File is not a supported object file")]
    NotAnObject(#[source] AnyError),

    #[error("Sections are compressed in an unsupported format")]
    UnsupportedCompressionFormat,

    #[error("Section is too big to be loaded")]
    SectionTooBig,

    #[error("IO error")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(AnyError),
}

/// Conversion of [`object`] errors into ours, with type erasure.
///
/// We erase the type here to prevent leaking [`object`] library types into our
/// public interface. If code needs to special-case based on particular
/// [`object`] errors, we should instead lift them into custom error variants.
impl From<object::Error> for Error {
    fn from(e: object::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

/// Maps an object file into memory.
///
/// The backing file is `mmap`ed to make reading more efficient. This currently
/// uses the [`object`] library to perform the actual heavy lifting, however
/// this should be considered an implementation detail.
pub struct File(Mmap);

impl File {
    /// Map the file at the given path into memory.
    pub fn load(path: &path::Path) -> Result<Self> {
        Self::load_file(&fs::File::open(path)?)
    }

    /// Map the given file into memory.
    pub fn load_file(file: &fs::File) -> Result<Self> {
        Ok(Self(unsafe { Mmap::map(file)? }))
    }

    /// Parse the header and create a reader.
    pub fn parse(&self) -> Result<Reader<'_>> {
        object::File::parse(&self.0[..])
            .map(Reader)
            .map_err(|e| Error::NotAnObject(Box::new(e)))
    }

    /// Resolves the bytes behind a [`SectionSlot`].
    pub fn slot_bytes<'obj>(&'obj self, slot: &'obj SectionSlot) -> &'obj [u8] {
        match slot {
            SectionSlot::Mapped(range) => &self.0[range.clone()],
            SectionSlot::Owned(data) => data,
        }
    }
}

/// Provides read access to the data in an object file.
///
/// Created via [`File::parse`].
pub struct Reader<'obj>(object::File<'obj>);

impl<'obj> Reader<'obj> {
    /// Checks whether this file has little-endian byte-order.
    pub fn is_little_endian(&self) -> bool {
        self.0.is_little_endian()
    }

    /// Returns the architecture, or [`None`] if unknown.
    pub fn arch(&self) -> Option<Arch> {
        match self.0.architecture() {
            object::Architecture::Aarch64 => Some(Arch::Aarch64),
            object::Architecture::X86_64 => Some(Arch::X86_64),
            _ => None,
        }
    }

    /// Loads the section with the given name into memory.
    ///
    /// Depending on whether the section is compressed in the input file or not,
    /// this can be an expensive operation. Callers should store and retrieve
    /// the returned instance if it is needed more than once.
    pub fn load_section(&self, name: &[u8]) -> Result<Option<Section<'obj>>> {
        let Some(obj_sec) = self.0.section_by_name_bytes(name) else {
            return Ok(None);
        };

        Ok(Some(Section {
            virt_addr: obj_sec.address(),
            virt_size: obj_sec.size(),
            data: SectionData::load_from_obj_sec(&obj_sec)?,
        }))
    }

    /// Like [`Self::load_section`], but returns a handle that does not borrow
    /// the section table and can be stored next to the owning [`File`].
    ///
    /// Missing sections are represented as an empty slot: DWARF consumers
    /// treat absent and empty sections the same way.
    pub fn section_slot(&self, name: &[u8]) -> Result<SectionSlot> {
        let Some(obj_sec) = self.0.section_by_name_bytes(name) else {
            return Ok(SectionSlot::Owned(Vec::new()));
        };

        let data = obj_sec.compressed_data()?;
        if data.format == object::CompressionFormat::None {
            let Some((offset, size)) = obj_sec.file_range() else {
                return Ok(SectionSlot::Owned(Vec::new()));
            };
            let (offset, size) = (offset as usize, size as usize);
            return Ok(SectionSlot::Mapped(offset..offset + size));
        }

        SectionData::decompress(&data).map(|x| match x {
            SectionData::Borrowed(slice) => SectionSlot::Owned(slice.to_vec()),
            SectionData::InMemory(vec) => SectionSlot::Owned(vec),
        })
    }

    /// Collects the relocations attached to the named section.
    ///
    /// Returns [`None`] if the section itself is absent. An empty vector means
    /// that the section exists but carries no relocations (e.g. `.text` in a
    /// linked executable, where no `.rela.text` is present).
    pub fn relocations(&self, name: &[u8]) -> Option<Vec<Reloc>> {
        let obj_sec = self.0.section_by_name_bytes(name)?;

        let relocs = obj_sec
            .relocations()
            .map(|(offset, reloc)| Reloc {
                offset,
                r_type: match reloc.flags() {
                    object::RelocationFlags::Elf { r_type } => Some(r_type),
                    _ => None,
                },
                symbol: match reloc.target() {
                    object::RelocationTarget::Symbol(idx) => Some(idx.0),
                    _ => None,
                },
            })
            .collect();

        Some(relocs)
    }

    /// Iterate over the symbol table, preserving raw symbol-table indices.
    ///
    /// Symbols with non-UTF-8 names are yielded with an empty name: the
    /// callers only match on well-known ASCII helper names.
    pub fn symbols(&self) -> impl Iterator<Item = Symbol<'obj>> + '_ {
        self.0.symbols().map(|sym| Symbol {
            index: sym.index().0,
            name: sym.name().unwrap_or(""),
            addr: sym.address(),
            size: sym.size(),
        })
    }

    /// Checks whether the symbol table is present at all.
    pub fn has_symbols(&self) -> bool {
        self.0.symbols().next().is_some()
    }

    /// Checks whether a section with the given name exists.
    pub fn has_section(&self, name: &[u8]) -> bool {
        self.0.section_by_name_bytes(name).is_some()
    }
}

/// Information and raw data of an object file section.
pub struct Section<'obj> {
    virt_addr: VirtAddr,
    virt_size: u64,
    data: SectionData<'obj>,
}

impl<'obj> Section<'obj> {
    /// Returns the virtual address of the first byte of this section.
    pub fn virt_addr(&self) -> VirtAddr {
        self.virt_addr
    }

    /// Returns the virtual address range of the section.
    pub fn va_range(&self) -> ops::Range<VirtAddr> {
        self.virt_addr..self.virt_addr + self.virt_size
    }
}

/// Allow using section objects where slices are expected.
impl<'obj> ops::Deref for Section<'obj> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match &self.data {
            SectionData::Borrowed(x) => x,
            SectionData::InMemory(x) => &x[..],
        }
    }
}

/// Storage for object file sections.
enum SectionData<'obj> {
    /// Section was uncompressed in the input file and we simply kept a ref.
    Borrowed(&'obj [u8]),

    /// Section was originally compressed and we decompressed it into memory.
    InMemory(Vec<u8>),
}

impl<'obj> SectionData<'obj> {
    fn load_from_obj_sec(sec: &object::Section<'obj, '_>) -> Result<Self> {
        Self::decompress(&sec.compressed_data()?)
    }

    fn decompress(data: &object::CompressedData<'obj>) -> Result<Self> {
        let final_size: usize = data
            .uncompressed_size
            .try_into()
            .map_err(|_| Error::SectionTooBig)?;

        let decoder: Box<dyn io::Read> = match data.format {
            object::CompressionFormat::Zlib => Box::new(ZlibDecoder::new(data.data)),
            object::CompressionFormat::Zstandard => Box::new(ZstdDecoder::new(data.data)?),
            object::CompressionFormat::None => return Ok(SectionData::Borrowed(data.data)),
            _ => return Err(Error::UnsupportedCompressionFormat),
        };

        let mut buf = Vec::with_capacity(final_size);
        decoder.take(final_size as u64).read_to_end(&mut buf)?;
        Ok(SectionData::InMemory(buf))
    }
}

/// Section bytes decoupled from the object's section table.
///
/// Uncompressed sections are stored as a byte range into the mapped file and
/// resolved on demand via [`File::slot_bytes`]; compressed sections carry
/// their decompressed bytes.
pub enum SectionSlot {
    /// Byte range into the mapped file.
    Mapped(ops::Range<usize>),
    /// Decompressed (or synthesized empty) section contents.
    Owned(Vec<u8>),
}

impl SectionSlot {
    /// Checks whether the slot carries any data at all.
    pub fn is_empty(&self) -> bool {
        match self {
            SectionSlot::Mapped(range) => range.is_empty(),
            SectionSlot::Owned(data) => data.is_empty(),
        }
    }
}

/// Relocation record, reduced to what the coverage scanner consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reloc {
    /// Offset of the patched location within the section (`r_offset`).
    pub offset: u64,
    /// ELF relocation type, if this is an ELF relocation.
    pub r_type: Option<u32>,
    /// Raw symbol-table index of the relocation target, if any.
    pub symbol: Option<usize>,
}

/// Symbol-table entry, preserving the raw table index.
#[derive(Debug, Clone, Copy)]
pub struct Symbol<'obj> {
    /// Raw index in the symbol table.
    pub index: usize,
    /// Symbol name. Might be mangled.
    pub name: &'obj str,
    /// Value of the symbol (an address, for defined function symbols).
    pub addr: VirtAddr,
    /// Size of the symbol.
    pub size: u64,
}

/// CPU architecture.
#[non_exhaustive]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    /// `aarch64` aka `arm64`.
    Aarch64,
    /// `x86_64` aka `amd64`.
    X86_64,
}
