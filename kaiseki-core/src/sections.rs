use crate::error::ElfError;
use crate::filemap::FileMap;
use crate::header::{ElfClass, ElfIdent};

/// Section type: unused entry.
pub const SHT_NULL: u32 = 0;

/// Section type: program-defined contents.
pub const SHT_PROGBITS: u32 = 1;

/// Section type: symbol table.
pub const SHT_SYMTAB: u32 = 2;

/// Section type: string table.
pub const SHT_STRTAB: u32 = 3;

/// Section type: dynamic linking information.
pub const SHT_DYNAMIC: u32 = 6;

/// Section type: occupies no file storage.
pub const SHT_NOBITS: u32 = 8;

/// Section type: dynamic symbol table.
pub const SHT_DYNSYM: u32 = 11;

/// Size of an elf32 section header entry.
pub const SHDR32_SIZE: u64 = 40;

/// Size of an elf64 section header entry.
pub const SHDR64_SIZE: u64 = 64;

/// One section header in file order, with its name resolved against the
/// section header string table.
#[derive(Debug, Clone)]
pub struct SectionDescriptor {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
    /// Resolved name; empty until name resolution runs.
    pub name: String,
}

impl SectionDescriptor {
    /// Decodes one record at `offset`. Field widths differ by class:
    /// name/type/link/info are always 32-bit, the rest are words.
    pub fn parse_at(
        ident: &ElfIdent,
        file: &FileMap,
        offset: u64,
    ) -> Result<Self, ElfError> {
        let sh_name = ident.read_u32(file, offset)?;
        let sh_type = ident.read_u32(file, offset + 4)?;
        let (link_at, word) = match ident.class {
            ElfClass::Elf32 => (24, 4u64),
            ElfClass::Elf64 => (40, 8u64),
        };
        let sh_flags = ident.read_word(file, offset + 8)?;
        let sh_addr = ident.read_word(file, offset + 8 + word)?;
        let sh_offset = ident.read_word(file, offset + 8 + 2 * word)?;
        let sh_size = ident.read_word(file, offset + 8 + 3 * word)?;
        let sh_link = ident.read_u32(file, offset + link_at)?;
        let sh_info = ident.read_u32(file, offset + link_at + 4)?;
        let sh_addralign = ident.read_word(file, offset + link_at + 8)?;
        let sh_entsize = ident.read_word(file, offset + link_at + 8 + word)?;

        Ok(Self {
            sh_name,
            sh_type,
            sh_flags,
            sh_addr,
            sh_offset,
            sh_size,
            sh_link,
            sh_info,
            sh_addralign,
            sh_entsize,
            name: String::new(),
        })
    }

    /// Whether the section's `sh_offset`/`sh_size` describe bytes in the
    /// file (false for `SHT_NULL` and `SHT_NOBITS`).
    pub fn has_file_storage(&self) -> bool {
        !matches!(self.sh_type, SHT_NULL | SHT_NOBITS)
    }
}
