use crate::error::ElfError;
use crate::filemap::FileMap;
use crate::header::{ElfClass, ElfIdent};

/// Size of an elf32 symbol entry.
pub const SYM32_SIZE: u64 = 16;

/// Size of an elf64 symbol entry.
pub const SYM64_SIZE: u64 = 24;

/// One symbol table entry, flattened across all symbol-bearing sections,
/// with its name resolved against `.strtab` or `.dynstr`.
#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
    /// Resolved name; `<unnamed>` when no string table resolves it.
    pub name: String,
}

impl SymbolEntry {
    /// Decodes one entry at `offset`. The field order differs by class:
    /// elf32 stores name, value, size, info, other, shndx; elf64 stores
    /// name, info, other, shndx, value, size.
    pub fn parse_at(
        ident: &ElfIdent,
        file: &FileMap,
        offset: u64,
    ) -> Result<Self, ElfError> {
        let st_name = ident.read_u32(file, offset)?;
        let (st_value, st_size, st_info, st_other, st_shndx) = match ident.class {
            ElfClass::Elf32 => {
                let value = u64::from(ident.read_u32(file, offset + 4)?);
                let size = u64::from(ident.read_u32(file, offset + 8)?);
                let info = file.read_at(offset + 12, 1)?[0];
                let other = file.read_at(offset + 13, 1)?[0];
                let shndx = ident.read_u16(file, offset + 14)?;
                (value, size, info, other, shndx)
            }
            ElfClass::Elf64 => {
                let info = file.read_at(offset + 4, 1)?[0];
                let other = file.read_at(offset + 5, 1)?[0];
                let shndx = ident.read_u16(file, offset + 6)?;
                let value = ident.read_u64(file, offset + 8)?;
                let size = ident.read_u64(file, offset + 16)?;
                (value, size, info, other, shndx)
            }
        };
        Ok(Self {
            st_name,
            st_info,
            st_other,
            st_shndx,
            st_value,
            st_size,
            name: String::new(),
        })
    }

    /// Symbol type, the lower four bits of `st_info`.
    pub fn sym_type(&self) -> u8 {
        self.st_info & 0xf
    }

    /// Symbol binding, the upper four bits of `st_info`.
    pub fn sym_bind(&self) -> u8 {
        self.st_info >> 4
    }
}
