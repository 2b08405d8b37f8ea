use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::ElfError;
use crate::filemap::FileMap;

/// ELF magic bytes: `\x7fELF`.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Size of the elf32 file header.
pub const EHDR32_SIZE: u64 = 52;

/// Size of the elf64 file header.
pub const EHDR64_SIZE: u64 = 64;

/// ELF object type: executable.
pub const ET_EXEC: u16 = 2;

/// ELF object type: shared object.
pub const ET_DYN: u16 = 3;

/// Word size selected by identification byte 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

/// Byte order selected by identification byte 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfData {
    Little,
    Big,
}

/// The decoded identification prefix. Fixes the word size and byte order
/// for every subsequent read the parser performs.
#[derive(Debug, Clone, Copy)]
pub struct ElfIdent {
    pub class: ElfClass,
    pub data: ElfData,
    pub version: u8,
}

impl ElfIdent {
    /// Decodes the first 16 bytes of the image.
    ///
    /// A wrong magic, or a class/data byte naming no defined word size or
    /// byte order, is `NotElf`; an identification version other than 1 is
    /// `BadVersion`.
    pub fn parse(file: &FileMap) -> Result<Self, ElfError> {
        let ident = file.read_at(0, 16)?;
        if ident[..4] != ELF_MAGIC {
            return Err(ElfError::NotElf);
        }
        let class = match ident[4] {
            1 => ElfClass::Elf32,
            2 => ElfClass::Elf64,
            _ => return Err(ElfError::NotElf),
        };
        let data = match ident[5] {
            1 => ElfData::Little,
            2 => ElfData::Big,
            _ => return Err(ElfError::NotElf),
        };
        if ident[6] != 1 {
            return Err(ElfError::BadVersion(ident[6]));
        }
        Ok(Self {
            class,
            data,
            version: ident[6],
        })
    }

    /// File-header size for the identified class.
    pub fn header_size(&self) -> u64 {
        match self.class {
            ElfClass::Elf32 => EHDR32_SIZE,
            ElfClass::Elf64 => EHDR64_SIZE,
        }
    }

    pub fn read_u16(&self, file: &FileMap, offset: u64) -> Result<u16, ElfError> {
        let b = file.read_at(offset, 2)?;
        Ok(match self.data {
            ElfData::Little => LittleEndian::read_u16(b),
            ElfData::Big => BigEndian::read_u16(b),
        })
    }

    pub fn read_u32(&self, file: &FileMap, offset: u64) -> Result<u32, ElfError> {
        let b = file.read_at(offset, 4)?;
        Ok(match self.data {
            ElfData::Little => LittleEndian::read_u32(b),
            ElfData::Big => BigEndian::read_u32(b),
        })
    }

    pub fn read_u64(&self, file: &FileMap, offset: u64) -> Result<u64, ElfError> {
        let b = file.read_at(offset, 8)?;
        Ok(match self.data {
            ElfData::Little => LittleEndian::read_u64(b),
            ElfData::Big => BigEndian::read_u64(b),
        })
    }

    /// Reads an address/offset/size word: 32-bit in elf32, 64-bit in elf64.
    pub fn read_word(&self, file: &FileMap, offset: u64) -> Result<u64, ElfError> {
        match self.class {
            ElfClass::Elf32 => self.read_u32(file, offset).map(u64::from),
            ElfClass::Elf64 => self.read_u64(file, offset),
        }
    }
}

/// The fixed-layout ELF file header, widened to 64-bit fields so one type
/// covers both classes.
#[derive(Debug, Clone, Copy)]
pub struct ElfHeader {
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl ElfHeader {
    /// Reads the fields past the identifier at their class-defined offsets,
    /// byte-swapping per the identified data encoding.
    pub fn parse(ident: &ElfIdent, file: &FileMap) -> Result<Self, ElfError> {
        let e_type = ident.read_u16(file, 16)?;
        let e_machine = ident.read_u16(file, 18)?;
        let e_version = ident.read_u32(file, 20)?;
        let e_entry = ident.read_word(file, 24)?;

        // Offsets diverge after e_entry: elf32 packs 32-bit words.
        let (phoff_at, shoff_at, tail) = match ident.class {
            ElfClass::Elf32 => (28, 32, 36),
            ElfClass::Elf64 => (32, 40, 48),
        };
        let e_phoff = ident.read_word(file, phoff_at)?;
        let e_shoff = ident.read_word(file, shoff_at)?;
        let e_flags = ident.read_u32(file, tail)?;
        let e_ehsize = ident.read_u16(file, tail + 4)?;
        let e_phentsize = ident.read_u16(file, tail + 6)?;
        let e_phnum = ident.read_u16(file, tail + 8)?;
        let e_shentsize = ident.read_u16(file, tail + 10)?;
        let e_shnum = ident.read_u16(file, tail + 12)?;
        let e_shstrndx = ident.read_u16(file, tail + 14)?;

        Ok(Self {
            e_type,
            e_machine,
            e_version,
            e_entry,
            e_phoff,
            e_shoff,
            e_flags,
            e_ehsize,
            e_phentsize,
            e_phnum,
            e_shentsize,
            e_shnum,
            e_shstrndx,
        })
    }

    pub fn is_executable(&self) -> bool {
        self.e_type == ET_EXEC
    }

    pub fn type_name(&self) -> &'static str {
        match self.e_type {
            0 => "NONE",
            1 => "REL",
            ET_EXEC => "EXEC",
            ET_DYN => "DYN",
            4 => "CORE",
            _ => "unknown",
        }
    }

    pub fn machine_name(&self) -> &'static str {
        match self.e_machine {
            0 => "none",
            3 => "Intel 80386",
            8 => "MIPS",
            40 => "ARM",
            62 => "AMD x86-64",
            183 => "AArch64",
            243 => "RISC-V",
            _ => "unknown",
        }
    }
}
