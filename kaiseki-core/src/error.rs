use std::io;

use thiserror::Error;

/// Failures surfaced by the file map and the ELF parser.
///
/// Per-element problems (an unresolvable name, an oversized symbol table)
/// are not errors; they degrade to sentinel output with a diagnostic.
#[derive(Debug, Error)]
pub enum ElfError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("file too small for its ELF class ({len} bytes, need {min})")]
    TooSmall { len: u64, min: u64 },

    #[error("not an ELF object")]
    NotElf,

    #[error("unsupported ELF version {0}")]
    BadVersion(u8),

    #[error("section header string table index {shstrndx} out of range ({shnum} sections)")]
    BadShStrNdx { shstrndx: u16, shnum: u16 },

    #[error("section at e_shstrndx is not a string table")]
    BadShStrTab,

    #[error("{0} extends past the end of the file")]
    Truncated(&'static str),

    #[error("read of {len} bytes at offset {offset:#x} is out of bounds")]
    OutOfBounds { offset: u64, len: u64 },
}
