use std::ops::Range;
use std::sync::Arc;

use crate::error::ElfError;
use crate::filemap::FileMap;
use crate::header::{ElfHeader, ElfIdent, EHDR32_SIZE};
use crate::sections::{
    SectionDescriptor, SHT_DYNAMIC, SHT_DYNSYM, SHT_STRTAB, SHT_SYMTAB,
};
use crate::symbols::SymbolEntry;

/// Sentinel for section names whose offset falls outside the string pool.
pub const INVALID_NAME: &str = "<invalid_name>";

/// Sentinel for symbols no string table resolves.
pub const UNNAMED: &str = "<unnamed>";

/// Decodes the structural metadata of one mapped ELF object.
///
/// Construction only checks the minimum size; all work happens in a single
/// [`ElfParser::parse`] call. After a successful parse the queries borrow
/// the decoded metadata; after a failed parse the parser is discardable.
#[derive(Debug)]
pub struct ElfParser {
    file: Arc<FileMap>,
    ident: Option<ElfIdent>,
    header: Option<ElfHeader>,
    sections: Vec<SectionDescriptor>,
    symbols: Vec<SymbolEntry>,
    strtab: Option<Range<usize>>,
    dynstr: Option<Range<usize>>,
}

impl ElfParser {
    /// Requires an image at least as large as the elf32 header.
    pub fn new(file: Arc<FileMap>) -> Result<Self, ElfError> {
        if file.len() < EHDR32_SIZE {
            return Err(ElfError::TooSmall {
                len: file.len(),
                min: EHDR32_SIZE,
            });
        }
        Ok(Self {
            file,
            ident: None,
            header: None,
            sections: Vec::new(),
            symbols: Vec::new(),
            strtab: None,
            dynstr: None,
        })
    }

    /// Runs all parse stages: identify, header, section headers, section
    /// names, symbols, symbol names.
    ///
    /// Structural failures abort with a distinct [`ElfError`]; per-element
    /// problems degrade to sentinel names or skipped tables with a
    /// diagnostic.
    pub fn parse(&mut self) -> Result<(), ElfError> {
        let ident = ElfIdent::parse(&self.file)?;
        if self.file.len() < ident.header_size() {
            return Err(ElfError::TooSmall {
                len: self.file.len(),
                min: ident.header_size(),
            });
        }
        self.ident = Some(ident);

        let header = ElfHeader::parse(&ident, &self.file)?;
        self.header = Some(header);

        if header.e_shnum == 0 {
            log::info!(
                "{}: no section headers, metadata is empty",
                self.file.path().display()
            );
            return Ok(());
        }
        if header.e_shstrndx >= header.e_shnum {
            return Err(ElfError::BadShStrNdx {
                shstrndx: header.e_shstrndx,
                shnum: header.e_shnum,
            });
        }
        let table_end = u64::from(header.e_shnum)
            .checked_mul(u64::from(header.e_shentsize))
            .and_then(|sz| header.e_shoff.checked_add(sz))
            .ok_or(ElfError::Truncated("section header table"))?;
        if table_end > self.file.len() {
            return Err(ElfError::Truncated("section header table"));
        }

        self.read_section_headers(&ident, &header)?;
        self.resolve_section_names(&header)?;
        self.read_symbols(&ident);
        self.resolve_symbol_names();

        log::info!(
            "{}: parsed {} sections, {} symbols",
            self.file.path().display(),
            self.sections.len(),
            self.symbols.len()
        );
        Ok(())
    }

    /// Reads `e_shnum` fixed-size records at `e_shoff`, in file order.
    fn read_section_headers(
        &mut self,
        ident: &ElfIdent,
        header: &ElfHeader,
    ) -> Result<(), ElfError> {
        self.sections = Vec::with_capacity(header.e_shnum as usize);
        for i in 0..u64::from(header.e_shnum) {
            let at = header.e_shoff + i * u64::from(header.e_shentsize);
            let sec = SectionDescriptor::parse_at(ident, &self.file, at)
                .map_err(|_| ElfError::Truncated("section header table"))?;
            self.sections.push(sec);
        }
        Ok(())
    }

    /// Resolves every section name against the string table at
    /// `e_shstrndx`, then caches the `.strtab`/`.dynstr` pools for symbol
    /// name resolution.
    fn resolve_section_names(&mut self, header: &ElfHeader) -> Result<(), ElfError> {
        let shstr = &self.sections[header.e_shstrndx as usize];
        if shstr.sh_type != SHT_STRTAB {
            return Err(ElfError::BadShStrTab);
        }
        let pool_range = file_range(shstr, self.file.len())
            .ok_or(ElfError::Truncated("section header string table"))?;

        for i in 0..self.sections.len() {
            let name_off = self.sections[i].sh_name;
            let pool = &self.file.bytes()[pool_range.clone()];
            self.sections[i].name = match string_at(pool, name_off) {
                Some(name) => name,
                None => {
                    log::warn!(
                        "section {i}: name offset {name_off:#x} outside the string table"
                    );
                    INVALID_NAME.to_string()
                }
            };
        }

        self.strtab = self.lookup_pool(".strtab");
        self.dynstr = self.lookup_pool(".dynstr");
        Ok(())
    }

    fn lookup_pool(&self, name: &str) -> Option<Range<usize>> {
        let sec = self
            .sections
            .iter()
            .find(|s| s.name == name && s.sh_type == SHT_STRTAB)?;
        let range = file_range(sec, self.file.len());
        if range.is_none() {
            log::warn!("{name} extends past the end of the file, ignored");
        }
        range
    }

    /// Decodes every `SHT_SYMTAB`/`SHT_DYNSYM` section into one flat
    /// vector, in file order. A zero entry size or an oversized table
    /// skips the section with a diagnostic.
    fn read_symbols(&mut self, ident: &ElfIdent) {
        self.symbols = Vec::new();
        for sec in &self.sections {
            if !matches!(sec.sh_type, SHT_SYMTAB | SHT_DYNSYM) {
                continue;
            }
            if sec.sh_entsize == 0 {
                log::warn!("symbol section {} has entry size 0, skipped", sec.name);
                continue;
            }
            if file_range(sec, self.file.len()).is_none() {
                log::warn!(
                    "symbol section {} does not fit within the file, skipped",
                    sec.name
                );
                continue;
            }
            for j in 0..sec.sh_size / sec.sh_entsize {
                let at = sec.sh_offset + j * sec.sh_entsize;
                match SymbolEntry::parse_at(ident, &self.file, at) {
                    Ok(sym) => self.symbols.push(sym),
                    Err(err) => {
                        log::warn!(
                            "symbol {j} in {}: {err}, rest of section skipped",
                            sec.name
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Picks a string pool per symbol: `.dynstr` when the symbol's section
    /// is `SHT_DYNAMIC`/`SHT_DYNSYM`, `.strtab` otherwise. Unresolvable
    /// entries become `<unnamed>`.
    fn resolve_symbol_names(&mut self) {
        let bytes = self.file.bytes();
        for sym in &mut self.symbols {
            let dynamic = self
                .sections
                .get(usize::from(sym.st_shndx))
                .is_some_and(|s| matches!(s.sh_type, SHT_DYNAMIC | SHT_DYNSYM));
            let pool = if dynamic { &self.dynstr } else { &self.strtab };
            sym.name = pool
                .clone()
                .and_then(|r| string_at(&bytes[r], sym.st_name))
                .unwrap_or_else(|| {
                    log::debug!("symbol name offset {:#x} unresolved", sym.st_name);
                    UNNAMED.to_string()
                });
        }
    }

    pub fn file(&self) -> &Arc<FileMap> {
        &self.file
    }

    pub fn ident(&self) -> Option<&ElfIdent> {
        self.ident.as_ref()
    }

    pub fn header(&self) -> Option<&ElfHeader> {
        self.header.as_ref()
    }

    pub fn sections(&self) -> &[SectionDescriptor] {
        &self.sections
    }

    pub fn symbols(&self) -> &[SymbolEntry] {
        &self.symbols
    }

    /// File-offset range of the named section's bytes. First match wins
    /// when names collide; `None` with a diagnostic when the range falls
    /// outside the image.
    pub fn section_file_range(&self, name: &str) -> Option<Range<usize>> {
        let sec = self.sections.iter().find(|s| s.name == name)?;
        let range = file_range(sec, self.file.len());
        if range.is_none() {
            log::warn!("section {name} extends past the end of the file");
        }
        range
    }

    /// Borrows the named section's bytes.
    pub fn section_data(&self, name: &str) -> Option<&[u8]> {
        self.section_file_range(name)
            .map(|r| &self.file.bytes()[r])
    }

    /// Declared size of the named section, 0 if absent.
    pub fn section_size(&self, name: &str) -> u64 {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map_or(0, |s| s.sh_size)
    }

    /// Virtual address of the named section, 0 if absent.
    pub fn section_address(&self, name: &str) -> u64 {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map_or(0, |s| s.sh_addr)
    }
}

/// In-file byte range of a section, `None` when `offset + size` overflows
/// or exceeds the image.
fn file_range(sec: &SectionDescriptor, file_len: u64) -> Option<Range<usize>> {
    let end = sec.sh_offset.checked_add(sec.sh_size)?;
    if end > file_len {
        return None;
    }
    Some(sec.sh_offset as usize..end as usize)
}

/// C-style string at `offset` within a pool: up to the first zero byte, or
/// the pool's end. `None` when the offset is outside the pool.
fn string_at(pool: &[u8], offset: u32) -> Option<String> {
    let start = offset as usize;
    if start >= pool.len() {
        return None;
    }
    let rest = &pool[start..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}
