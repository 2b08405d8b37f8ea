use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::disasm::{ArmDisassembler, DecodeMode, Instruction};
use crate::error::ElfError;
use crate::filemap::FileMap;
use crate::header::ElfHeader;
use crate::parser::{ElfParser, INVALID_NAME};
use crate::pool::WorkerPool;
use crate::sections::SectionDescriptor;

/// Lifecycle callbacks a host binds to a [`Session`].
///
/// For one `load` the calls are totally ordered: `started`, then
/// non-decreasing `progress`, then `finished`, then `error` exactly when
/// the load failed.
pub trait SessionObserver: Send + Sync {
    fn started(&self);
    fn progress(&self, pct: u8);
    fn finished(&self, ok: bool);
    fn error(&self, message: &str);
}

/// One symbol as surfaced to the host: resolved name, value, size, and the
/// name of its defining section (`"unknown"` when the index is out of
/// range).
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub name: String,
    pub value: u64,
    pub size: u64,
    pub section: String,
}

#[derive(Default)]
struct State {
    file: Option<Arc<FileMap>>,
    parser: Option<ElfParser>,
    disasm: Option<ArmDisassembler>,
}

/// The process-local binding of at most one mapped file, parser, and
/// decoder.
///
/// `load` runs on the worker pool and publishes lifecycle events through
/// the observer; every other operation is a synchronous snapshot read that
/// contends with the worker for the state guard. Queries on an unloaded
/// session return empty results.
pub struct Session {
    state: Arc<Mutex<State>>,
    observer: Arc<dyn SessionObserver>,
    pool: WorkerPool,
}

impl Session {
    pub fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self::with_pool(observer, WorkerPool::with_default_workers())
    }

    pub fn with_pool(observer: Arc<dyn SessionObserver>, pool: WorkerPool) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            observer,
            pool,
        }
    }

    /// Schedules a load of `path`. Emits `started` synchronously; the
    /// worker releases any prior file, maps and parses the new one, and
    /// finishes with `finished(true)` or `finished(false)` + `error`.
    pub fn load(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.observer.started();

        let state = Arc::clone(&self.state);
        let observer = Arc::clone(&self.observer);
        let queued = self.pool.enqueue(move || {
            let result = {
                let mut state = state.lock().unwrap();
                state.file = None;
                state.parser = None;
                state.disasm = None;
                let result = load_into(&mut state, &path, observer.as_ref());
                if result.is_err() {
                    state.file = None;
                    state.parser = None;
                    state.disasm = None;
                }
                result
            };
            match result {
                Ok(()) => observer.finished(true),
                Err(err) => {
                    log::error!("load of {} failed: {err}", path.display());
                    observer.finished(false);
                    observer.error(&err.to_string());
                }
            }
        });
        if !queued {
            self.observer.finished(false);
            self.observer.error("worker pool rejected the load");
        }
    }

    /// Resolved section names, omitting empty and `<invalid_name>` entries.
    pub fn section_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let Some(parser) = state.parser.as_ref() else {
            return Vec::new();
        };
        parser
            .sections()
            .iter()
            .filter(|s| !s.name.is_empty() && s.name != INVALID_NAME)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Snapshot of every section descriptor, in file order.
    pub fn sections(&self) -> Vec<SectionDescriptor> {
        let state = self.state.lock().unwrap();
        state
            .parser
            .as_ref()
            .map_or_else(Vec::new, |p| p.sections().to_vec())
    }

    /// Snapshot of the flat symbol list.
    pub fn symbols(&self) -> Vec<SymbolInfo> {
        let state = self.state.lock().unwrap();
        let Some(parser) = state.parser.as_ref() else {
            return Vec::new();
        };
        parser
            .symbols()
            .iter()
            .map(|sym| SymbolInfo {
                name: sym.name.clone(),
                value: sym.st_value,
                size: sym.st_size,
                section: parser
                    .sections()
                    .get(usize::from(sym.st_shndx))
                    .map_or_else(|| "unknown".to_string(), |s| s.name.clone()),
            })
            .collect()
    }

    /// The parsed file header, if a file is loaded.
    pub fn header(&self) -> Option<ElfHeader> {
        let state = self.state.lock().unwrap();
        state.parser.as_ref().and_then(|p| p.header().copied())
    }

    /// Decodes the named section. The section bytes are looked up under
    /// the guard; the decode pass itself runs on a borrowed slice outside
    /// it. Empty when no file is loaded or the section is absent.
    pub fn disassemble(&self, section: &str, base_va: u64, mode: DecodeMode) -> Vec<Instruction> {
        let (file, range, disasm) = {
            let state = self.state.lock().unwrap();
            let (Some(parser), Some(disasm)) = (state.parser.as_ref(), state.disasm.as_ref())
            else {
                return Vec::new();
            };
            let Some(range) = parser.section_file_range(section) else {
                log::error!("section not found: {section}");
                return Vec::new();
            };
            (Arc::clone(parser.file()), range, *disasm)
        };
        disasm.disassemble(&file.bytes()[range], base_va, mode)
    }

    /// Raw bytes of a sub-range of the named section, clamped to the
    /// section's size. Empty when `offset` is at or past the end.
    pub fn hex_dump(&self, section: &str, offset: u64, length: usize) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let Some(parser) = state.parser.as_ref() else {
            return Vec::new();
        };
        let Some(range) = parser.section_file_range(section) else {
            log::error!("section not found: {section}");
            return Vec::new();
        };
        let data = &parser.file().bytes()[range];
        if offset >= data.len() as u64 {
            return Vec::new();
        }
        let start = offset as usize;
        let take = length.min(data.len() - start);
        data[start..start + take].to_vec()
    }
}

/// Maps, parses, and binds a decoder, reporting progress between stages.
fn load_into(
    state: &mut State,
    path: &std::path::Path,
    observer: &dyn SessionObserver,
) -> Result<(), ElfError> {
    let file = Arc::new(FileMap::open(path)?);
    state.file = Some(Arc::clone(&file));
    observer.progress(30);

    let mut parser = ElfParser::new(file)?;
    parser.parse()?;
    observer.progress(70);

    state.parser = Some(parser);
    state.disasm = Some(ArmDisassembler::new());
    observer.progress(100);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::tests::make_elf64_le;
    use crate::parser::tests::make_elf64_with_sections;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Condvar;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Started,
        Progress(u8),
        Finished(bool),
        Error(String),
    }

    struct Recorder {
        events: Mutex<Vec<Event>>,
        changed: Condvar,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                changed: Condvar::new(),
            })
        }

        fn push(&self, event: Event) {
            self.events.lock().unwrap().push(event);
            self.changed.notify_all();
        }

        fn wait_for<F: Fn(&[Event]) -> bool>(&self, pred: F) -> Vec<Event> {
            let mut events = self.events.lock().unwrap();
            while !pred(&events) {
                events = self.changed.wait(events).unwrap();
            }
            events.clone()
        }

        fn wait_finished(&self) -> bool {
            let events = self.wait_for(|ev| {
                ev.iter().any(|e| matches!(e, Event::Finished(_)))
            });
            events
                .iter()
                .find_map(|e| match e {
                    Event::Finished(ok) => Some(*ok),
                    _ => None,
                })
                .unwrap()
        }
    }

    impl SessionObserver for Recorder {
        fn started(&self) {
            self.push(Event::Started);
        }
        fn progress(&self, pct: u8) {
            self.push(Event::Progress(pct));
        }
        fn finished(&self, ok: bool) {
            self.push(Event::Finished(ok));
        }
        fn error(&self, message: &str) {
            self.push(Event::Error(message.to_string()));
        }
    }

    fn write_fixture(name: &str, bytes: &[u8]) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("kaiseki-session-{}-{name}", std::process::id()));
        fs::write(&path, bytes).expect("write fixture");
        path
    }

    fn remove_fixture(path: &Path) {
        let _ = fs::remove_file(path);
    }

    #[test]
    fn load_publishes_ordered_events() {
        let path = write_fixture("events.elf", &make_elf64_with_sections());
        let recorder = Recorder::new();
        let session = Session::new(recorder.clone());
        session.load(&path);
        assert!(recorder.wait_finished());

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events[0], Event::Started);
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![30, 70, 100]);
        assert_eq!(*events.last().unwrap(), Event::Finished(true));
        assert!(!events.iter().any(|e| matches!(e, Event::Error(_))));
        remove_fixture(&path);
    }

    #[test]
    fn queries_reflect_loaded_metadata() {
        let path = write_fixture("queries.elf", &make_elf64_with_sections());
        let recorder = Recorder::new();
        let session = Session::new(recorder.clone());
        session.load(&path);
        assert!(recorder.wait_finished());

        assert_eq!(
            session.section_names(),
            [".text", ".symtab", ".strtab", ".shstrtab"]
        );
        let symbols = session.symbols();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[1].name, "main");
        assert_eq!(symbols[1].value, 0x8000);
        assert_eq!(symbols[1].section, ".text");

        let header = session.header().expect("header present");
        assert_eq!(header.e_entry, 0x8000);
        remove_fixture(&path);
    }

    #[test]
    fn disassemble_and_hex_dump() {
        let path = write_fixture("disasm.elf", &make_elf64_with_sections());
        let recorder = Recorder::new();
        let session = Session::new(recorder.clone());
        session.load(&path);
        assert!(recorder.wait_finished());

        let instructions = session.disassemble(".text", 0x8000, DecodeMode::Arm);
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].mnemonic, "B");
        assert_eq!(instructions[0].branch_target, Some(0x800C));
        assert_eq!(instructions[1].address, 0x8004);

        assert_eq!(session.hex_dump(".text", 4, 16), [0x42, 0x20, 0x00, 0x00]);
        assert_eq!(session.hex_dump(".text", 0, 2), [0x01, 0x00]);
        assert!(session.hex_dump(".text", 8, 4).is_empty());
        assert!(session.hex_dump(".absent", 0, 4).is_empty());
        remove_fixture(&path);
    }

    #[test]
    fn unloaded_session_returns_empty() {
        let recorder = Recorder::new();
        let session = Session::new(recorder);
        assert!(session.section_names().is_empty());
        assert!(session.symbols().is_empty());
        assert!(session.header().is_none());
        assert!(session
            .disassemble(".text", 0, DecodeMode::Arm)
            .is_empty());
        assert!(session.hex_dump(".text", 0, 16).is_empty());
    }

    #[test]
    fn failed_load_reports_error_and_clears_state() {
        let path = write_fixture("short.bin", &[0u8; 10]);
        let recorder = Recorder::new();
        let session = Session::new(recorder.clone());
        session.load(&path);
        assert!(!recorder.wait_finished());

        let events =
            recorder.wait_for(|ev| ev.iter().any(|e| matches!(e, Event::Error(_))));
        let finished_at = events
            .iter()
            .position(|e| *e == Event::Finished(false))
            .unwrap();
        let error_at = events
            .iter()
            .position(|e| matches!(e, Event::Error(_)))
            .unwrap();
        assert!(finished_at < error_at);
        assert!(session.section_names().is_empty());
        remove_fixture(&path);
    }

    #[test]
    fn load_of_missing_file_fails() {
        let recorder = Recorder::new();
        let session = Session::new(recorder.clone());
        session.load("/nonexistent/kaiseki-missing.elf");
        assert!(!recorder.wait_finished());
    }

    #[test]
    fn reload_replaces_metadata() {
        let first = write_fixture("reload-a.elf", &make_elf64_with_sections());
        let second = write_fixture("reload-b.elf", &make_elf64_le());
        let recorder = Recorder::new();
        let session = Session::new(recorder.clone());

        session.load(&first);
        recorder.wait_for(|ev| {
            ev.iter()
                .filter(|e| matches!(e, Event::Finished(_)))
                .count()
                == 1
        });
        assert!(!session.section_names().is_empty());

        session.load(&second);
        recorder.wait_for(|ev| {
            ev.iter()
                .filter(|e| matches!(e, Event::Finished(_)))
                .count()
                == 2
        });
        // The second file has no sections; the first snapshot is gone.
        assert!(session.section_names().is_empty());
        assert!(session.header().is_some());

        remove_fixture(&first);
        remove_fixture(&second);
    }
}
