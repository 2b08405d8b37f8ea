use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use kaiseki_core::{DecodeMode, Session, SessionObserver};

/// ARM ELF inspection and disassembly CLI
#[derive(Parser)]
#[command(
    name = "kaiseki",
    about = "Inspect and disassemble ARM ELF binaries (sections, symbols, instructions)",
    version,
    author
)]
struct Cli {
    /// Path to an ELF object
    #[arg(required = true)]
    path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the parsed ELF header
    Info,
    /// List all sections
    Sections,
    /// List all symbols
    Symbols,
    /// Disassemble a section
    Disasm {
        /// Section name, e.g. .text
        section: String,
        /// Base virtual address (defaults to the section's address)
        #[arg(long, value_parser = parse_hex)]
        base: Option<u64>,
        /// Decode as Thumb instead of ARM
        #[arg(long)]
        thumb: bool,
    },
    /// Dump raw section bytes
    Hexdump {
        /// Section name, e.g. .rodata
        section: String,
        /// Byte offset into the section
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Number of bytes to dump
        #[arg(long, default_value_t = 256)]
        length: usize,
    },
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid address {s:?}: {e}"))
}

enum LoadEvent {
    Finished(bool),
    Error(String),
}

/// Forwards lifecycle events to a channel so the CLI can block until the
/// background parse completes.
struct ChannelObserver {
    tx: Mutex<mpsc::Sender<LoadEvent>>,
}

impl SessionObserver for ChannelObserver {
    fn started(&self) {
        log::info!("parsing started");
    }

    fn progress(&self, pct: u8) {
        log::info!("parsing progress: {pct}%");
    }

    fn finished(&self, ok: bool) {
        let _ = self.tx.lock().unwrap().send(LoadEvent::Finished(ok));
    }

    fn error(&self, message: &str) {
        let _ = self
            .tx
            .lock()
            .unwrap()
            .send(LoadEvent::Error(message.to_string()));
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let (tx, rx) = mpsc::channel();
    let observer = Arc::new(ChannelObserver { tx: Mutex::new(tx) });
    let session = Session::new(observer);
    session.load(&cli.path);

    loop {
        match rx.recv()? {
            LoadEvent::Finished(true) => break,
            LoadEvent::Finished(false) => continue, // the error message follows
            LoadEvent::Error(message) => bail!("failed to load {}: {message}", cli.path.display()),
        }
    }

    match cli.command {
        Command::Info => {
            let header = session.header().expect("loaded session has a header");
            println!("Type:        {}", header.type_name());
            println!("Machine:     {}", header.machine_name());
            println!("Entry point: 0x{:x}", header.e_entry);
            println!("Sections:    {}", header.e_shnum);
            println!("Symbols:     {}", session.symbols().len());
        }

        Command::Sections => {
            let sections = session.sections();
            if sections.is_empty() {
                println!("No sections found.");
            } else {
                println!(
                    "{:<20} {:<18} {:<10} {:<10} {:<10}",
                    "Section", "VMA", "Size", "Offset", "Flags"
                );
                println!("{}", "-".repeat(80));
                for s in &sections {
                    println!(
                        "{:<20} 0x{:<16x} {:<10x} {:<10x} {:<10x}",
                        s.name, s.sh_addr, s.sh_size, s.sh_offset, s.sh_flags
                    );
                }
            }
        }

        Command::Symbols => {
            let symbols = session.symbols();
            if symbols.is_empty() {
                println!("No symbols found (stripped binary?).");
            } else {
                println!(
                    "{:<28} {:<18} {:<10} {:<16}",
                    "Symbol", "Value", "Size", "Section"
                );
                println!("{}", "-".repeat(80));
                for sym in &symbols {
                    println!(
                        "{:<28} 0x{:<16x} {:<10} {:<16}",
                        sym.name, sym.value, sym.size, sym.section
                    );
                }
            }
        }

        Command::Disasm {
            section,
            base,
            thumb,
        } => {
            let base = base.unwrap_or_else(|| {
                session
                    .sections()
                    .iter()
                    .find(|s| s.name == section)
                    .map_or(0, |s| s.sh_addr)
            });
            let mode = if thumb { DecodeMode::Thumb } else { DecodeMode::Arm };
            let instructions = session.disassemble(&section, base, mode);
            if instructions.is_empty() {
                bail!("section {section} not found or empty");
            }
            for instr in &instructions {
                let bytes: Vec<String> =
                    instr.bytes.iter().map(|b| format!("{b:02X}")).collect();
                print!(
                    "0x{:08X}  {:<12} {:<8} {}",
                    instr.address,
                    bytes.join(" "),
                    instr.mnemonic,
                    instr.operands
                );
                if let Some(comment) = &instr.comment {
                    print!("  ; {comment}");
                }
                println!();
            }
        }

        Command::Hexdump {
            section,
            offset,
            length,
        } => {
            let bytes = session.hex_dump(&section, offset, length);
            if bytes.is_empty() {
                bail!("section {section} not found or offset past its end");
            }
            for (row, chunk) in bytes.chunks(16).enumerate() {
                let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
                let ascii: String = chunk
                    .iter()
                    .map(|&b| {
                        if (0x20..0x7f).contains(&b) {
                            b as char
                        } else {
                            '.'
                        }
                    })
                    .collect();
                println!(
                    "{:08x}  {:<47}  |{ascii}|",
                    offset + (row * 16) as u64,
                    hex.join(" ")
                );
            }
        }
    }

    Ok(())
}
