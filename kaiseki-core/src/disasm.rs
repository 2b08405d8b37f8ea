use byteorder::{ByteOrder, LittleEndian};

/// Execution mode for a decode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Arm,
    Thumb,
}

/// One decoded instruction record.
///
/// `bytes` holds exactly the consumed octets in stream order, so the width
/// is `bytes.len()` (2 or 4, or the short remainder of a truncated tail).
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Virtual address: region base plus the widths consumed before it.
    pub address: u64,
    /// Raw encoded bytes.
    pub bytes: Vec<u8>,
    pub mnemonic: String,
    pub operands: String,
    /// Inline annotation, e.g. a resolved symbol.
    pub comment: Option<String>,
    /// Absolute target, present exactly for branch instructions.
    pub branch_target: Option<u64>,
}

impl Instruction {
    pub fn width(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_branch(&self) -> bool {
        self.branch_target.is_some()
    }
}

/// Condition suffixes indexed by the `cond` field. Index 14 (always) is
/// rendered empty; 15 is the reserved NV encoding.
const COND_SUFFIXES: [&str; 16] = [
    "EQ", "NE", "CS", "CC", "MI", "PL", "VS", "VC", "HI", "LS", "GE", "LT", "GT", "LE", "", "NV",
];

/// A32 data-processing opcodes indexed by bits 24..21.
const DATA_OPCODES: [&str; 16] = [
    "AND", "EOR", "SUB", "RSB", "ADD", "ADC", "SBC", "RSC", "TST", "TEQ", "CMP", "CMN", "ORR",
    "MOV", "BIC", "MVN",
];

const MOV: usize = 13;
const MVN: usize = 15;

/// Linear-sweep decoder for A32, Thumb-1, and the Thumb-2 32-bit
/// encodings. Stateless over a single call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArmDisassembler;

impl ArmDisassembler {
    pub fn new() -> Self {
        Self
    }

    /// Walks `data` in one forward pass, consuming 2 or 4 octets per step.
    /// The cumulative width of the returned records always equals
    /// `data.len()`: a short tail yields one final `???` record covering
    /// the remainder.
    pub fn disassemble(&self, data: &[u8], base_va: u64, mode: DecodeMode) -> Vec<Instruction> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        while offset < data.len() {
            let address = base_va + offset as u64;
            let rest = &data[offset..];
            let instr = match mode {
                DecodeMode::Arm => {
                    if rest.len() < 4 {
                        truncated(address, rest)
                    } else {
                        decode_arm(LittleEndian::read_u32(rest), address, &rest[..4])
                    }
                }
                DecodeMode::Thumb => {
                    if rest.len() < 2 {
                        truncated(address, rest)
                    } else {
                        let hw = LittleEndian::read_u16(rest);
                        if is_thumb2_prefix(hw) && rest.len() >= 4 {
                            let hw2 = LittleEndian::read_u16(&rest[2..]);
                            decode_thumb32(u32::from(hw) << 16 | u32::from(hw2), address, &rest[..4])
                        } else {
                            decode_thumb16(hw, address, &rest[..2])
                        }
                    }
                }
            };
            offset += instr.width();
            out.push(instr);
        }
        out
    }
}

fn record(
    address: u64,
    raw: &[u8],
    mnemonic: String,
    operands: String,
    branch_target: Option<u64>,
) -> Instruction {
    Instruction {
        address,
        bytes: raw.to_vec(),
        mnemonic,
        operands,
        comment: None,
        branch_target,
    }
}

/// Final record for a tail shorter than the required width.
fn truncated(address: u64, rest: &[u8]) -> Instruction {
    record(address, rest, "???".to_string(), String::new(), None)
}

/// True when a halfword opens a 32-bit Thumb-2 encoding (top five bits
/// 11101, 11110, or 11111). These values cannot collide with the Thumb-1
/// branch encodings (`0xDxxx`, `0xE000..=0xE7FF`).
fn is_thumb2_prefix(hw: u16) -> bool {
    matches!(hw >> 11, 0b11101 | 0b11110 | 0b11111)
}

fn decode_arm(word: u32, address: u64, raw: &[u8]) -> Instruction {
    let cond = COND_SUFFIXES[(word >> 28) as usize & 0xF];

    if word & 0x0E00_0000 == 0x0A00_0000 {
        // B/BL: 24-bit signed immediate, in units of four bytes.
        let link = word & 0x0100_0000 != 0;
        let mut offset = ((word & 0x00FF_FFFF) << 2) as i32;
        if offset & 0x0200_0000 != 0 {
            offset |= 0xFC00_0000u32 as i32;
        }
        let target = address
            .wrapping_add(8)
            .wrapping_add(offset as i64 as u64);
        let mnemonic = format!("{}{cond}", if link { "BL" } else { "B" });
        record(address, raw, mnemonic, format!("0x{target:08X}"), Some(target))
    } else if word & 0x0C00_0000 == 0 {
        decode_data_processing(word, address, raw, cond)
    } else if word & 0x0C00_0000 == 0x0400_0000 {
        decode_load_store(word, address, raw, cond)
    } else {
        record(
            address,
            raw,
            format!("UNK{cond}"),
            format!("0x{word:08X}"),
            None,
        )
    }
}

fn decode_data_processing(word: u32, address: u64, raw: &[u8], cond: &str) -> Instruction {
    let opcode = (word >> 21) as usize & 0xF;
    let rd = (word >> 12) & 0xF;
    let rn = (word >> 16) & 0xF;

    let mut operands = format!("R{rd}");
    if opcode != MOV && opcode != MVN {
        operands.push_str(&format!(", R{rn}"));
    }
    if word & 0x0200_0000 != 0 {
        // Rotated immediate: 8 bits rotated right by twice the imm4 field.
        let rotate = (word >> 8) & 0xF;
        let imm = (word & 0xFF).rotate_right(rotate * 2);
        operands.push_str(&format!(", #0x{imm:X}"));
    } else {
        operands.push_str(&format!(", R{}", word & 0xF));
    }
    record(
        address,
        raw,
        format!("{}{cond}", DATA_OPCODES[opcode]),
        operands,
        None,
    )
}

fn decode_load_store(word: u32, address: u64, raw: &[u8], cond: &str) -> Instruction {
    let load = word & 0x0010_0000 != 0;
    let byte = word & 0x0040_0000 != 0;
    let rt = (word >> 12) & 0xF;
    let rn = (word >> 16) & 0xF;

    let mut operands = format!("R{rt}, [R{rn}");
    if word & 0x0200_0000 != 0 {
        operands.push_str(&format!(", R{}]", word & 0xF));
    } else {
        let imm = word & 0xFFF;
        if imm != 0 {
            let sign = if word & 0x0080_0000 != 0 { "" } else { "-" };
            operands.push_str(&format!(", #{sign}0x{imm:X}]"));
        } else {
            operands.push(']');
        }
    }
    let mnemonic = format!(
        "{}{}{cond}",
        if load { "LDR" } else { "STR" },
        if byte { "B" } else { "" }
    );
    record(address, raw, mnemonic, operands, None)
}

fn decode_thumb16(hw: u16, address: u64, raw: &[u8]) -> Instruction {
    if hw & 0xF000 == 0xD000 {
        // Conditional branch: signed 8-bit immediate, in halfwords.
        let cond = COND_SUFFIXES[(hw >> 8) as usize & 0xF];
        let offset = i64::from((hw & 0xFF) as u8 as i8) * 2;
        let target = address.wrapping_add(4).wrapping_add(offset as u64);
        record(
            address,
            raw,
            format!("B{cond}"),
            format!("0x{target:08X}"),
            Some(target),
        )
    } else if hw & 0xF800 == 0xE000 {
        // Unconditional branch: signed 11-bit immediate, in halfwords.
        let mut imm = i32::from(hw & 0x7FF);
        if imm & 0x400 != 0 {
            imm |= !0x7FF;
        }
        let target = address.wrapping_add(4).wrapping_add((imm * 2) as i64 as u64);
        record(
            address,
            raw,
            "B".to_string(),
            format!("0x{target:08X}"),
            Some(target),
        )
    } else if hw & 0xFF00 == 0x2000 {
        let rd = (hw >> 8) & 0x7;
        let imm = hw & 0xFF;
        record(
            address,
            raw,
            "MOV".to_string(),
            format!("R{rd}, #0x{imm:X}"),
            None,
        )
    } else if hw & 0xFE00 == 0x1C00 {
        let rd = hw & 0x7;
        let rn = (hw >> 3) & 0x7;
        let imm = (hw >> 6) & 0x7;
        record(
            address,
            raw,
            "ADD".to_string(),
            format!("R{rd}, R{rn}, #{imm}"),
            None,
        )
    } else {
        record(
            address,
            raw,
            "T16_UNK".to_string(),
            format!("0x{hw:04X}"),
            None,
        )
    }
}

/// `word` is the concatenation `hw1 << 16 | hw2`, first halfword most
/// significant.
fn decode_thumb32(word: u32, address: u64, raw: &[u8]) -> Instruction {
    if word & 0xF800_D000 == 0xF000_D000 {
        // BL: reassemble the 25-bit displacement from S, J1, J2, imm10,
        // imm11 as S:I1:I2:imm10:imm11:0, where In = !(Jn ^ S).
        let s = (word >> 26) & 1;
        let j1 = (word >> 13) & 1;
        let j2 = (word >> 11) & 1;
        let imm10 = (word >> 16) & 0x3FF;
        let imm11 = word & 0x7FF;
        let i1 = !(j1 ^ s) & 1;
        let i2 = !(j2 ^ s) & 1;
        let mut offset =
            ((s << 24) | (i1 << 23) | (i2 << 22) | (imm10 << 12) | (imm11 << 1)) as i32;
        if s != 0 {
            offset |= 0xFE00_0000u32 as i32;
        }
        let target = address
            .wrapping_add(4)
            .wrapping_add(offset as i64 as u64);
        record(
            address,
            raw,
            "BL".to_string(),
            format!("0x{target:08X}"),
            Some(target),
        )
    } else {
        record(
            address,
            raw,
            "T32_UNK".to_string(),
            format!("0x{word:08X}"),
            None,
        )
    }
}
