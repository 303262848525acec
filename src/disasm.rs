//! Human-readable memory/register dumps and a linear disassembler.
//!
//! Supplemented from the source's core-dump tooling (`MDUMP`/`RDUMP` write a dump to the
//! console); here the dump is rendered to a `String` and routed through `tracing` instead
//! of a direct `write()` call, matching how the rest of the interpreter reports state.

use std::fmt::Write as _;

use itertools::Itertools;

use crate::opcodes::{PrimaryOp, SecondaryOp, TertiaryOp};
use crate::registers::{Flags, Registers};

/// Sixteen bytes per row, offset prefix, hex bytes, then an ASCII gutter.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:06x}  ", row * 16);
        for b in chunk {
            let _ = write!(out, "{b:02x} ");
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push_str(" |");
        for &b in chunk {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' };
            out.push(c);
        }
        out.push_str("|\n");
    }
    out
}

/// Sixteen registers plus the Z/N/C flag word, each register shown under all three views.
pub fn register_dump(registers: &Registers, flags: Flags) -> String {
    let mut out = String::new();
    for r in 0..16 {
        let _ = writeln!(
            out,
            "R{r:02}  int={:<12} uint=0x{:08x}  float={}",
            registers.signed(r),
            registers.unsigned(r),
            registers.float(r),
        );
    }
    let _ = writeln!(
        out,
        "flags  Z={} N={} C={}",
        flags.zero() as u8,
        flags.negative() as u8,
        flags.carry() as u8,
    );
    out
}

/// Decodes one instruction at `addr` into its mnemonic and the number of bytes it
/// occupies, enough to drive a walking disassembler without executing anything.
pub fn decode_one(code: &[u8], addr: usize) -> (String, usize) {
    let Some(&prefix) = code.get(addr) else {
        return ("???".to_string(), 1);
    };
    match PrimaryOp::from_u8(prefix) {
        Some(PrimaryOp::Next) => {
            let Some(&secondary_prefix) = code.get(addr + 1) else {
                return ("NEXT ???".to_string(), 2);
            };
            match SecondaryOp::from_u8(secondary_prefix) {
                Some(SecondaryOp::Next) => {
                    let Some(&tertiary) = code.get(addr + 2) else {
                        return ("NEXT NEXT ???".to_string(), 3);
                    };
                    let name = match TertiaryOp::from_u8(tertiary) {
                        Some(TertiaryOp::Mdump) => "MDUMP",
                        Some(TertiaryOp::Rdump) => "RDUMP",
                        None => "???",
                    };
                    (name.to_string(), 3)
                }
                Some(op) => (format!("{op:?}").to_uppercase(), operand_width(prefix, addr, code) + 1),
                None => ("???".to_string(), 2),
            }
        }
        Some(op) => {
            let name = format!("{op:?}").to_uppercase();
            (name, operand_width(prefix, addr, code))
        }
        None => ("???".to_string(), 1),
    }
}

/// Best-effort operand width for display purposes: 2 bytes for a register-register
/// form, or 2 plus the width-tagged immediate size otherwise. Exact per-opcode operand
/// shapes live in `interpreter`; this is advisory for the disassembler's byte walk.
fn operand_width(prefix: u8, addr: usize, code: &[u8]) -> usize {
    use crate::opcodes::{BYTE, FLOAT, MODE_REG, WIDTH_MASK, WORD};
    if prefix & MODE_REG != 0 {
        return 2;
    }
    let size = match prefix & WIDTH_MASK {
        BYTE => 1,
        WORD => 2,
        FLOAT => 4,
        _ => 4,
    };
    let _ = (addr, code);
    2 + size
}

/// Walks a code region from `0` to `program_size`, returning one line per instruction.
pub fn disassemble(code: &[u8], program_size: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut addr = 0;
    while addr < program_size {
        let (mnemonic, width) = decode_one(code, addr);
        let bytes = code[addr..(addr + width).min(code.len())]
            .iter()
            .map(|b| format!("{b:02x}"))
            .join(" ");
        lines.push(format!("{addr:06x}  {bytes:<24} {mnemonic}"));
        addr += width.max(1);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::MODE_REG;

    #[test]
    fn decode_one_reads_a_plain_primary_opcode() {
        let (mnemonic, width) = decode_one(&[PrimaryOp::Hlt as u8], 0);
        assert_eq!(mnemonic, "HLT");
        assert!(width >= 1);
    }

    #[test]
    fn decode_one_walks_into_the_secondary_table_through_next() {
        let code = [PrimaryOp::Next as u8, SecondaryOp::Csb as u8, 0x01];
        let (mnemonic, width) = decode_one(&code, 0);
        assert_eq!(mnemonic, "CSB");
        assert!(width >= 2);
    }

    #[test]
    fn decode_one_walks_into_the_tertiary_table_through_two_nexts() {
        let code = [PrimaryOp::Next as u8, SecondaryOp::Next as u8, TertiaryOp::Mdump as u8];
        let (mnemonic, width) = decode_one(&code, 0);
        assert_eq!(mnemonic, "MDUMP");
        assert_eq!(width, 3);
    }

    #[test]
    fn decode_one_past_the_end_of_code_reports_unknown() {
        let (mnemonic, width) = decode_one(&[], 0);
        assert_eq!(mnemonic, "???");
        assert_eq!(width, 1);
    }

    #[test]
    fn disassemble_walks_register_register_instructions_two_bytes_at_a_time() {
        let code = [PrimaryOp::Mov as u8 | MODE_REG, 0x01, PrimaryOp::Hlt as u8];
        let lines = disassemble(&code, 2);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("MOV"));
    }

    #[test]
    fn hex_dump_pads_a_short_final_row_and_renders_an_ascii_gutter() {
        let dump = hex_dump(b"hi");
        assert!(dump.contains("68 69"));
        assert!(dump.contains("|hi"));
    }
}
