//! Mnemonic-to-bytes encoding, matching the exact operand layouts each opcode handler
//! in `crate::interpreter` expects.

use crate::error::AssemblerError;
use crate::opcodes::{
    PrimaryOp, SecondaryOp, TertiaryOp, BYTE, FLOAT, HANDLE, LONG, MODE_REG, WORD,
};

use super::lexer::{Operand, ParsedInstruction};
use super::linker::LabelTable;

fn width_from_suffix(suffix: Option<&str>, line: usize) -> Result<u8, AssemblerError> {
    match suffix {
        None => Ok(LONG),
        Some("B") => Ok(BYTE),
        Some("W") => Ok(WORD),
        Some("L") => Ok(LONG),
        Some("F") => Ok(FLOAT),
        Some("H") => Ok(HANDLE),
        Some(other) => Err(AssemblerError::UnknownWidthSuffix {
            line,
            suffix: other.to_string(),
        }),
    }
}

/// `BYTE` is accepted up to `0x7F`, not `0xFF`: the source's auto-size check compares an
/// unsigned literal against `SCHAR_MAX`, not `UCHAR_MAX` (see DESIGN.md).
fn auto_width(value: i64) -> u8 {
    if (-128..=0x7F).contains(&value) {
        BYTE
    } else if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
        WORD
    } else {
        LONG
    }
}

fn int_bytes(width: u8, value: i64, line: usize) -> Result<Vec<u8>, AssemblerError> {
    match width {
        BYTE => {
            if !(-128..=0xFF).contains(&value) {
                return Err(AssemblerError::ImmediateOutOfRange { line, value, width: 1 });
            }
            Ok(vec![value as u8])
        }
        WORD => {
            if !(i16::MIN as i64..=u16::MAX as i64).contains(&value) {
                return Err(AssemblerError::ImmediateOutOfRange { line, value, width: 2 });
            }
            Ok((value as u16).to_be_bytes().to_vec())
        }
        _ => Ok((value as i32 as u32).to_be_bytes().to_vec()),
    }
}

fn want_register(op: &Operand, line: usize) -> Result<u8, AssemblerError> {
    match op {
        Operand::Register(r) => Ok(*r),
        other => Err(AssemblerError::Syntax {
            line,
            message: format!("expected a register, found {other:?}"),
        }),
    }
}

fn want_buffer(op: &Operand, line: usize) -> Result<i32, AssemblerError> {
    match op {
        Operand::Buffer(id) => Ok(*id),
        Operand::Immediate(v) => Ok(*v as i32),
        other => Err(AssemblerError::Syntax {
            line,
            message: format!("expected a string-buffer id, found {other:?}"),
        }),
    }
}

/// Emits a placeholder `u16` and registers a patch site for `label`, or emits the
/// literal address directly if the operand was already numeric.
fn push_address(bytes: &mut Vec<u8>, op: &Operand, labels: &mut LabelTable, line: usize) -> Result<(), AssemblerError> {
    match op {
        Operand::Label(name) => {
            labels.reference(name, bytes.len(), line);
            bytes.extend_from_slice(&[0, 0]);
            Ok(())
        }
        Operand::Immediate(v) => {
            bytes.extend_from_slice(&(*v as u16).to_be_bytes());
            Ok(())
        }
        other => Err(AssemblerError::Syntax {
            line,
            message: format!("expected a label or address, found {other:?}"),
        }),
    }
}

/// Splits `MOV.F` into `("MOV", Some("F"))`.
fn split_suffix(mnemonic: &str) -> (&str, Option<&str>) {
    match mnemonic.split_once('.') {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (mnemonic, None),
    }
}

/// `LOD`/`STR`/`MOV`/`ADD`/`SUB`/`MUL`/`DIV`/`AND`/`OR`/`SHR`/`SHL`/`CMP`: two operands,
/// register-register or register-immediate, width-tagged.
fn encode_alu(op_byte: u8, instr: &ParsedInstruction, suffix: Option<&str>, line: usize) -> Result<Vec<u8>, AssemblerError> {
    let dst = want_register(&instr.operands[0], line)?;
    let rhs = instr.operands.get(1).ok_or_else(|| AssemblerError::Syntax {
        line,
        message: "expected a second operand".to_string(),
    })?;
    match rhs {
        Operand::Register(src) => Ok(vec![op_byte | MODE_REG, (dst << 4) | src]),
        Operand::Immediate(v) => {
            let width = match suffix {
                Some(_) => width_from_suffix(suffix, line)?,
                None => auto_width(*v),
            };
            let mut bytes = vec![op_byte | width, dst << 4];
            bytes.extend(int_bytes(width, *v, line)?);
            Ok(bytes)
        }
        Operand::FloatImmediate(f) => {
            let mut bytes = vec![op_byte | FLOAT, dst << 4];
            bytes.extend_from_slice(&f.to_bits().to_be_bytes());
            Ok(bytes)
        }
        other => Err(AssemblerError::Syntax {
            line,
            message: format!("unsupported right-hand operand {other:?}"),
        }),
    }
}

fn encode_single_reg(op_byte: u8, instr: &ParsedInstruction, line: usize) -> Result<Vec<u8>, AssemblerError> {
    let reg = want_register(
        instr.operands.first().ok_or_else(|| AssemblerError::Syntax {
            line,
            message: "expected a register operand".to_string(),
        })?,
        line,
    )?;
    Ok(vec![op_byte, reg << 4])
}

fn encode_reg_pair(op_byte: u8, instr: &ParsedInstruction, line: usize) -> Result<Vec<u8>, AssemblerError> {
    let a = want_register(&instr.operands[0], line)?;
    let b = want_register(&instr.operands[1], line)?;
    Ok(vec![PrimaryOp::Next as u8, op_byte, (a << 4) | b])
}

fn encode_buffer_only(op_byte: u8, instr: &ParsedInstruction, line: usize) -> Result<Vec<u8>, AssemblerError> {
    let id = want_buffer(&instr.operands[0], line)?;
    Ok(vec![PrimaryOp::Next as u8, op_byte, id as u8])
}

fn encode_buffer_reg(op_byte: u8, instr: &ParsedInstruction, line: usize) -> Result<Vec<u8>, AssemblerError> {
    let id = want_buffer(&instr.operands[0], line)?;
    let reg = want_register(&instr.operands[1], line)?;
    Ok(vec![PrimaryOp::Next as u8, op_byte, id as u8, reg << 4])
}

fn encode_buffer_buffer(op_byte: u8, instr: &ParsedInstruction, line: usize) -> Result<Vec<u8>, AssemblerError> {
    let dst = want_buffer(&instr.operands[0], line)?;
    let src = want_buffer(&instr.operands[1], line)?;
    Ok(vec![PrimaryOp::Next as u8, op_byte, dst as u8, src as u8])
}

fn encode_single_reg_secondary(op_byte: u8, instr: &ParsedInstruction, line: usize) -> Result<Vec<u8>, AssemblerError> {
    let reg = want_register(&instr.operands[0], line)?;
    Ok(vec![PrimaryOp::Next as u8, op_byte, reg << 4])
}

/// Encodes one parsed instruction into bytes, registering any label reference as a
/// patch site. `code_len` is this instruction's starting address, used only for error
/// messages.
pub fn encode_instruction(
    instr: &ParsedInstruction,
    labels: &mut LabelTable,
    line: usize,
    code_len: usize,
) -> Result<Vec<u8>, AssemblerError> {
    let (base, suffix) = split_suffix(&instr.mnemonic);
    let _ = code_len;

    let bytes = match base {
        "NOP" => vec![PrimaryOp::Nop as u8],
        "HLT" => vec![PrimaryOp::Hlt as u8],
        "RET" => vec![PrimaryOp::Ret as u8],

        "LOD" => encode_alu(PrimaryOp::Lod as u8, instr, suffix, line)?,
        "STR" => encode_alu(PrimaryOp::Str as u8, instr, suffix, line)?,
        "MOV" => encode_alu(PrimaryOp::Mov as u8, instr, suffix, line)?,
        "ADD" => encode_alu(PrimaryOp::Add as u8, instr, suffix, line)?,
        "SUB" => encode_alu(PrimaryOp::Sub as u8, instr, suffix, line)?,
        "MUL" => encode_alu(PrimaryOp::Mul as u8, instr, suffix, line)?,
        "DIV" => encode_alu(PrimaryOp::Div as u8, instr, suffix, line)?,
        "AND" => encode_alu(PrimaryOp::And as u8, instr, suffix, line)?,
        "OR" => encode_alu(PrimaryOp::Or as u8, instr, suffix, line)?,
        "SHR" => encode_alu(PrimaryOp::Shr as u8, instr, suffix, line)?,
        "SHL" => encode_alu(PrimaryOp::Shl as u8, instr, suffix, line)?,
        "CMP" => encode_alu(PrimaryOp::Cmp as u8, instr, suffix, line)?,

        "NOT" => encode_single_reg(PrimaryOp::Not as u8, instr, line)?,
        "TOF" => encode_single_reg(PrimaryOp::Tof as u8, instr, line)?,
        "TOI" => encode_single_reg(PrimaryOp::Toi as u8, instr, line)?,
        "PSH" => encode_single_reg(PrimaryOp::Psh as u8, instr, line)?,
        "POP" => encode_single_reg(PrimaryOp::Pop as u8, instr, line)?,

        "JMP" | "JZR" | "JNZ" | "JNE" | "JPO" | "JCA" | "JNC" | "CAL" => {
            let op_byte = match base {
                "JMP" => PrimaryOp::Jmp as u8,
                "JZR" => PrimaryOp::Jzr as u8,
                "JNZ" => PrimaryOp::Jnz as u8,
                "JNE" => PrimaryOp::Jne as u8,
                "JPO" => PrimaryOp::Jpo as u8,
                "JCA" => PrimaryOp::Jca as u8,
                "JNC" => PrimaryOp::Jnc as u8,
                _ => PrimaryOp::Cal as u8,
            };
            match &instr.operands[0] {
                Operand::Register(r) => vec![op_byte | MODE_REG, *r],
                target @ (Operand::Label(_) | Operand::Immediate(_)) => {
                    let mut bytes = vec![op_byte];
                    push_address(&mut bytes, target, labels, line)?;
                    bytes
                }
                other => {
                    return Err(AssemblerError::Syntax {
                        line,
                        message: format!("unsupported jump target {other:?}"),
                    })
                }
            }
        }

        "EXT" => {
            let reg = want_register(&instr.operands[0], line)?;
            let mut bytes = vec![PrimaryOp::Ext as u8, reg << 4];
            push_address(&mut bytes, &instr.operands[1], labels, line)?;
            bytes
        }

        "GET" | "SET" => {
            let reg = want_register(&instr.operands[0], line)?;
            let tag = width_from_suffix(suffix, line)?;
            let op_byte = if base == "GET" { PrimaryOp::Get as u8 } else { PrimaryOp::Set as u8 };
            let handle = match &instr.operands[1] {
                Operand::Immediate(v) => *v as u32,
                other => {
                    return Err(AssemblerError::Syntax {
                        line,
                        message: format!("expected a handle literal, found {other:?}"),
                    })
                }
            };
            let mut bytes = vec![op_byte | tag, reg << 4];
            bytes.extend_from_slice(&handle.to_be_bytes());
            bytes
        }

        "CSB" => encode_buffer_only(SecondaryOp::Csb as u8, instr, line)?,
        "ZSB" => encode_buffer_only(SecondaryOp::Zsb as u8, instr, line)?,
        "WSB" => encode_buffer_only(SecondaryOp::Wsb as u8, instr, line)?,
        "EXE" => encode_buffer_only(SecondaryOp::Exe as u8, instr, line)?,

        "ASS" => {
            let id = want_buffer(&instr.operands[0], line)?;
            let mut bytes = vec![PrimaryOp::Next as u8, SecondaryOp::Ass as u8, id as u8];
            push_address(&mut bytes, &instr.operands[1], labels, line)?;
            bytes
        }
        "ASB" => encode_buffer_buffer(SecondaryOp::Asb as u8, instr, line)?,
        "ASN" => encode_buffer_reg(SecondaryOp::Asn as u8, instr, line)?,
        "ASC" => encode_buffer_reg(SecondaryOp::Asc as u8, instr, line)?,
        "ASF" => encode_buffer_reg(SecondaryOp::Asf as u8, instr, line)?,
        "SBL" => encode_buffer_reg(SecondaryOp::Sbl as u8, instr, line)?,
        "SBO" => encode_buffer_reg(SecondaryOp::Sbo as u8, instr, line)?,
        "SCO" => encode_buffer_reg(SecondaryOp::Sco as u8, instr, line)?,
        "GCO" => encode_buffer_reg(SecondaryOp::Gco as u8, instr, line)?,

        "RDC" => encode_single_reg_secondary(SecondaryOp::Rdc as u8, instr, line)?,
        "RDN" => encode_single_reg_secondary(SecondaryOp::Rdn as u8, instr, line)?,
        "WRN" => encode_single_reg_secondary(SecondaryOp::Wrn as u8, instr, line)?,
        "WRC" => encode_single_reg_secondary(SecondaryOp::Wrc as u8, instr, line)?,
        "WRF" => encode_single_reg_secondary(SecondaryOp::Wrf as u8, instr, line)?,
        "CFD" => encode_single_reg_secondary(SecondaryOp::Cfd as u8, instr, line)?,
        "SFD" => encode_single_reg_secondary(SecondaryOp::Sfd as u8, instr, line)?,
        "DLY" => encode_single_reg_secondary(SecondaryOp::Dly as u8, instr, line)?,
        "OPS" => encode_single_reg_secondary(SecondaryOp::Ops as u8, instr, line)?,
        "CPS" => encode_single_reg_secondary(SecondaryOp::Cps as u8, instr, line)?,
        "CTM" => encode_single_reg_secondary(SecondaryOp::Ctm as u8, instr, line)?,
        "EVS" => encode_single_reg_secondary(SecondaryOp::Evs as u8, instr, line)?,

        "STM" => encode_reg_pair(SecondaryOp::Stm as u8, instr, line)?,
        "WFS" => encode_reg_pair(SecondaryOp::Wfs as u8, instr, line)?,
        "NFY" => encode_reg_pair(SecondaryOp::Nfy as u8, instr, line)?,
        "EVE" => encode_reg_pair(SecondaryOp::Eve as u8, instr, line)?,

        "WRS" => {
            let mut bytes = vec![PrimaryOp::Next as u8, SecondaryOp::Wrs as u8];
            push_address(&mut bytes, &instr.operands[0], labels, line)?;
            bytes
        }

        "OFD" => {
            let reg = want_register(&instr.operands[0], line)?;
            let mode = match &instr.operands[2] {
                Operand::Char(c) => *c,
                other => {
                    return Err(AssemblerError::Syntax {
                        line,
                        message: format!("expected a mode character, found {other:?}"),
                    })
                }
            };
            let mut bytes = vec![PrimaryOp::Next as u8, SecondaryOp::Ofd as u8, reg << 4];
            push_address(&mut bytes, &instr.operands[1], labels, line)?;
            bytes.push(mode);
            bytes
        }

        "MDUMP" => vec![PrimaryOp::Next as u8, SecondaryOp::Next as u8, TertiaryOp::Mdump as u8],
        "RDUMP" => vec![PrimaryOp::Next as u8, SecondaryOp::Next as u8, TertiaryOp::Rdump as u8],

        "DAT" => encode_dat(suffix, instr, line)?,

        other => {
            return Err(AssemblerError::UnknownMnemonic {
                line,
                name: other.to_string(),
            })
        }
    };
    Ok(bytes)
}

/// `DAT.B`/`DAT.W`/`DAT.L`/`DAT.F`/`DAT.STR`: raw literal data embedded in the code
/// image, used as the target of `ASS`/`WRS`/`OFD`/`EXT` address operands.
fn encode_dat(suffix: Option<&str>, instr: &ParsedInstruction, line: usize) -> Result<Vec<u8>, AssemblerError> {
    let operand = instr.operands.first().ok_or_else(|| AssemblerError::Syntax {
        line,
        message: "DAT requires an operand".to_string(),
    })?;
    match suffix {
        Some("STR") => match operand {
            Operand::Str(bytes) => {
                let mut out = bytes.clone();
                out.push(0);
                Ok(out)
            }
            other => Err(AssemblerError::Syntax {
                line,
                message: format!("DAT.STR expects a string literal, found {other:?}"),
            }),
        },
        Some("F") => match operand {
            Operand::FloatImmediate(f) => Ok(f.to_bits().to_be_bytes().to_vec()),
            other => Err(AssemblerError::Syntax {
                line,
                message: format!("DAT.F expects a float literal, found {other:?}"),
            }),
        },
        suffix => {
            let width = width_from_suffix(suffix.or(Some("L")), line)?;
            let value = match operand {
                Operand::Immediate(v) => *v,
                Operand::Char(c) => *c as i64,
                other => {
                    return Err(AssemblerError::Syntax {
                        line,
                        message: format!("DAT expects a numeric literal, found {other:?}"),
                    })
                }
            };
            int_bytes(width, value, line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::PrimaryOp;

    fn instr(mnemonic: &str, operands: Vec<Operand>) -> ParsedInstruction {
        ParsedInstruction {
            mnemonic: mnemonic.to_string(),
            operands,
        }
    }

    #[test]
    fn auto_width_picks_byte_up_to_0x7f_but_word_at_0x80() {
        assert_eq!(auto_width(0x7F), BYTE);
        assert_eq!(auto_width(0x80), WORD);
        assert_eq!(auto_width(-128), BYTE);
        assert_eq!(auto_width(i16::MAX as i64), WORD);
        assert_eq!(auto_width(i16::MAX as i64 + 1), LONG);
    }

    #[test]
    fn encode_alu_with_an_unsuffixed_small_immediate_auto_sizes_to_byte() {
        let i = instr("ADD", vec![Operand::Register(2), Operand::Immediate(5)]);
        let bytes = encode_alu(PrimaryOp::Add as u8, &i, None, 1).unwrap();
        assert_eq!(bytes, vec![PrimaryOp::Add as u8 | BYTE, 2 << 4, 5]);
    }

    #[test]
    fn encode_alu_register_register_sets_mode_reg_and_packs_both_nibbles() {
        let i = instr("MOV", vec![Operand::Register(1), Operand::Register(3)]);
        let bytes = encode_alu(PrimaryOp::Mov as u8, &i, None, 1).unwrap();
        assert_eq!(bytes, vec![PrimaryOp::Mov as u8 | MODE_REG, (1 << 4) | 3]);
    }

    #[test]
    fn int_bytes_rejects_a_byte_value_below_its_signed_floor() {
        assert!(int_bytes(BYTE, -129, 1).is_err());
        assert!(int_bytes(BYTE, 0xFF, 1).is_ok());
    }

    #[test]
    fn push_address_emits_a_placeholder_and_registers_a_label_reference() {
        let mut labels = LabelTable::new();
        let mut bytes = Vec::new();
        push_address(&mut bytes, &Operand::Label("done".to_string()), &mut labels, 1).unwrap();
        assert_eq!(bytes, vec![0, 0]);
    }

    #[test]
    fn split_suffix_separates_the_base_mnemonic_from_a_dotted_width_tag() {
        assert_eq!(split_suffix("MOV.F"), ("MOV", Some("F")));
        assert_eq!(split_suffix("HLT"), ("HLT", None));
    }
}
