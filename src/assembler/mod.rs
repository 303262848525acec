//! The two-pass assembler: source text to a flat byte image `crate::memory::Memory`
//! can load directly.

mod encode;
mod lexer;
mod linker;

use crate::error::AssemblerError;
use encode::encode_instruction;
use lexer::{parse_line, ParsedLine};
use linker::LabelTable;

/// Assembles `source` into a code image, or every error found along the way.
///
/// A single streaming pass emits bytes and records a label table as it goes;
/// instruction length never depends on a label's resolved address (only on whether an
/// operand is a register, an immediate, or a label), so one pass suffices to lay out
/// the whole image before a second, label-only pass patches every forward reference.
pub fn assemble(source: &str) -> Result<Vec<u8>, Vec<AssemblerError>> {
    let mut code = Vec::new();
    let mut labels = LabelTable::new();
    let mut errors = Vec::new();

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        match parse_line(raw_line, line_no) {
            Ok(ParsedLine::Empty) => {}
            Ok(ParsedLine::Label(name)) => {
                if let Err(e) = labels.define(&name, code.len(), line_no) {
                    errors.push(e);
                }
            }
            Ok(ParsedLine::Instruction(instr)) => {
                match encode_instruction(&instr, &mut labels, line_no, code.len()) {
                    Ok(bytes) => code.extend(bytes),
                    Err(e) => errors.push(e),
                }
            }
            Err(e) => errors.push(e),
        }
    }

    if let Err(mut link_errors) = labels.apply(&mut code) {
        errors.append(&mut link_errors);
    }

    if errors.is_empty() {
        Ok(code)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_a_trivial_move_and_halt() {
        let code = assemble("MOV R0, #5\nHLT\n").expect("assembly should succeed");
        assert_eq!(code, vec![0x03 | crate::opcodes::BYTE, 0x00, 0x05, 0x1B]);
    }

    #[test]
    fn resolves_a_forward_label_reference() {
        let source = "JMP skip\nNOP\nskip:\nHLT\n";
        let code = assemble(source).expect("assembly should succeed");
        // JMP (3 bytes) + NOP (1 byte) = address 4 for `skip`.
        assert_eq!(&code[0..3], &[0x0D, 0x00, 0x04]);
        assert_eq!(code[3], 0x00); // NOP
        assert_eq!(code[4], 0x1B); // HLT
    }

    #[test]
    fn reports_undefined_labels() {
        let errs = assemble("JMP nowhere\nHLT\n").unwrap_err();
        assert!(matches!(&errs[0], AssemblerError::UndefinedLabel { name, .. } if name == "nowhere"));
    }

    #[test]
    fn reports_duplicate_labels() {
        let errs = assemble("here:\nNOP\nhere:\nHLT\n").unwrap_err();
        assert!(matches!(&errs[0], AssemblerError::DuplicateLabel { name, .. } if name == "here"));
    }

    #[test]
    fn auto_sizes_a_small_immediate_to_a_byte() {
        let code = assemble("MOV R1, #100\nHLT\n").expect("assembly should succeed");
        assert_eq!(&code[0..3], &[0x03 | crate::opcodes::BYTE, 0x10, 100]);
    }

    #[test]
    fn register_register_form_sets_the_mode_bit() {
        let code = assemble("ADD R0, R1\nHLT\n").expect("assembly should succeed");
        assert_eq!(&code[0..2], &[0x04 | crate::opcodes::MODE_REG, 0x01]);
    }
}
