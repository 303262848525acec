//! String-buffer opcodes: `CSB`/`ZSB`/`WSB`/`ASS`/`ASB`/`ASN`/`ASC`/`ASF`/`SBL`/`SBO`/
//! `SCO`/`GCO`, plus `EXE` (shell command execution).
//!
//! All of these live in the secondary table, reached through a primary `NEXT`
//! trampoline: `self.pc()` still points at that primary `0x1F` byte while a handler
//! runs, so operand bytes start two past it (`pc()+1` is the secondary opcode byte
//! itself, `pc()+2` is the first operand).

use std::process::Command;

use super::Vm;
use crate::error::VmError;

impl Vm {
    fn buffer_id_at(&self, prefix: usize) -> i32 {
        self.memory().byte(prefix + 2) as i32
    }

    pub(super) fn op_csb(&mut self) -> Result<(), VmError> {
        let id = self.buffer_id_at(self.pc());
        self.stringbuffers.create(id);
        self.inc_pc(3)
    }

    pub(super) fn op_zsb(&mut self) -> Result<(), VmError> {
        let id = self.buffer_id_at(self.pc());
        self.stringbuffers.clear(id);
        self.inc_pc(3)
    }

    /// `WSB`: writes the buffer's contents to the active write fd.
    pub(super) fn op_wsb(&mut self) -> Result<(), VmError> {
        let id = self.buffer_id_at(self.pc());
        if let Some(bytes) = self.stringbuffers.get(id) {
            let bytes = bytes.to_vec();
            let _ = self.files.write_string(&bytes);
        }
        self.inc_pc(3)
    }

    /// `ASS`: appends a string literal read from memory at the address following the
    /// buffer id, NUL-terminated, to the buffer.
    pub(super) fn op_ass(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let id = self.buffer_id_at(prefix);
        let addr = self.memory().read_u16_be(prefix + 3) as usize;
        let s = self.memory().read_cstr(addr).to_vec();
        self.stringbuffers.append_string(id, &s);
        self.inc_pc(5)
    }

    /// `ASB`: appends the contents of one buffer to another.
    pub(super) fn op_asb(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let dst = self.buffer_id_at(prefix);
        let src = self.memory().byte(prefix + 3) as i32;
        self.stringbuffers.append_buffer(dst, src);
        self.inc_pc(4)
    }

    /// `ASN`: appends the decimal rendering of a register's signed value.
    pub(super) fn op_asn(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let id = self.buffer_id_at(prefix);
        let reg = self.memory().byte(prefix + 3) as usize >> 4;
        let n = self.registers().signed(reg);
        self.stringbuffers.append_number(id, n);
        self.inc_pc(4)
    }

    /// `ASC`: appends a single character held in a register's low byte.
    pub(super) fn op_asc(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let id = self.buffer_id_at(prefix);
        let reg = self.memory().byte(prefix + 3) as usize >> 4;
        let c = self.registers().unsigned(reg) as u8;
        self.stringbuffers.append_char(id, c);
        self.inc_pc(4)
    }

    /// `ASF`: appends a register's float value.
    pub(super) fn op_asf(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let id = self.buffer_id_at(prefix);
        let reg = self.memory().byte(prefix + 3) as usize >> 4;
        let f = self.registers().float(reg);
        self.stringbuffers.append_float(id, f);
        self.inc_pc(4)
    }

    pub(super) fn op_sbl(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let id = self.buffer_id_at(prefix);
        let dst = self.memory().byte(prefix + 3) as usize >> 4;
        let len = self.stringbuffers.length(id);
        self.registers.set_signed(dst, len);
        self.inc_pc(4)
    }

    /// `SBO`: sets the buffer's random-access read/write cursor from a register.
    pub(super) fn op_sbo(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let id = self.buffer_id_at(prefix);
        let reg = self.memory().byte(prefix + 3) as usize >> 4;
        let offset = self.registers().unsigned(reg) as usize;
        self.stringbuffers.set_rw_offset(id, offset);
        self.inc_pc(4)
    }

    /// `SCO`: stores a single character (from a register's low byte) at the buffer's
    /// current cursor; one call, matching the corrected semantics in DESIGN.md.
    pub(super) fn op_sco(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let id = self.buffer_id_at(prefix);
        let reg = self.memory().byte(prefix + 3) as usize >> 4;
        let c = self.registers().unsigned(reg) as u8;
        self.stringbuffers.set_char_at_offset(id, c);
        self.inc_pc(4)
    }

    /// `GCO`: reads the character at the buffer's cursor into a register.
    pub(super) fn op_gco(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let id = self.buffer_id_at(prefix);
        let dst = self.memory().byte(prefix + 3) as usize >> 4;
        let c = self.stringbuffers.char_at_offset(id);
        self.registers.set_unsigned(dst, c as u32);
        self.inc_pc(4)
    }

    /// `EXE`: runs the buffer's contents as a shell command line, storing the child's
    /// exit status in `R0`.
    pub(super) fn op_exe(&mut self) -> Result<(), VmError> {
        let id = self.buffer_id_at(self.pc());
        let status = match self.stringbuffers.get(id) {
            Some(bytes) => {
                let cmd = String::from_utf8_lossy(bytes).into_owned();
                Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .status()
                    .ok()
                    .and_then(|s| s.code())
                    .unwrap_or(-1)
            }
            None => -1,
        };
        self.registers.set_signed(crate::consts::REG_R0, status);
        self.inc_pc(3)
    }
}

#[cfg(test)]
mod tests {
    use super::Vm;
    use crate::opcodes::SecondaryOp;

    fn vm_with(code: &[u8]) -> Vm {
        let mut vm = Vm::new(64, 16).unwrap();
        vm.load_program(code).unwrap();
        vm
    }

    #[test]
    fn csb_creates_a_buffer_that_asc_can_then_append_a_character_into() {
        let mut vm = vm_with(&[0x1F, SecondaryOp::Csb as u8, 0x01]);
        vm.op_csb().unwrap();

        let code = [0x1F, SecondaryOp::Asc as u8, 0x01, 0x00];
        vm.load_program(&code).unwrap();
        vm.set_pc(0);
        vm.registers.set_unsigned(0, b'x' as u32);
        vm.op_asc().unwrap();

        assert_eq!(vm.stringbuffers.get(1).unwrap(), b"x");
    }

    #[test]
    fn asn_appends_the_decimal_rendering_of_a_signed_register() {
        let mut vm = vm_with(&[0x1F, SecondaryOp::Csb as u8, 0x02]);
        vm.op_csb().unwrap();

        let code = [0x1F, SecondaryOp::Asn as u8, 0x02, 0x00];
        vm.load_program(&code).unwrap();
        vm.set_pc(0);
        vm.registers.set_signed(0, -7);
        vm.op_asn().unwrap();

        assert_eq!(vm.stringbuffers.length(2), 2);
        assert_eq!(vm.stringbuffers.get(2).unwrap(), b"-7");
    }

    #[test]
    fn sbl_reports_the_buffers_current_length_into_a_register() {
        let mut vm = vm_with(&[0x1F, SecondaryOp::Csb as u8, 0x03]);
        vm.op_csb().unwrap();
        vm.stringbuffers.append_string(3, b"abcd");

        let code = [0x1F, SecondaryOp::Sbl as u8, 0x03, 0x00];
        vm.load_program(&code).unwrap();
        vm.set_pc(0);
        vm.op_sbl().unwrap();

        assert_eq!(vm.registers().signed(0), 4);
    }

    #[test]
    fn sbo_then_gco_reads_back_the_character_at_the_chosen_cursor() {
        let mut vm = vm_with(&[0x1F, SecondaryOp::Csb as u8, 0x04]);
        vm.op_csb().unwrap();
        vm.stringbuffers.append_string(4, b"hello");

        let code = [0x1F, SecondaryOp::Sbo as u8, 0x04, 0x10];
        vm.load_program(&code).unwrap();
        vm.set_pc(0);
        vm.registers.set_unsigned(1, 1);
        vm.op_sbo().unwrap();

        let code = [0x1F, SecondaryOp::Gco as u8, 0x04, 0x00];
        vm.load_program(&code).unwrap();
        vm.set_pc(0);
        vm.op_gco().unwrap();

        assert_eq!(vm.registers().unsigned(0), b'e' as u32);
    }

    #[test]
    fn zsb_clears_a_buffers_contents_back_to_empty() {
        let mut vm = vm_with(&[0x1F, SecondaryOp::Csb as u8, 0x05]);
        vm.op_csb().unwrap();
        vm.stringbuffers.append_string(5, b"abc");
        assert_eq!(vm.stringbuffers.length(5), 3);

        let code = [0x1F, SecondaryOp::Zsb as u8, 0x05];
        vm.load_program(&code).unwrap();
        vm.set_pc(0);
        vm.op_zsb().unwrap();

        assert_eq!(vm.stringbuffers.length(5), 0);
    }
}
