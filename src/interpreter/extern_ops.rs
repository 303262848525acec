//! The external-variable bridge opcodes: `EXT`, `GET`, `SET`, `NFY`, `EVS`, `EVE`.
//!
//! `GET`/`SET` cannot use the ordinary width-mask/mode-bit decoding every other
//! width-tagged opcode uses: the `HANDLE` tag (`0x60`) sets exactly the bits that
//! `WIDTH_MASK & prefix == WORD` and `MODE_REG` would also set for a register-addressed
//! `WORD` operand, so the two are indistinguishable after masking alone. These two
//! opcodes never address a handle via a register selected by the mode bit; a handle is
//! always a 4-byte immediate. The unmasked prefix byte is tested for the literal `0x60`
//! pattern first, and only falls back to the ordinary width mask otherwise (see
//! DESIGN.md).

use super::Vm;
use crate::error::VmError;
use crate::externvar::NotifyKind;
use crate::opcodes::{BYTE, FLOAT, HANDLE, MODE_REG, WIDTH_MASK, WORD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleDatatype {
    Handle,
    Byte,
    Word,
    Long,
    Float,
}

impl Vm {
    fn handle_datatype(&self, prefix_addr: usize) -> HandleDatatype {
        let raw = self.memory().byte(prefix_addr);
        if raw & (WIDTH_MASK | MODE_REG) == HANDLE {
            HandleDatatype::Handle
        } else {
            match raw & WIDTH_MASK {
                BYTE => HandleDatatype::Byte,
                WORD => HandleDatatype::Word,
                FLOAT => HandleDatatype::Float,
                _ => HandleDatatype::Long,
            }
        }
    }

    /// `EXT reg, addr`: resolves the NUL-terminated variable name at `addr` to a handle,
    /// stored in `reg`.
    pub(super) fn op_ext(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 1) as usize >> 4;
        let addr = self.memory().read_u16_be(prefix + 2) as usize;
        let name = String::from_utf8_lossy(self.memory().read_cstr(addr)).into_owned();
        let handle = self.externs.get_handle(&name);
        self.registers.set_unsigned(reg, handle);
        self.inc_pc(4)
    }

    /// `GET reg, handle`: fetches a value through the external bridge. The destination
    /// slot's shape depends on the width tag: `HANDLE` reads a string into the buffer
    /// named by `reg`, `FLOAT` reads a float register, anything else (including the
    /// source's orphaned `WORD` case, per DESIGN.md) reads a plain integer register.
    pub(super) fn op_get(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let dst = self.memory().byte(prefix + 1) as usize >> 4;
        let handle = self.memory().read_u32_be(prefix + 2);
        match self.handle_datatype(prefix) {
            HandleDatatype::Handle => {
                let s = self.externs.get_string(handle);
                self.stringbuffers.create(dst as i32);
                self.stringbuffers.clear(dst as i32);
                self.stringbuffers.append_string(dst as i32, &s);
            }
            HandleDatatype::Float => {
                let f = self.externs.get_float(handle);
                self.registers.set_float(dst, f);
            }
            HandleDatatype::Byte | HandleDatatype::Word | HandleDatatype::Long => {
                let v = self.externs.get(handle);
                self.registers.set_unsigned(dst, v);
            }
        }
        self.inc_pc(6)
    }

    /// `SET handle, reg`: writes a value through the external bridge. `BYTE` and
    /// `HANDLE` both mean "string" (a single disjoint arm, unlike the source's
    /// fallthrough between them, per DESIGN.md); `FLOAT` means float; everything else
    /// means integer.
    pub(super) fn op_set(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let src = self.memory().byte(prefix + 1) as usize >> 4;
        let handle = self.memory().read_u32_be(prefix + 2);
        match self.handle_datatype(prefix) {
            HandleDatatype::Byte | HandleDatatype::Handle => {
                let bytes = self.stringbuffers.get(src as i32).unwrap_or(&[]).to_vec();
                self.externs.set_string(handle, &bytes);
            }
            HandleDatatype::Float => {
                let f = self.registers().float(src);
                self.externs.set_float(handle, f);
            }
            HandleDatatype::Word | HandleDatatype::Long => {
                let v = self.registers().unsigned(src);
                self.externs.set(handle, v);
            }
        }
        self.inc_pc(6)
    }

    /// `NFY reg, handle`: requests a notification be delivered for `handle`, storing the
    /// bridge's status code in `reg`. `NFY` lives in the secondary table (reached
    /// through a primary `NEXT`), so its operand byte is at `pc()+2`.
    pub(super) fn op_nfy(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let byte = self.memory().byte(prefix + 2);
        let reg = byte as usize >> 4;
        let handle_reg = byte as usize & 0x0F;
        let handle = self.registers().unsigned(handle_reg);
        let kind = NotifyKind::from_u32(self.registers().unsigned(reg)).map(|k| k as u32).unwrap_or(0);
        let status = self.externs.notify(handle, kind);
        self.registers.set_signed(reg, status);
        self.inc_pc(3)
    }

    /// `EVS reg`: begins validation for the notification request in `reg`, storing the
    /// variable handle under validation back into `reg` (or an error sentinel).
    /// Secondary-table opcode; operand byte at `pc()+2`.
    pub(super) fn op_evs(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let request = self.registers().unsigned(reg);
        match self.externs.validate_start(request) {
            Some(handle) => {
                self.registers.set_unsigned(reg, handle);
                self.inc_pc(3)
            }
            None => {
                self.running = false;
                Err(VmError::ValidationStartFailure)
            }
        }
    }

    /// `EVE reg1, reg2`: ends validation of the handle in `reg1` with the errno-style
    /// result in `reg2`. Secondary-table opcode; operand byte at `pc()+2`.
    pub(super) fn op_eve(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let byte = self.memory().byte(prefix + 2);
        let handle_reg = byte as usize >> 4;
        let result_reg = byte as usize & 0x0F;
        let handle = self.registers().unsigned(handle_reg);
        let result = self.registers().signed(result_reg);
        self.externs.validate_end(handle, result);
        self.inc_pc(3)
    }
}

#[cfg(test)]
mod tests {
    use super::{HandleDatatype, Vm};
    use crate::opcodes::{BYTE, FLOAT, HANDLE};

    fn vm_with(code: &[u8]) -> Vm {
        let mut vm = Vm::new(64, 16).unwrap();
        vm.load_program(code).unwrap();
        vm
    }

    #[test]
    fn ext_resolves_a_name_and_stores_its_handle() {
        // EXT R0, addr(0x0006); the name "v\0" lives at offset 6, past the instruction.
        let mut vm = vm_with(&[0x1C, 0x00, 0x00, 0x06, 0x00, 0x00, b'v', 0]);
        vm.op_ext().unwrap();
        assert_ne!(vm.registers().unsigned(0), 0);
    }

    #[test]
    fn set_then_get_round_trips_an_integer_through_the_bridge() {
        let mut vm = Vm::new(64, 16).unwrap();
        let handle = vm.externs.get_handle("v");
        vm.registers.set_unsigned(1, 99);

        // SET handle, R1 (LONG width, src register in the high nibble of byte 1).
        let mut set_code = vec![0x1E, 0x10];
        set_code.extend_from_slice(&handle.to_be_bytes());
        vm.load_program(&set_code).unwrap();
        vm.op_set().unwrap();

        // GET R2, handle (LONG width, dst register in the high nibble of byte 1).
        let mut get_code = vec![0x1D, 0x20];
        get_code.extend_from_slice(&handle.to_be_bytes());
        vm.load_program(&get_code).unwrap();
        vm.set_pc(0);
        vm.op_get().unwrap();

        assert_eq!(vm.registers().unsigned(2), 99);
    }

    #[test]
    fn handle_datatype_resolves_the_0x60_literal_before_falling_back_to_the_width_mask() {
        let vm = vm_with(&[HANDLE, 0x00]);
        assert_eq!(vm.handle_datatype(0), HandleDatatype::Handle);

        let vm = vm_with(&[FLOAT, 0x00]);
        assert_eq!(vm.handle_datatype(0), HandleDatatype::Float);

        let vm = vm_with(&[BYTE, 0x00]);
        assert_eq!(vm.handle_datatype(0), HandleDatatype::Byte);
    }
}
