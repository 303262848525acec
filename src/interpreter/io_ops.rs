//! File and text I/O opcodes: `RDN`/`RDC`/`WRN`/`WRC`/`WRF`/`WRS`/`OFD`/`CFD`/`SFD`, plus
//! `OPS`/`CPS` (opening and closing an externally-hosted print session).
//!
//! All secondary-table opcodes: `self.pc()` points at the primary `NEXT` byte while a
//! handler runs, so the first operand byte is at `pc()+2`, past the secondary opcode
//! byte at `pc()+1`.

use super::Vm;
use crate::consts::REG_R0;
use crate::error::VmError;

impl Vm {
    fn set_r0(&mut self, ok: bool) {
        self.registers.set_signed(REG_R0, if ok { 0 } else { -1 });
    }

    /// `RDN reg`: reads an integer from the active read fd into a register.
    pub(super) fn op_rdn(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        match self.files.read_num() {
            Ok(n) => {
                self.registers.set_signed(reg, n);
                self.set_r0(true);
            }
            Err(_) => self.set_r0(false),
        }
        self.inc_pc(3)
    }

    /// `RDC reg`: reads one character from the active read fd into a register.
    pub(super) fn op_rdc(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        match self.files.read_char() {
            Ok(c) => {
                self.registers.set_unsigned(reg, c as u32);
                self.set_r0(true);
            }
            Err(_) => self.set_r0(false),
        }
        self.inc_pc(3)
    }

    pub(super) fn op_wrn(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let n = self.registers().signed(reg);
        let ok = self.files.write_num(n).is_ok();
        self.set_r0(ok);
        self.inc_pc(3)
    }

    pub(super) fn op_wrc(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let c = self.registers().unsigned(reg) as u8;
        let ok = self.files.write_char(c).is_ok();
        self.set_r0(ok);
        self.inc_pc(3)
    }

    pub(super) fn op_wrf(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let f = self.registers().float(reg);
        let ok = self.files.write_float(f).is_ok();
        self.set_r0(ok);
        self.inc_pc(3)
    }

    /// `WRS addr`: writes a NUL-terminated string literal from memory to the active
    /// write fd.
    pub(super) fn op_wrs(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let addr = self.memory().read_u16_be(prefix + 2) as usize;
        let s = self.memory().read_cstr(addr).to_vec();
        let ok = self.files.write_string(&s).is_ok();
        self.set_r0(ok);
        self.inc_pc(4)
    }

    /// `OFD reg, addr, mode`: opens the NUL-terminated path at `addr` with a literal
    /// mode-character byte, storing the new VM fd in `reg` (or a sentinel on failure).
    pub(super) fn op_ofd(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let addr = self.memory().read_u16_be(prefix + 3) as usize;
        let mode = self.memory().byte(prefix + 5) as char;
        let path = String::from_utf8_lossy(self.memory().read_cstr(addr)).into_owned();
        match self.files.open(&path, mode) {
            Ok(fd) => {
                self.registers.set_signed(reg, fd);
                self.set_r0(true);
            }
            Err(_) => {
                self.registers.set_signed(reg, -1);
                self.set_r0(false);
            }
        }
        self.inc_pc(6)
    }

    pub(super) fn op_cfd(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let fd = self.registers().signed(reg);
        let ok = self.files.close(fd).is_ok();
        self.set_r0(ok);
        self.inc_pc(3)
    }

    pub(super) fn op_sfd(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let fd = self.registers().signed(reg);
        let ok = self.files.set_active(fd).is_ok();
        self.set_r0(ok);
        self.inc_pc(3)
    }

    /// `OPS reg`: asks the external-variable bridge to open a print session for the
    /// notification request named by `reg`, registering the fd it hands back as a new
    /// active write fd (text mode).
    pub(super) fn op_ops(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let request = self.registers().unsigned(reg);
        match self.externs.open_print_session(request) {
            Some((_handle, fd)) => {
                let ok = self.files.set_extern_write_fd(fd, 'w').is_ok();
                self.set_r0(ok);
            }
            None => self.set_r0(false),
        }
        self.inc_pc(3)
    }

    /// `CPS reg`: closes a previously opened print session.
    pub(super) fn op_cps(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let handle = self.registers().unsigned(reg);
        let fd = self.files.active_write_fd();
        self.externs.close_print_session(handle, fd);
        let ok = self.files.clear_extern_fd(fd).is_ok();
        self.set_r0(ok);
        self.inc_pc(3)
    }
}
