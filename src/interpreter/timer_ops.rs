//! `STM`/`CTM` (arm/disarm an interval timer), `WFS` (block for a notification signal),
//! and `DLY` (sleep).
//!
//! All secondary-table opcodes: operand bytes start at `pc()+2`, past the primary
//! `NEXT` byte at `pc()` and the secondary opcode byte at `pc()+1`.

use super::Vm;
use crate::error::VmError;
use crate::timers::{self, SignalEvent};

impl Vm {
    fn reg_pair(&self, prefix: usize) -> (usize, usize) {
        let byte = self.memory().byte(prefix + 2);
        (byte as usize >> 4, byte as usize & 0x0F)
    }

    /// `STM id_reg, ms_reg`: arms (or re-arms, tearing down the old timer) a periodic
    /// host timer.
    pub(super) fn op_stm(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let (id_reg, ms_reg) = self.reg_pair(prefix);
        let id = self.registers().unsigned(id_reg);
        let ms = self.registers().unsigned(ms_reg);
        self.timers.arm(id, ms)?;
        self.inc_pc(3)
    }

    /// `CTM id_reg`: disarms a timer.
    pub(super) fn op_ctm(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let id = self.registers().unsigned(reg);
        self.timers.disarm(id)?;
        self.inc_pc(3)
    }

    /// `WFS reg1, reg2`: blocks for any reserved real-time signal, storing the
    /// notification kind's offset in `reg1` and the payload id in `reg2`.
    pub(super) fn op_wfs(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let (kind_reg, id_reg) = self.reg_pair(prefix);
        match timers::wait_for_signal() {
            Ok(SignalEvent { signal_offset, id }) => {
                self.registers.set_signed(kind_reg, signal_offset);
                self.registers.set_signed(id_reg, id);
            }
            Err(_) => {
                self.registers.set_signed(kind_reg, -1);
                self.registers.set_signed(id_reg, -1);
            }
        }
        self.inc_pc(3)
    }

    /// `DLY reg`: sleeps for a millisecond count held in a register.
    pub(super) fn op_dly(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 2) as usize >> 4;
        let ms = self.registers().unsigned(reg);
        timers::delay(ms);
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
    fn stm_then_ctm_arms_and_disarms_a_real_timer() {
        let mut vm = vm_with(&[0x1F, SecondaryOp::Stm as u8, 0x01]);
        vm.registers.set_unsigned(0, 1);
        vm.registers.set_unsigned(1, 60_000);
        vm.op_stm().unwrap();

        let code = [0x1F, SecondaryOp::Ctm as u8, 0x00];
        vm.load_program(&code).unwrap();
        vm.set_pc(0);
        vm.op_ctm().unwrap();
    }

    #[test]
    fn ctm_on_an_unarmed_id_propagates_the_error_and_stops_the_vm() {
        let mut vm = vm_with(&[0x1F, SecondaryOp::Ctm as u8, 0x00]);
        vm.registers.set_unsigned(0, 2);
        assert!(vm.op_ctm().is_err());
    }

    #[test]
    fn dly_advances_the_pc_past_the_single_operand_byte() {
        let mut vm = vm_with(&[0x1F, SecondaryOp::Dly as u8, 0x00]);
        vm.registers.set_unsigned(0, 1);
        vm.op_dly().unwrap();
        assert_eq!(vm.pc(), 3);
    }
}
