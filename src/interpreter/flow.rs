//! Control transfer: `JMP` and its conditional variants, `CAL`/`RET`, `PSH`/`POP`, `HLT`.
//!
//! A jump target is either a register (mode bit set, full 32-bit unsigned value) or an
//! immediate 16-bit big-endian address following the prefix byte, matching the width the
//! assembler's label linker patches.

use super::Vm;
use crate::consts::WORD_SIZE;
use crate::error::VmError;

impl Vm {
    /// Reads a jump target and returns `(address, bytes consumed after the prefix byte)`.
    fn jump_target(&self, prefix: usize) -> (usize, usize) {
        if self.is_register_mode(prefix) {
            let reg = self.memory().byte(prefix + 1) as usize & 0x0F;
            (self.registers().unsigned(reg) as usize, 1)
        } else {
            let addr = self.memory().read_u16_be(prefix + 1) as usize;
            (addr, 2)
        }
    }

    fn take_branch(&mut self, taken: bool) -> Result<(), VmError> {
        let prefix = self.pc();
        let (target, consumed) = self.jump_target(prefix);
        if taken {
            self.set_pc(target);
            Ok(())
        } else {
            self.inc_pc(1 + consumed)
        }
    }

    pub(super) fn op_jmp(&mut self) -> Result<(), VmError> {
        self.take_branch(true)
    }

    pub(super) fn op_jzr(&mut self) -> Result<(), VmError> {
        let taken = self.flags().zero();
        self.take_branch(taken)
    }

    pub(super) fn op_jnz(&mut self) -> Result<(), VmError> {
        let taken = !self.flags().zero();
        self.take_branch(taken)
    }

    pub(super) fn op_jne(&mut self) -> Result<(), VmError> {
        let taken = !self.flags().zero();
        self.take_branch(taken)
    }

    pub(super) fn op_jpo(&mut self) -> Result<(), VmError> {
        let taken = !self.flags().negative();
        self.take_branch(taken)
    }

    pub(super) fn op_jca(&mut self) -> Result<(), VmError> {
        let taken = self.flags().carry();
        self.take_branch(taken)
    }

    /// Tests the Z flag rather than C, a literal quirk of the source's branch table
    /// (see DESIGN.md) preserved rather than "fixed" since nothing calls this out as a bug.
    pub(super) fn op_jnc(&mut self) -> Result<(), VmError> {
        let taken = !self.flags().zero();
        self.take_branch(taken)
    }

    /// `CAL`: pushes the return address (first byte past this instruction), bumps the
    /// call depth, tags the string-buffer manager with the new level, then jumps.
    pub(super) fn op_cal(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let (target, consumed) = self.jump_target(prefix);
        let return_addr = prefix + 1 + consumed;

        let sp = self.sp() - WORD_SIZE;
        if sp < self.stack_floor() {
            self.running = false;
            return Err(VmError::StackOverflow);
        }
        self.memory_mut().write_u32_be(sp, return_addr as u32);
        self.set_sp(sp);

        self.call_depth += 1;
        self.stringbuffers.set_level(self.call_depth);
        self.set_pc(target);
        Ok(())
    }

    /// `RET`: pops the return address, releases every string buffer tagged with the
    /// outgoing call depth, and resumes at the popped address.
    pub(super) fn op_ret(&mut self) -> Result<(), VmError> {
        let sp = self.sp();
        if sp + WORD_SIZE > self.stack_ceiling() {
            self.running = false;
            return Err(VmError::StackUnderflow);
        }
        let return_addr = self.memory().read_u32_be(sp);
        self.set_sp(sp + WORD_SIZE);

        self.stringbuffers.free_level(self.call_depth);
        self.call_depth = self.call_depth.saturating_sub(1);
        self.stringbuffers.set_level(self.call_depth);

        self.set_pc(return_addr as usize);
        Ok(())
    }

    /// `PSH reg`: pushes a register's raw bytes onto the stack, full word width.
    pub(super) fn op_psh(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 1) as usize >> 4;
        let sp = self.sp() - WORD_SIZE;
        if sp < self.stack_floor() {
            self.running = false;
            return Err(VmError::StackOverflow);
        }
        let bytes = self.registers().raw_be_bytes(reg);
        self.memory_mut().write_u32_be(sp, u32::from_be_bytes(bytes));
        self.set_sp(sp);
        self.inc_pc(2)
    }

    /// `POP reg`: pops a full word off the stack into a register.
    pub(super) fn op_pop(&mut self) -> Result<(), VmError> {
        let prefix = self.pc();
        let reg = self.memory().byte(prefix + 1) as usize >> 4;
        let sp = self.sp();
        if sp + WORD_SIZE > self.stack_ceiling() {
            self.running = false;
            return Err(VmError::StackUnderflow);
        }
        let word = self.memory().read_u32_be(sp);
        self.registers.set_raw_be_bytes(reg, word.to_be_bytes());
        self.set_sp(sp + WORD_SIZE);
        self.inc_pc(2)
    }

    pub(super) fn op_hlt(&mut self) -> Result<(), VmError> {
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Vm;
    use crate::consts::{REG_R0, WORD_SIZE};

    fn vm_with(code: &[u8]) -> Vm {
        let mut vm = Vm::new(64, 16).unwrap();
        vm.load_program(code).unwrap();
        vm
    }

    #[test]
    fn jmp_immediate_sets_pc_to_the_encoded_address() {
        let mut vm = vm_with(&[0x0D, 0x00, 0x20]);
        vm.op_jmp().unwrap();
        assert_eq!(vm.pc(), 0x20);
    }

    #[test]
    fn jzr_falls_through_when_zero_flag_is_clear() {
        let mut vm = vm_with(&[0x0E, 0x00, 0x20]);
        vm.op_jzr().unwrap();
        assert_eq!(vm.pc(), 3);
    }

    #[test]
    fn hlt_clears_the_running_flag() {
        let mut vm = vm_with(&[0x1B]);
        vm.op_hlt().unwrap();
        assert!(!vm.running);
    }

    #[test]
    fn psh_then_pop_round_trips_a_register_through_the_stack() {
        let mut vm = vm_with(&[0x19, 0x00, 0x1A, 0x10]);
        vm.registers.set_unsigned(REG_R0, 0xDEAD_BEEF);
        let sp_before = vm.sp();
        vm.op_psh().unwrap();
        assert_eq!(vm.sp(), sp_before - WORD_SIZE);
        vm.registers.set_unsigned(1, 0);
        vm.op_pop().unwrap();
        assert_eq!(vm.registers().unsigned(1), 0xDEAD_BEEF);
        assert_eq!(vm.sp(), sp_before);
    }

    #[test]
    fn cal_pushes_the_return_address_and_bumps_call_depth() {
        let mut vm = vm_with(&[0x14, 0x00, 0x10]);
        let sp_before = vm.sp();
        vm.op_cal().unwrap();
        assert_eq!(vm.pc(), 0x10);
        assert_eq!(vm.call_depth(), 1);
        assert_eq!(vm.sp(), sp_before - WORD_SIZE);
        assert_eq!(vm.memory().read_u32_be(vm.sp()), 3);
    }

    #[test]
    fn ret_restores_the_caller_address_and_decrements_call_depth() {
        let mut vm = vm_with(&[0x14, 0x00, 0x10]);
        vm.op_cal().unwrap();
        vm.op_ret().unwrap();
        assert_eq!(vm.pc(), 3);
        assert_eq!(vm.call_depth(), 0);
    }

    #[test]
    fn psh_past_the_stack_floor_reports_overflow() {
        let mut vm = vm_with(&[0x19, 0x00, 0x00, 0x00]);
        let program_size = vm.memory().program_size();
        vm.set_sp(program_size);
        assert!(vm.op_psh().is_err());
        assert!(!vm.running);
    }
}
