//! `NOP`, and the `MDUMP`/`RDUMP` diagnostic opcodes.

use tracing::info;

use super::Vm;
use crate::error::VmError;

impl Vm {
    pub(super) fn op_nop(&mut self) -> Result<(), VmError> {
        self.inc_pc(1)
    }

    /// `MDUMP`: logs a hex dump of the whole memory image at `info` level. Reached
    /// through two `NEXT` trampolines, so the instruction is 3 bytes wide.
    pub(super) fn op_mdump(&mut self) -> Result<(), VmError> {
        info!(dump = %crate::disasm::hex_dump(self.memory().as_slice()), "memory dump");
        self.inc_pc(3)
    }

    /// `RDUMP`: logs the register file and flags at `info` level.
    pub(super) fn op_rdump(&mut self) -> Result<(), VmError> {
        info!(dump = %crate::disasm::register_dump(self.registers(), self.flags()), "register dump");
        self.inc_pc(3)
    }
}
