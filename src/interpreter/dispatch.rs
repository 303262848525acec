//! The fetch-decode-dispatch loop: `Vm::step`/`Vm::run`, and the byte-to-handler mapping
//! across all three opcode tables.

use tracing::{debug, trace, warn};

use super::Vm;
use crate::error::VmError;
use crate::opcodes::{PrimaryOp, SecondaryOp, TertiaryOp};

/// The result of driving the dispatch loop to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// `HLT` was executed.
    Halted,
    /// The caller-supplied step budget was exhausted before the program halted.
    StepLimitReached,
    /// A fatal condition stopped execution before `HLT`.
    Error(VmError),
}

impl Vm {
    /// Executes exactly one instruction.
    pub fn step(&mut self) -> Result<(), VmError> {
        let prefix = self.memory().byte(self.pc());
        match PrimaryOp::from_u8(prefix) {
            Some(PrimaryOp::Nop) => self.op_nop(),
            Some(PrimaryOp::Lod) => self.op_lod(),
            Some(PrimaryOp::Str) => self.op_str(),
            Some(PrimaryOp::Mov) => self.op_mov(),
            Some(PrimaryOp::Add) => self.op_add(),
            Some(PrimaryOp::Sub) => self.op_sub(),
            Some(PrimaryOp::Mul) => self.op_mul(),
            Some(PrimaryOp::Div) => self.op_div(),
            Some(PrimaryOp::And) => self.op_and(),
            Some(PrimaryOp::Or) => self.op_or(),
            Some(PrimaryOp::Not) => self.op_not(),
            Some(PrimaryOp::Shr) => self.op_shr(),
            Some(PrimaryOp::Shl) => self.op_shl(),
            Some(PrimaryOp::Jmp) => self.op_jmp(),
            Some(PrimaryOp::Jzr) => self.op_jzr(),
            Some(PrimaryOp::Jnz) => self.op_jnz(),
            Some(PrimaryOp::Jne) => self.op_jne(),
            Some(PrimaryOp::Jpo) => self.op_jpo(),
            Some(PrimaryOp::Jca) => self.op_jca(),
            Some(PrimaryOp::Jnc) => self.op_jnc(),
            Some(PrimaryOp::Cal) => self.op_cal(),
            Some(PrimaryOp::Ret) => self.op_ret(),
            Some(PrimaryOp::Cmp) => self.op_cmp(),
            Some(PrimaryOp::Tof) => self.op_tof(),
            Some(PrimaryOp::Toi) => self.op_toi(),
            Some(PrimaryOp::Psh) => self.op_psh(),
            Some(PrimaryOp::Pop) => self.op_pop(),
            Some(PrimaryOp::Hlt) => self.op_hlt(),
            Some(PrimaryOp::Ext) => self.op_ext(),
            Some(PrimaryOp::Get) => self.op_get(),
            Some(PrimaryOp::Set) => self.op_set(),
            Some(PrimaryOp::Next) => self.dispatch_secondary(),
            None => {
                self.running = false;
                Err(VmError::IllegalOpcode(prefix))
            }
        }
    }

    fn dispatch_secondary(&mut self) -> Result<(), VmError> {
        let secondary_prefix = self.memory().byte(self.pc() + 1);
        match SecondaryOp::from_u8(secondary_prefix) {
            Some(SecondaryOp::Ops) => self.op_ops(),
            Some(SecondaryOp::Cps) => self.op_cps(),
            Some(SecondaryOp::Wrs) => self.op_wrs(),
            Some(SecondaryOp::Csb) => self.op_csb(),
            Some(SecondaryOp::Zsb) => self.op_zsb(),
            Some(SecondaryOp::Wsb) => self.op_wsb(),
            Some(SecondaryOp::Ass) => self.op_ass(),
            Some(SecondaryOp::Asb) => self.op_asb(),
            Some(SecondaryOp::Asn) => self.op_asn(),
            Some(SecondaryOp::Asc) => self.op_asc(),
            Some(SecondaryOp::Asf) => self.op_asf(),
            Some(SecondaryOp::Rdc) => self.op_rdc(),
            Some(SecondaryOp::Rdn) => self.op_rdn(),
            Some(SecondaryOp::Wrf) => self.op_wrf(),
            Some(SecondaryOp::Wrn) => self.op_wrn(),
            Some(SecondaryOp::Wrc) => self.op_wrc(),
            Some(SecondaryOp::Dly) => self.op_dly(),
            Some(SecondaryOp::Stm) => self.op_stm(),
            Some(SecondaryOp::Ctm) => self.op_ctm(),
            Some(SecondaryOp::Nfy) => self.op_nfy(),
            Some(SecondaryOp::Wfs) => self.op_wfs(),
            Some(SecondaryOp::Evs) => self.op_evs(),
            Some(SecondaryOp::Eve) => self.op_eve(),
            Some(SecondaryOp::Sbl) => self.op_sbl(),
            Some(SecondaryOp::Sbo) => self.op_sbo(),
            Some(SecondaryOp::Sco) => self.op_sco(),
            Some(SecondaryOp::Gco) => self.op_gco(),
            Some(SecondaryOp::Ofd) => self.op_ofd(),
            Some(SecondaryOp::Cfd) => self.op_cfd(),
            Some(SecondaryOp::Sfd) => self.op_sfd(),
            Some(SecondaryOp::Exe) => self.op_exe(),
            Some(SecondaryOp::Next) => self.dispatch_tertiary(),
            None => {
                self.running = false;
                Err(VmError::IllegalOpcode(secondary_prefix))
            }
        }
    }

    fn dispatch_tertiary(&mut self) -> Result<(), VmError> {
        let tertiary = self.memory().byte(self.pc() + 2);
        match TertiaryOp::from_u8(tertiary) {
            Some(TertiaryOp::Mdump) => self.op_mdump(),
            Some(TertiaryOp::Rdump) => self.op_rdump(),
            None => {
                self.running = false;
                Err(VmError::IllegalOpcode(tertiary))
            }
        }
    }

    /// Runs instructions until `HLT`, a fatal error, or `max_steps` is exhausted
    /// (`None` runs unbounded).
    pub fn run(&mut self, max_steps: Option<u64>) -> ExecuteOutcome {
        let mut steps = 0u64;
        loop {
            if !self.running {
                return ExecuteOutcome::Halted;
            }
            if let Some(limit) = max_steps {
                if steps >= limit {
                    return ExecuteOutcome::StepLimitReached;
                }
            }
            trace!(pc = self.pc(), "fetch");
            match self.step() {
                Ok(()) => {}
                Err(err) => {
                    warn!(%err, pc = self.pc(), "execution halted");
                    return ExecuteOutcome::Error(err);
                }
            }
            if !self.running {
                debug!(steps, "halted");
                return ExecuteOutcome::Halted;
            }
            steps += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecuteOutcome, Vm};

    #[test]
    fn run_executes_an_assembled_program_to_completion() {
        let code = crate::assembler::assemble("MOV R0, #5\nADD R0, R0\nHLT\n").unwrap();
        let mut vm = Vm::with_defaults().unwrap();
        vm.load_program(&code).unwrap();
        let outcome = vm.run(None);
        assert_eq!(outcome, ExecuteOutcome::Halted);
        assert_eq!(vm.registers().signed(0), 10);
    }

    #[test]
    fn run_stops_at_the_step_budget_on_a_program_that_never_halts() {
        let code = crate::assembler::assemble("loop:\nJMP loop\n").unwrap();
        let mut vm = Vm::with_defaults().unwrap();
        vm.load_program(&code).unwrap();
        let outcome = vm.run(Some(5));
        assert_eq!(outcome, ExecuteOutcome::StepLimitReached);
    }

    #[test]
    fn running_past_the_end_of_the_program_image_is_a_fatal_error() {
        let code = crate::assembler::assemble("NOP\n").unwrap();
        let mut vm = Vm::with_defaults().unwrap();
        vm.load_program(&code).unwrap();
        let outcome = vm.run(None);
        assert!(matches!(outcome, ExecuteOutcome::Error(_)));
    }
}
