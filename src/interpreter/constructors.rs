use super::Vm;
use crate::consts::{DEFAULT_CORE_SIZE, DEFAULT_STACK_SIZE};
use crate::error::VmError;
use crate::externvar::{DefaultExternalVariables, DynamicExternalVariables, ExternalVariables};
use crate::files::FileTable;
use crate::memory::Memory;
use crate::opcodes::check_table_order;
use crate::registers::{Flags, Registers};
use crate::stringbuffer::StringBufferManager;
use crate::timers::TimerTable;

impl Vm {
    /// Creates a VM with the default in-process external-variable backend.
    pub fn new(core_size: usize, stack_size: usize) -> Result<Self, VmError> {
        Self::with_externals(core_size, stack_size, Box::new(DefaultExternalVariables::new()))
    }

    /// Creates a VM at the documented default core/stack sizes.
    pub fn with_defaults() -> Result<Self, VmError> {
        Self::new(DEFAULT_CORE_SIZE, DEFAULT_STACK_SIZE)
    }

    /// Creates a VM whose external-variable bridge is a dynamically loaded library.
    ///
    /// # Safety
    /// See [`DynamicExternalVariables::load`].
    pub unsafe fn with_externals_library(core_size: usize, stack_size: usize, libname: &str) -> Result<Self, VmError> {
        let lib = DynamicExternalVariables::load(libname)
            .map_err(|e| VmError::ExternalsLibLoad(libname.to_string(), e.to_string()))?;
        Self::with_externals(core_size, stack_size, Box::new(lib))
    }

    fn with_externals(
        core_size: usize,
        stack_size: usize,
        externs: Box<dyn ExternalVariables>,
    ) -> Result<Self, VmError> {
        if !check_table_order() {
            return Err(VmError::TableOutOfOrder);
        }
        let mut vm = Self {
            registers: Registers::new(),
            flags: Flags::default(),
            memory: Memory::new(core_size.max(1), stack_size),
            call_depth: 0,
            running: true,
            stringbuffers: StringBufferManager::new(),
            files: FileTable::new(),
            timers: TimerTable::new(),
            externs,
            verbose: false,
        };
        vm.set_sp(core_size);
        vm.set_pc(0);
        Ok(vm)
    }
}
