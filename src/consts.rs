//! VM parameters

/* REGISTER TYPES */

/// Register count. R0-R13 general purpose, R14 = SP, R15 = PC.
pub const VM_REGISTER_COUNT: usize = 16;

/// Holds function return values, by code-generator convention.
pub const REG_R0: usize = 0x00;

/// Holds the current frame pointer, by code-generator convention.
pub const REG_R1: usize = 0x01;

/// Scratch register the code generator uses as an effective-address holder.
pub const REG_R2: usize = 0x02;

/// The stack pointer.
pub const REG_SP: usize = 0x0E;

/// The program counter.
pub const REG_PC: usize = 0x0F;

/* END */

/* MEMORY TYPES */

/// Length of a word, in bytes.
pub const WORD_SIZE: usize = 4;

/// Default total image size if the caller does not override it.
pub const DEFAULT_CORE_SIZE: usize = 65_536;

/// Default stack size carved out of the top of the image.
pub const DEFAULT_STACK_SIZE: usize = 8_192;

/// Maximum number of concurrently open VM file descriptor slots.
pub const MAX_OPEN_FILES: usize = 20;

/// Maximum number of timer slots. Timer id 0 is reserved as invalid.
pub const MAX_TIMERS: usize = 20;

/// Initial/growth increment for string buffers, in bytes.
pub const STRING_BUFFER_BLOCK_SIZE: usize = 256;

/* STATUS FLAGS */

/// Result was exactly zero.
pub const ZFLAG: u8 = 0x01;
/// Result's sign bit was set.
pub const NFLAG: u8 = 0x02;
/// Sign bit changed between the prior and new destination value.
pub const CFLAG: u8 = 0x04;

/// Sign bit of a 32-bit word.
pub const SIGNBIT: u32 = 0x8000_0000;
