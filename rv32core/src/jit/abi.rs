//! Host-ABI details the emitter needs: which registers carry arguments, and how much shadow
//! space a call site must reserve, per the two x86-64 calling conventions dynasm-rs targets.

/// Bytes of stack space a call site must reserve before an indirect `call`, beyond the return
/// address itself, to stay ABI-compliant. The Windows x64 convention mandates 32 bytes of shadow
/// space for the register-passed arguments even when the callee doesn't spill them; the System V
/// AMD64 convention requires none, only 16-byte stack alignment at the call instruction.
#[cfg(target_os = "windows")]
pub const SHADOW_SPACE: i32 = 0x20;
#[cfg(not(target_os = "windows"))]
pub const SHADOW_SPACE: i32 = 0;

/// Registers holding the trampoline's three arguments `(rv_ptr, state_base, raw_instruction)`,
/// as `dynasmrt` register operands.
#[cfg(target_os = "windows")]
pub mod arg_regs {
    pub const ARG0: u8 = 1; // rcx
    pub const ARG1: u8 = 2; // rdx
    pub const ARG2: u8 = 8; // r8
}
#[cfg(not(target_os = "windows"))]
pub mod arg_regs {
    pub const ARG0: u8 = 7; // rdi
    pub const ARG1: u8 = 6; // rsi
    pub const ARG2: u8 = 2; // rdx
}
