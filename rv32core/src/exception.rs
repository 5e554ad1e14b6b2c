//! The sticky exception latch.

use thiserror::Error;

/// The kind of exception latched by the processor. `None` means the hart is free to keep
/// stepping; any other value halts the stepping loop until the embedder clears it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error, Default)]
pub enum Exception {
    #[default]
    #[error("no exception")]
    None,
    #[error("instruction-fetch address misaligned")]
    InstructionMisaligned,
    #[error("illegal instruction")]
    IllegalInstruction,
    #[error("environment call")]
    EnvironmentCall,
    #[error("breakpoint")]
    Breakpoint,
}

impl Exception {
    pub fn is_none(self) -> bool {
        matches!(self, Exception::None)
    }
}
