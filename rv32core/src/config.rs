//! Construction-time configuration.

/// Implementation-defined choices the core must make but the instruction set itself leaves open.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Address `reset` sets `pc` to when no explicit address is given.
    pub reset_vector: u32,
    /// Value `reset` writes into `x[sp]` (`x2`). Must be 16-byte aligned per the calling
    /// convention, and must land in a region the embedder has mapped.
    pub default_stack_pointer: u32,
    /// Forces every `step` to go through the interpreter even when the `jit` feature is compiled
    /// in. Has no effect when `jit` is not enabled. Intended for embedders that need to compare
    /// JIT and interpreter behavior directly rather than for routine use.
    pub disable_jit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reset_vector: 0,
            // An arbitrary but 16-byte-aligned default; embedders running real guest binaries
            // are expected to override this to match whatever they mapped for the stack.
            default_stack_pointer: 0x7fff_fff0,
            disable_jit: false,
        }
    }
}
