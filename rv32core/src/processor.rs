//! The processor state and its construction/reset/accessor lifecycle.

use log::trace;

use crate::bus::Bus;
use crate::config::Config;
use crate::csr::Csrs;
use crate::exception::Exception;
use crate::registers::{Registers, Specifier, SP};

#[cfg(feature = "f")]
use crate::fregisters::{FRegisters, FSpecifier};

#[cfg(feature = "jit")]
use crate::jit::BlockCache;

/// A single RISC-V hart plus the embedder-supplied I/O bus it executes against.
///
/// Built from a [`Bus`] implementation and an optional [`Config`]; see [`Rv::new`] and
/// [`Rv::with_config`]. There is no explicit `delete`/`dispose` method: dropping an `Rv` releases
/// its register state and, with the `jit` feature, the block cache's executable pages, through
/// ordinary `Drop`.
pub struct Rv<B: Bus> {
    pub(crate) x: Registers,
    #[cfg(feature = "f")]
    pub(crate) f: FRegisters,
    pub(crate) pc: u32,
    pub(crate) csrs: Csrs,
    pub(crate) exception: Exception,
    pub(crate) bus: B,
    pub(crate) config: Config,
    #[cfg(feature = "jit")]
    pub(crate) jit: BlockCache,
}

impl<B: Bus> Rv<B> {
    /// Allocates state and resets to `pc = 0`, as [`Config::default`] specifies.
    pub fn new(bus: B) -> Self {
        Self::with_config(bus, Config::default())
    }

    pub fn with_config(bus: B, config: Config) -> Self {
        let mut rv = Self {
            x: Registers::new(),
            #[cfg(feature = "f")]
            f: FRegisters::new(),
            pc: 0,
            csrs: Csrs::default(),
            exception: Exception::None,
            bus,
            config,
            #[cfg(feature = "jit")]
            jit: BlockCache::new(),
        };
        let reset_vector = rv.config.reset_vector;
        rv.reset(reset_vector);
        rv
    }

    /// Clears registers and CSRs, sets `pc`, and sets `x[sp]` to the configured default stack
    /// pointer.
    pub fn reset(&mut self, pc: u32) {
        trace!("resetting hart, pc={pc:#010x}");
        self.x.reset();
        #[cfg(feature = "f")]
        self.f.reset();
        self.csrs.reset();
        self.exception = Exception::None;
        self.pc = pc;
        self.x.set_x(SP, self.config.default_stack_pointer);
        #[cfg(feature = "jit")]
        self.jit.flush();
    }

    pub fn x(&self, specifier: Specifier) -> u32 {
        self.x.x(specifier)
    }

    pub fn set_x(&mut self, specifier: Specifier, value: u32) {
        self.x.set_x(specifier, value);
    }

    #[cfg(feature = "f")]
    pub fn f(&self, specifier: FSpecifier) -> u32 {
        self.f.bits(specifier)
    }

    #[cfg(feature = "f")]
    pub fn set_f(&mut self, specifier: FSpecifier, bits: u32) {
        self.f.set_bits(specifier, bits);
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn csr_cycle(&self) -> u64 {
        self.csrs.cycle()
    }

    pub fn exception(&self) -> Exception {
        self.exception
    }

    pub fn clear_exception(&mut self) {
        self.exception = Exception::None;
    }

    pub fn userdata(&self) -> &B {
        &self.bus
    }

    pub fn userdata_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Drains any JIT-compiled translations. The embedder must call this after mutating guest
    /// code pages the block cache may have already translated; the cache itself never detects
    /// self-modifying writes.
    #[cfg(feature = "jit")]
    pub fn flush_jit_cache(&mut self) {
        self.jit.flush();
    }
}
