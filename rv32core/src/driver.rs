//! The execution driver: `rv_step`, the outer loop that advances `csr_cycle` and hands control
//! to the JIT (when enabled) before falling back to the interpreter.

use crate::bus::Bus;
use crate::interpreter;
use crate::processor::Rv;

impl<B: Bus> Rv<B> {
    /// Runs up to `cycles` guest instructions, stopping earlier if an exception is latched.
    /// Returns the number of instructions actually retired.
    pub fn step(&mut self, cycles: u64) -> u64 {
        let target = self.csrs.cycle().saturating_add(cycles);
        let start = self.csrs.cycle();

        while self.csrs.cycle() < target && self.exception.is_none() {
            #[cfg(feature = "jit")]
            {
                if !self.config.disable_jit {
                    if let Some(retired) = self.try_run_block(target) {
                        let _ = retired;
                        continue;
                    }
                }
            }

            while self.csrs.cycle() < target && self.exception.is_none() {
                let pc = self.pc;
                let inst = self.bus.mem_ifetch(pc);
                let sequential = interpreter::execute(self, inst);
                self.csrs.advance_cycle(1);
                if !sequential {
                    break;
                }
            }
        }

        self.csrs.cycle() - start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::CpuView;
    use crate::exception::Exception;

    struct FlatMemory {
        data: Vec<u8>,
        halted: bool,
    }

    impl FlatMemory {
        fn new(size: usize) -> Self {
            Self { data: vec![0; size], halted: false }
        }

        fn load(&mut self, addr: u32, words: &[u32]) {
            for (i, word) in words.iter().enumerate() {
                let base = addr as usize + i * 4;
                self.data[base..base + 4].copy_from_slice(&word.to_le_bytes());
            }
        }
    }

    impl Bus for FlatMemory {
        fn mem_ifetch(&mut self, addr: u32) -> u32 {
            self.mem_read_w(addr)
        }
        fn mem_read_b(&mut self, addr: u32) -> u8 {
            self.data[addr as usize]
        }
        fn mem_read_s(&mut self, addr: u32) -> u16 {
            u16::from_le_bytes(self.data[addr as usize..addr as usize + 2].try_into().unwrap())
        }
        fn mem_read_w(&mut self, addr: u32) -> u32 {
            u32::from_le_bytes(self.data[addr as usize..addr as usize + 4].try_into().unwrap())
        }
        fn mem_write_b(&mut self, addr: u32, value: u8) {
            self.data[addr as usize] = value;
        }
        fn mem_write_s(&mut self, addr: u32, value: u16) {
            self.data[addr as usize..addr as usize + 2].copy_from_slice(&value.to_le_bytes());
        }
        fn mem_write_w(&mut self, addr: u32, value: u32) {
            self.data[addr as usize..addr as usize + 4].copy_from_slice(&value.to_le_bytes());
        }
        fn on_ecall(&mut self, mut cpu: CpuView<'_>, _pc: u32, _inst: u32) {
            self.halted = true;
            cpu.raise(Exception::EnvironmentCall);
        }
        fn on_ebreak(&mut self, mut cpu: CpuView<'_>, _pc: u32, _inst: u32) {
            cpu.raise(Exception::Breakpoint);
        }
    }

    #[test]
    fn steps_a_trivial_addi_program() {
        let mut bus = FlatMemory::new(64);
        // addi x1, x0, 5 ; ecall
        bus.load(0, &[0x0050_0093, 0x0000_0073]);
        let mut rv: Rv<FlatMemory> = Rv::new(bus);
        rv.step(10);
        assert_eq!(rv.x(crate::registers::Specifier::from_u5(1)), 5);
        assert_eq!(rv.exception(), Exception::EnvironmentCall);
        assert!(rv.userdata().halted);
    }
}
