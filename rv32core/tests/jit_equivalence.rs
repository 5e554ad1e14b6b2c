//! Checks that a block ending in a load, a store, and a taken branch leaves the hart in the same
//! state whether it ran through the JIT or the plain interpreter. Only built with `--features
//! jit`; with the feature off there is no JIT path to compare against.
#![cfg(feature = "jit")]

use std::collections::HashMap;

use rv32core::{Bus, Config, CpuView, Exception, Rv, Specifier};

const OP_IMM: u32 = 0b0010011;
const BRANCH: u32 = 0b1100011;
const OP: u32 = 0b0110011;
const LOAD: u32 = 0b0000011;
const STORE: u32 = 0b0100011;
const SYSTEM: u32 = 0b1110011;

fn r_type(opcode: u32, funct3: u32, funct7: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn i_type(opcode: u32, funct3: u32, rd: u32, rs1: u32, imm: i32) -> u32 {
    (((imm as u32) & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn s_type(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm: i32) -> u32 {
    let imm = imm as u32;
    let lo = imm & 0x1f;
    let hi = (imm >> 5) & 0x7f;
    (hi << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (lo << 7) | opcode
}

fn b_type(opcode: u32, funct3: u32, rs1: u32, rs2: u32, imm: i32) -> u32 {
    let imm = imm as u32;
    let bit12 = (imm >> 12) & 1;
    let bit11 = (imm >> 11) & 1;
    let bits10_5 = (imm >> 5) & 0x3f;
    let bits4_1 = (imm >> 1) & 0xf;
    (bit12 << 31) | (bits10_5 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (bits4_1 << 8) | (bit11 << 7) | opcode
}

fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(OP_IMM, 0b000, rd, rs1, imm)
}

fn ecall() -> u32 {
    i_type(SYSTEM, 0b000, 0, 0, 0)
}

struct FlatMemory {
    bytes: HashMap<u32, u8>,
}

impl FlatMemory {
    fn new() -> Self {
        Self { bytes: HashMap::new() }
    }

    fn load(&mut self, addr: u32, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            for (j, byte) in word.to_le_bytes().into_iter().enumerate() {
                self.bytes.insert(addr + (i * 4 + j) as u32, byte);
            }
        }
    }

    fn byte(&self, addr: u32) -> u8 {
        *self.bytes.get(&addr).unwrap_or(&0)
    }
}

impl Bus for FlatMemory {
    fn mem_ifetch(&mut self, addr: u32) -> u32 {
        self.mem_read_w(addr)
    }
    fn mem_read_b(&mut self, addr: u32) -> u8 {
        self.byte(addr)
    }
    fn mem_read_s(&mut self, addr: u32) -> u16 {
        u16::from_le_bytes([self.byte(addr), self.byte(addr + 1)])
    }
    fn mem_read_w(&mut self, addr: u32) -> u32 {
        u32::from_le_bytes([self.byte(addr), self.byte(addr + 1), self.byte(addr + 2), self.byte(addr + 3)])
    }
    fn mem_write_b(&mut self, addr: u32, value: u8) {
        self.bytes.insert(addr, value);
    }
    fn mem_write_s(&mut self, addr: u32, value: u16) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.bytes.insert(addr + i as u32, b);
        }
    }
    fn mem_write_w(&mut self, addr: u32, value: u32) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.bytes.insert(addr + i as u32, b);
        }
    }
    fn on_ecall(&mut self, mut cpu: CpuView<'_>, _pc: u32, _inst: u32) {
        cpu.raise(Exception::EnvironmentCall);
    }
    fn on_ebreak(&mut self, mut cpu: CpuView<'_>, _pc: u32, _inst: u32) {
        cpu.raise(Exception::Breakpoint);
    }
}

fn x(n: u32) -> Specifier {
    Specifier::from_u5(n)
}

/// A store and a load round-tripping through a scratch address, followed by a taken branch, an
/// instruction that should be skipped, and a final instruction after the branch target — this
/// exercises every `Terminated` JIT exit the PC bug could hide behind (store, load, branch).
fn program() -> Vec<u32> {
    let store_pc: i32 = 16;
    let branch_pc: i32 = 24;
    let skip_target: i32 = 32;
    vec![
        addi(1, 0, 5),                                      // 0:  x1 = 5
        addi(2, 0, 10),                                     // 4:  x2 = 10
        r_type(OP, 0b000, 0, 3, 1, 2),                       // 8:  x3 = x1 + x2 = 15
        addi(4, 0, 0x100),                                   // 12: x4 = scratch address
        s_type(STORE, 0b010, 4, 3, 0),                       // 16: mem[x4] = x3
        i_type(LOAD, 0b010, 5, 4, 0),                        // 20: x5 = mem[x4]
        b_type(BRANCH, 0b000, 5, 3, skip_target - branch_pc), // 24: beq x5, x3, skip
        addi(6, 0, 999),                                     // 28: x6 = 999 (must be skipped)
        addi(7, 0, 42),                                      // 32: skip: x7 = 42
        ecall(),                                             // 36
    ]
}

#[test]
fn jit_and_interpreter_agree_on_post_state() {
    let mut jit_bus = FlatMemory::new();
    jit_bus.load(0, &program());
    let mut jit_rv: Rv<FlatMemory> = Rv::new(jit_bus);
    jit_rv.step(1000);

    let mut interp_bus = FlatMemory::new();
    interp_bus.load(0, &program());
    let config = Config { disable_jit: true, ..Config::default() };
    let mut interp_rv: Rv<FlatMemory> = Rv::with_config(interp_bus, config);
    interp_rv.step(1000);

    assert_eq!(jit_rv.exception(), Exception::EnvironmentCall);
    assert_eq!(interp_rv.exception(), Exception::EnvironmentCall);
    assert_eq!(jit_rv.pc(), interp_rv.pc());

    for reg in 1..8 {
        assert_eq!(
            jit_rv.x(x(reg)),
            interp_rv.x(x(reg)),
            "x{reg} diverged between JIT and interpreter"
        );
    }

    assert_eq!(jit_rv.x(x(3)), 15);
    assert_eq!(jit_rv.x(x(5)), 15);
    assert_eq!(jit_rv.x(x(6)), 0, "branch must have been taken, skipping the addi to x6");
    assert_eq!(jit_rv.x(x(7)), 42);
}
