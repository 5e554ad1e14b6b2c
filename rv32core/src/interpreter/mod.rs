//! The interpreter: dispatch table, per-opcode semantics, and the glue that ties the pure
//! arithmetic in [`rv32i`]/[`rv32m`]/[`rv32a`]/[`rv32f`]/[`zicsr`] to processor state and the bus.

pub mod rv32a;
pub mod rv32f;
pub mod rv32i;
pub mod rv32m;
pub mod zicsr;

use log::{trace, warn};

use crate::bus::{Bus, CpuView};
use crate::decode::{Instruction, LoadWidth, RegImmOp, RegRegOp, RegShiftImmOp, StoreWidth};
use crate::exception::Exception;
use crate::processor::Rv;

#[cfg(feature = "a")]
use crate::decode::AmoOp;
#[cfg(feature = "f")]
use crate::decode::{FCmpOp, FSgnjOp, FmaOp, FpOp};

/// The 32 major-opcode groups a RISC-V instruction word can select, tagged with whether this
/// core has a handler family for that group. Indexed by `inst[6:2]`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum HandlerKind {
    Illegal,
    Load,
    Store,
    OpImm,
    Op,
    Lui,
    Auipc,
    Jal,
    Jalr,
    Branch,
    MiscMem,
    System,
    Amo,
    LoadFp,
    StoreFp,
    Fma,
    OpFp,
}

const fn handler_kind(group: usize) -> HandlerKind {
    match group {
        0b00000 => HandlerKind::Load,
        0b00100 => HandlerKind::OpImm,
        0b01000 => HandlerKind::Store,
        0b01100 => HandlerKind::Op,
        0b01101 => HandlerKind::Lui,
        0b00101 => HandlerKind::Auipc,
        0b11011 => HandlerKind::Jal,
        0b11001 => HandlerKind::Jalr,
        0b11000 => HandlerKind::Branch,
        0b00011 => HandlerKind::MiscMem,
        0b11100 => HandlerKind::System,
        0b01011 => HandlerKind::Amo,
        0b00001 => HandlerKind::LoadFp,
        0b01001 => HandlerKind::StoreFp,
        0b10000 | 0b10001 | 0b10010 | 0b10011 => HandlerKind::Fma,
        0b10100 => HandlerKind::OpFp,
        _ => HandlerKind::Illegal,
    }
}

const fn build_table() -> [HandlerKind; 32] {
    let mut table = [HandlerKind::Illegal; 32];
    let mut i = 0;
    while i < 32 {
        table[i] = handler_kind(i);
        i += 1;
    }
    table
}

/// The dispatch table proper: 32 slots keyed by `inst[6:2]`, each tagged with the handler
/// family responsible for that major opcode. An unpopulated slot is a fatal illegal instruction.
static DISPATCH_TABLE: [HandlerKind; 32] = build_table();

fn opcode_group(raw: u32) -> usize {
    ((raw >> 2) & 0x1f) as usize
}

/// Executes one instruction from `rv.pc`. Returns `true` if the instruction retired sequentially
/// (the driver may continue without re-examining PC-derived state), `false` if it was a control
/// transfer or raised an exception.
pub(crate) fn execute<B: Bus>(rv: &mut Rv<B>, raw: u32) -> bool {
    let kind = DISPATCH_TABLE[opcode_group(raw)];
    if kind == HandlerKind::Illegal
        || (!cfg!(feature = "a") && kind == HandlerKind::Amo)
        || (!cfg!(feature = "f") && matches!(kind, HandlerKind::LoadFp | HandlerKind::StoreFp | HandlerKind::Fma | HandlerKind::OpFp))
    {
        warn!("illegal instruction {raw:#010x} at pc={:#010x} (unpopulated dispatch slot)", rv.pc);
        rv.exception = Exception::IllegalInstruction;
        return false;
    }

    let inst = match Instruction::decode(raw) {
        Ok(inst) => inst,
        Err(err) => {
            warn!("illegal instruction {raw:#010x} at pc={:#010x}: {err}", rv.pc);
            rv.exception = Exception::IllegalInstruction;
            return false;
        }
    };
    trace!("executing {inst:?} at pc={:#010x}", rv.pc);
    dispatch(rv, inst, raw)
}

fn advance<B: Bus>(rv: &mut Rv<B>) -> bool {
    rv.pc = rv.pc.wrapping_add(4);
    true
}

/// Performs a control transfer to `target`, latching a misalignment exception if it is not
/// 4-byte aligned. Always non-sequential: callers are branches and jumps.
fn jump<B: Bus>(rv: &mut Rv<B>, target: u32) -> bool {
    rv.pc = target;
    if target & 0b11 != 0 {
        rv.exception = Exception::InstructionMisaligned;
    }
    false
}

fn dispatch<B: Bus>(rv: &mut Rv<B>, inst: Instruction, raw: u32) -> bool {
    match inst {
        Instruction::OpImm { op, dest, src, immediate } => {
            let value = match op {
                RegImmOp::Addi => rv32i::addi(rv.x(src), immediate),
                RegImmOp::Slti => rv32i::slti(rv.x(src), immediate),
                RegImmOp::Sltiu => rv32i::sltiu(rv.x(src), immediate),
                RegImmOp::Xori => rv32i::xori(rv.x(src), immediate),
                RegImmOp::Ori => rv32i::ori(rv.x(src), immediate),
                RegImmOp::Andi => rv32i::andi(rv.x(src), immediate),
            };
            rv.set_x(dest, value);
            advance(rv)
        }
        Instruction::OpShiftImm { op, dest, src, shift_amount } => {
            let value = match op {
                RegShiftImmOp::Slli => rv32i::slli(rv.x(src), shift_amount),
                RegShiftImmOp::Srli => rv32i::srli(rv.x(src), shift_amount),
                RegShiftImmOp::Srai => rv32i::srai(rv.x(src), shift_amount),
            };
            rv.set_x(dest, value);
            advance(rv)
        }
        Instruction::Lui { dest, immediate } => {
            rv.set_x(dest, immediate as u32);
            advance(rv)
        }
        Instruction::Auipc { dest, immediate } => {
            rv.set_x(dest, rv.pc.wrapping_add(immediate as u32));
            advance(rv)
        }
        Instruction::Jal { dest, offset } => {
            let link = rv.pc.wrapping_add(4);
            let target = rv.pc.wrapping_add(offset as u32);
            rv.set_x(dest, link);
            jump(rv, target)
        }
        Instruction::Jalr { dest, base, offset } => {
            let link = rv.pc.wrapping_add(4);
            let target = rv.x(base).wrapping_add(offset as u32) & !1;
            rv.set_x(dest, link);
            jump(rv, target)
        }
        Instruction::Branch { condition, src1, src2, offset } => {
            if rv32i::branch_taken(condition, rv.x(src1), rv.x(src2)) {
                let target = rv.pc.wrapping_add(offset as u32);
                jump(rv, target)
            } else {
                advance(rv)
            }
        }
        Instruction::Load { width, dest, base, offset } => {
            let addr = rv.x(base).wrapping_add(offset as u32);
            let value = match width {
                LoadWidth::Byte => rv.bus.mem_read_b(addr) as i8 as i32 as u32,
                LoadWidth::ByteUnsigned => rv.bus.mem_read_b(addr) as u32,
                LoadWidth::Half => rv.bus.mem_read_s(addr) as i16 as i32 as u32,
                LoadWidth::HalfUnsigned => rv.bus.mem_read_s(addr) as u32,
                LoadWidth::Word => rv.bus.mem_read_w(addr),
            };
            rv.set_x(dest, value);
            advance(rv)
        }
        Instruction::Store { width, src, base, offset } => {
            let addr = rv.x(base).wrapping_add(offset as u32);
            let value = rv.x(src);
            match width {
                StoreWidth::Byte => rv.bus.mem_write_b(addr, value as u8),
                StoreWidth::Half => rv.bus.mem_write_s(addr, value as u16),
                StoreWidth::Word => rv.bus.mem_write_w(addr, value),
            }
            advance(rv)
        }
        Instruction::Op { op, dest, src1, src2 } => {
            let (a, b) = (rv.x(src1), rv.x(src2));
            let value = match op {
                RegRegOp::Add => rv32i::add(a, b),
                RegRegOp::Sub => rv32i::sub(a, b),
                RegRegOp::Sll => rv32i::sll(a, b),
                RegRegOp::Slt => rv32i::slt(a, b),
                RegRegOp::Sltu => rv32i::sltu(a, b),
                RegRegOp::Xor => rv32i::xor(a, b),
                RegRegOp::Srl => rv32i::srl(a, b),
                RegRegOp::Sra => rv32i::sra(a, b),
                RegRegOp::Or => rv32i::or(a, b),
                RegRegOp::And => rv32i::and(a, b),
                #[cfg(feature = "m")]
                RegRegOp::Mul => rv32m::mul(a, b),
                #[cfg(feature = "m")]
                RegRegOp::Mulh => rv32m::mulh(a, b),
                #[cfg(feature = "m")]
                RegRegOp::Mulhsu => rv32m::mulhsu(a, b),
                #[cfg(feature = "m")]
                RegRegOp::Mulhu => rv32m::mulhu(a, b),
                #[cfg(feature = "m")]
                RegRegOp::Div => rv32m::div(a, b),
                #[cfg(feature = "m")]
                RegRegOp::Divu => rv32m::divu(a, b),
                #[cfg(feature = "m")]
                RegRegOp::Rem => rv32m::rem(a, b),
                #[cfg(feature = "m")]
                RegRegOp::Remu => rv32m::remu(a, b),
            };
            rv.set_x(dest, value);
            advance(rv)
        }
        Instruction::Fence | Instruction::FenceI => advance(rv),
        Instruction::Ecall => {
            let orig_pc = rv.pc;
            rv.pc = orig_pc.wrapping_add(4);
            rv.bus.on_ecall(CpuView::new(&mut rv.x, &mut rv.pc, &mut rv.exception), orig_pc, raw);
            false
        }
        Instruction::Ebreak => {
            let orig_pc = rv.pc;
            rv.pc = orig_pc.wrapping_add(4);
            rv.bus.on_ebreak(CpuView::new(&mut rv.x, &mut rv.pc, &mut rv.exception), orig_pc, raw);
            false
        }
        #[cfg(feature = "zicsr")]
        Instruction::Csr { op, dest, src, csr } => {
            let operand = rv.x(src);
            let old = rv.csrs.read(csr);
            let (to_rd, new) = zicsr::apply(op, old, operand);
            rv.csrs.write(csr, new);
            rv.set_x(dest, to_rd);
            advance(rv)
        }
        #[cfg(feature = "zicsr")]
        Instruction::Csri { op, dest, immediate, csr } => {
            let old = rv.csrs.read(csr);
            let (to_rd, new) = zicsr::apply(op, old, immediate);
            rv.csrs.write(csr, new);
            rv.set_x(dest, to_rd);
            advance(rv)
        }
        #[cfg(feature = "a")]
        Instruction::Amo { op, addr, src, dest, .. } => {
            let address = rv.x(addr);
            match op {
                AmoOp::LrW => {
                    let value = rv.bus.mem_read_w(address);
                    rv.set_x(dest, value);
                }
                AmoOp::ScW => {
                    let value = rv.x(src);
                    rv.bus.mem_write_w(address, value);
                    rv.set_x(dest, 0);
                }
                _ => {
                    let old = rv.bus.mem_read_w(address);
                    let new = rv32a::apply(op, old, rv.x(src)).expect("non-LR/SC amo always folds");
                    rv.bus.mem_write_w(address, new);
                    rv.set_x(dest, old);
                }
            }
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FLoad { dest, base, offset } => {
            let addr = rv.x(base).wrapping_add(offset as u32);
            let bits = rv.bus.mem_read_w(addr);
            rv.set_f(dest, bits);
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FStore { src, base, offset } => {
            let addr = rv.x(base).wrapping_add(offset as u32);
            rv.bus.mem_write_w(addr, rv.f(src));
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FOp { op, dest, src1, src2 } => {
            let a = f32::from_bits(rv.f(src1));
            let b = f32::from_bits(rv.f(src2));
            let result = match op {
                FpOp::Add => rv32f::add(a, b),
                FpOp::Sub => rv32f::sub(a, b),
                FpOp::Mul => rv32f::mul(a, b),
                FpOp::Div => rv32f::div(a, b),
                FpOp::Sqrt => rv32f::sqrt(a),
                FpOp::Min => rv32f::min(a, b),
                FpOp::Max => rv32f::max(a, b),
            };
            rv.set_f(dest, result.to_bits());
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FMadd { op, dest, src1, src2, src3 } => {
            let a = f32::from_bits(rv.f(src1));
            let b = f32::from_bits(rv.f(src2));
            let c = f32::from_bits(rv.f(src3));
            let result = match op {
                FmaOp::Madd => rv32f::madd(a, b, c),
                FmaOp::Msub => rv32f::msub(a, b, c),
                FmaOp::Nmsub => rv32f::nmsub(a, b, c),
                FmaOp::Nmadd => rv32f::nmadd(a, b, c),
            };
            rv.set_f(dest, result.to_bits());
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FSgnj { op, dest, src1, src2 } => {
            let (a, b) = (rv.f(src1), rv.f(src2));
            let result = match op {
                FSgnjOp::Sgnj => rv32f::sgnj(a, b),
                FSgnjOp::Sgnjn => rv32f::sgnjn(a, b),
                FSgnjOp::Sgnjx => rv32f::sgnjx(a, b),
            };
            rv.set_f(dest, result);
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FCmp { op, dest, src1, src2 } => {
            let a = f32::from_bits(rv.f(src1));
            let b = f32::from_bits(rv.f(src2));
            let result = match op {
                FCmpOp::Eq => rv32f::feq(a, b),
                FCmpOp::Lt => rv32f::flt(a, b),
                FCmpOp::Le => rv32f::fle(a, b),
            };
            rv.set_x(dest, result as u32);
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FCvtToInt { signed, dest, src } => {
            let value = rv32f::cvt_to_int(signed, f32::from_bits(rv.f(src)));
            rv.set_x(dest, value);
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FCvtFromInt { signed, dest, src } => {
            let value = rv32f::cvt_from_int(signed, rv.x(src));
            rv.set_f(dest, value.to_bits());
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FClass { dest, src } => {
            rv.set_x(dest, rv32f::fclass(rv.f(src)));
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FMvXW { dest, src } => {
            rv.set_x(dest, rv.f(src));
            advance(rv)
        }
        #[cfg(feature = "f")]
        Instruction::FMvWX { dest, src } => {
            rv.set_f(dest, rv.x(src));
            advance(rv)
        }
    }
}
