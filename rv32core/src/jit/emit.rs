//! The basic-block translator: walks guest instructions from a starting PC, emitting x86-64 into
//! a `dynasmrt` assembler until it hits a terminator or an instruction it cannot translate.

use dynasmrt::{dynasm, DynasmApi};

use crate::bus::Bus;
use crate::decode::{Instruction, RegImmOp, RegRegOp, RegShiftImmOp};
use crate::jit::abi::SHADOW_SPACE;
use crate::jit::block::Block;
use crate::processor::Rv;

/// What the emitter does with an immediate-zero operand. Spelled out as its own type (rather
/// than inlined `if`s at each call site) so each of the three documented identities is a single
/// named, independently testable decision.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Fold {
    /// Emit the operation normally.
    Normal,
    /// The operation is the identity; emit nothing.
    Elide,
    /// The operation forces the result to zero; emit `xor dest, dest` instead.
    ZeroIdiom,
}

/// `add r, 0` / `shl r, 0` and similar "`op`, 0" mutations: the identity, so elide.
fn additive_fold(amount: i64) -> Fold {
    if amount == 0 {
        Fold::Elide
    } else {
        Fold::Normal
    }
}

/// `and r, 0` forces the result to zero: `xor r, r`.
fn and_fold(operand: i64) -> Fold {
    if operand == 0 {
        Fold::ZeroIdiom
    } else {
        Fold::Normal
    }
}

/// `mov r, 0`: prefer `xor r, r`, which is shorter and doesn't touch the flags the same way a
/// literal zero immediate move would suggest to a reader.
fn mov_fold(value: i64) -> Fold {
    if value == 0 {
        Fold::ZeroIdiom
    } else {
        Fold::Normal
    }
}

type Assembler = dynasmrt::x64::Assembler;

/// Translates one basic block starting at `rv.pc`. Returns `None` if even the first instruction
/// cannot be translated (the driver then falls back to the interpreter for this PC entirely).
pub(crate) fn translate<B: Bus>(rv: &mut Rv<B>) -> Option<Block> {
    let start_pc = rv.pc;
    let rv_base = rv as *mut Rv<B> as usize;
    let x_offset = (&rv.x as *const _ as usize) - rv_base;
    let pc_offset = (&rv.pc as *const _ as usize) - rv_base;

    let mut ops = Assembler::new().ok()?;
    let entry = ops.offset();
    emit_prologue(&mut ops);

    let mut pc = start_pc;
    let mut count: u32 = 0;
    let mut translated_any = false;
    let mut ended_in_helper_call = false;

    loop {
        let raw = rv.bus.mem_ifetch(pc);
        let inst = match Instruction::decode(raw) {
            Ok(inst) => inst,
            Err(_) => break,
        };

        let outcome = emit_instruction::<B>(&mut ops, &inst, x_offset, pc, raw);
        match outcome {
            EmitOutcome::Refused => break,
            EmitOutcome::Continued => {
                count += 1;
                translated_any = true;
                pc = pc.wrapping_add(4);
            }
            EmitOutcome::Terminated => {
                count += 1;
                translated_any = true;
                ended_in_helper_call = true;
                break;
            }
        }

        // A basic block is bounded; translating forever on straight-line code would grow the
        // buffer without limit and defeat the cache's point of amortizing translation cost.
        if count >= 512 {
            break;
        }
    }

    if !translated_any {
        return None;
    }

    // A block that ends in a helper call (load/store/branch/jump/ecall/ebreak) already had its
    // real next-pc written by the interpreter inside that call — fall-through for loads/stores/
    // ecall/ebreak, the branch/jump target otherwise. Overwriting it here with `pc` (the stale
    // address of the terminator instruction itself) would clobber that correct, dynamically
    // computed value. Only a block that ends because translation simply ran out (a refused
    // instruction, a decode failure, or the per-block instruction cap) needs this static write,
    // since in that case `pc` is still the untouched address of the next instruction to execute.
    let guest_pc_end = if ended_in_helper_call { pc.wrapping_add(4) } else { pc };
    if !ended_in_helper_call {
        emit_pc_store(&mut ops, pc_offset, pc);
    }
    emit_epilogue(&mut ops, count);

    let code = ops.finalize().ok()?;
    Some(Block {
        guest_pc_start: start_pc,
        guest_pc_end,
        code,
        entry,
        instructions: count,
    })
}

enum EmitOutcome {
    /// The instruction was inlined; the block continues to the next guest instruction.
    Continued,
    /// The instruction was inlined and ends the block (branch, jump, load, store, ecall/ebreak).
    Terminated,
    /// The instruction cannot be translated; the block ends *before* it.
    Refused,
}

#[cfg(target_os = "windows")]
macro_rules! emit_load_arg0_into_rbx {
    ($ops:expr) => {
        dynasm!($ops; .arch x64; mov rbx, rcx)
    };
}
#[cfg(not(target_os = "windows"))]
macro_rules! emit_load_arg0_into_rbx {
    ($ops:expr) => {
        dynasm!($ops; .arch x64; mov rbx, rdi)
    };
}

fn emit_prologue(ops: &mut Assembler) {
    dynasm!(ops
        ; .arch x64
        ; push rbx
        ; sub rsp, (SHADOW_SPACE + 8) // keep 16-byte alignment across the following calls
    );
    emit_load_arg0_into_rbx!(ops);
}

fn emit_epilogue(ops: &mut Assembler, count: u32) {
    dynasm!(ops
        ; .arch x64
        ; mov eax, (count as i32)
        ; add rsp, (SHADOW_SPACE + 8)
        ; pop rbx
        ; ret
    );
}

/// Writes the static next-pc back to `rv.pc`. Only correct to emit when the block ended at an
/// address that was never executed (see the call site in `translate`).
fn emit_pc_store(ops: &mut Assembler, pc_offset: usize, final_pc: u32) {
    let pc_addr = pc_offset as i32;
    dynasm!(ops
        ; .arch x64
        ; mov DWORD [rbx + pc_addr], (final_pc as i32)
    );
}

fn emit_instruction<B: Bus>(
    ops: &mut Assembler,
    inst: &Instruction,
    x_offset: usize,
    pc: u32,
    raw: u32,
) -> EmitOutcome {
    let reg_addr = |specifier: u8| (x_offset as i32) + 4 * specifier as i32;

    match *inst {
        Instruction::Fence | Instruction::FenceI => EmitOutcome::Continued,

        Instruction::OpImm { op, dest, src, immediate } => {
            if u8::from(dest) == 0 {
                return EmitOutcome::Continued;
            }
            let src_addr = reg_addr(src.into());
            let dest_addr = reg_addr(dest.into());
            load_operand(ops, src_addr, u8::from(src) == 0);
            match op {
                RegImmOp::Addi => match additive_fold(immediate as i64) {
                    Fold::Elide => {}
                    _ => dynasm!(ops; .arch x64; add eax, immediate),
                },
                RegImmOp::Andi => match and_fold(immediate as i64) {
                    Fold::ZeroIdiom => dynasm!(ops; .arch x64; xor eax, eax),
                    _ => dynasm!(ops; .arch x64; and eax, immediate),
                },
                RegImmOp::Ori => dynasm!(ops; .arch x64; or eax, immediate),
                RegImmOp::Xori => dynasm!(ops; .arch x64; xor eax, immediate),
                RegImmOp::Slti => dynasm!(ops
                    ; .arch x64
                    ; cmp eax, immediate
                    ; setl al
                    ; movzx eax, al
                ),
                RegImmOp::Sltiu => dynasm!(ops
                    ; .arch x64
                    ; cmp eax, immediate
                    ; setb al
                    ; movzx eax, al
                ),
            }
            dynasm!(ops; .arch x64; mov DWORD [rbx + dest_addr], eax);
            EmitOutcome::Continued
        }

        Instruction::OpShiftImm { op, dest, src, shift_amount } => {
            if u8::from(dest) == 0 {
                return EmitOutcome::Continued;
            }
            let src_addr = reg_addr(src.into());
            let dest_addr = reg_addr(dest.into());
            load_operand(ops, src_addr, u8::from(src) == 0);
            if additive_fold(shift_amount as i64) == Fold::Normal {
                let amount = shift_amount as i8;
                match op {
                    RegShiftImmOp::Slli => dynasm!(ops; .arch x64; shl eax, amount),
                    RegShiftImmOp::Srli => dynasm!(ops; .arch x64; shr eax, amount),
                    RegShiftImmOp::Srai => dynasm!(ops; .arch x64; sar eax, amount),
                }
            }
            dynasm!(ops; .arch x64; mov DWORD [rbx + dest_addr], eax);
            EmitOutcome::Continued
        }

        Instruction::Lui { dest, immediate } => {
            if u8::from(dest) == 0 {
                return EmitOutcome::Continued;
            }
            let dest_addr = reg_addr(dest.into());
            match mov_fold(immediate as i64) {
                Fold::ZeroIdiom => dynasm!(ops; .arch x64; xor eax, eax),
                _ => dynasm!(ops; .arch x64; mov eax, immediate),
            }
            dynasm!(ops; .arch x64; mov DWORD [rbx + dest_addr], eax);
            EmitOutcome::Continued
        }

        Instruction::Auipc { dest, immediate } => {
            if u8::from(dest) == 0 {
                return EmitOutcome::Continued;
            }
            let dest_addr = reg_addr(dest.into());
            let pc_literal = pc as i32;
            dynasm!(ops; .arch x64; mov eax, pc_literal);
            if additive_fold(immediate as i64) == Fold::Normal {
                dynasm!(ops; .arch x64; add eax, immediate);
            }
            dynasm!(ops; .arch x64; mov DWORD [rbx + dest_addr], eax);
            EmitOutcome::Continued
        }

        Instruction::Op { op, dest, src1, src2 } => {
            // The multiply/divide extension is routed through the helper trampoline rather than
            // inlined: divide-by-zero and overflow sentinels are cheap in Rust and not worth
            // duplicating in hand-emitted x86.
            if matches!(
                op,
                RegRegOp::Add | RegRegOp::Sub | RegRegOp::Sll | RegRegOp::Slt | RegRegOp::Sltu
                    | RegRegOp::Xor | RegRegOp::Srl | RegRegOp::Sra | RegRegOp::Or | RegRegOp::And
            ) {
                if u8::from(dest) == 0 {
                    return EmitOutcome::Continued;
                }
                let addr1 = reg_addr(src1.into());
                let addr2 = reg_addr(src2.into());
                let dest_addr = reg_addr(dest.into());
                load_operand(ops, addr1, u8::from(src1) == 0);
                let src2_is_zero = u8::from(src2) == 0;
                match op {
                    RegRegOp::Add => {
                        if !src2_is_zero {
                            dynasm!(ops; .arch x64; add eax, [rbx + addr2]);
                        }
                    }
                    RegRegOp::Sub => {
                        if !src2_is_zero {
                            dynasm!(ops; .arch x64; sub eax, [rbx + addr2]);
                        }
                    }
                    RegRegOp::Or => {
                        if !src2_is_zero {
                            dynasm!(ops; .arch x64; or eax, [rbx + addr2]);
                        }
                    }
                    RegRegOp::Xor => {
                        if !src2_is_zero {
                            dynasm!(ops; .arch x64; xor eax, [rbx + addr2]);
                        }
                    }
                    RegRegOp::And => {
                        if src2_is_zero {
                            dynasm!(ops; .arch x64; xor eax, eax);
                        } else {
                            dynasm!(ops; .arch x64; and eax, [rbx + addr2]);
                        }
                    }
                    RegRegOp::Sll | RegRegOp::Srl | RegRegOp::Sra => {
                        dynasm!(ops
                            ; .arch x64
                            ; mov ecx, [rbx + addr2]
                            ; and cl, 0x1f
                        );
                        match op {
                            RegRegOp::Sll => dynasm!(ops; .arch x64; shl eax, cl),
                            RegRegOp::Srl => dynasm!(ops; .arch x64; shr eax, cl),
                            RegRegOp::Sra => dynasm!(ops; .arch x64; sar eax, cl),
                            _ => unreachable!(),
                        }
                    }
                    RegRegOp::Slt => dynasm!(ops
                        ; .arch x64
                        ; cmp eax, [rbx + addr2]
                        ; setl al
                        ; movzx eax, al
                    ),
                    RegRegOp::Sltu => dynasm!(ops
                        ; .arch x64
                        ; cmp eax, [rbx + addr2]
                        ; setb al
                        ; movzx eax, al
                    ),
                    _ => unreachable!("matched against the base op set above"),
                }
                dynasm!(ops; .arch x64; mov DWORD [rbx + dest_addr], eax);
                EmitOutcome::Continued
            } else {
                emit_helper_terminator::<B>(ops, raw)
            }
        }

        Instruction::Load { .. } | Instruction::Store { .. } => emit_helper_terminator::<B>(ops, raw),
        Instruction::Branch { .. } | Instruction::Jal { .. } | Instruction::Jalr { .. } => {
            emit_helper_terminator::<B>(ops, raw)
        }
        Instruction::Ecall | Instruction::Ebreak => emit_helper_terminator::<B>(ops, raw),

        // Atomics, CSR ops, and the float extension back off: the block ends just before them
        // and the interpreter takes over for that instruction.
        _ => EmitOutcome::Refused,
    }
}

/// Emits a load of `[rbx + addr]` into `eax`, or the `x0` read identity (`xor eax, eax`, no
/// load) when the source register is `x0`.
fn load_operand(ops: &mut Assembler, addr: i32, is_zero_register: bool) {
    if is_zero_register {
        dynasm!(ops; .arch x64; xor eax, eax);
    } else {
        dynasm!(ops; .arch x64; mov eax, [rbx + addr]);
    }
}

/// Loads, stores, branches, jumps, and the syscall hooks all require calling back into the
/// embedder or touching the exception latch, neither of which it's worth hand-compiling: the
/// emitter materializes the helper's address into a scratch register and issues an indirect
/// call, then the driver inspects the exception latch to decide whether the block can keep going.
fn emit_helper_terminator<B: Bus>(ops: &mut Assembler, raw: u32) -> EmitOutcome {
    let helper = super::helper_trampoline::<B> as usize as i64;
    let raw_literal = raw as i32;
    dynasm!(ops
        ; .arch x64
        ; mov Rq(crate::jit::abi::arg_regs::ARG0), rbx
        ; mov Rd(crate::jit::abi::arg_regs::ARG1), raw_literal
        ; mov rax, QWORD helper
        ; call rax
    );
    EmitOutcome::Terminated
}
