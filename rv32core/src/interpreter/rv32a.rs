//! The `a` extension: atomic memory operations.
//!
//! `LR.W`/`SC.W` are modeled without a reservation set: `SC.W` always succeeds and writes `0` to
//! `rd`, the simplification this core's specification inherits rather than tracking per-hart
//! reservations. The AMO read-modify-write ops are plain pure functions over the old word and the
//! source register value; the actual read-modify-write sequencing against the bus happens in the
//! interpreter dispatcher, since that is the part that is not pure.

use crate::decode::AmoOp;

/// Computes the new memory value for an AMO read-modify-write op, given the word currently in
/// memory and the value in the source register. Returns `None` for `LrW`/`ScW`, which the
/// dispatcher handles separately since they are not simple binary folds.
pub fn apply(op: AmoOp, old: u32, src: u32) -> Option<u32> {
    Some(match op {
        AmoOp::LrW | AmoOp::ScW => return None,
        AmoOp::Swap => src,
        AmoOp::Add => old.wrapping_add(src),
        AmoOp::Xor => old ^ src,
        AmoOp::And => old & src,
        AmoOp::Or => old | src,
        AmoOp::Min => (old as i32).min(src as i32) as u32,
        AmoOp::Max => (old as i32).max(src as i32) as u32,
        AmoOp::Minu => old.min(src),
        AmoOp::Maxu => old.max(src),
    })
}
