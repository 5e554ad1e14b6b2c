//! The `m` extension: integer multiply/divide, including the two RISC-V-mandated divide-by-zero
//! and signed-overflow sentinels (never raised as errors — see the crate's error-handling docs).

pub fn mul(a: u32, b: u32) -> u32 {
    a.wrapping_mul(b)
}

pub fn mulh(a: u32, b: u32) -> u32 {
    let product = (a as i32 as i64).wrapping_mul(b as i32 as i64);
    (product >> 32) as u32
}

pub fn mulhsu(a: u32, b: u32) -> u32 {
    let product = (a as i32 as i64).wrapping_mul(b as i64);
    (product >> 32) as u32
}

pub fn mulhu(a: u32, b: u32) -> u32 {
    let product = (a as u64).wrapping_mul(b as u64);
    (product >> 32) as u32
}

pub fn div(a: u32, b: u32) -> u32 {
    let (a, b) = (a as i32, b as i32);
    if b == 0 {
        0xFFFF_FFFF
    } else if a == i32::MIN && b == -1 {
        a as u32
    } else {
        a.wrapping_div(b) as u32
    }
}

pub fn divu(a: u32, b: u32) -> u32 {
    if b == 0 {
        0xFFFF_FFFF
    } else {
        a.wrapping_div(b)
    }
}

pub fn rem(a: u32, b: u32) -> u32 {
    let (sa, sb) = (a as i32, b as i32);
    if sb == 0 {
        a
    } else if sa == i32::MIN && sb == -1 {
        0
    } else {
        sa.wrapping_rem(sb) as u32
    }
}

pub fn remu(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        a.wrapping_rem(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mulhu_matches_widened_multiplication() {
        let a = 0xFFFF_FFFFu32;
        let b = 2u32;
        let full = (a as u64) * (b as u64);
        assert_eq!(mulhu(a, b), (full >> 32) as u32);
    }

    #[test]
    fn div_by_zero_is_all_ones() {
        assert_eq!(div(5, 0), 0xFFFF_FFFF);
        assert_eq!(divu(5, 0), 0xFFFF_FFFF);
    }

    #[test]
    fn rem_by_zero_is_dividend() {
        assert_eq!(rem(5, 0), 5);
        assert_eq!(remu(5, 0), 5);
    }

    #[test]
    fn div_overflow_edge_case() {
        assert_eq!(div(0x8000_0000, 0xFFFF_FFFF), 0x8000_0000);
        assert_eq!(rem(0x8000_0000, 0xFFFF_FFFF), 0);
    }
}
