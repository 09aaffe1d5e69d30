//! RISC-5 floating-point unit.
//!
//! The machine's float format looks like IEEE single precision (1 sign
//! bit, 8-bit biased exponent, 23-bit fraction with a hidden one) but the
//! arithmetic is the hardware's, not IEEE-754: results truncate where the
//! FPU truncates, subnormals flush to zero, and there are no NaNs, infs
//! or traps. Division by zero produces a canonical zero-exponent result.
//!
//! FAD doubles as the int↔float conversion unit: the `u` modifier turns
//! the first operand into a 24-bit integer to be floated, and the `v`
//! modifier makes the adder return the raw aligned sum, which is how
//! FLOOR is built. FSB is FAD with the second operand's sign flipped.

/// Floating-point add, with the `u`/`v` conversion modifiers.
#[must_use]
pub fn add(x: u32, y: u32, u: bool, v: bool) -> u32 {
    let xs = x & 0x8000_0000 != 0;
    let xe: u32;
    let x0: i32;
    if u {
        // Integer operand: 24-bit signed value pre-scaled for the adder.
        xe = 150;
        x0 = (((x & 0x00FF_FFFF) << 8) as i32) >> 7;
    } else {
        xe = (x >> 23) & 0xFF;
        let xm = ((x & 0x007F_FFFF) << 1) | 0x0100_0000;
        x0 = if xs { -(xm as i32) } else { xm as i32 };
    }

    let ys = y & 0x8000_0000 != 0;
    let ye = (y >> 23) & 0xFF;
    let mut ym = (y & 0x007F_FFFF) << 1;
    if !u && !v {
        ym |= 0x0100_0000;
    }
    let y0 = if ys { -(ym as i32) } else { ym as i32 };

    // Align the smaller operand to the larger exponent.
    let e0: u32;
    let x3: i32;
    let y3: i32;
    if ye > xe {
        let shift = ye - xe;
        e0 = ye;
        x3 = if shift > 31 { x0 >> 31 } else { x0 >> shift };
        y3 = y0;
    } else {
        let shift = xe - ye;
        e0 = xe;
        x3 = x0;
        y3 = if shift > 31 { y0 >> 31 } else { y0 >> shift };
    }

    let xs_bit = u32::from(xs);
    let ys_bit = u32::from(ys);
    let sum = ((xs_bit << 26) | (xs_bit << 25) | (x3 as u32 & 0x01FF_FFFF))
        .wrapping_add((ys_bit << 26) | (ys_bit << 25) | (y3 as u32 & 0x01FF_FFFF));

    let s = (if sum & 0x0400_0000 != 0 {
        sum.wrapping_neg()
    } else {
        sum
    })
    .wrapping_add(1)
        & 0x07FF_FFFF;

    // Renormalise.
    let mut e1 = e0.wrapping_add(1);
    let mut t3 = s >> 1;
    if s & 0x03FF_FFFC != 0 {
        while t3 & 0x0100_0000 == 0 {
            t3 <<= 1;
            e1 = e1.wrapping_sub(1);
        }
    } else {
        t3 <<= 24;
        e1 = e1.wrapping_sub(24);
    }

    let xn = x & 0x7FFF_FFFF == 0;
    let yn = y & 0x7FFF_FFFF == 0;
    if v {
        ((sum << 5) as i32 >> 6) as u32
    } else if xn {
        if u || yn { 0 } else { y }
    } else if yn {
        x
    } else if t3 & 0x01FF_FFFF == 0 || e1 & 0x100 != 0 {
        0
    } else {
        ((sum & 0x0400_0000) << 5) | (e1 << 23) | ((t3 >> 1) & 0x007F_FFFF)
    }
}

/// Floating-point multiply.
#[must_use]
pub fn mul(x: u32, y: u32) -> u32 {
    let sign = (x ^ y) & 0x8000_0000;
    let xe = (x >> 23) & 0xFF;
    let ye = (y >> 23) & 0xFF;

    let xm = (x & 0x007F_FFFF) | 0x0080_0000;
    let ym = (y & 0x007F_FFFF) | 0x0080_0000;
    let m = u64::from(xm) * u64::from(ym);

    let mut e1 = xe.wrapping_add(ye).wrapping_sub(127);
    let z0 = if m & (1 << 47) != 0 {
        e1 = e1.wrapping_add(1);
        ((m >> 24) as u32) & 0x007F_FFFF
    } else {
        ((m >> 23) as u32) & 0x007F_FFFF
    };

    if xe == 0 || ye == 0 {
        0
    } else if e1 & 0x100 == 0 {
        sign | ((e1 & 0xFF) << 23) | z0
    } else if e1 & 0x80 == 0 {
        // Exponent overflow saturates.
        sign | (0xFF << 23) | z0
    } else {
        0
    }
}

/// Floating-point divide.
///
/// The quotient truncates. A zero divisor yields the canonical
/// zero-exponent result carrying the quotient's sign.
#[must_use]
pub fn div(x: u32, y: u32) -> u32 {
    let sign = (x ^ y) & 0x8000_0000;
    let xe = (x >> 23) & 0xFF;
    let ye = (y >> 23) & 0xFF;
    if xe == 0 {
        return 0;
    }
    if ye == 0 {
        return sign;
    }

    let xm = (x & 0x007F_FFFF) | 0x0080_0000;
    let ym = (y & 0x007F_FFFF) | 0x0080_0000;
    let q1 = ((u64::from(xm) << 24) / u64::from(ym)) as u32;

    let mut e1 = xe.wrapping_add(126).wrapping_sub(ye);
    let q2 = if q1 & 0x0100_0000 != 0 {
        e1 = e1.wrapping_add(1);
        q1 >> 1
    } else {
        q1
    };

    if e1 & 0x100 == 0 {
        sign | ((e1 & 0xFF) << 23) | (q2 & 0x007F_FFFF)
    } else if e1 & 0x80 == 0 {
        sign | (0xFF << 23) | (q2 & 0x007F_FFFF)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(value: f32) -> u32 {
        value.to_bits()
    }

    #[test]
    fn add_simple() {
        assert_eq!(add(f(1.0), f(2.0), false, false), f(3.0));
        assert_eq!(add(f(1.5), f(0.25), false, false), f(1.75));
    }

    #[test]
    fn add_with_cancellation() {
        // 0.5 - 1.5 = -1.0, via FSB's sign flip on the second operand
        assert_eq!(add(f(0.5), f(1.5) ^ 0x8000_0000, false, false), f(-1.0));
        // 1.5 - 0.5 = 1.0
        assert_eq!(add(f(1.5), f(0.5) ^ 0x8000_0000, false, false), f(1.0));
    }

    #[test]
    fn add_zero_identities() {
        assert_eq!(add(0, f(2.5), false, false), f(2.5));
        assert_eq!(add(f(2.5), 0, false, false), f(2.5));
        assert_eq!(add(0, 0, false, false), 0);
    }

    #[test]
    fn mul_simple() {
        assert_eq!(mul(f(1.0), f(1.0)), f(1.0));
        assert_eq!(mul(f(1.5), f(2.0)), f(3.0));
        assert_eq!(mul(f(2.0), f(2.0)), f(4.0));
        assert_eq!(mul(f(3.0), f(3.0)), f(9.0));
    }

    #[test]
    fn mul_signs() {
        assert_eq!(mul(f(-2.0), f(3.0)), f(-6.0));
        assert_eq!(mul(f(-2.0), f(-3.0)), f(6.0));
    }

    #[test]
    fn mul_by_zero_flushes() {
        assert_eq!(mul(f(5.0), 0), 0);
        assert_eq!(mul(0, f(5.0)), 0);
    }

    #[test]
    fn div_simple() {
        assert_eq!(div(f(1.0), f(1.0)), f(1.0));
        assert_eq!(div(f(1.0), f(2.0)), f(0.5));
        assert_eq!(div(f(6.0), f(-3.0)), f(-2.0));
        assert_eq!(div(f(3.0), f(1.5)), f(2.0));
    }

    #[test]
    fn div_truncates() {
        // 1/3 in this format truncates toward zero; the result must not
        // exceed the mathematically exact quotient.
        let third = div(f(1.0), f(3.0));
        let approx = f32::from_bits(third);
        assert!(approx <= 1.0 / 3.0);
        assert!((1.0 / 3.0) - approx < 1e-6);
    }

    #[test]
    fn div_by_zero_is_canonical_zero_exponent() {
        let q = div(f(1.0), 0);
        assert_eq!((q >> 23) & 0xFF, 0);
        let q = div(f(-1.0), 0);
        assert_eq!((q >> 23) & 0xFF, 0);
        assert_eq!(q & 0x8000_0000, 0x8000_0000);
    }

    #[test]
    fn zero_dividend() {
        assert_eq!(div(0, f(3.0)), 0);
    }
}
