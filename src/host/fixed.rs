//! Fixed-point helpers for XInput2 wire values.
//!
//! XInput2 reports positions as 16.16 (`FP1616`) and valuator values as
//! 32.32 (`FP3232`). Everything here is pure arithmetic.

use x11rb::protocol::xinput;

/// 32.32 fixed-point value as carried on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fp3232 {
    pub integral: i32,
    pub frac: u32,
}

impl Fp3232 {
    pub const fn new(integral: i32, frac: u32) -> Self {
        Self { integral, frac }
    }
}

impl From<xinput::Fp3232> for Fp3232 {
    fn from(v: xinput::Fp3232) -> Self {
        Self {
            integral: v.integral,
            frac: v.frac,
        }
    }
}

pub fn fp3232_to_f64(v: Fp3232) -> f64 {
    v.integral as f64 + v.frac as f64 / 4_294_967_296.0
}

pub fn fp3232_to_i64(v: Fp3232) -> i64 {
    ((v.integral as i64) << 32) | v.frac as i64
}

pub fn fp3232_from_i64(n: i64) -> Fp3232 {
    Fp3232 {
        integral: (n >> 32) as i32,
        frac: n as u32,
    }
}

/// Exact subtraction through the 64-bit representation.
pub fn fp3232_sub(a: Fp3232, b: Fp3232) -> Fp3232 {
    fp3232_from_i64(fp3232_to_i64(a).wrapping_sub(fp3232_to_i64(b)))
}

pub fn fp3232_round(v: Fp3232) -> i32 {
    fp3232_to_f64(v).round() as i32
}

pub fn fp1616_to_f64(v: i32) -> f64 {
    v as f64 / 65535.0
}

pub fn fp1616_round(v: i32) -> i32 {
    fp1616_to_f64(v).round() as i32
}

/// Rescale `value` from the device range `[min, max]` into `[out_min, out_max]`.
///
/// A zero-width device range scales by 1, so the result is `out_min` plus
/// the rounded offset from `min`.
pub fn fp3232_scale(value: Fp3232, min: Fp3232, max: Fp3232, out_min: i32, out_max: i32) -> i32 {
    let offset = fp3232_to_i64(fp3232_sub(value, min)) as i128;
    let width = fp3232_to_i64(fp3232_sub(max, min)) as i128;
    if width == 0 {
        return out_min.saturating_add(fp3232_round(fp3232_from_i64(offset as i64)));
    }
    let span = out_max as i128 - out_min as i128;
    let scaled = out_min as i128 + offset * span / width;
    scaled.clamp(i32::MIN as i128, i32::MAX as i128) as i32
}
