use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and export.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Whole units in `v`, rounded toward zero. Negative values clamp to 0.
#[inline]
pub fn floor_units(v: Fixed64) -> u32 {
    if v <= Fixed64::ZERO {
        return 0;
    }
    v.saturating_to_num::<u32>()
}

/// Scale an integer rate by a multiplier and floor the result.
#[inline]
pub fn scale_floor(value: u32, factor: Fixed64) -> u32 {
    floor_units(Fixed64::saturating_from_num(value).saturating_mul(factor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed64_multiplication() {
        let a = f64_to_fixed64(3.0);
        let b = f64_to_fixed64(4.0);
        assert_eq!(fixed64_to_f64(a * b), 12.0);
    }

    #[test]
    fn floor_units_truncates() {
        assert_eq!(floor_units(f64_to_fixed64(2.75)), 2);
        assert_eq!(floor_units(f64_to_fixed64(0.99)), 0);
        assert_eq!(floor_units(f64_to_fixed64(-3.0)), 0);
    }

    #[test]
    fn scale_floor_halves_speed() {
        assert_eq!(scale_floor(5, f64_to_fixed64(0.5)), 2);
        assert_eq!(scale_floor(4, Fixed64::ONE), 4);
        assert_eq!(scale_floor(4, Fixed64::ZERO), 0);
    }

    #[test]
    fn scale_floor_saturates() {
        assert_eq!(scale_floor(u32::MAX, f64_to_fixed64(2.0)), i32::MAX as u32);
    }

    #[test]
    fn fixed64_determinism() {
        let a = f64_to_fixed64(1.0 / 3.0);
        let b = f64_to_fixed64(1.0 / 3.0);
        assert_eq!(a * f64_to_fixed64(3.0), b * f64_to_fixed64(3.0));
    }
}
