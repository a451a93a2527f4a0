//! Axis shaping: inversion, dead zone and rescale.

/// Shape a raw axis sample in `[-1, 1]` into a command component.
///
/// Inversion is applied first, then magnitudes at or below `dead_zone` are
/// zeroed, and the remaining range is linearly rescaled so the output is
/// continuous at the dead-zone boundary and reaches exactly ±1.0 at full
/// deflection.
pub fn shape_axis(raw: f32, dead_zone: f32, invert: bool) -> f32 {
    let value = if invert { -raw } else { raw };
    let value = value.clamp(-1.0, 1.0);

    if value.abs() <= dead_zone {
        return 0.0;
    }

    value.signum() * (value.abs() - dead_zone) / (1.0 - dead_zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_inside_dead_zone() {
        assert_eq!(shape_axis(0.0, 0.05, false), 0.0);
        assert_eq!(shape_axis(0.03, 0.05, false), 0.0);
        assert_eq!(shape_axis(-0.05, 0.05, false), 0.0);
    }

    #[test]
    fn continuous_at_dead_zone_boundary() {
        let just_outside = shape_axis(0.0501, 0.05, false);
        assert!(just_outside > 0.0);
        assert!(just_outside < 0.001);
    }

    #[test]
    fn strictly_increasing_outside_dead_zone() {
        let mut prev = 0.0;
        let mut m = 0.06;
        while m <= 1.0 {
            let out = shape_axis(m, 0.05, false);
            assert!(out > prev, "not increasing at m={m}");
            prev = out;
            m += 0.01;
        }
    }

    #[test]
    fn full_deflection_reaches_exactly_one() {
        assert_eq!(shape_axis(1.0, 0.05, false), 1.0);
        assert_eq!(shape_axis(-1.0, 0.05, false), -1.0);
        assert_eq!(shape_axis(1.0, 0.3, false), 1.0);
    }

    #[test]
    fn sixty_percent_deflection_scenario() {
        // (0.60 - 0.05) / (1 - 0.05) = 0.5789...
        let out = shape_axis(0.60, 0.05, false);
        assert!((out - 0.579).abs() < 0.001, "got {out}");
    }

    #[test]
    fn inversion_flips_sign_before_dead_zone() {
        assert_eq!(
            shape_axis(0.60, 0.05, true),
            -shape_axis(0.60, 0.05, false)
        );
        assert_eq!(shape_axis(0.03, 0.05, true), 0.0);
    }

    #[test]
    fn out_of_range_input_is_clamped() {
        assert_eq!(shape_axis(1.5, 0.05, false), 1.0);
        assert_eq!(shape_axis(-2.0, 0.05, false), -1.0);
    }
}
