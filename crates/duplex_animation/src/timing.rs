//! Timing functions
//!
//! Monotonic reparametrizations of animation phase on `[0, 1]`.

/// Timing function applied to the normalized phase of an animation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimingFunction {
    #[default]
    Linear,
    CubicIn,
    CubicOut,
    CubicInOut,
}

impl TimingFunction {
    /// Parse a host-side name. Unknown names fall back to linear.
    pub fn from_name(name: &str) -> Self {
        match name {
            "cubicIn" => TimingFunction::CubicIn,
            "cubicOut" => TimingFunction::CubicOut,
            "cubicInOut" => TimingFunction::CubicInOut,
            _ => TimingFunction::Linear,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TimingFunction::Linear => "linear",
            TimingFunction::CubicIn => "cubicIn",
            TimingFunction::CubicOut => "cubicOut",
            TimingFunction::CubicInOut => "cubicInOut",
        }
    }

    /// Map phase `t` to progress
    pub fn apply(self, t: f64) -> f64 {
        match self {
            TimingFunction::Linear => t,
            TimingFunction::CubicIn => cubic_in(t),
            TimingFunction::CubicOut => cubic_out(t),
            TimingFunction::CubicInOut => {
                if t < 0.5 {
                    cubic_in(t * 2.0) / 2.0
                } else {
                    1.0 - cubic_in((1.0 - t) * 2.0) / 2.0
                }
            }
        }
    }
}

fn cubic_in(t: f64) -> f64 {
    t * t * t
}

fn cubic_out(t: f64) -> f64 {
    1.0 - cubic_in(1.0 - t)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TimingFunction; 4] = [
        TimingFunction::Linear,
        TimingFunction::CubicIn,
        TimingFunction::CubicOut,
        TimingFunction::CubicInOut,
    ];

    #[test]
    fn test_endpoints() {
        for tf in ALL {
            assert_eq!(tf.apply(0.0), 0.0, "{}", tf.name());
            assert_eq!(tf.apply(1.0), 1.0, "{}", tf.name());
        }
    }

    #[test]
    fn test_monotonic() {
        for tf in ALL {
            let mut last = tf.apply(0.0);
            for i in 1..=100 {
                let v = tf.apply(f64::from(i) / 100.0);
                assert!(v >= last, "{} not monotonic at {}", tf.name(), i);
                last = v;
            }
        }
    }

    #[test]
    fn test_curve_shapes() {
        assert_eq!(TimingFunction::CubicIn.apply(0.5), 0.125);
        assert_eq!(TimingFunction::CubicOut.apply(0.5), 0.875);
        assert_eq!(TimingFunction::CubicInOut.apply(0.5), 0.5);
        assert_eq!(TimingFunction::CubicInOut.apply(0.25), 0.0625);
    }

    #[test]
    fn test_names() {
        assert_eq!(TimingFunction::from_name("cubicOut"), TimingFunction::CubicOut);
        assert_eq!(TimingFunction::from_name("bounce"), TimingFunction::Linear);
        for tf in ALL {
            assert_eq!(TimingFunction::from_name(tf.name()), tf);
        }
    }
}
