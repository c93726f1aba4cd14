//! Property animation state machine
//!
//! An [`Animation`] interpolates a numeric property from `from` to `to` over
//! `duration` milliseconds, optionally repeating and reversing. It is pure:
//! [`Animation::update`] takes the frame time and reports the value to write,
//! leaving property access and host callbacks to the scheduler.

use duplex_core::{CoreError, HostValue, Result};

use crate::timing::TimingFunction;

/// How many cycles an animation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Times(u32),
    Forever,
}

/// Playback direction of the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Start parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AnimParams {
    pub from: f64,
    pub to: f64,
    /// Cycle length in milliseconds
    pub duration: f64,
    pub repeat: Repeat,
    pub autoreverse: bool,
    pub timing: TimingFunction,
    /// Start the first cycle at this value instead of `from`
    pub initial_pos: Option<f64>,
    /// Phase-lock to cycles counted from this clock time
    pub ref_time: Option<f64>,
}

impl Default for AnimParams {
    fn default() -> Self {
        Self {
            from: 0.0,
            to: 1.0,
            duration: 1000.0,
            repeat: Repeat::Times(1),
            autoreverse: false,
            timing: TimingFunction::Linear,
            initial_pos: None,
            ref_time: None,
        }
    }
}

impl AnimParams {
    pub fn new(from: f64, to: f64, duration: f64) -> Self {
        Self {
            from,
            to,
            duration,
            ..Default::default()
        }
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_count(self, count: u32) -> Self {
        self.with_repeat(Repeat::Times(count))
    }

    pub fn forever(self) -> Self {
        self.with_repeat(Repeat::Forever)
    }

    pub fn with_autoreverse(mut self, autoreverse: bool) -> Self {
        self.autoreverse = autoreverse;
        self
    }

    pub fn with_timing(mut self, timing: TimingFunction) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_initial_pos(mut self, pos: f64) -> Self {
        self.initial_pos = Some(pos);
        self
    }

    pub fn with_ref_time(mut self, ref_time: f64) -> Self {
        self.ref_time = Some(ref_time);
        self
    }

    /// Decode a host parameter dictionary.
    ///
    /// Recognized keys: `from`, `to`, `duration`, `count` (negative means
    /// forever), `autoreverse`, `timeFunc`, `pos` and `refTime`. Missing keys
    /// keep their defaults; `pos` and `refTime` are only honored when numeric.
    pub fn from_host(value: &HostValue) -> Result<Self> {
        if !matches!(value, HostValue::Dict(_)) {
            return Err(CoreError::type_error(format!(
                "animation parameters must be an object, got {}",
                value.type_name()
            )));
        }
        let mut params = AnimParams::default();
        if let Some(v) = value.get("from") {
            params.from = v.to_number();
        }
        if let Some(v) = value.get("to") {
            params.to = v.to_number();
        }
        if let Some(v) = value.get("duration") {
            params.duration = v.to_number();
        }
        if let Some(v) = value.get("count") {
            let count = v.to_int32();
            params.repeat = if count < 0 {
                Repeat::Forever
            } else {
                Repeat::Times(count as u32)
            };
        }
        if let Some(v) = value.get("autoreverse") {
            params.autoreverse = v.truthy();
        }
        if let Some(v) = value.get("timeFunc") {
            params.timing = TimingFunction::from_name(&v.to_display_string());
        }
        params.initial_pos = value.get("pos").and_then(HostValue::as_f64);
        params.ref_time = value.get("refTime").and_then(HostValue::as_f64);
        Ok(params)
    }
}

/// Outcome of one [`Animation::update`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Nothing to write this frame
    Idle,
    /// Write this value
    Value(f64),
    /// Write this value; the animation is over
    Ended(f64),
}

/// A running animation
#[derive(Debug, Clone)]
pub struct Animation {
    params: AnimParams,
    remaining: Repeat,
    direction: Direction,
    ended: bool,
    start_time: Option<f64>,
    last_time: f64,
}

impl Animation {
    pub fn new(params: AnimParams) -> Self {
        Self {
            remaining: params.repeat,
            params,
            direction: Direction::Forward,
            ended: false,
            start_time: None,
            last_time: 0.0,
        }
    }

    pub fn params(&self) -> &AnimParams {
        &self.params
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Cycles left, counting the current one
    pub fn remaining(&self) -> Repeat {
        self.remaining
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Advance to clock time `now` (milliseconds).
    pub fn update(&mut self, now: f64) -> Step {
        if self.ended {
            return Step::Idle;
        }
        let duration = self.params.duration;
        if self.remaining == Repeat::Times(0) || !(duration.is_finite() && duration > 0.0) {
            return self.finish();
        }

        let start = match self.start_time {
            Some(start) => start,
            None => match self.first_start(now) {
                Ok(Some(start)) => start,
                Ok(None) => return Step::Idle,
                Err(step) => return step,
            },
        };

        // Clock went backwards: keep the elapsed time of the last frame.
        let start = if now < self.last_time {
            now - (self.last_time - start)
        } else {
            start
        };
        self.start_time = Some(start);
        self.last_time = now;

        let elapsed = now - start;
        let mut t = elapsed / duration;

        if t >= 1.0 {
            if let Repeat::Times(n) = self.remaining {
                if n <= 1 {
                    self.remaining = Repeat::Times(0);
                    return self.finish();
                }
                self.remaining = Repeat::Times(n - 1);
            }

            let mut over = elapsed - duration;
            let mut cycles = 1u64;
            if over >= duration {
                let extra = (over / duration).floor();
                over -= extra * duration;
                cycles += extra as u64;
                if !self.consume_cycles(extra as u64) {
                    return self.finish();
                }
            }
            self.start_time = Some(now - over);
            t = over / duration;
            if cycles % 2 == 1 {
                self.toggle();
            }
        }

        if self.direction == Direction::Backward {
            t = 1.0 - t;
        }
        Step::Value(self.position(t))
    }

    /// Establish the start time on the first tick.
    ///
    /// `Ok(None)` defers (reference time in the future), `Err` carries the
    /// final step when the reference time already used up every cycle.
    fn first_start(&mut self, now: f64) -> std::result::Result<Option<f64>, Step> {
        let duration = self.params.duration;
        let mut start = now;

        if let Some(ref_time) = self.params.ref_time {
            let mut diff = now - ref_time;
            if diff < 0.0 {
                return Ok(None);
            }
            let cycles = (diff / duration).floor();
            if cycles > 0.0 {
                if !self.consume_cycles(cycles as u64) {
                    return Err(self.finish());
                }
                diff -= cycles * duration;
                if (cycles as u64) % 2 == 1 {
                    self.toggle();
                }
            }
            start -= diff;
        }

        if let Some(fraction) = self.params.initial_pos.and_then(|pos| self.fraction_of(pos)) {
            start -= fraction * duration;
        }

        self.last_time = now;
        Ok(Some(start))
    }

    /// Linear fraction of the way from `from` to `to`, if `pos` lies in
    /// `(from, to]`.
    fn fraction_of(&self, pos: f64) -> Option<f64> {
        let span = self.params.to - self.params.from;
        if span == 0.0 {
            return None;
        }
        let fraction = (pos - self.params.from) / span;
        (fraction > 0.0 && fraction <= 1.0).then_some(fraction)
    }

    /// Take whole cycles off a finite counter. False when that exhausts it.
    fn consume_cycles(&mut self, cycles: u64) -> bool {
        match self.remaining {
            Repeat::Forever => true,
            Repeat::Times(n) if cycles >= u64::from(n) => {
                self.remaining = Repeat::Times(0);
                false
            }
            Repeat::Times(n) => {
                self.remaining = Repeat::Times(n - cycles as u32);
                true
            }
        }
    }

    fn toggle(&mut self) {
        if self.params.autoreverse {
            self.direction = match self.direction {
                Direction::Forward => Direction::Backward,
                Direction::Backward => Direction::Forward,
            };
        }
    }

    fn position(&self, t: f64) -> f64 {
        let AnimParams { from, to, timing, .. } = self.params;
        from + (to - from) * timing.apply(t)
    }

    fn finish(&mut self) -> Step {
        self.ended = true;
        Step::Ended(self.params.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(step: Step) -> f64 {
        match step {
            Step::Value(v) => v,
            other => panic!("expected a value, got {:?}", other),
        }
    }

    #[test]
    fn test_linear_single_cycle() {
        let mut anim = Animation::new(AnimParams::new(0.0, 10.0, 1000.0));
        let start = 5000.0;
        assert_eq!(anim.update(start), Step::Value(0.0));
        assert!((value(anim.update(start + 500.0)) - 5.0).abs() < 1e-9);
        assert_eq!(anim.update(start + 1000.0), Step::Ended(10.0));
        assert!(anim.is_ended());
        assert_eq!(anim.update(start + 1100.0), Step::Idle);
    }

    #[test]
    fn test_autoreverse_two_cycles() {
        let params = AnimParams::new(0.0, 1.0, 1000.0)
            .with_count(2)
            .with_autoreverse(true);
        let mut anim = Animation::new(params);
        anim.update(0.0);
        let rising = value(anim.update(400.0));
        let peak = value(anim.update(900.0));
        assert!(rising < peak);
        assert_eq!(anim.direction(), Direction::Forward);

        let after = value(anim.update(1200.0));
        assert_eq!(anim.direction(), Direction::Backward);
        let later = value(anim.update(1700.0));
        assert!(later < after);
        assert!((later - 0.3).abs() < 1e-9);

        assert_eq!(anim.update(2000.0), Step::Ended(1.0));
    }

    #[test]
    fn test_repeat_without_autoreverse_restarts() {
        let params = AnimParams::new(0.0, 100.0, 1000.0).with_count(3);
        let mut anim = Animation::new(params);
        anim.update(0.0);
        assert!((value(anim.update(1250.0)) - 25.0).abs() < 1e-9);
        assert_eq!(anim.remaining(), Repeat::Times(2));
        assert_eq!(anim.direction(), Direction::Forward);
    }

    #[test]
    fn test_overflow_spanning_several_cycles() {
        let params = AnimParams::new(0.0, 100.0, 1000.0)
            .forever()
            .with_autoreverse(true);
        let mut anim = Animation::new(params);
        anim.update(0.0);
        // Two whole cycles pass in one frame: direction ends where it began.
        assert!((value(anim.update(2250.0)) - 25.0).abs() < 1e-9);
        assert_eq!(anim.direction(), Direction::Forward);
        // Three: reversed.
        assert!((value(anim.update(5250.0)) - 75.0).abs() < 1e-9);
        assert_eq!(anim.direction(), Direction::Backward);
    }

    #[test]
    fn test_overflow_exhausts_finite_count() {
        let mut anim = Animation::new(AnimParams::new(0.0, 1.0, 100.0).with_count(3));
        anim.update(0.0);
        assert_eq!(anim.update(450.0), Step::Ended(1.0));
    }

    #[test]
    fn test_ref_time_phase_lock() {
        let params = AnimParams::new(0.0, 100.0, 1000.0)
            .forever()
            .with_autoreverse(true)
            .with_ref_time(0.0);
        let mut early = Animation::new(params.clone());
        let mut late = Animation::new(params);

        let mut now = 100.0;
        while now < 2600.0 {
            early.update(now);
            now += 100.0;
        }
        late.update(2600.0);
        let a = value(early.update(2700.0));
        let b = value(late.update(2700.0));
        assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
        assert!((a - 70.0).abs() < 1e-6);
    }

    #[test]
    fn test_ref_time_in_future_defers() {
        let params = AnimParams::new(0.0, 10.0, 1000.0).with_ref_time(500.0);
        let mut anim = Animation::new(params);
        assert_eq!(anim.update(100.0), Step::Idle);
        assert_eq!(anim.update(500.0), Step::Value(0.0));
    }

    #[test]
    fn test_ref_time_past_every_cycle_ends() {
        let params = AnimParams::new(0.0, 10.0, 1000.0)
            .with_count(2)
            .with_ref_time(0.0);
        let mut anim = Animation::new(params);
        assert_eq!(anim.update(2500.0), Step::Ended(10.0));
    }

    #[test]
    fn test_initial_pos_shifts_start() {
        let params = AnimParams::new(0.0, 10.0, 1000.0).with_initial_pos(5.0);
        let mut anim = Animation::new(params);
        assert!((value(anim.update(0.0)) - 5.0).abs() < 1e-9);
        assert_eq!(anim.update(500.0), Step::Ended(10.0));

        // Outside (from, to]: ignored
        let params = AnimParams::new(0.0, 10.0, 1000.0).with_initial_pos(20.0);
        assert_eq!(Animation::new(params).update(0.0), Step::Value(0.0));
    }

    #[test]
    fn test_non_monotonic_clock_keeps_phase() {
        let mut anim = Animation::new(AnimParams::new(0.0, 100.0, 1000.0));
        anim.update(1000.0);
        assert!((value(anim.update(1400.0)) - 40.0).abs() < 1e-9);
        // Clock jumps back; position holds and continues from there.
        assert!((value(anim.update(200.0)) - 40.0).abs() < 1e-9);
        assert!((value(anim.update(300.0)) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_count_and_zero_duration_end_immediately() {
        let mut anim = Animation::new(AnimParams::new(0.0, 3.0, 1000.0).with_count(0));
        assert_eq!(anim.update(0.0), Step::Ended(3.0));
        let mut anim = Animation::new(AnimParams::new(0.0, 3.0, 0.0));
        assert_eq!(anim.update(0.0), Step::Ended(3.0));
    }

    #[test]
    fn test_non_numeric_duration_ends_immediately() {
        let host = HostValue::dict([
            ("to", HostValue::Number(4.0)),
            ("duration", HostValue::from("slow")),
        ]);
        let params = AnimParams::from_host(&host).unwrap();
        assert!(params.duration.is_nan());
        let mut anim = Animation::new(params);
        assert_eq!(anim.update(0.0), Step::Ended(4.0));
        assert_eq!(anim.update(16.0), Step::Idle);

        let endless = AnimParams::new(0.0, 4.0, f64::INFINITY);
        assert_eq!(Animation::new(endless).update(0.0), Step::Ended(4.0));
    }

    #[test]
    fn test_params_from_host() {
        let host = HostValue::dict([
            ("from", HostValue::Number(1.0)),
            ("to", HostValue::Number(2.0)),
            ("duration", HostValue::Number(300.0)),
            ("count", HostValue::Number(-1.0)),
            ("autoreverse", HostValue::Bool(true)),
            ("timeFunc", HostValue::from("cubicOut")),
            ("pos", HostValue::from("1.5")),
            ("refTime", HostValue::Number(42.0)),
        ]);
        let params = AnimParams::from_host(&host).unwrap();
        assert_eq!(params.from, 1.0);
        assert_eq!(params.to, 2.0);
        assert_eq!(params.duration, 300.0);
        assert_eq!(params.repeat, Repeat::Forever);
        assert!(params.autoreverse);
        assert_eq!(params.timing, TimingFunction::CubicOut);
        assert_eq!(params.initial_pos, None);
        assert_eq!(params.ref_time, Some(42.0));

        let unknown = HostValue::dict([("timeFunc", HostValue::from("spring"))]);
        assert_eq!(
            AnimParams::from_host(&unknown).unwrap().timing,
            TimingFunction::Linear
        );
        assert!(matches!(
            AnimParams::from_host(&HostValue::Null),
            Err(CoreError::Type(_))
        ));
    }
}
