use crate::{
    full_unit_interval, AbsoluteValue, ControlType, Interval, Target, Transformation, UnitValue,
};

/// Why a source event deliberately produced no output. Distinct from failure
/// so that policy drops stay observable.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DropReason {
    /// Source value outside the configured source interval while
    /// `ignore_out_of_range_source_values` is set.
    SourceValueOutOfRange,
    /// The change would be smaller than the minimum step size.
    StepTooSmall,
    /// The control transformation failed to evaluate.
    TransformationFailed,
}

/// Outcome of applying the mode in control direction.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ModeControlResult {
    /// Write the given value to the target.
    HitTarget(UnitValue),
    /// The desired value was determined but the target has it already or the
    /// change was suppressed as sub-threshold. Don't write.
    LeaveTargetUntouched(UnitValue),
    /// Deliberate no-output outcome.
    Dropped(DropReason),
}

impl ModeControlResult {
    pub fn hit_value(self) -> Option<UnitValue> {
        match self {
            ModeControlResult::HitTarget(v) => Some(v),
            _ => None,
        }
    }
}

/// The numeric transformation pipeline of one mapping.
///
/// Holds the per-mapping sequential state (`previous_target_value`), so
/// control applications of one mode must be strictly ordered by event
/// arrival.
#[derive(Clone, Debug)]
pub struct Mode<T: Transformation> {
    pub source_value_interval: Interval<UnitValue>,
    pub target_value_interval: Interval<UnitValue>,
    /// Bounds for the delta applied per event when stepping is in effect.
    pub step_size_interval: Interval<UnitValue>,
    /// Bounds for the distance between two successive target values.
    pub jump_interval: Interval<UnitValue>,
    pub reverse: bool,
    pub rotate: bool,
    pub round_target_value: bool,
    /// Forces stepped behavior even for continuous targets.
    pub scale_mode: bool,
    pub ignore_out_of_range_source_values: bool,
    /// Replaces the complete numeric pipeline when set.
    pub control_transformation: Option<T>,
    pub feedback_transformation: Option<T>,
    /// Value written by the previous control application.
    pub previous_target_value: Option<UnitValue>,
}

impl<T: Transformation> Default for Mode<T> {
    fn default() -> Self {
        Self {
            source_value_interval: full_unit_interval(),
            target_value_interval: full_unit_interval(),
            step_size_interval: full_unit_interval(),
            jump_interval: full_unit_interval(),
            reverse: false,
            rotate: false,
            round_target_value: false,
            scale_mode: false,
            ignore_out_of_range_source_values: false,
            control_transformation: None,
            feedback_transformation: None,
            previous_target_value: None,
        }
    }
}

impl<T: Transformation> Mode<T> {
    /// Applies the control direction of the pipeline and returns what should
    /// happen with the target.
    pub fn control(&mut self, input: AbsoluteValue, target: &impl Target) -> ModeControlResult {
        let prev = self
            .previous_target_value
            .unwrap_or_else(|| target.current_value());
        let result = self.control_internal(input.to_unit_value(), prev, target.control_type());
        if let ModeControlResult::HitTarget(v) = result {
            self.previous_target_value = Some(v);
        }
        result
    }

    /// Resets the sequential state, e.g. when the mapping gets (re)activated.
    pub fn reset(&mut self) {
        self.previous_target_value = None;
    }

    fn control_internal(
        &self,
        input: UnitValue,
        prev: UnitValue,
        control_type: ControlType,
    ) -> ModeControlResult {
        if let Some(t) = &self.control_transformation {
            return match t.transform(input.get(), prev.get()) {
                Ok(out) => hit_or_leave(UnitValue::new_clamped(out), prev),
                Err(_) => ModeControlResult::Dropped(DropReason::TransformationFailed),
            };
        }
        // 1. Range mapping
        if !input.is_within_interval(&self.source_value_interval)
            && self.ignore_out_of_range_source_values
        {
            return ModeControlResult::Dropped(DropReason::SourceValueOutOfRange);
        }
        let src = &self.source_value_interval;
        let tgt = &self.target_value_interval;
        let pos = if src.is_degenerate() {
            0.0
        } else if self.rotate {
            // Out-of-range inputs wrap around later instead of saturating.
            (input.get() - src.min_val().get()) / src.span()
        } else {
            input.map_to_unit_interval_from(src).get()
        };
        // 2. Reverse
        let pos = if self.reverse { 1.0 - pos } else { pos };
        let mut out = tgt.min_val().get() + pos * tgt.span();
        // 3. Stepping
        if control_type.is_discrete() || self.scale_mode {
            let step_min = self.step_size_interval.min_val().get();
            let step_max = self.step_size_interval.max_val().get();
            let delta = out - prev.get();
            if delta == 0.0 {
                return ModeControlResult::LeaveTargetUntouched(prev);
            }
            let magnitude = delta.abs();
            if magnitude < step_min {
                return ModeControlResult::Dropped(DropReason::StepTooSmall);
            }
            let quantum = control_type
                .step_size()
                .filter(|s| !s.is_zero())
                .map(|s| s.get())
                .unwrap_or(step_min);
            let mut step = if quantum > 0.0 {
                (magnitude / quantum).round() * quantum
            } else {
                magnitude
            };
            if step == 0.0 {
                return ModeControlResult::Dropped(DropReason::StepTooSmall);
            }
            if step > step_max {
                step = step_max;
            }
            out = prev.get() + step.copysign(delta);
        }
        // 4. Rotation
        let (t_min, t_max) = (tgt.min_val().get(), tgt.max_val().get());
        if out < t_min || out > t_max {
            out = if self.rotate {
                if tgt.is_degenerate() {
                    t_min
                } else {
                    t_min + (out - t_min).rem_euclid(tgt.span())
                }
            } else {
                out.clamp(t_min, t_max)
            };
        }
        // 5. Jump limiting
        let jump_min = self.jump_interval.min_val().get();
        let jump_max = self.jump_interval.max_val().get();
        let jump = (out - prev.get()).abs();
        if jump < jump_min {
            return ModeControlResult::LeaveTargetUntouched(prev);
        }
        if jump > jump_max {
            out = (prev.get() + jump_max.copysign(out - prev.get())).clamp(t_min, t_max);
        }
        // 6. Rounding
        if self.round_target_value {
            if let Some(step_size) = control_type.step_size().filter(|s| !s.is_zero()) {
                out = UnitValue::new_clamped(out)
                    .snap_to_grid_by_step_size(step_size)
                    .get()
                    .clamp(t_min, t_max);
            }
        }
        hit_or_leave(UnitValue::new_clamped(out), prev)
    }

    /// Applies the feedback direction: takes the authoritative target value
    /// and produces the value to encode into the outbound event.
    ///
    /// Stepping, rotation and jump limiting don't apply here because feedback
    /// reflects actual target state.
    pub fn feedback(&self, target_value: UnitValue) -> Result<UnitValue, &'static str> {
        if let Some(t) = &self.feedback_transformation {
            let out = t.transform(target_value.get(), 0.0)?;
            return Ok(UnitValue::new_clamped(out));
        }
        let pos = target_value
            .clamp_to_interval(&self.target_value_interval)
            .map_to_unit_interval_from(&self.target_value_interval);
        let pos = if self.reverse { pos.inverse() } else { pos };
        Ok(pos.map_from_unit_interval_to(&self.source_value_interval))
    }
}

fn hit_or_leave(out: UnitValue, prev: UnitValue) -> ModeControlResult {
    if out == prev {
        ModeControlResult::LeaveTargetUntouched(out)
    } else {
        ModeControlResult::HitTarget(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[derive(Clone, Debug)]
    struct TestTransformation(fn(f64) -> Result<f64, &'static str>);

    impl Transformation for TestTransformation {
        fn transform(&self, input_value: f64, _output_value: f64) -> Result<f64, &'static str> {
            (self.0)(input_value)
        }
    }

    struct TestTarget {
        current_value: UnitValue,
        control_type: ControlType,
    }

    impl Target for TestTarget {
        fn current_value(&self) -> UnitValue {
            self.current_value
        }

        fn control_type(&self) -> ControlType {
            self.control_type
        }
    }

    fn continuous_target() -> TestTarget {
        TestTarget {
            current_value: UnitValue::MIN,
            control_type: ControlType::AbsoluteContinuous,
        }
    }

    fn uv(value: f64) -> UnitValue {
        UnitValue::new(value)
    }

    fn abs(value: f64) -> AbsoluteValue {
        AbsoluteValue::Continuous(uv(value))
    }

    #[test]
    fn default_is_identity() {
        // Given
        let mut mode: Mode<TestTransformation> = Default::default();
        let target = continuous_target();
        // When
        let result = mode.control(abs(64.0 / 127.0), &target);
        // Then
        let v = result.hit_value().unwrap();
        assert_abs_diff_eq!(v.get(), 0.5039, epsilon = 0.0001);
    }

    #[test]
    fn reverse() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            reverse: true,
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(64.0 / 127.0), &target);
        // Then
        assert_abs_diff_eq!(result.hit_value().unwrap().get(), 0.4961, epsilon = 0.0001);
    }

    #[test]
    fn reverse_involution() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            reverse: true,
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let controlled = mode.control(abs(0.3), &target).hit_value().unwrap();
        let fed_back = mode.feedback(controlled).unwrap();
        // Then
        assert_abs_diff_eq!(fed_back.get(), 0.3);
    }

    #[test]
    fn range_mapping_stays_within_target_interval() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            source_value_interval: Interval::new(uv(0.2), uv(0.8)),
            target_value_interval: Interval::new(uv(0.25), uv(0.75)),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let low = mode.control(abs(0.2), &target);
        let mid = mode.control(abs(0.5), &target);
        let high = mode.control(abs(0.8), &target);
        // Then
        assert_abs_diff_eq!(low.hit_value().unwrap().get(), 0.25);
        assert_abs_diff_eq!(mid.hit_value().unwrap().get(), 0.5);
        assert_abs_diff_eq!(high.hit_value().unwrap().get(), 0.75);
    }

    #[test]
    fn out_of_range_clamps_by_default() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            source_value_interval: Interval::new(uv(0.0), uv(0.5)),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(0.7), &target);
        // Then
        assert_abs_diff_eq!(result.hit_value().unwrap().get(), 1.0);
    }

    #[test]
    fn out_of_range_drops_when_ignoring() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            source_value_interval: Interval::new(uv(0.0), uv(0.5)),
            ignore_out_of_range_source_values: true,
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(0.7), &target);
        // Then
        assert_eq!(
            result,
            ModeControlResult::Dropped(DropReason::SourceValueOutOfRange)
        );
        assert_eq!(mode.previous_target_value, None);
    }

    #[test]
    fn rotation_wraps_instead_of_clamping() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            source_value_interval: Interval::new(uv(0.0), uv(0.5)),
            rotate: true,
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(0.51), &target);
        // Then
        // Slightly above the source maximum lands near the target minimum.
        let v = result.hit_value().unwrap().get();
        assert!(v < 0.1, "expected wrap near target minimum, got {v}");
    }

    #[test]
    fn degenerate_source_interval_yields_constant() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            source_value_interval: Interval::new(uv(0.4), uv(0.4)),
            target_value_interval: Interval::new(uv(0.3), uv(0.9)),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(0.4), &target);
        // Then
        assert_abs_diff_eq!(result.hit_value().unwrap().get(), 0.3);
    }

    #[test]
    fn degenerate_target_interval_yields_single_bound() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            target_value_interval: Interval::new(uv(0.6), uv(0.6)),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(0.123), &target);
        // Then
        assert_abs_diff_eq!(result.hit_value().unwrap().get(), 0.6);
    }

    #[test]
    fn step_suppression_keeps_previous_value() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            scale_mode: true,
            step_size_interval: Interval::new(uv(0.1), uv(1.0)),
            previous_target_value: Some(uv(0.5)),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(0.52), &target);
        // Then
        assert_eq!(result, ModeControlResult::Dropped(DropReason::StepTooSmall));
        assert_eq!(mode.previous_target_value, Some(uv(0.5)));
    }

    #[test]
    fn step_capping_limits_large_deltas() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            scale_mode: true,
            step_size_interval: Interval::new(uv(0.05), uv(0.1)),
            previous_target_value: Some(uv(0.2)),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let up = mode.control(abs(0.9), &target);
        // Then
        assert_abs_diff_eq!(up.hit_value().unwrap().get(), 0.3);
    }

    #[test]
    fn discrete_target_steps_on_atomic_grid() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            previous_target_value: Some(uv(0.5)),
            ..Default::default()
        };
        let target = TestTarget {
            current_value: uv(0.5),
            control_type: ControlType::AbsoluteDiscrete {
                atomic_step_size: uv(0.25),
            },
        };
        // When
        let result = mode.control(abs(0.8), &target);
        // Then
        // Delta 0.3 snaps to one atomic step of 0.25.
        assert_abs_diff_eq!(result.hit_value().unwrap().get(), 0.75);
    }

    #[test]
    fn jump_clamp_limits_distance_from_previous_value() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            jump_interval: Interval::new(uv(0.0), uv(0.1)),
            previous_target_value: Some(uv(0.2)),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let up = mode.control(abs(0.9), &target);
        let down = mode.control(abs(0.0), &target);
        // Then
        assert_abs_diff_eq!(up.hit_value().unwrap().get(), 0.3);
        assert_abs_diff_eq!(down.hit_value().unwrap().get(), 0.2);
    }

    #[test]
    fn sub_threshold_jump_is_suppressed() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            jump_interval: Interval::new(uv(0.1), uv(1.0)),
            previous_target_value: Some(uv(0.5)),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(0.55), &target);
        // Then
        assert_eq!(result, ModeControlResult::LeaveTargetUntouched(uv(0.5)));
        assert_eq!(mode.previous_target_value, Some(uv(0.5)));
    }

    #[test]
    fn rounding_snaps_to_target_grid() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            round_target_value: true,
            ..Default::default()
        };
        let target = TestTarget {
            current_value: UnitValue::MIN,
            control_type: ControlType::AbsoluteContinuousRoundable {
                rounding_step_size: uv(0.25),
            },
        };
        // When
        let result = mode.control(abs(0.6), &target);
        // Then
        assert_abs_diff_eq!(result.hit_value().unwrap().get(), 0.5);
    }

    #[test]
    fn identical_input_is_idempotent_after_reset() {
        // Given
        let mut mode: Mode<TestTransformation> = Default::default();
        let target = continuous_target();
        // When
        let first = mode.control(abs(0.4), &target);
        mode.reset();
        let second = mode.control(abs(0.4), &target);
        // Then
        assert_eq!(first, second);
    }

    #[test]
    fn repeated_input_leaves_target_untouched() {
        // Given
        let mut mode: Mode<TestTransformation> = Default::default();
        let target = continuous_target();
        // When
        let first = mode.control(abs(0.4), &target);
        let second = mode.control(abs(0.4), &target);
        // Then
        assert_eq!(first, ModeControlResult::HitTarget(uv(0.4)));
        assert_eq!(second, ModeControlResult::LeaveTargetUntouched(uv(0.4)));
    }

    #[test]
    fn control_transformation_replaces_pipeline() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            // Would reverse and clamp hard if the pipeline ran.
            reverse: true,
            target_value_interval: Interval::new(uv(0.0), uv(0.1)),
            control_transformation: Some(TestTransformation(|x| Ok(x * 0.5))),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(0.8), &target);
        // Then
        assert_abs_diff_eq!(result.hit_value().unwrap().get(), 0.4);
    }

    #[test]
    fn failing_transformation_drops_event() {
        // Given
        let mut mode: Mode<TestTransformation> = Mode {
            control_transformation: Some(TestTransformation(|_| Err("division by zero"))),
            ..Default::default()
        };
        let target = continuous_target();
        // When
        let result = mode.control(abs(0.8), &target);
        // Then
        assert_eq!(
            result,
            ModeControlResult::Dropped(DropReason::TransformationFailed)
        );
    }

    #[test]
    fn feedback_inverts_range_mapping() {
        // Given
        let mode: Mode<TestTransformation> = Mode {
            source_value_interval: Interval::new(uv(0.2), uv(0.8)),
            target_value_interval: Interval::new(uv(0.0), uv(0.5)),
            ..Default::default()
        };
        // When
        let result = mode.feedback(uv(0.25)).unwrap();
        // Then
        assert_abs_diff_eq!(result.get(), 0.5);
    }

    #[test]
    fn feedback_transformation_overrides_inverse_mapping() {
        // Given
        let mode: Mode<TestTransformation> = Mode {
            feedback_transformation: Some(TestTransformation(|y| Ok(1.0 - y))),
            ..Default::default()
        };
        // When
        let result = mode.feedback(uv(0.3)).unwrap();
        // Then
        assert_abs_diff_eq!(result.get(), 0.7);
    }
}
