//! Duration normalization
//!
//! Rescales sibling durations so they add up to a target. Pure and deterministic.

use serde::Serialize;
use tracing::debug;

use super::step::{Step, total_minutes};

/// Default relative drift tolerated before rescaling
pub const DEFAULT_TOLERANCE: f64 = 0.15;

/// Outcome of a normalization pass
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Normalized {
    pub steps: Vec<Step>,
    pub was_normalized: bool,
    pub original_sum: u32,
    pub final_sum: u32,
}

/// Rescale `steps` toward `target` minutes
///
/// Steps come back unchanged when their sum is zero, the target is zero, or the
/// relative drift is within `tolerance`. Otherwise each duration is multiplied
/// by `target / sum`, rounded, and floored at 1. Rounding error is not
/// redistributed, so the final sum may miss the target by up to one minute per step.
pub fn normalize(steps: Vec<Step>, target: u32, tolerance: f64) -> Normalized {
    let original_sum = total_minutes(&steps);
    debug!(original_sum, target, tolerance, count = steps.len(), "normalize: called");

    if original_sum == 0 || target == 0 {
        debug!("normalize: zero sum or target, unchanged");
        return unchanged(steps, original_sum);
    }

    let drift = (original_sum as f64 - target as f64).abs() / target as f64;
    if drift <= tolerance {
        debug!(drift, "normalize: within tolerance");
        return unchanged(steps, original_sum);
    }

    let ratio = target as f64 / original_sum as f64;
    let steps: Vec<Step> = steps
        .into_iter()
        .map(|mut s| {
            let scaled = (s.estimated_minutes as f64 * ratio).round() as u32;
            s.set_minutes(scaled.max(1));
            s
        })
        .collect();

    let final_sum = total_minutes(&steps);
    debug!(ratio, final_sum, "normalize: rescaled");
    Normalized {
        steps,
        was_normalized: true,
        original_sum,
        final_sum,
    }
}

fn unchanged(steps: Vec<Step>, sum: u32) -> Normalized {
    Normalized {
        steps,
        was_normalized: false,
        original_sum: sum,
        final_sum: sum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::step::StepType;
    use proptest::prelude::*;

    fn steps(minutes: &[u32]) -> Vec<Step> {
        minutes
            .iter()
            .enumerate()
            .map(|(i, m)| Step::new(format!("s{}", i), i as u32 + 1, *m, StepType::Mental, 0))
            .collect()
    }

    #[test]
    fn test_scales_up_by_five() {
        let out = normalize(steps(&[2, 4, 6]), 60, DEFAULT_TOLERANCE);
        assert!(out.was_normalized);
        assert_eq!(out.original_sum, 12);
        assert_eq!(
            out.steps.iter().map(|s| s.estimated_minutes).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert_eq!(out.final_sum, 60);
        assert!(!out.steps[0].is_composite);
        assert!(out.steps[1].is_composite);
    }

    #[test]
    fn test_within_tolerance_unchanged() {
        let input = steps(&[20, 20, 10]);
        let out = normalize(input.clone(), 45, DEFAULT_TOLERANCE);
        assert!(!out.was_normalized);
        assert_eq!(out.steps, input);
        assert_eq!(out.final_sum, 50);
    }

    #[test]
    fn test_zero_sum_and_zero_target() {
        assert!(!normalize(Vec::new(), 30, DEFAULT_TOLERANCE).was_normalized);
        assert!(!normalize(steps(&[5, 5]), 0, DEFAULT_TOLERANCE).was_normalized);
    }

    #[test]
    fn test_floor_at_one() {
        let out = normalize(steps(&[1, 1, 100]), 10, DEFAULT_TOLERANCE);
        assert!(out.steps.iter().all(|s| s.estimated_minutes >= 1));
    }

    #[test]
    fn test_floor_can_leave_small_target_out_of_tolerance() {
        // Six 1-minute floors already overshoot a 3 minute target
        let once = normalize(steps(&[100, 100, 100, 100, 100, 100]), 3, DEFAULT_TOLERANCE);
        assert!(once.was_normalized);
        assert_eq!(once.final_sum, 6);
        let twice = normalize(once.steps.clone(), 3, DEFAULT_TOLERANCE);
        assert_eq!(twice.steps, once.steps);
    }

    #[test]
    fn test_composite_recomputed_on_shrink() {
        let out = normalize(steps(&[30, 30, 30]), 15, DEFAULT_TOLERANCE);
        assert!(out.steps.iter().all(|s| !s.is_composite));
    }

    proptest! {
        #[test]
        fn prop_sum_within_step_count(
            minutes in prop::collection::vec(1u32..500, 1..12),
            target in 1u32..2000,
        ) {
            let n = minutes.len() as i64;
            let out = normalize(steps(&minutes), target, DEFAULT_TOLERANCE);
            if out.was_normalized {
                // Floor-at-1 can push the sum up by at most one per step as well
                prop_assert!((out.final_sum as i64 - target as i64).abs() <= n);
            } else {
                let drift = (out.original_sum as f64 - target as f64).abs() / target as f64;
                prop_assert!(drift <= DEFAULT_TOLERANCE);
            }
        }

        // Below ~200 minutes the floor at 1 and per-step rounding can leave a
        // rescaled set outside the tolerance, so a second pass may rescale again.
        // Small targets are covered by the two properties that follow.
        #[test]
        fn prop_idempotent(
            minutes in prop::collection::vec(1u32..500, 1..7),
            target in 200u32..2000,
        ) {
            let once = normalize(steps(&minutes), target, DEFAULT_TOLERANCE);
            let twice = normalize(once.steps.clone(), target, DEFAULT_TOLERANCE);
            prop_assert!(!twice.was_normalized);
            prop_assert_eq!(twice.steps, once.steps);
        }

        #[test]
        fn prop_small_target_within_tolerance_is_noop(
            minutes in prop::collection::vec(1u32..30, 1..6),
            skew in -0.13f64..0.13,
        ) {
            let sum: u32 = minutes.iter().sum();
            let target = ((sum as f64 * (1.0 + skew)).round() as u32).max(1);
            let drift = (sum as f64 - target as f64).abs() / target as f64;
            prop_assume!(drift <= DEFAULT_TOLERANCE);

            let input = steps(&minutes);
            let out = normalize(input.clone(), target, DEFAULT_TOLERANCE);
            prop_assert!(!out.was_normalized);
            prop_assert_eq!(out.steps, input);
            prop_assert_eq!(out.final_sum, sum);
        }

        #[test]
        fn prop_small_target_second_pass_noop_when_first_lands(
            minutes in prop::collection::vec(1u32..500, 1..7),
            target in 1u32..200,
        ) {
            let once = normalize(steps(&minutes), target, DEFAULT_TOLERANCE);
            let drift = (once.final_sum as f64 - target as f64).abs() / target as f64;
            if drift <= DEFAULT_TOLERANCE {
                let twice = normalize(once.steps.clone(), target, DEFAULT_TOLERANCE);
                prop_assert!(!twice.was_normalized);
                prop_assert_eq!(twice.steps, once.steps);
            }
        }

        #[test]
        fn prop_composite_matches_minutes(
            minutes in prop::collection::vec(1u32..200, 1..8),
            target in 1u32..600,
        ) {
            let out = normalize(steps(&minutes), target, DEFAULT_TOLERANCE);
            for s in &out.steps {
                prop_assert_eq!(s.is_composite, s.estimated_minutes > 10);
            }
        }
    }
}
