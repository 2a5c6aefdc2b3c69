//! Conversion of desired order volumes into venue-valid volumes.

use crate::utils::decimal::{ceil_to_step, floor_to_step, round_to_step};
use crate::venue::VolumeConstraint;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::trace;

/// Decimal places kept after step rounding, at least.
const MIN_VOLUME_DP: u32 = 2;

/// The constraint cannot produce a valid volume.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("unusable volume constraint for {instrument}: {reason}")]
pub struct UnusableConstraint {
    pub instrument: String,
    pub reason: String,
}

/// Snaps volumes onto an instrument's `[min, max]` step grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeNormalizer;

impl VolumeNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Clamp `desired` into `[min, max]`, round to the nearest step multiple
    /// and round to two decimals (more if the step needs them).
    ///
    /// If rounding leaves the range, the nearest in-range multiple is used.
    pub fn normalize(
        &self,
        instrument: &str,
        desired: Decimal,
        constraint: &VolumeConstraint,
    ) -> Result<Decimal, UnusableConstraint> {
        let unusable = |reason: String| UnusableConstraint {
            instrument: instrument.to_string(),
            reason,
        };

        if let Some(defect) = constraint.defect() {
            return Err(unusable(defect));
        }

        let VolumeConstraint { min, max, step } = *constraint;
        let dp = MIN_VOLUME_DP.max(step.scale());

        let off_grid = || unusable(format!("volume step {} cannot be applied to [{}, {}]", step, min, max));

        let clamped = desired.clamp(min, max);
        let mut volume = round_to_step(clamped, step).ok_or_else(off_grid)?.round_dp(dp);

        if volume < min {
            volume = ceil_to_step(min, step).ok_or_else(off_grid)?.round_dp(dp);
        } else if volume > max {
            volume = floor_to_step(max, step).ok_or_else(off_grid)?.round_dp(dp);
        }

        if volume < min || volume > max || volume <= Decimal::ZERO {
            return Err(unusable(format!(
                "no positive multiple of {} within [{}, {}]",
                step, min, max
            )));
        }

        trace!(instrument, %desired, %volume, %step, "Volume normalized");
        Ok(volume.normalize())
    }
}
