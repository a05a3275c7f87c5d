//! Progressive accumulation bookkeeping.
//!
//! The kernel keeps a running average in the output image weighted by
//! `1 / step`. Anything that changes what a pixel converges to must restart
//! that average: the image is zeroed and `step` goes back to 1.

use std::fmt;

/// Storage the samples are accumulated into.
pub trait AccumulationTarget {
    /// Zero every pixel before the next dispatch.
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    Startup,
    SceneRegenerated,
    CameraMoved,
    ParametersEdited,
    KernelReloaded,
    Resized,
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ResetReason::Startup => "startup",
            ResetReason::SceneRegenerated => "scene regenerated",
            ResetReason::CameraMoved => "camera moved",
            ResetReason::ParametersEdited => "parameters edited",
            ResetReason::KernelReloaded => "kernel reloaded",
            ResetReason::Resized => "resized",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulationController {
    step: u32,
    resets_this_frame: u32,
}

impl Default for AccumulationController {
    fn default() -> Self {
        Self {
            step: 1,
            resets_this_frame: 0,
        }
    }
}

impl AccumulationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step the next dispatch renders with.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Whether a reset happened since the last `tick`.
    pub fn was_reset(&self) -> bool {
        self.resets_this_frame > 0
    }

    pub fn reset<T: AccumulationTarget + ?Sized>(&mut self, target: &mut T, reason: ResetReason) {
        target.clear();
        self.step = 1;
        self.resets_this_frame += 1;
        tracing::debug!(%reason, "accumulation reset");
    }

    /// Forget resets made outside a frame, e.g. the startup clear.
    pub(crate) fn begin_frame(&mut self) {
        self.resets_this_frame = 0;
    }

    /// Close the frame. Must run after every reset of the frame and after its
    /// dispatch, so a reset frame is always rendered with `step == 1`.
    pub fn tick(&mut self) {
        self.step = self.step.saturating_add(1);
        self.resets_this_frame = 0;
    }
}
