use crate::channel::{Channel, Region, TransformState};
use crate::error::Result;
use crate::transform::{apply_transform_region, Resample};

use super::TransformBackend;

/// Rayon-parallel software warp. Always available.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl TransformBackend for CpuBackend {
    fn name(&self) -> &str {
        "CPU"
    }

    fn try_transform_region(
        &self,
        channel: &Channel,
        state: &TransformState,
        region: Region,
        resample: Resample,
    ) -> Result<Channel> {
        apply_transform_region(channel, state, region, resample)
    }
}
