pub mod cpu;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, Region, TransformState};
use crate::error::Result;
use crate::transform::{apply_transform, apply_transform_region, Resample};

pub use cpu::CpuBackend;

/// Which device the transform engine should try first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use the GPU when one can be initialized, else the CPU.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu => write!(f, "gpu"),
        }
    }
}

/// A device able to warp a channel by a [`TransformState`].
pub trait TransformBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_gpu(&self) -> bool {
        false
    }

    /// Produce only the output pixels inside `region`.
    fn try_transform_region(
        &self,
        channel: &Channel,
        state: &TransformState,
        region: Region,
        resample: Resample,
    ) -> Result<Channel>;

    fn try_transform(
        &self,
        channel: &Channel,
        state: &TransformState,
        resample: Resample,
    ) -> Result<Channel> {
        let (w, h) = channel.size();
        self.try_transform_region(channel, state, Region::full(w, h), resample)
    }
}

/// Build the backend for `preference`, falling back to the CPU when no GPU is usable.
pub fn create_backend(preference: DevicePreference) -> Arc<dyn TransformBackend> {
    match preference {
        DevicePreference::Cpu => Arc::new(CpuBackend),
        DevicePreference::Auto | DevicePreference::Gpu => {
            probe_gpu().unwrap_or_else(|| Arc::new(CpuBackend))
        }
    }
}

#[cfg(feature = "gpu")]
fn probe_gpu() -> Option<Arc<dyn TransformBackend>> {
    match wgpu_backend::WgpuBackend::new() {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            tracing::info!("GPU unavailable, using CPU: {e}");
            None
        }
    }
}

#[cfg(not(feature = "gpu"))]
fn probe_gpu() -> Option<Arc<dyn TransformBackend>> {
    tracing::debug!("Built without GPU support");
    None
}

/// Transform on `backend`, silently redoing the work on the CPU if it fails.
pub fn transform_with_fallback(
    backend: &dyn TransformBackend,
    channel: &Channel,
    state: &TransformState,
    resample: Resample,
) -> Channel {
    if state.is_identity() {
        return channel.clone();
    }
    match backend.try_transform(channel, state, resample) {
        Ok(out) => out,
        Err(e) => {
            tracing::debug!(
                backend = backend.name(),
                "Accelerated transform failed, using CPU: {e}"
            );
            apply_transform(channel, state, resample)
        }
    }
}

/// Region variant of [`transform_with_fallback`]. Only an invalid region is an error.
pub fn transform_region_with_fallback(
    backend: &dyn TransformBackend,
    channel: &Channel,
    state: &TransformState,
    region: Region,
    resample: Resample,
) -> Result<Channel> {
    if state.is_identity() {
        return apply_transform_region(channel, state, region, resample);
    }
    match backend.try_transform_region(channel, state, region, resample) {
        Ok(out) => Ok(out),
        Err(e) => {
            tracing::debug!(
                backend = backend.name(),
                "Accelerated region transform failed, using CPU: {e}"
            );
            apply_transform_region(channel, state, region, resample)
        }
    }
}
