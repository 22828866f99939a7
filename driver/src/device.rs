use std::fmt;

use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device};

/// Accelerators this build can see on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    pub cuda: bool,
    pub metal: bool,
}

impl HostCapabilities {
    /// Probe the host. Both flags are false unless the crate was built with
    /// the matching `cuda` / `metal` feature.
    pub fn detect() -> Self {
        Self {
            cuda: cuda_is_available(),
            metal: metal_is_available(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cuda,
    Metal,
    Cpu,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Metal => "metal",
            Self::Cpu => "cpu",
        }
    }

    /// Weight dtype used when loading onto this device.
    pub fn dtype(&self) -> DType {
        match self {
            Self::Cuda => DType::BF16,
            Self::Metal => DType::F16,
            Self::Cpu => DType::F32,
        }
    }

    pub fn open(&self) -> candle_core::Result<Device> {
        match self {
            Self::Cuda => Device::new_cuda(0),
            Self::Metal => Device::new_metal(0),
            Self::Cpu => Ok(Device::Cpu),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the execution target: CUDA first, then Metal, then the CPU.
pub fn select(caps: HostCapabilities, force_cpu: bool) -> DeviceKind {
    if force_cpu {
        DeviceKind::Cpu
    } else if caps.cuda {
        DeviceKind::Cuda
    } else if caps.metal {
        DeviceKind::Metal
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        tracing::info!("running on CPU, build with `--features metal` to run on the GPU");
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        tracing::info!("running on CPU, build with `--features cuda` to run on the GPU");

        DeviceKind::Cpu
    }
}
