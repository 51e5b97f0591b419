use candle_core::Device;
use tracing::warn;

#[cfg(any(feature = "metal", feature = "cuda"))]
use tracing::info;

#[cfg(not(any(feature = "metal", feature = "cuda")))]
use tracing::debug;

use super::error::EmbeddingError;

/// Picks the compute device for model backends. GPU when compiled in and present, else CPU.
pub fn select_device() -> Result<Device, EmbeddingError> {
    #[cfg(any(feature = "metal", feature = "cuda"))]
    let mut failures: Vec<String> = Vec::new();

    #[cfg(not(any(feature = "metal", feature = "cuda")))]
    let failures: Vec<String> = Vec::new();

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Model inference on Metal");
                return Ok(device);
            }
            Err(e) => {
                warn!(error = %e, "Metal device unavailable");
                failures.push(format!("metal: {e}"));
            }
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Model inference on CUDA");
                return Ok(device);
            }
            Err(e) => {
                warn!(error = %e, "CUDA device unavailable");
                failures.push(format!("cuda: {e}"));
            }
        }
    }

    #[cfg(not(any(feature = "metal", feature = "cuda")))]
    debug!("Built without GPU features");

    let reason = if failures.is_empty() {
        "no GPU backend compiled".to_string()
    } else {
        failures.join("; ")
    };
    warn!(reason = %reason, "Model inference on CPU");
    Ok(Device::Cpu)
}

/// Short label for logs and model info.
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
