use crate::api::ComputeApi;
use crate::error::{RenderError, RenderResult};

/// Platform and GPU device picked for the session.
pub struct SelectedDevice<A: ComputeApi> {
    pub platform: A::Platform,
    pub device: A::Device,
}

/// Picks the platform and GPU device at fixed indices.
///
/// There is no search or fallback: an index past the end of either
/// enumeration is [`RenderError::DeviceUnavailable`].
pub fn select_device<A: ComputeApi>(
    api: &mut A,
    platform_index: usize,
    device_index: usize,
) -> RenderResult<SelectedDevice<A>> {
    let unavailable = |reason: String| RenderError::DeviceUnavailable {
        platform: platform_index,
        device: device_index,
        reason,
    };

    let platforms = api
        .platforms()
        .map_err(|err| unavailable(format!("platform enumeration failed: {err}")))?;
    let platform = platforms.get(platform_index).cloned().ok_or_else(|| {
        unavailable(format!(
            "platform index out of range ({} platform(s) found)",
            platforms.len()
        ))
    })?;

    let devices = api
        .gpu_devices(&platform)
        .map_err(|err| unavailable(format!("device enumeration failed: {err}")))?;
    let device = devices.get(device_index).cloned().ok_or_else(|| {
        unavailable(format!(
            "GPU device index out of range ({} GPU device(s) on {platform:?})",
            devices.len()
        ))
    })?;

    tracing::info!(?platform, ?device, "selected compute device");
    Ok(SelectedDevice { platform, device })
}
