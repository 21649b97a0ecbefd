use super::{GPUError, Result};
use ash::{extensions::khr, vk, Instance};
use std::ffi::CStr;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceType {
    #[default]
    Dedicated,
    Integrated,
    Other,
}

impl From<vk::PhysicalDeviceType> for DeviceType {
    fn from(value: vk::PhysicalDeviceType) -> Self {
        match value {
            vk::PhysicalDeviceType::DISCRETE_GPU => DeviceType::Dedicated,
            vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceType::Integrated,
            _ => DeviceType::Other,
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub kind: DeviceType,
    pub driver_version: u32,
}

impl From<vk::PhysicalDeviceProperties> for DeviceInfo {
    fn from(value: vk::PhysicalDeviceProperties) -> Self {
        DeviceInfo {
            name: unsafe {
                CStr::from_ptr(value.device_name.as_ptr())
                    .to_str()
                    .unwrap_or("UNKNOWN")
                    .to_string()
            },
            kind: value.device_type.into(),
            driver_version: value.driver_version,
        }
    }
}

/// Physical device chosen for the context plus the queue families it will
/// submit and present on.
#[derive(Clone, Debug)]
pub struct SelectedDevice {
    pub(crate) pdevice: vk::PhysicalDevice,
    pub(crate) graphics_family: u32,
    pub(crate) present_family: u32,
    pub info: DeviceInfo,
}

impl std::fmt::Display for SelectedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[Name {} -- Driver Ver {} -- Graphics Family {} -- Present Family {}]",
            self.info.name, self.info.driver_version, self.graphics_family, self.present_family
        )
    }
}

/// Surface the selected device has to be able to present to.
pub(crate) struct PresentTarget<'a> {
    pub loader: &'a khr::Surface,
    pub surface: vk::SurfaceKHR,
}

pub(crate) fn has_swapchain_extension(enabled: &[vk::ExtensionProperties]) -> bool {
    enabled.iter().any(|ext| unsafe {
        CStr::from_ptr(ext.extension_name.as_ptr()) == khr::Swapchain::name()
    })
}

/// Lower is better. The preferred kind wins, then dedicated over integrated.
fn rank(kind: DeviceType, preferred: DeviceType) -> u32 {
    if kind == preferred {
        return 0;
    }
    match kind {
        DeviceType::Dedicated => 1,
        DeviceType::Integrated => 2,
        DeviceType::Other => 3,
    }
}

/// Picks the best physical device with a graphics queue. When `target` is
/// given, the device must also present to it and support swap chains.
pub(crate) fn select_device(
    instance: &Instance,
    target: Option<&PresentTarget>,
    preferred: DeviceType,
) -> Result<SelectedDevice> {
    let pdevices = unsafe { instance.enumerate_physical_devices()? };
    let mut best: Option<(u32, SelectedDevice)> = None;

    for pdevice in pdevices {
        let info: DeviceInfo = unsafe { instance.get_physical_device_properties(pdevice) }.into();
        let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };

        let graphics_family = match families
            .iter()
            .position(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        {
            Some(idx) => idx as u32,
            None => {
                log::debug!("skipping {}: no graphics queue", info.name);
                continue;
            }
        };

        let present_family = match target {
            Some(target) => {
                let extensions =
                    unsafe { instance.enumerate_device_extension_properties(pdevice)? };
                if !has_swapchain_extension(&extensions) {
                    log::debug!("skipping {}: no swap chain support", info.name);
                    continue;
                }

                let mut found = None;
                // Prefer presenting from the graphics family.
                let order = std::iter::once(graphics_family)
                    .chain((0..families.len() as u32).filter(|f| *f != graphics_family));
                for family in order {
                    let supported = unsafe {
                        target.loader.get_physical_device_surface_support(
                            pdevice,
                            family,
                            target.surface,
                        )?
                    };
                    if supported {
                        found = Some(family);
                        break;
                    }
                }

                match found {
                    Some(family) => family,
                    None => {
                        log::debug!("skipping {}: cannot present to the surface", info.name);
                        continue;
                    }
                }
            }
            None => graphics_family,
        };

        let score = rank(info.kind, preferred);
        let candidate = SelectedDevice {
            pdevice,
            graphics_family,
            present_family,
            info,
        };
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, device)| device).ok_or(GPUError::NoSuitableDevice)
}
