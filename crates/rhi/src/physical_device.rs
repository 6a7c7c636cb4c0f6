//! GPU selection.
//!
//! Every GPU that offers a graphics family, a present family (when a
//! surface is given), and Vulkan 1.3 is scored; the best-scoring one wins.
//! Discrete GPUs dominate the score so an integrated chip is only picked
//! when nothing better exists.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// The two queue families the frontend needs. Usually the same family on
/// desktop hardware.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Deduplicated family list, for building queue create infos without
    /// requesting the same family twice.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = [self.graphics_family, self.present_family]
            .into_iter()
            .flatten()
            .collect();
        families.dedup();
        families
    }
}

/// A selected GPU plus everything device creation and memory allocation
/// need to know about it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("unknown")
        }
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let v = self.properties.api_version;
        (
            vk::api_version_major(v),
            vk::api_version_minor(v),
            vk::api_version_patch(v),
        )
    }
}

/// Pick the best GPU that can render and present to `surface`.
///
/// # Errors
///
/// [`RhiError::NoSuitableGpu`] when no device qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: Option<&ash::khr::surface::Instance>,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    debug!("Enumerated {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| qualify(instance, device, surface, surface_loader))
        .max_by_key(score);

    match best {
        Some(info) => {
            let (major, minor, patch) = info.api_version();
            info!(
                "Selected GPU '{}' (Vulkan {}.{}.{}, score {})",
                info.device_name(),
                major,
                minor,
                patch,
                score(&info)
            );
            Ok(info)
        }
        None => {
            warn!("No GPU offers the required queue families and Vulkan 1.3");
            Err(RhiError::NoSuitableGpu)
        }
    }
}

/// Pick a GPU with no presentation target, for transfer-only work.
///
/// The present family is aliased to the graphics family so device creation
/// takes the same path as the windowed case.
pub fn select_physical_device_headless(
    instance: &ash::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let mut info = select_physical_device(instance, vk::SurfaceKHR::null(), None)?;
    info.queue_families.present_family = info.queue_families.graphics_family;
    Ok(info)
}

fn qualify(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: Option<&ash::khr::surface::Instance>,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };

    // Dynamic rendering needs 1.3.
    if vk::api_version_major(properties.api_version) == 1
        && vk::api_version_minor(properties.api_version) < 3
    {
        return None;
    }

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    let usable = match surface_loader {
        Some(_) => queue_families.is_complete(),
        None => queue_families.graphics_family.is_some(),
    };
    if !usable {
        return None;
    }

    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

/// Locate graphics and present families.
///
/// Graphics capability is a superset test: the family's flags must
/// *contain* `GRAPHICS`. An any-bit test would also admit transfer-only
/// and compute-only families.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: Option<&ash::khr::surface::Instance>,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();
    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() {
            if let Some(loader) = surface_loader {
                let supported = unsafe {
                    loader
                        .get_physical_device_surface_support(device, i, surface)
                        .unwrap_or(false)
                };
                if supported {
                    indices.present_family = Some(i);
                }
            }
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

fn score(info: &PhysicalDeviceInfo) -> u32 {
    let type_score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };
    type_score + info.properties.limits.max_image_dimension2_d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completeness_needs_both_families() {
        let mut indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());

        indices.graphics_family = Some(0);
        assert!(!indices.is_complete());

        indices.present_family = Some(2);
        assert!(indices.is_complete());
    }

    #[test]
    fn test_unique_families_collapses_shared_family() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert_eq!(split.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_unique_families_skips_missing_entries() {
        let graphics_only = QueueFamilyIndices {
            graphics_family: Some(3),
            present_family: None,
        };
        assert_eq!(graphics_only.unique_families(), vec![3]);
    }
}
