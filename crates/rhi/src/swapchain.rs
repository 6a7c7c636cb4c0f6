//! Swapchain creation, acquisition, and presentation.
//!
//! Built once for a fixed-size surface and never rebuilt: acquire and
//! present pass their `vk::Result` straight to the caller, which treats
//! out-of-date as fatal and merely logs suboptimal.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiError;
use crate::instance::Instance;

/// What the surface can do, as reported by the physical device.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// A surface with no formats or no present modes cannot host a
    /// swapchain at all.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The swapchain plus one image view per swapchain image.
///
/// The images belong to the driver; only the views are created and
/// destroyed here. Not thread-safe.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Build a swapchain for the given surface at roughly `width`x`height`
    /// (the surface's own extent wins when it reports one).
    ///
    /// Picks B8G8R8A8_SRGB when offered, MAILBOX with a FIFO fallback, and
    /// min+1 images clamped to the surface maximum.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<Self, RhiError> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Surface reports no formats or no present modes".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        let queue_families = device.queue_families();
        let graphics_family = queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let present_family = queue_families
            .present_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let family_indices = [graphics_family, present_family];

        // CONCURRENT only when the families actually differ; EXCLUSIVE
        // avoids the sharing cost on the common single-family path.
        let (sharing_mode, shared_families) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        let image_views = create_image_views(&device, &images, surface_format.format)?;

        info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} images ({:?} sharing)",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            images.len(),
            sharing_mode
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    /// Acquire the next image, signaling `semaphore` when it is usable.
    ///
    /// Returns `(image_index, suboptimal)`; out-of-date arrives as
    /// `Err(vk::Result::ERROR_OUT_OF_DATE_KHR)`.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queue `image_index` for presentation after `wait_semaphore` signals.
    /// `Ok(true)` flags a suboptimal swapchain.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Panics when `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Panics when `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
        debug!("Swapchain destroyed");
    }
}

/// B8G8R8A8_SRGB + SRGB_NONLINEAR first, then the UNORM twin, then
/// whatever the surface lists first.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    for wanted in [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM] {
        if let Some(&format) = formats.iter().find(|f| {
            f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        }) {
            return format;
        }
    }
    warn!("No BGRA format offered; taking {:?}", formats[0].format);
    formats[0]
}

/// MAILBOX when offered, else FIFO. FIFO is the one mode every driver
/// must support.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent when fixed; otherwise the requested size
/// clamped into the surface's min/max range. A current width of `u32::MAX`
/// means the surface leaves the size to us.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// min+1 so acquisition rarely blocks on the driver, capped by the
/// surface maximum (0 meaning uncapped).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    images
        .iter()
        .enumerate()
        .map(|(i, &image)| {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );

            unsafe {
                device
                    .handle()
                    .create_image_view(&create_info, None)
                    .map_err(|e| {
                        RhiError::SwapchainError(format!("Image view {} failed: {:?}", i, e))
                    })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(f: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: f,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_format_choice_walks_preference_order() {
        let all = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&all).format,
            vk::Format::B8G8R8A8_SRGB
        );

        let no_srgb = &all[..2];
        assert_eq!(
            choose_surface_format(no_srgb).format,
            vk::Format::B8G8R8A8_UNORM
        );

        let neither = &all[..1];
        assert_eq!(
            choose_surface_format(neither).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_present_mode_mailbox_over_fifo() {
        let with_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&with_mailbox),
            vk::PresentModeKHR::MAILBOX
        );

        let without = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&without), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_extent_fixed_surface_wins() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 640, 480);
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_extent_clamped_when_surface_defers() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 200,
                height: 200,
            },
            max_image_extent: vk::Extent2D {
                width: 1600,
                height: 1600,
            },
            ..Default::default()
        };

        let too_big = choose_extent(&capabilities, 5000, 5000);
        assert_eq!((too_big.width, too_big.height), (1600, 1600));

        let too_small = choose_extent(&capabilities, 10, 10);
        assert_eq!((too_small.width, too_small.height), (200, 200));

        let in_range = choose_extent(&capabilities, 1024, 720);
        assert_eq!((in_range.width, in_range.height), (1024, 720));
    }

    #[test]
    fn test_image_count_min_plus_one_capped() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 3);

        let uncapped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&uncapped), 3);
    }

    #[test]
    fn test_adequacy_needs_formats_and_modes() {
        let mut support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![format(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(support.is_adequate());

        support.formats.clear();
        assert!(!support.is_adequate());

        support.formats = vec![format(vk::Format::B8G8R8A8_SRGB)];
        support.present_modes.clear();
        assert!(!support.is_adequate());
    }
}
