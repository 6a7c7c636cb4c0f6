//! Fences and semaphores for the frame protocol.
//!
//! The fence is the only completion signal the host ever observes; it is
//! what bounds how many frames can be in flight. The two semaphores order
//! queue work against acquisition and presentation entirely on the GPU
//! timeline. [`FrameSync`] bundles the triplet one frame slot owns.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Default number of frames the CPU may record ahead of the GPU.
///
/// Callers can pick a different count per renderer; this is the value used
/// when there is no reason to deviate.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Owned binary semaphore, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Owned fence, optionally created signaled.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence. `signaled` starts it in the signaled state, for
    /// fences that are waited on before anything has been submitted
    /// against them.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Block until the fence signals, up to `timeout` nanoseconds
    /// (`u64::MAX` waits forever). Expiry surfaces as `vk::Result::TIMEOUT`.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?;
        }
        Ok(())
    }

    /// Return the fence to the unsignaled state. Must not be called while
    /// a submission still references it.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Non-blocking signaled check.
    pub fn is_signaled(&self) -> bool {
        matches!(
            unsafe { self.device.handle().get_fence_status(self.fence) },
            Ok(true)
        )
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// The synchronization triplet for one frame slot.
///
/// Per frame: wait the fence, reset it, acquire an image signaling
/// `image_available`, submit waiting on `image_available` and signaling
/// `render_finished` plus the fence, then present waiting on
/// `render_finished`.
pub struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    /// Create the triplet for one slot. The fence starts signaled so the
    /// slot's first wait falls through.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        debug!("Created frame slot synchronization objects");

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Semaphore signaled when the acquired image is ready to be written.
    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    /// Semaphore signaled when the slot's rendering completes.
    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    /// Fence signaled when the slot's submission retires.
    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flight_count_is_small() {
        // One slot disables overlap entirely; large counts only add latency.
        assert!((1..=4).contains(&DEFAULT_FRAMES_IN_FLIGHT));
    }

    #[test]
    fn test_sync_objects_cross_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
