//! Frame slot construction against a real device.
//!
//! Needs a working Vulkan installation; each test skips itself when the
//! loader or a suitable GPU is missing.

use std::sync::Arc;

use vk2d_renderer::FrameSlot;
use vk2d_rhi::command::CommandPool;
use vk2d_rhi::device::Device;
use vk2d_rhi::instance::Instance;
use vk2d_rhi::physical_device::select_physical_device_headless;

struct Gpu {
    device: Arc<Device>,
    _instance: Instance,
}

fn setup() -> Option<Gpu> {
    let instance = match Instance::new(false, &[]) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("Skipping test: Vulkan not available ({e})");
            return None;
        }
    };

    let info = match select_physical_device_headless(instance.handle()) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("Skipping test: no suitable GPU ({e})");
            return None;
        }
    };

    let device = match Device::new(&instance, &info) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("Skipping test: device creation failed ({e})");
            return None;
        }
    };

    Some(Gpu {
        device,
        _instance: instance,
    })
}

#[test]
fn slot_count_is_chosen_at_runtime() {
    let Some(gpu) = setup() else { return };

    let family = gpu
        .device
        .queue_families()
        .graphics_family
        .expect("headless selection always sets the graphics family");
    let pool = CommandPool::new(gpu.device.clone(), family).expect("command pool");

    for count in 1..=3usize {
        let slots = FrameSlot::create_all(&gpu.device, &pool, count).expect("frame slots");
        assert_eq!(slots.len(), count);

        for slot in &slots {
            // A fresh slot's fence is signaled so its first wait falls
            // through, and its command buffer is immediately recordable.
            assert!(slot.sync().fence().is_signaled());
            slot.command_buffer().begin().expect("begin");
            slot.command_buffer().end().expect("end");
        }
    }
}
