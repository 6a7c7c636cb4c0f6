//! Integration tests that exercise buffers and transfers on a real device.
//!
//! These tests need a working Vulkan installation; they skip themselves when
//! the loader, a suitable GPU, or the required extensions are missing.

use std::sync::Arc;

use vk2d_rhi::buffer::{Buffer, BufferUsage};
use vk2d_rhi::command::CommandPool;
use vk2d_rhi::device::Device;
use vk2d_rhi::instance::Instance;
use vk2d_rhi::physical_device::select_physical_device_headless;
use vk2d_rhi::transfer::{download_from_device, upload_to_device};
use vk2d_rhi::{vk, RhiError};

struct Gpu {
    // Field order matters: device resources drop before the instance.
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

fn graphics_pool(gpu: &Gpu) -> CommandPool {
    let family = gpu
        .device
        .queue_families()
        .graphics_family
        .expect("headless selection always sets the graphics family");
    CommandPool::new(gpu.device.clone(), family).expect("command pool creation")
}

#[test]
fn staging_write_read_round_trip() {
    let Some(gpu) = setup() else { return };

    let data: Vec<u8> = (0..=255).collect();
    let staging = Buffer::new_with_data(gpu.device.clone(), BufferUsage::Staging, &data)
        .expect("staging buffer creation");

    let read = staging.read_data(0, data.len()).expect("read back");
    assert_eq!(read, data);
}

#[test]
fn upload_then_download_is_byte_identical() {
    let Some(gpu) = setup() else { return };
    let pool = graphics_pool(&gpu);

    let data: Vec<u8> = (0..1024u32).flat_map(|i| i.to_le_bytes()).collect();

    let vertex_buffer = upload_to_device(gpu.device.clone(), &pool, BufferUsage::Vertex, &data)
        .expect("upload to device-local memory");
    assert_eq!(vertex_buffer.size(), data.len() as u64);

    let downloaded =
        download_from_device(gpu.device.clone(), &pool, &vertex_buffer).expect("download");
    assert_eq!(downloaded, data);
}

#[test]
fn write_past_end_is_rejected() {
    let Some(gpu) = setup() else { return };

    let staging =
        Buffer::new(gpu.device.clone(), BufferUsage::Staging, 16).expect("staging buffer");

    assert!(staging.write_data(8, &[0u8; 16]).is_err());
    assert!(staging.write_data(0, &[0u8; 16]).is_ok());
}

#[test]
fn huge_offset_is_rejected_not_wrapped() {
    let Some(gpu) = setup() else { return };

    let staging =
        Buffer::new(gpu.device.clone(), BufferUsage::Staging, 16).expect("staging buffer");

    // An offset near the top of the range must fail the bounds check even
    // though offset + len wraps around zero.
    assert!(staging.write_data(vk::DeviceSize::MAX, &[0u8; 1]).is_err());
    assert!(staging
        .read_data(vk::DeviceSize::MAX - 4, 8)
        .is_err());
}

#[test]
fn device_local_buffer_rejects_host_access() {
    let Some(gpu) = setup() else { return };

    let vertex =
        Buffer::new(gpu.device.clone(), BufferUsage::Vertex, 64).expect("vertex buffer");

    assert!(vertex.write_data(0, &[0u8; 64]).is_err());
    assert!(vertex.read_data(0, 64).is_err());
}

#[test]
fn impossible_memory_properties_fail_cleanly() {
    let Some(gpu) = setup() else { return };

    // DEVICE_LOCAL + LAZILY_ALLOCATED + HOST_VISIBLE (and friends) can never
    // coexist in one memory type, so creation must fail with the memory-type
    // error rather than panic or leak the buffer handle.
    let impossible = vk::MemoryPropertyFlags::DEVICE_LOCAL
        | vk::MemoryPropertyFlags::HOST_VISIBLE
        | vk::MemoryPropertyFlags::HOST_COHERENT
        | vk::MemoryPropertyFlags::HOST_CACHED
        | vk::MemoryPropertyFlags::LAZILY_ALLOCATED
        | vk::MemoryPropertyFlags::PROTECTED;

    for _ in 0..64 {
        let result = Buffer::with_flags(
            gpu.device.clone(),
            vk::BufferUsageFlags::TRANSFER_SRC,
            impossible,
            128,
        );
        match result {
            Err(RhiError::NoSuitableMemoryType { required }) => {
                assert_eq!(required, impossible);
            }
            Ok(_) => panic!("impossible property combination was satisfied"),
            Err(e) => panic!("wrong error for impossible properties: {e:?}"),
        }
    }

    // The device is still healthy after the failed creations.
    let staging =
        Buffer::new(gpu.device.clone(), BufferUsage::Staging, 128).expect("staging buffer");
    staging.write_data(0, &[7u8; 128]).expect("write");
}

#[test]
fn command_buffer_reset_is_idempotent() {
    let Some(gpu) = setup() else { return };
    let pool = graphics_pool(&gpu);

    let cmd = pool.allocate_one().expect("command buffer");

    // Reset of a fresh buffer and a double reset are both no-ops.
    cmd.reset().expect("first reset");
    cmd.reset().expect("second reset");

    // The buffer is still recordable afterwards.
    cmd.begin().expect("begin");
    cmd.end().expect("end");
    cmd.reset().expect("reset after recording");
    cmd.begin().expect("begin after reset");
    cmd.end().expect("end after reset");

    pool.free_buffers(&[cmd.handle()]);
}

#[test]
fn batch_allocation_and_pool_reset() {
    let Some(gpu) = setup() else { return };
    let pool = graphics_pool(&gpu);

    let buffers = pool.allocate_buffers(3).expect("batch allocation");
    assert_eq!(buffers.len(), 3);

    // Record into every buffer, then return the whole pool to its initial
    // state in one call.
    for cmd in &buffers {
        cmd.begin().expect("begin");
        cmd.end().expect("end");
    }
    pool.reset_all().expect("pool reset");

    // Every buffer is recordable again without an individual reset.
    for cmd in &buffers {
        cmd.begin().expect("begin after pool reset");
        cmd.end().expect("end after pool reset");
    }

    let handles: Vec<vk::CommandBuffer> = buffers.iter().map(|cmd| cmd.handle()).collect();
    pool.free_buffers(&handles);
}
