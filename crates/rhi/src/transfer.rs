//! Staging transfers between host and device-local memory.
//!
//! Device-local buffers cannot be mapped, so data reaches them in two
//! stages: the bytes land in a host-visible staging buffer, then a one-shot
//! command buffer copies them on the graphics queue. These transfers run at
//! startup, before the frame loop, so completion is awaited with a full
//! device idle rather than per-transfer fences.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::RhiResult;

/// Uploads `data` into a new device-local buffer.
///
/// Creates a staging buffer, fills it, copies it into a fresh buffer of the
/// given role, and blocks until the copy has retired. The staging buffer and
/// the one-shot command buffer are released before returning.
///
/// # Errors
///
/// Returns an error if any buffer creation, recording, or submission step
/// fails.
pub fn upload_to_device(
    device: Arc<Device>,
    pool: &CommandPool,
    usage: BufferUsage,
    data: &[u8],
) -> RhiResult<Buffer> {
    let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, data)?;
    let dst = Buffer::new(device.clone(), usage, data.len() as vk::DeviceSize)?;

    copy_buffer(&device, pool, &staging, &dst, data.len() as vk::DeviceSize)?;

    debug!("Uploaded {} bytes to {} buffer", data.len(), usage.name());

    Ok(dst)
}

/// Copies a device-local buffer back into host memory.
///
/// The inverse of [`upload_to_device`], used to verify round trips. Copies
/// through a readback buffer and returns its contents.
///
/// # Errors
///
/// Returns an error if any buffer creation, recording, or submission step
/// fails.
pub fn download_from_device(
    device: Arc<Device>,
    pool: &CommandPool,
    src: &Buffer,
) -> RhiResult<Vec<u8>> {
    let readback = Buffer::new(device.clone(), BufferUsage::Readback, src.size())?;

    copy_buffer(&device, pool, src, &readback, src.size())?;

    readback.read_data(0, src.size() as usize)
}

/// Records and submits a one-shot buffer copy, then waits for it to retire.
fn copy_buffer(
    device: &Arc<Device>,
    pool: &CommandPool,
    src: &Buffer,
    dst: &Buffer,
    size: vk::DeviceSize,
) -> RhiResult<()> {
    let cmd = pool.allocate_one()?;

    let result = record_and_submit(device, &cmd, src, dst, size);

    // Return the one-shot buffer to the pool whether or not the copy worked.
    pool.free_buffers(&[cmd.handle()]);

    result
}

fn record_and_submit(
    device: &Arc<Device>,
    cmd: &CommandBuffer,
    src: &Buffer,
    dst: &Buffer,
    size: vk::DeviceSize,
) -> RhiResult<()> {
    cmd.begin()?;

    let regions = [vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    }];
    cmd.copy_buffer(src.handle(), dst.handle(), regions.as_slice());

    cmd.end()?;

    let command_buffers = [cmd.handle()];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    // No semaphores: nothing else is running this early, and the idle wait
    // below bounds the transfer.
    unsafe {
        device.submit_graphics(&[submit_info], vk::Fence::null())?;
    }

    device.wait_idle()
}
