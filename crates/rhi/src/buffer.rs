//! GPU buffer management.
//!
//! Buffers pair a `vk::Buffer` with a dedicated `vk::DeviceMemory` block.
//! Memory is allocated directly from the device: the memory type is picked
//! with [`find_memory_type`](crate::memory::find_memory_type) against the
//! device's type table, one allocation per buffer, bound at offset zero.
//!
//! # Overview
//!
//! - [`BufferUsage`] defines the role of a buffer (staging, vertex, readback)
//! - [`Buffer`] wraps VkBuffer plus its backing memory
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vk2d_rhi::device::Device;
//! use vk2d_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vk2d_rhi::RhiError> {
//! let staging = Buffer::new(device, BufferUsage::Staging, 256)?;
//! staging.write_data(0, &[0u8; 256])?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::find_memory_type;

/// Buffer role.
///
/// Determines the Vulkan usage flags and the memory properties the backing
/// allocation must have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// CPU-writable source for uploads to device-local memory.
    Staging,
    /// Device-local vertex buffer, filled through a staging copy.
    Vertex,
    /// CPU-readable destination for downloads from device-local memory.
    Readback,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    /// Returns the memory properties the backing allocation must satisfy.
    ///
    /// Staging and readback memory is coherent, so mapped writes and reads
    /// need no explicit flush or invalidate.
    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Staging | BufferUsage::Readback => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
            BufferUsage::Vertex => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    /// Returns a human-readable name for the buffer role.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Staging => "staging",
            BufferUsage::Vertex => "vertex",
            BufferUsage::Readback => "readback",
        }
    }
}

/// GPU buffer with dedicated memory.
///
/// The allocation is sized from `vk::MemoryRequirements`, which may be larger
/// than the requested byte count due to alignment; `size` keeps the caller's
/// original request.
///
/// # Thread Safety
///
/// The buffer itself is not thread-safe. Synchronize access externally
/// when sharing between threads.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Backing device memory, bound at offset zero.
    memory: vk::DeviceMemory,
    /// Requested buffer size in bytes.
    size: vk::DeviceSize,
    /// Memory properties the backing allocation satisfies.
    properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Creates a new buffer for the given role, with dedicated memory.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoSuitableMemoryType`] if no memory type in the
    /// device's table is both compatible with the buffer and supports the
    /// properties the role requires. The partially created buffer handle is
    /// destroyed before returning.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::with_flags(device, usage.to_vk_usage(), usage.memory_properties(), size)
    }

    /// Creates a buffer from raw usage and memory property flags, for
    /// combinations the [`BufferUsage`] roles do not cover.
    ///
    /// Same failure behavior as [`Buffer::new`]: when no memory type
    /// satisfies `properties`, the buffer handle is destroyed and
    /// [`RhiError::NoSuitableMemoryType`] is returned.
    pub fn with_flags(
        device: Arc<Device>,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        size: vk::DeviceSize,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let memory_type_index = match find_memory_type(
            requirements.memory_type_bits,
            device.memory_types(),
            properties,
        ) {
            Some(index) => index,
            None => {
                // Don't leak the buffer handle on the failure path.
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(RhiError::NoSuitableMemoryType {
                    required: properties,
                });
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.handle().allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        if let Err(e) = unsafe { device.handle().bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.handle().free_memory(memory, None);
                device.handle().destroy_buffer(buffer, None);
            }
            return Err(e.into());
        }

        debug!(
            "Created buffer: {} bytes (allocated {}, memory type {}, {:?})",
            size, requirements.size, memory_type_index, properties
        );

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            properties,
        })
    }

    /// Creates a new buffer and initializes it with data.
    ///
    /// The buffer role must be host visible.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or the write fails.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// Maps the backing memory, copies, and unmaps. The memory is coherent,
    /// so no flush is needed before the next queue submission.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The backing memory is not host visible
    /// - The write would exceed the buffer size
    /// - Mapping fails
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        self.check_host_access(offset, data.len())?;

        unsafe {
            let mapped = self.device.handle().map_memory(
                self.memory,
                offset,
                data.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped as *mut u8, data.len());
            self.device.handle().unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Reads data from the buffer at the specified offset.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The backing memory is not host visible
    /// - The read would exceed the buffer size
    /// - Mapping fails
    pub fn read_data(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        self.check_host_access(offset, len)?;

        let mut data = vec![0u8; len];
        unsafe {
            let mapped = self.device.handle().map_memory(
                self.memory,
                offset,
                len as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(mapped as *const u8, data.as_mut_ptr(), len);
            self.device.handle().unmap_memory(self.memory);
        }

        Ok(data)
    }

    fn check_host_access(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<()> {
        if !self.is_host_visible() {
            return Err(RhiError::InvalidHandle(
                "Buffer memory is not host visible".to_string(),
            ));
        }

        // checked_add keeps a huge offset from wrapping past the size test.
        let end = offset.checked_add(len as vk::DeviceSize);
        if end.map_or(true, |end| end > self.size) {
            return Err(RhiError::InvalidHandle(format!(
                "Access exceeds buffer size: offset {} + len {} > buffer {}",
                offset, len, self.size
            )));
        }

        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the requested buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Whether the backing memory can be mapped by the host.
    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().free_memory(self.memory, None);
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed buffer ({} bytes)", self.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(BufferUsage::Staging
            .to_vk_usage()
            .contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(BufferUsage::Vertex
            .to_vk_usage()
            .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
        assert!(BufferUsage::Readback
            .to_vk_usage()
            .contains(vk::BufferUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn test_buffer_usage_memory_properties() {
        assert_eq!(
            BufferUsage::Staging.memory_properties(),
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        );
        assert_eq!(
            BufferUsage::Vertex.memory_properties(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert_eq!(
            BufferUsage::Readback.memory_properties(),
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        );
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Staging.name(), "staging");
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Readback.name(), "readback");
    }
}
