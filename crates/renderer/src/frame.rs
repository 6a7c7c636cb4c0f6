//! Frame slots and the cursor over them.
//!
//! The renderer records each frame into one of a small, fixed set of slots.
//! Every slot owns its own synchronization objects and command buffer, so
//! the CPU can record frame N+1 while the GPU still works on frame N. The
//! cursor tracks which slot the CPU is currently recording into.

use std::sync::Arc;

use tracing::debug;

use vk2d_rhi::command::{CommandBuffer, CommandPool};
use vk2d_rhi::device::Device;
use vk2d_rhi::sync::FrameSync;
use vk2d_rhi::RhiResult;

/// Resources owned by one frame slot: the sync triplet plus a command
/// buffer that is reset and re-recorded every time the slot comes around.
pub struct FrameSlot {
    sync: FrameSync,
    command_buffer: CommandBuffer,
}

impl FrameSlot {
    /// Build `count` slots, allocating their command buffers from `pool`
    /// in a single batch. Each slot's fence starts signaled.
    pub fn create_all(
        device: &Arc<Device>,
        pool: &CommandPool,
        count: usize,
    ) -> RhiResult<Vec<Self>> {
        let command_buffers = pool.allocate_buffers(count as u32)?;

        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(FrameSlot {
                    sync: FrameSync::new(device.clone())?,
                    command_buffer,
                })
            })
            .collect::<RhiResult<Vec<_>>>()?;

        debug!("Created {} frame slot(s)", slots.len());
        Ok(slots)
    }

    #[inline]
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }
}

/// Tracks which frame slot the CPU is recording into.
///
/// Advancing wraps around to slot 0 after the last slot. The slot count is
/// fixed at construction and equals the number of frames that may be in
/// flight at once.
pub struct FrameCursor {
    /// Slot the next frame will be recorded into (0..slot_count).
    current_slot: usize,
    /// Number of frame slots.
    slot_count: usize,
    /// Total frames started since construction.
    frame_number: u64,
}

impl FrameCursor {
    /// Create a cursor over `slot_count` frame slots, starting at slot 0.
    pub fn new(slot_count: usize) -> Self {
        debug_assert!(slot_count >= 1);
        Self {
            current_slot: 0,
            slot_count,
            frame_number: 0,
        }
    }

    /// Get the slot the current frame uses.
    #[inline]
    pub fn slot(&self) -> usize {
        self.current_slot
    }

    /// Get the number of frames started so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Move to the next slot after a frame has been submitted.
    pub fn advance(&mut self) {
        self.current_slot = (self.current_slot + 1) % self.slot_count;
        self.frame_number += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_cycle_in_order() {
        let mut cursor = FrameCursor::new(2);

        let mut slots = Vec::new();
        for _ in 0..5 {
            slots.push(cursor.slot());
            cursor.advance();
        }

        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(cursor.frame_number(), 5);
    }

    #[test]
    fn test_single_slot_never_moves() {
        let mut cursor = FrameCursor::new(1);

        for _ in 0..4 {
            assert_eq!(cursor.slot(), 0);
            cursor.advance();
        }
        assert_eq!(cursor.frame_number(), 4);
    }

    #[test]
    fn test_slot_reuse_bounds_frames_in_flight() {
        // Reusing a slot means waiting on the fence of the frame submitted
        // there previously. Model that wait and check that no more than
        // slot_count frames are ever outstanding at once.
        for slot_count in 1..=3 {
            let mut cursor = FrameCursor::new(slot_count);
            let mut submitted_in_slot: Vec<Option<u64>> = vec![None; slot_count];

            for frame in 0..20u64 {
                assert_eq!(cursor.frame_number(), frame);

                if let Some(previous) = submitted_in_slot[cursor.slot()] {
                    let outstanding = frame - previous;
                    assert!(
                        outstanding as usize <= slot_count,
                        "slot_count={}: frame {} reused a slot while {} frames were outstanding",
                        slot_count,
                        frame,
                        outstanding
                    );
                }

                submitted_in_slot[cursor.slot()] = Some(frame);
                cursor.advance();
            }
        }
    }
}
