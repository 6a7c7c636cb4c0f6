//! Memory type selection.
//!
//! Vulkan exposes the memory types a device offers as a flat table. Every
//! buffer reports which entries of that table it can live in via a bitmask,
//! and the caller layers its own requirements (host visible, device local)
//! on top. Selecting a type is a pure lookup over those two inputs, so it
//! lives here as a free function that touches no Vulkan handles.

use ash::vk;

/// Finds the first memory type that satisfies an allocation request.
///
/// `compatible_bits` is the `memory_type_bits` mask from
/// `vk::MemoryRequirements`: bit `i` set means type index `i` is compatible
/// with the resource. `required` is the set of property flags the caller
/// needs; a type qualifies only when its flags contain *all* of them.
///
/// Returns the lowest qualifying index, or `None` when no type qualifies.
/// There is no fallback to weaker properties: a partial match (for example
/// host visible but not coherent when both were requested) is a miss.
pub fn find_memory_type(
    compatible_bits: u32,
    types: &[vk::MemoryType],
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    types.iter().enumerate().find_map(|(index, memory_type)| {
        let compatible = compatible_bits & (1 << index) != 0;
        let supported = memory_type.property_flags.contains(required);
        (compatible && supported).then_some(index as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_type(flags: vk::MemoryPropertyFlags) -> vk::MemoryType {
        vk::MemoryType {
            property_flags: flags,
            heap_index: 0,
        }
    }

    #[test]
    fn test_picks_first_qualifying_index() {
        let types = [
            memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            memory_type(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
            memory_type(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
        ];

        let found = find_memory_type(
            0b111,
            &types,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(found, Some(1));
    }

    #[test]
    fn test_requires_all_flags_not_any() {
        // Host visible alone must not satisfy a visible+coherent request.
        let types = [memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE)];

        let found = find_memory_type(
            0b1,
            &types,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_extra_flags_on_type_are_fine() {
        let types = [memory_type(
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        )];

        let found = find_memory_type(0b1, &types, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert_eq!(found, Some(0));
    }

    #[test]
    fn test_respects_compatibility_mask() {
        let types = [
            memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL),
        ];

        // Index 0 has the right flags but the resource cannot live there.
        let found = find_memory_type(0b10, &types, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert_eq!(found, Some(1));
    }

    #[test]
    fn test_no_match_returns_none() {
        let types = [
            memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE),
        ];

        let found = find_memory_type(0b11, &types, vk::MemoryPropertyFlags::PROTECTED);
        assert_eq!(found, None);
    }

    #[test]
    fn test_empty_required_matches_first_compatible() {
        let types = [
            memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE),
        ];

        let found = find_memory_type(0b10, &types, vk::MemoryPropertyFlags::empty());
        assert_eq!(found, Some(1));
    }
}
