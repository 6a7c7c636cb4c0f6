//! Vertex data structures and input descriptions.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// 2D vertex with a clip-space position.
///
/// # Memory Layout
///
/// `#[repr(C)]` keeps the layout predictable: 8 bytes, position at offset 0.
///
/// # Shader Locations
///
/// - location 0: position (vec2)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// 2D position in clip space.
    pub position: Vec2,
}

impl Vertex {
    /// Creates a new vertex.
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
        }
    }

    /// Get the vertex input binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 1] {
        [
            // Position at location 0
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        // Vertex: 1 x Vec2 = 8 bytes
        assert_eq!(std::mem::size_of::<Vertex>(), 8);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 8);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs.len(), 1);

        assert_eq!(attrs[0].binding, 0);
        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);
    }

    #[test]
    fn test_vertex_pod_cast() {
        let vertices = [Vertex::new(0.0, -0.5), Vertex::new(0.5, 0.5)];

        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 16);

        let back: &[Vertex] = bytemuck::cast_slice(bytes);
        assert_eq!(back, &vertices);
    }
}
