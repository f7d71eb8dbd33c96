//! Vertex data structures and input descriptions.
//!
//! This module defines the vertex format used by the mesh pipeline and
//! the indexing helper that deduplicates vertices during model loading.

use std::collections::HashMap;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex format for textured mesh rendering.
///
/// Each vertex contains:
/// - `position` (Vec3): 3D position in object space
/// - `color` (Vec3): RGB vertex color, multiplied with the sampled texture
/// - `tex_coord` (Vec2): Texture coordinates (UV)
///
/// # Memory Layout
///
/// The struct uses `#[repr(C)]` to ensure predictable memory layout:
/// - Offset 0: position (12 bytes)
/// - Offset 12: color (12 bytes)
/// - Offset 24: tex_coord (8 bytes)
/// - Total size: 32 bytes
///
/// # Shader Locations
///
/// - location 0: position (vec3)
/// - location 1: color (vec3)
/// - location 2: tex_coord (vec2)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    /// 3D position in object space.
    pub position: Vec3,
    /// RGB vertex color.
    pub color: Vec3,
    /// Texture coordinates (UV).
    pub tex_coord: Vec2,
}

impl Vertex {
    /// Creates a new vertex with the specified attributes.
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Get the vertex input binding description.
    ///
    /// Returns a binding description for binding 0 with per-vertex input rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            // Position at location 0
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            // Color at location 1
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            // TexCoord at location 2
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

/// Bit-pattern key for vertex deduplication.
///
/// Floats do not implement `Eq` or `Hash`, so identical vertices are
/// recognized by their exact bit pattern. `Vertex` is `Pod` with no
/// padding, which makes the cast to eight `u32` words lossless.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct VertexKey([u32; 8]);

impl From<Vertex> for VertexKey {
    fn from(vertex: Vertex) -> Self {
        Self(bytemuck::cast(vertex))
    }
}

/// Builds a deduplicated vertex buffer and index buffer.
///
/// Model faces reference the same corner vertices many times. This
/// collapses bit-identical vertices into a single entry and emits one
/// `u32` index per input vertex, preserving first-occurrence order.
pub fn index_vertices(vertices: impl IntoIterator<Item = Vertex>) -> (Vec<Vertex>, Vec<u32>) {
    let mut unique: HashMap<VertexKey, u32> = HashMap::new();
    let mut out_vertices = Vec::new();
    let mut indices = Vec::new();

    for vertex in vertices {
        let index = *unique.entry(VertexKey::from(vertex)).or_insert_with(|| {
            let index = out_vertices.len() as u32;
            out_vertices.push(vertex);
            index
        });
        indices.push(index);
    }

    (out_vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        // Vertex: Vec3 (12) + Vec3 (12) + Vec2 (8) = 32 bytes
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(Vertex::size(), 32);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs.len(), 3);

        // Position attribute (location 0)
        assert_eq!(attrs[0].binding, 0);
        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);

        // Color attribute (location 1)
        assert_eq!(attrs[1].binding, 0);
        assert_eq!(attrs[1].location, 1);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[1].offset, 12);

        // TexCoord attribute (location 2)
        assert_eq!(attrs[2].binding, 0);
        assert_eq!(attrs[2].location, 2);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[2].offset, 24);
    }

    #[test]
    fn test_vertex_new() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        let color = Vec3::new(0.5, 0.6, 0.7);
        let tex_coord = Vec2::new(0.25, 0.75);

        let vertex = Vertex::new(position, color, tex_coord);

        assert_eq!(vertex.position, position);
        assert_eq!(vertex.color, color);
        assert_eq!(vertex.tex_coord, tex_coord);
    }

    #[test]
    fn test_vertex_pod_zeroable() {
        let vertex = Vertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::ONE,
            Vec2::new(0.5, 0.5),
        );

        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 32);

        let vertex_back: &Vertex = bytemuck::from_bytes(bytes);
        assert_eq!(vertex_back.position, vertex.position);
        assert_eq!(vertex_back.color, vertex.color);
        assert_eq!(vertex_back.tex_coord, vertex.tex_coord);
    }

    #[test]
    fn test_vertex_offsets() {
        // Verify field offsets match what we specify in attribute descriptions
        use std::mem::offset_of;

        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, color), 12);
        assert_eq!(offset_of!(Vertex, tex_coord), 24);
    }

    #[test]
    fn test_index_vertices_deduplicates() {
        let a = Vertex::new(Vec3::ZERO, Vec3::ONE, Vec2::ZERO);
        let b = Vertex::new(Vec3::X, Vec3::ONE, Vec2::ZERO);
        let c = Vertex::new(Vec3::Y, Vec3::ONE, Vec2::ZERO);

        // Two triangles sharing the edge (a, b)
        let (vertices, indices) = index_vertices([a, b, c, a, c, b]);

        assert_eq!(vertices.len(), 3);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 1]);
    }

    #[test]
    fn test_index_vertices_preserves_first_occurrence_order() {
        let a = Vertex::new(Vec3::ZERO, Vec3::ONE, Vec2::ZERO);
        let b = Vertex::new(Vec3::X, Vec3::ONE, Vec2::ZERO);

        let (vertices, indices) = index_vertices([b, a, b]);

        assert_eq!(vertices[0].position, Vec3::X);
        assert_eq!(vertices[1].position, Vec3::ZERO);
        assert_eq!(indices, vec![0, 1, 0]);
    }

    #[test]
    fn test_index_vertices_empty_input() {
        let (vertices, indices) = index_vertices([]);
        assert!(vertices.is_empty());
        assert!(indices.is_empty());
    }

    #[test]
    fn test_index_vertices_distinguishes_tex_coords() {
        // Same position, different UV: must stay separate vertices
        let a = Vertex::new(Vec3::ZERO, Vec3::ONE, Vec2::ZERO);
        let b = Vertex::new(Vec3::ZERO, Vec3::ONE, Vec2::new(1.0, 0.0));

        let (vertices, indices) = index_vertices([a, b]);

        assert_eq!(vertices.len(), 2);
        assert_eq!(indices, vec![0, 1]);
    }
}
