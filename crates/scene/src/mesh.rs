use foundation::math::{Mat4, Vec2, Vec3};

use crate::material::MaterialId;

/// One mesh cell's slice of the vertex buffers plus its material slot.
///
/// Cells are the smallest patchable unit: 3 vertices for fan cells on polar
/// boundary rows, 6 for quad cells. A streamed tile covers a rectangular
/// block of cells and overwrites each cell's slot and UVs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MeshGroup {
    pub first_vertex: usize,
    pub vertex_count: usize,
    pub material: MaterialId,
}

/// A pre-subdivided panorama mesh: flat position/UV buffers and one material
/// group per cell, in the row-major cell order the builder produced.
///
/// The container rotation covers panorama orientation correction; visibility
/// sampling applies it before frustum testing.
#[derive(Debug)]
pub struct GridMesh {
    positions: Vec<Vec3>,
    uvs: Vec<Vec2>,
    groups: Vec<MeshGroup>,
    rotation: Mat4,
    uv_dirty: bool,
}

impl GridMesh {
    pub fn new(positions: Vec<Vec3>, uvs: Vec<Vec2>, groups: Vec<MeshGroup>) -> Self {
        debug_assert_eq!(positions.len(), uvs.len());
        debug_assert!(
            groups
                .iter()
                .all(|g| g.first_vertex + g.vertex_count <= positions.len())
        );
        Self {
            positions,
            uvs,
            groups,
            rotation: Mat4::identity(),
            uv_dirty: false,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, index: usize) -> Vec3 {
        self.positions[index]
    }

    pub fn uv(&self, index: usize) -> Vec2 {
        self.uvs[index]
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group(&self, index: usize) -> &MeshGroup {
        &self.groups[index]
    }

    pub fn rotation(&self) -> Mat4 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Mat4) {
        self.rotation = rotation;
    }

    pub fn set_group_material(&mut self, index: usize, material: MaterialId) {
        self.groups[index].material = material;
    }

    /// Overwrites one cell's UVs starting at `first_vertex` and marks the UV
    /// attribute dirty for re-upload.
    pub fn write_cell_uvs(&mut self, first_vertex: usize, uvs: &[Vec2]) {
        self.uvs[first_vertex..first_vertex + uvs.len()].copy_from_slice(uvs);
        self.uv_dirty = true;
    }

    pub fn uv_dirty(&self) -> bool {
        self.uv_dirty
    }

    /// Reads and resets the dirty marker; the renderer calls this when it
    /// re-uploads the attribute.
    pub fn take_uv_dirty(&mut self) -> bool {
        std::mem::take(&mut self.uv_dirty)
    }
}
