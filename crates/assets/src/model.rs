//! Mesh loading from Wavefront OBJ files.
//!
//! OBJ faces reference positions and texture coordinates through separate
//! index lists, so the loader expands every face corner into its own
//! (position, texcoord) pair. Deduplication into GPU vertex/index buffers
//! happens later, once the corners are turned into typed vertices.

use std::io::BufRead;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{AssetError, AssetResult};

/// Triangle mesh data in face-corner order.
///
/// Each face corner carries its own position and texture coordinate.
/// Three consecutive corners form one triangle.
#[derive(Debug, Default, Clone)]
pub struct MeshData {
    /// One position per face corner, in draw order.
    pub positions: Vec<[f32; 3]>,
    /// One texture coordinate per face corner, V flipped for top-down sampling.
    pub tex_coords: Vec<[f32; 2]>,
}

impl MeshData {
    /// Loads a mesh from an OBJ file.
    ///
    /// All shapes in the file are merged into a single mesh. Faces are
    /// triangulated during import; points and lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_obj(path: &Path) -> AssetResult<Self> {
        debug!("Loading OBJ model from {:?}", path);

        let (models, _materials) =
            tobj::load_obj(path, &load_options()).map_err(|e| AssetError::ObjLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mesh = Self::from_models(&models);

        info!(
            "Loaded OBJ model {:?}: {} shapes, {} triangles",
            path,
            models.len(),
            mesh.triangle_count()
        );

        Ok(mesh)
    }

    /// Parses a mesh from an in-memory OBJ document.
    ///
    /// Material libraries referenced by the document are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed.
    pub fn from_obj_buf(reader: &mut impl BufRead) -> AssetResult<Self> {
        let (models, _materials) =
            tobj::load_obj_buf(reader, &load_options(), |_| {
                Err(tobj::LoadError::GenericFailure)
            })
            .map_err(|e| AssetError::ObjParse(e.to_string()))?;

        Ok(Self::from_models(&models))
    }

    /// Expands all shapes into a single face-corner stream.
    fn from_models(models: &[tobj::Model]) -> Self {
        let corner_count: usize = models.iter().map(|m| m.mesh.indices.len()).sum();

        let mut positions = Vec::with_capacity(corner_count);
        let mut tex_coords = Vec::with_capacity(corner_count);

        for model in models {
            let mesh = &model.mesh;
            let has_tex_coords =
                !mesh.texcoords.is_empty() && mesh.texcoord_indices.len() == mesh.indices.len();

            if !has_tex_coords && !mesh.indices.is_empty() {
                warn!(
                    "Shape '{}' has no texture coordinates, defaulting to (0, 0)",
                    model.name
                );
            }

            for (corner, &position_index) in mesh.indices.iter().enumerate() {
                let pi = position_index as usize * 3;
                positions.push([
                    mesh.positions[pi],
                    mesh.positions[pi + 1],
                    mesh.positions[pi + 2],
                ]);

                if has_tex_coords {
                    let ti = mesh.texcoord_indices[corner] as usize * 2;
                    // OBJ puts the V origin at the bottom of the image
                    tex_coords.push([mesh.texcoords[ti], 1.0 - mesh.texcoords[ti + 1]]);
                } else {
                    tex_coords.push([0.0, 0.0]);
                }
            }
        }

        Self {
            positions,
            tex_coords,
        }
    }

    /// Returns the number of face corners.
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Returns `true` if the mesh has no geometry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const QUAD_OBJ: &str = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 1.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3
f 1/1 3/3 4/4
";

    #[test]
    fn test_from_obj_buf_expands_face_corners() {
        let mesh = MeshData::from_obj_buf(&mut Cursor::new(QUAD_OBJ)).unwrap();

        assert_eq!(mesh.corner_count(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.tex_coords.len(), 6);

        // Corners 0 and 3 both reference vertex 1
        assert_eq!(mesh.positions[0], [0.0, 0.0, 0.0]);
        assert_eq!(mesh.positions[3], [0.0, 0.0, 0.0]);
        assert_eq!(mesh.positions[1], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_from_obj_buf_flips_v() {
        let mesh = MeshData::from_obj_buf(&mut Cursor::new(QUAD_OBJ)).unwrap();

        // vt (0, 0) becomes (0, 1); vt (1, 1) becomes (1, 0)
        assert_eq!(mesh.tex_coords[0], [0.0, 1.0]);
        assert_eq!(mesh.tex_coords[2], [1.0, 0.0]);
    }

    #[test]
    fn test_from_obj_buf_defaults_missing_tex_coords() {
        let obj = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
f 1 2 3
";
        let mesh = MeshData::from_obj_buf(&mut Cursor::new(obj)).unwrap();

        assert_eq!(mesh.corner_count(), 3);
        assert_eq!(mesh.tex_coords, vec![[0.0, 0.0]; 3]);
    }

    #[test]
    fn test_load_obj_missing_file() {
        let result = MeshData::load_obj(Path::new("does/not/exist.obj"));
        assert!(matches!(result, Err(AssetError::ObjLoad { .. })));
    }
}
