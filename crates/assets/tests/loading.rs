//! Integration tests for mesh and texture loading from in-memory data.

use std::io::Cursor;

use ember_assets::{AssetError, MeshData, TextureData};

const CUBE_FACE_OBJ: &str = "\
# one textured cube face, given as a quad
v -0.5 -0.5 0.0
v  0.5 -0.5 0.0
v  0.5  0.5 0.0
v -0.5  0.5 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3 4/4
";

#[test]
fn test_obj_quad_is_triangulated() {
    let mesh = MeshData::from_obj_buf(&mut Cursor::new(CUBE_FACE_OBJ)).unwrap();

    // One quad becomes two triangles
    assert_eq!(mesh.triangle_count(), 2);
    assert_eq!(mesh.corner_count(), 6);
    assert_eq!(mesh.positions.len(), mesh.tex_coords.len());
}

#[test]
fn test_obj_tex_coords_are_v_flipped() {
    let mesh = MeshData::from_obj_buf(&mut Cursor::new(CUBE_FACE_OBJ)).unwrap();

    // Every corner's V is mirrored around 0.5
    for (corner, tex_coord) in mesh.tex_coords.iter().enumerate() {
        assert!(
            (0.0..=1.0).contains(&tex_coord[1]),
            "corner {} V out of range: {}",
            corner,
            tex_coord[1]
        );
    }

    // The corner at vt (0, 0) samples the top of the image
    assert_eq!(mesh.tex_coords[0], [0.0, 1.0]);
}

#[test]
fn test_obj_multiple_shapes_are_merged() {
    let obj = "\
o first
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
f 1 2 3
o second
v 2.0 0.0 0.0
v 3.0 0.0 0.0
v 2.0 1.0 0.0
f 4 5 6
";
    let mesh = MeshData::from_obj_buf(&mut Cursor::new(obj)).unwrap();

    assert_eq!(mesh.triangle_count(), 2);
    assert_eq!(mesh.positions[0], [0.0, 0.0, 0.0]);
    assert_eq!(mesh.positions[3], [2.0, 0.0, 0.0]);
}

#[test]
fn test_obj_parse_error() {
    let result = MeshData::from_obj_buf(&mut Cursor::new("f 1/banana 2 3\n"));
    assert!(matches!(result, Err(AssetError::ObjParse(_))));
}

#[test]
fn test_png_decodes_to_rgba8() {
    let source = image::RgbaImage::from_fn(2, 2, |x, y| {
        image::Rgba([(x * 255) as u8, (y * 255) as u8, 0, 255])
    });

    let mut png_bytes = Vec::new();
    source
        .write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)
        .unwrap();

    let texture = TextureData::from_encoded_bytes(&png_bytes).unwrap();

    assert_eq!(texture.width(), 2);
    assert_eq!(texture.height(), 2);
    assert_eq!(texture.pixels().len(), 2 * 2 * 4);

    // Top-left texel survives the round trip
    assert_eq!(&texture.pixels()[0..4], &[0, 0, 0, 255]);
    // Top-right texel has full red
    assert_eq!(&texture.pixels()[4..8], &[255, 0, 0, 255]);
}

#[test]
fn test_grayscale_png_expands_to_rgba8() {
    let source = image::GrayImage::from_pixel(3, 1, image::Luma([128]));

    let mut png_bytes = Vec::new();
    source
        .write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)
        .unwrap();

    let texture = TextureData::from_encoded_bytes(&png_bytes).unwrap();

    assert_eq!(texture.width(), 3);
    assert_eq!(texture.height(), 1);
    assert_eq!(texture.pixels().len(), 3 * 4);
    assert_eq!(&texture.pixels()[0..4], &[128, 128, 128, 255]);
}

#[test]
fn test_garbage_bytes_are_rejected() {
    let result = TextureData::from_encoded_bytes(&[0xde, 0xad, 0xbe, 0xef]);
    assert!(matches!(result, Err(AssetError::Image(_))));
}
