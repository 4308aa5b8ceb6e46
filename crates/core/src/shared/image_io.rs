use std::io::Cursor;
use std::path::Path;

use crate::shared::frame::Frame;

fn to_rgb_image(frame: &Frame) -> Result<image::RgbImage, Box<dyn std::error::Error>> {
    if frame.channels() != 3 {
        return Err(format!("expected an RGB frame, got {} channels", frame.channels()).into());
    }
    image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| "Failed to create image from frame data".into())
}

/// Encodes an RGB frame as PNG bytes.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let img = to_rgb_image(frame)?;
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

/// Writes an RGB frame to `path`, creating parent directories.
pub fn write_png(path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let img = to_rgb_image(frame)?;
    img.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Frame::new(data, width, height, 3)
    }

    #[test]
    fn test_encode_png_has_signature() {
        let bytes = encode_png(&make_frame(4, 4, [1, 2, 3])).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_write_png_preserves_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("crop.png");
        write_png(&path, &make_frame(5, 3, [50, 100, 200])).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!((img.width(), img.height()), (5, 3));
        assert_eq!(img.get_pixel(4, 2).0, [50, 100, 200]);
    }

    #[test]
    fn test_encode_rejects_grayscale() {
        let frame = Frame::new(vec![0u8; 4], 2, 2, 1);
        assert!(encode_png(&frame).is_err());
    }
}
