use image::imageops::FilterType;
use tch::Tensor;

// Normalization statistics of the pretrained backbone's training data.
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, thiserror::Error)]
#[error("could not decode image: {0}")]
pub struct DecodeError(#[from] image::ImageError);

/// Decodes raw image bytes into the model input: a `[1, 3, size, size]`
/// float tensor, RGB, normalized with ImageNet statistics.
pub fn image_to_tensor(bytes: &[u8], size: u32) -> Result<Tensor, DecodeError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    let plane = (size * size) as usize;
    let mut chw = vec![0f32; 3 * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let base = (y * size + x) as usize;
        for channel in 0..3 {
            chw[channel * plane + base] = pixel[channel] as f32 / 255.0;
        }
    }

    let side = size as i64;
    let tensor = Tensor::from_slice(&chw).view([1, 3, side, side]);
    let mean = Tensor::from_slice(&IMAGENET_MEAN).view([1, 3, 1, 1]);
    let std = Tensor::from_slice(&IMAGENET_STD).view([1, 3, 1, 1]);
    Ok((tensor - mean) / std)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 10]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn produces_expected_tensor_shape() {
        let tensor = image_to_tensor(&png_bytes(100, 40), 64).unwrap();
        assert_eq!(tensor.size(), vec![1, 3, 64, 64]);
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = image_to_tensor(b"definitely not an image", 64);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_truncated_image() {
        let mut bytes = png_bytes(32, 32);
        bytes.truncate(bytes.len() / 2);
        assert!(image_to_tensor(&bytes, 64).is_err());
    }
}
