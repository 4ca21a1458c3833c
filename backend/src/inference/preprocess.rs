use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Resizes to `size`x`size` (bilinear) and lays the RGB pixels out as a
/// `[1, 3, size, size]` array scaled to `[0, 1]`. No mean/std normalisation.
pub fn to_input_array(image: &DynamicImage, size: u32) -> Array4<f32> {
    let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    let side = size as usize;
    let mut input = Array4::<f32>::zeros((1, 3, side, side));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for channel in 0..3 {
            input[[0, channel, y as usize, x as usize]] = f32::from(pixel[channel]) / 255.0;
        }
    }

    input
}
