use crate::types::Region;
use image::{GrayImage, RgbaImage};

/// Holds the screenshot data
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    /// Raw RGBA pixel data, row-major
    pub image_data: Vec<u8>,
    /// Width of the image
    pub width: u32,
    /// Height of the image
    pub height: u32,
    /// Screen coordinates of the top-left pixel. Non-zero after cropping.
    pub origin: (u32, u32),
}

impl ScreenshotResult {
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            image_data: image.into_raw(),
            width,
            height,
            origin: (0, 0),
        }
    }

    fn as_rgba(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.image_data.clone())
    }

    /// Cut out `region` (screen coordinates). Returns None if the region misses the capture.
    pub fn crop(&self, region: Region) -> Option<ScreenshotResult> {
        let local = Region::new(
            region.x.checked_sub(self.origin.0)?,
            region.y.checked_sub(self.origin.1)?,
            region.width,
            region.height,
        )
        .clamp_to(self.width, self.height)?;
        let rgba = self.as_rgba()?;
        let cropped =
            image::imageops::crop_imm(&rgba, local.x, local.y, local.width, local.height)
                .to_image();
        let mut result = ScreenshotResult::from_rgba(cropped);
        result.origin = (self.origin.0 + local.x, self.origin.1 + local.y);
        Some(result)
    }

    /// Luma conversion used by the template matcher.
    pub fn to_gray(&self) -> Option<GrayImage> {
        self.as_rgba()
            .map(|rgba| image::DynamicImage::ImageRgba8(rgba).to_luma8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_crop_keeps_screen_origin() {
        let mut img = RgbaImage::new(40, 30);
        img.put_pixel(25, 12, Rgba([255, 255, 255, 255]));
        let shot = ScreenshotResult::from_rgba(img);

        let cropped = shot.crop(Region::new(20, 10, 100, 100)).unwrap();
        assert_eq!(cropped.origin, (20, 10));
        assert_eq!((cropped.width, cropped.height), (20, 20));
        let gray = cropped.to_gray().unwrap();
        assert_eq!(gray.get_pixel(5, 2).0[0], 255);

        assert!(shot.crop(Region::new(50, 0, 10, 10)).is_none());
    }
}
