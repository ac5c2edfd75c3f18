//! 2D textures
//!
//! Decoding is delegated to the `image` crate; this module only turns decoded
//! pixels into GPU textures.

use std::path::Path;

use image::RgbaImage;

use crate::render::device::{GraphicsDevice, TextureFilter, TextureFormat, TextureId};
use crate::render::RenderError;

/// GPU texture plus its dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl Texture {
    /// Upload tightly packed pixels
    pub fn from_pixels(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixels: &[u8],
        filter: TextureFilter,
    ) -> Result<Self, RenderError> {
        let id = device.create_texture_2d(width, height, format, Some(pixels), filter)?;
        Ok(Self { id, width, height, format })
    }

    /// Upload a decoded RGBA image
    pub fn from_image(
        device: &mut dyn GraphicsDevice,
        image: &RgbaImage,
        filter: TextureFilter,
    ) -> Result<Self, RenderError> {
        let (width, height) = image.dimensions();
        Self::from_pixels(device, width, height, TextureFormat::Rgba8, image.as_raw(), filter)
    }

    /// Decode an image file and upload it
    pub fn load<P: AsRef<Path>>(
        device: &mut dyn GraphicsDevice,
        path: P,
        filter: TextureFilter,
    ) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| RenderError::ResourceCreationFailed(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        log::info!("Loaded texture {}x{} from {:?}", image.width(), image.height(), path);
        Self::from_image(device, &image, filter)
    }

    /// 1×1 texture of a single color
    pub fn solid(device: &mut dyn GraphicsDevice, color: [u8; 4]) -> Result<Self, RenderError> {
        Self::from_pixels(device, 1, 1, TextureFormat::Rgba8, &color, TextureFilter::Nearest)
    }

    /// GL texture name
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texel format
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Delete the GPU texture
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if !self.id.is_none() {
            device.delete_texture(self.id);
            self.id = TextureId::NONE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;

    #[test]
    fn test_from_image_keeps_dimensions() {
        let mut device = HeadlessDevice::new(64, 64);
        let image = RgbaImage::from_pixel(4, 2, image::Rgba([255, 0, 0, 255]));
        let texture = Texture::from_image(&mut device, &image, TextureFilter::Linear).expect("texture");
        assert_eq!((texture.width(), texture.height()), (4, 2));
        assert_eq!(device.texture_size(texture.id()), Some((4, 2, 1)));
    }

    #[test]
    fn test_release_frees_texture() {
        let mut device = HeadlessDevice::new(64, 64);
        let mut texture = Texture::solid(&mut device, [255; 4]).expect("texture");
        texture.release(&mut device);
        assert!(texture.id().is_none());
        assert_eq!(device.live_object_count(), 0);
    }
}
