//! Image decoding seam.
//!
//! Decoding is delegated to an [`ImageDecoder`] supplied by the caller. The
//! decoder is not required to be re-entrant: the client owns it behind a single
//! mutex and every decode in the process of that client goes through it.

use bytes::Bytes;

/// How a decoded image is fitted into the requested bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleType {
    /// Keep aspect ratio, fit inside the bounds
    #[default]
    FitCenter,
    /// Keep aspect ratio, cover the bounds
    CenterCrop,
    /// Stretch to the bounds
    FitXy,
    /// No scaling
    Center,
}

/// Pixel layout requested from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8 bits per channel RGBA
    #[default]
    Rgba8888,
    /// 16-bit RGB
    Rgb565,
    /// Single alpha channel
    Alpha8,
}

/// Decode parameters carried by an image request.
///
/// A bound of 0 means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    /// Maximum width in pixels
    pub max_width: u32,
    /// Maximum height in pixels
    pub max_height: u32,
    /// Requested pixel format
    pub format: PixelFormat,
    /// Scaling strategy
    pub scale_type: ScaleType,
}

/// A decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout of `pixels`
    pub format: PixelFormat,
    /// Pixel data
    pub pixels: Bytes,
}

/// Turns encoded image bytes into an [`Image`].
///
/// Implementations only need to be `Send`; calls are serialized by the client.
pub trait ImageDecoder: Send + 'static {
    /// Decode `bytes` within the limits of `options`.
    fn decode(&mut self, bytes: &[u8], options: &DecodeOptions) -> Result<Image, String>;
}

impl<F> ImageDecoder for F
where
    F: FnMut(&[u8], &DecodeOptions) -> Result<Image, String> + Send + 'static,
{
    fn decode(&mut self, bytes: &[u8], options: &DecodeOptions) -> Result<Image, String> {
        self(bytes, options)
    }
}
