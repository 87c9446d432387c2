//! Image tensor handling: layout detection, normalization and JPEG encoding
//!
//! Host runtimes hand images over as float tensors. Depending on the producing
//! node the data is channel-last (HWC) or channel-first (CHW), may carry a
//! leading batch dimension, and lives either in [0, 1] or in [-1, 1].

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use tracing::debug;

use crate::error::{CogVideoError, Result};

/// Default JPEG quality used for uploads
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Float image tensor as received from the host
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Channel ordering of a 3-D tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    ChannelsLast,
    ChannelsFirst,
}

/// 8-bit channel-last pixels ready for encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixels {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

/// JPEG bytes plus the dimensions the upload form needs
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageTensor {
    /// Build a tensor, checking that `data` fills `shape` exactly
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        if shape.len() < 2 || shape.len() > 4 {
            return Err(CogVideoError::InvalidInput(format!(
                "expected a 2-D, 3-D or 4-D image tensor, got shape {:?}",
                shape
            )));
        }

        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(CogVideoError::InvalidInput(format!(
                "tensor shape {:?} needs {} values but {} were given",
                shape,
                expected,
                data.len()
            )));
        }

        Ok(Self { shape, data })
    }

    /// Tensor from what a host array object reports: its `shape` as signed
    /// integers and its values flattened in row-major order
    pub fn from_host_array(shape: &[i64], values: Vec<f64>) -> Result<Self> {
        let dims = shape
            .iter()
            .map(|&dim| {
                usize::try_from(dim).map_err(|_| {
                    CogVideoError::InvalidInput(format!("negative dimension {} in shape {:?}", dim, shape))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(dims, values.into_iter().map(|v| v as f32).collect())
    }

    /// Channel-last tensor in [0, 1] from an 8-bit RGB image
    pub fn from_rgb_image(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let data = img.as_raw().iter().map(|&v| v as f32 / 255.0).collect();

        Self {
            shape: vec![height as usize, width as usize, 3],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Drop a leading batch dimension, keeping only the first image
    pub fn first_in_batch(&self) -> Result<ImageTensor> {
        if self.shape.len() != 4 {
            return Ok(self.clone());
        }

        let batch = self.shape[0];
        if batch == 0 {
            return Err(CogVideoError::InvalidInput("image batch is empty".to_string()));
        }

        let shape = self.shape[1..].to_vec();
        let len: usize = shape.iter().product();
        if batch > 1 {
            debug!("Batch of {} images, using the first", batch);
        }

        Ok(Self {
            data: self.data[..len].to_vec(),
            shape,
        })
    }

    /// Whether the data uses the [-1, 1] convention
    pub fn is_signed(&self) -> bool {
        self.data.iter().any(|&v| v < 0.0)
    }

    /// Layout of the (unbatched) tensor. A leading dimension of 3 or 4 means
    /// channel-first.
    pub fn layout(&self) -> Layout {
        match self.shape.as_slice() {
            [c, _, _] if *c == 3 || *c == 4 => Layout::ChannelsFirst,
            _ => Layout::ChannelsLast,
        }
    }

    /// Normalize to 8-bit channel-last pixels
    pub fn to_pixels(&self) -> Result<Pixels> {
        let tensor = self.first_in_batch()?;
        let signed = tensor.is_signed();

        let (height, width, channels, layout) = match *tensor.shape.as_slice() {
            [h, w] => (h, w, 1, Layout::ChannelsLast),
            [c, h, w] if tensor.layout() == Layout::ChannelsFirst => (h, w, c, Layout::ChannelsFirst),
            [h, w, c] => (h, w, c, Layout::ChannelsLast),
            _ => {
                return Err(CogVideoError::InvalidInput(format!(
                    "unsupported tensor shape {:?}",
                    tensor.shape
                )))
            }
        };

        if !matches!(channels, 1 | 3 | 4) {
            return Err(CogVideoError::InvalidInput(format!(
                "unsupported channel count {} in shape {:?}",
                channels, tensor.shape
            )));
        }
        if width == 0 || height == 0 {
            return Err(CogVideoError::InvalidInput(format!(
                "image has no pixels: shape {:?}",
                tensor.shape
            )));
        }

        let plane = width * height;
        let mut data = Vec::with_capacity(plane * channels);
        for pixel in 0..plane {
            for channel in 0..channels {
                let idx = match layout {
                    Layout::ChannelsLast => pixel * channels + channel,
                    Layout::ChannelsFirst => channel * plane + pixel,
                };
                data.push(normalize_value(tensor.data[idx], signed));
            }
        }

        Ok(Pixels {
            width: to_u32(width)?,
            height: to_u32(height)?,
            channels: channels as u8,
            data,
        })
    }

    /// Normalize and encode as RGB JPEG
    pub fn encode_jpeg(&self, quality: u8) -> Result<EncodedImage> {
        let pixels = self.to_pixels()?;
        let rgb = pixels.into_rgb()?;
        let (width, height) = rgb.dimensions();

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;

        debug!("Encoded {}x{} image as {} JPEG bytes", width, height, bytes.len());

        Ok(EncodedImage { bytes, width, height })
    }
}

impl Pixels {
    /// Expand or drop channels to plain RGB
    pub fn into_rgb(self) -> Result<RgbImage> {
        let (width, height) = (self.width, self.height);
        let invalid = || CogVideoError::InvalidInput("pixel buffer does not match its size".to_string());

        let image = match self.channels {
            1 => DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, self.data).ok_or_else(invalid)?),
            3 => return RgbImage::from_raw(width, height, self.data).ok_or_else(invalid),
            4 => DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, self.data).ok_or_else(invalid)?),
            other => {
                return Err(CogVideoError::InvalidInput(format!(
                    "unsupported channel count {}",
                    other
                )))
            }
        };

        Ok(image.to_rgb8())
    }
}

/// Map one float sample to a byte: shift [-1, 1] to [0, 1] when `signed`,
/// scale by 255, clamp and truncate.
pub fn normalize_value(value: f32, signed: bool) -> u8 {
    let unit = if signed { (value + 1.0) / 2.0 } else { value };
    let scaled = (unit * 255.0).clamp(0.0, 255.0);
    if scaled.is_nan() {
        0
    } else {
        scaled as u8
    }
}

/// Inverse of [`normalize_value`], up to quantization
pub fn denormalize_value(byte: u8, signed: bool) -> f32 {
    let unit = byte as f32 / 255.0;
    if signed {
        unit * 2.0 - 1.0
    } else {
        unit
    }
}

fn to_u32(dim: usize) -> Result<u32> {
    u32::try_from(dim).map_err(|_| CogVideoError::InvalidInput(format!("dimension {} is too large", dim)))
}
