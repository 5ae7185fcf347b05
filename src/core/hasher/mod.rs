//! # Perceptual Hasher
//!
//! Reduces one page image to a 64-bit fingerprint.
//!
//! ## Algorithm
//! 1. Decode the bytes into an RGBA raster (JPEG or PNG)
//! 2. Resize to 8x8 with bilinear interpolation
//! 3. Convert each pixel to 8-bit luminance with the JFIF coefficients
//! 4. Threshold every pixel against the truncated mean
//! 5. Pack bits row-major, MSB first: bit 63 is pixel (0,0), bit 0 is (7,7)
//!
//! The bit order is load-bearing: the manifest stores these exact bits as a
//! 16-hex-digit integer and the matcher compares them by Hamming distance.

use crate::error::HashError;
use image::imageops::{self, FilterType};
use image::{GenericImageView, Rgba, RgbaImage};

/// Side length of the thresholded raster.
pub const HASH_SIZE: u32 = 8;

/// Fingerprint of one decoded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFingerprint {
    /// 64-bit luminance-threshold hash.
    pub phash: u64,
    /// Width of the decoded raster, before downscaling.
    pub width: u32,
    /// Height of the decoded raster, before downscaling.
    pub height: u32,
}

/// Turns raw image bytes into a [`PageFingerprint`].
#[derive(Debug, Default)]
pub struct PerceptualHasher;

impl PerceptualHasher {
    pub fn new() -> Self {
        Self
    }

    /// Fingerprint one page.
    ///
    /// Fails with [`HashError::Decode`] when the bytes are not a
    /// recognised image and [`HashError::EmptyImage`] when the decoded
    /// raster has no pixels.
    pub fn hash_bytes(&self, data: &[u8]) -> Result<PageFingerprint, HashError> {
        let decoded = image::load_from_memory(data).map_err(|e| HashError::Decode {
            reason: e.to_string(),
        })?;

        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(HashError::EmptyImage { width, height });
        }

        let small = imageops::resize(
            &decoded.to_rgba8(),
            HASH_SIZE,
            HASH_SIZE,
            FilterType::Triangle,
        );

        Ok(PageFingerprint {
            phash: threshold_hash(&small),
            width,
            height,
        })
    }
}

/// Hamming distance between two fingerprints.
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Mean-threshold an 8x8 raster into the packed 64-bit hash.
fn threshold_hash(small: &RgbaImage) -> u64 {
    let mut total: u32 = 0;
    for pixel in small.pixels() {
        total += u32::from(luminance(pixel));
    }
    // Truncated integer mean over the 64 samples.
    let mean = total / (HASH_SIZE * HASH_SIZE);

    let mut bits: u64 = 0;
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            let lum = u32::from(luminance(small.get_pixel(x, y)));
            bits = (bits << 1) | u64::from(lum > mean);
        }
    }
    bits
}

/// 8-bit luminance from the JFIF YCbCr coefficients.
///
/// The channels are widened to 16 bits first; the `>> 24` folds the
/// 16-to-8-bit step back in, matching the stored manifest hashes bit for
/// bit.
fn luminance(pixel: &Rgba<u8>) -> u8 {
    let r = u32::from(pixel[0]) * 257;
    let g = u32::from(pixel[1]) * 257;
    let b = u32::from(pixel[2]) * 257;

    ((19595 * r + 38470 * g + 7471 * b + (1 << 15)) >> 24) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    /// Encode an 8x8 RGBA raster as in-memory PNG bytes.
    fn png_bytes(pixel_at: impl Fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_fn(8, 8, |x, y| Rgba(pixel_at(x, y)));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn constant_image_hashes_to_zero() {
        let bytes = png_bytes(|_, _| [128, 128, 128, 255]);
        let hasher = PerceptualHasher::new();

        let fp = hasher.hash_bytes(&bytes).unwrap();

        assert_eq!(fp.phash, 0x0000_0000_0000_0000);
        assert_eq!((fp.width, fp.height), (8, 8));
    }

    #[test]
    fn left_right_split_packs_rows_msb_first() {
        // Left 4 columns black, right 4 white: each row packs as 0000 1111.
        let bytes = png_bytes(|x, _| {
            if x < 4 {
                [0, 0, 0, 255]
            } else {
                [255, 255, 255, 255]
            }
        });
        let hasher = PerceptualHasher::new();

        let fp = hasher.hash_bytes(&bytes).unwrap();

        assert_eq!(fp.phash, 0x0F0F_0F0F_0F0F_0F0F);
    }

    #[test]
    fn pixel_checkerboard_alternates_bits() {
        // White on even columns in every row: 1010 1010 per row.
        let bytes = png_bytes(|x, _| {
            if x % 2 == 0 {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            }
        });
        let hasher = PerceptualHasher::new();

        let fp = hasher.hash_bytes(&bytes).unwrap();

        assert_eq!(fp.phash, 0xAAAA_AAAA_AAAA_AAAA);
    }

    #[test]
    fn hashing_is_deterministic() {
        let bytes = png_bytes(|x, y| [(x * 31) as u8, (y * 17) as u8, 90, 255]);
        let hasher = PerceptualHasher::new();

        let first = hasher.hash_bytes(&bytes).unwrap();
        let second = hasher.hash_bytes(&bytes).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let hasher = PerceptualHasher::new();
        let result = hasher.hash_bytes(b"this is not an image");
        assert!(matches!(result, Err(HashError::Decode { .. })));
    }

    #[test]
    fn reported_dimensions_are_pre_resize() {
        let img = RgbaImage::from_fn(40, 60, |_, _| Rgba([10, 200, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let hasher = PerceptualHasher::new();

        let fp = hasher.hash_bytes(&bytes).unwrap();

        assert_eq!((fp.width, fp.height), (40, 60));
    }

    #[test]
    fn hamming_counts_differing_bits() {
        assert_eq!(hamming(0, 0), 0);
        assert_eq!(hamming(u64::MAX, 0), 64);
        assert_eq!(hamming(0b1011, 0b0010), 2);
        // popcount of xor, for arbitrary values
        let (x, y) = (0x0123_4567_89AB_CDEF_u64, 0xFEDC_BA98_7654_3210_u64);
        assert_eq!(hamming(x, y), (x ^ y).count_ones());
    }
}
