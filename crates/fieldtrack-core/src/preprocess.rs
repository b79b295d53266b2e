//! Frame normalization: scaled color, grayscale and HSV representations.

use serde::{Deserialize, Serialize};

use crate::image::{GrayImage, HsvImage, RgbImage, RgbImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Preprocessing options.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Uniform scale factor applied to the raw frame before any detection.
    pub scale: f32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

/// The three image representations consumed downstream.
#[derive(Clone, Debug)]
pub struct PreparedFrame {
    pub color: RgbImage,
    pub gray: GrayImage,
    pub hsv: HsvImage,
}

impl PreparedFrame {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.color.width == 0 || self.color.height == 0
    }
}

fn scaled_dim(dim: usize, scale: f32) -> usize {
    if dim == 0 {
        return 0;
    }
    ((dim as f32 * scale).round() as usize).max(1)
}

/// Normalize a raw frame into scaled color, grayscale and HSV images.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(raw, params), fields(width = raw.width, height = raw.height))
)]
pub fn preprocess_frame(raw: &RgbImageView<'_>, params: &PreprocessParams) -> PreparedFrame {
    let scale = if params.scale.is_finite() && params.scale > 0.0 {
        params.scale
    } else {
        1.0
    };
    let out_w = scaled_dim(raw.width, scale);
    let out_h = scaled_dim(raw.height, scale);

    let color = if out_w == raw.width && out_h == raw.height {
        RgbImage {
            width: raw.width,
            height: raw.height,
            data: raw.data.to_vec(),
        }
    } else {
        resize_area(raw, out_w, out_h)
    };
    let gray = rgb_to_gray(&color.view());
    let hsv = rgb_to_hsv(&color.view());

    PreparedFrame { color, gray, hsv }
}

/// Source footprint of every output index along one axis: `(src_index, weight)`
/// with weights summing to one.
fn area_weights(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f32)>> {
    let ratio = src_len as f32 / dst_len as f32;
    let mut out = Vec::with_capacity(dst_len);
    for d in 0..dst_len {
        if ratio <= 1.0 {
            // Enlarging: nearest source sample.
            let s = (((d as f32 + 0.5) * ratio) as usize).min(src_len - 1);
            out.push(vec![(s, 1.0)]);
            continue;
        }
        let start = d as f32 * ratio;
        let end = (start + ratio).min(src_len as f32);
        let mut taps = Vec::new();
        let mut s = start.floor() as usize;
        while (s as f32) < end && s < src_len {
            let lo = start.max(s as f32);
            let hi = end.min(s as f32 + 1.0);
            if hi > lo {
                taps.push((s, (hi - lo) / ratio));
            }
            s += 1;
        }
        out.push(taps);
    }
    out
}

/// Resample with area averaging when shrinking, nearest sampling when enlarging.
pub fn resize_area(src: &RgbImageView<'_>, out_w: usize, out_h: usize) -> RgbImage {
    if src.is_empty() || out_w == 0 || out_h == 0 {
        return RgbImage::new(0, 0);
    }
    let wx = area_weights(src.width, out_w);
    let wy = area_weights(src.height, out_h);

    let mut out = RgbImage::new(out_w, out_h);
    for (y, ytaps) in wy.iter().enumerate() {
        for (x, xtaps) in wx.iter().enumerate() {
            let mut acc = [0.0f32; 3];
            for &(sy, fy) in ytaps {
                for &(sx, fx) in xtaps {
                    let p = src.pixel(sx, sy);
                    let w = fx * fy;
                    acc[0] += w * p[0] as f32;
                    acc[1] += w * p[1] as f32;
                    acc[2] += w * p[2] as f32;
                }
            }
            out.put_pixel(x, y, acc.map(|c| c.round().clamp(0.0, 255.0) as u8));
        }
    }
    out
}

/// BT.601 luma.
pub fn rgb_to_gray(src: &RgbImageView<'_>) -> GrayImage {
    let data = src
        .data
        .chunks_exact(3)
        .map(|p| {
            let y = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
            y.round().clamp(0.0, 255.0) as u8
        })
        .collect();
    GrayImage {
        width: src.width,
        height: src.height,
        data,
    }
}

#[inline]
fn hsv_from_rgb(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
    let h_deg = if diff <= 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / diff
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    let h_deg = if h_deg < 0.0 { h_deg + 360.0 } else { h_deg };

    let mut h = (h_deg / 2.0).round() as u32;
    if h >= 180 {
        h -= 180;
    }
    [h as u8, s.round().clamp(0.0, 255.0) as u8, v as u8]
}

/// RGB to 8-bit HSV (`h` in `[0, 180)`).
pub fn rgb_to_hsv(src: &RgbImageView<'_>) -> HsvImage {
    let mut data = Vec::with_capacity(src.data.len());
    for p in src.data.chunks_exact(3) {
        data.extend_from_slice(&hsv_from_rgb(p[0], p[1], p[2]));
    }
    HsvImage {
        width: src.width,
        height: src.height,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Hsv;

    #[test]
    fn primary_colors_map_to_expected_hues() {
        let mut img = RgbImage::new(4, 1);
        img.put_pixel(0, 0, [255, 0, 0]);
        img.put_pixel(1, 0, [0, 255, 0]);
        img.put_pixel(2, 0, [0, 0, 255]);
        img.put_pixel(3, 0, [255, 128, 0]);
        let hsv = rgb_to_hsv(&img.view());

        assert_eq!(hsv.pixel(0, 0), Hsv { h: 0, s: 255, v: 255 });
        assert_eq!(hsv.pixel(1, 0), Hsv { h: 60, s: 255, v: 255 });
        assert_eq!(hsv.pixel(2, 0), Hsv { h: 120, s: 255, v: 255 });
        // orange sits in the low-hue band used for ball tracking
        assert_eq!(hsv.pixel(3, 0).h, 15);
    }

    #[test]
    fn gray_pixels_have_zero_saturation() {
        let img = RgbImage::filled(2, 2, [90, 90, 90]);
        let hsv = rgb_to_hsv(&img.view());
        assert!(hsv.data.chunks_exact(3).all(|p| p[0] == 0 && p[1] == 0 && p[2] == 90));
        let gray = rgb_to_gray(&img.view());
        assert!(gray.data.iter().all(|&g| g == 90));
    }

    #[test]
    fn half_scale_averages_two_by_two_blocks() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, [100, 0, 0]);
        img.put_pixel(1, 0, [200, 0, 0]);
        img.put_pixel(0, 1, [0, 0, 0]);
        img.put_pixel(1, 1, [100, 0, 0]);
        let frame = preprocess_frame(&img.view(), &PreprocessParams { scale: 0.5 });
        assert_eq!((frame.color.width, frame.color.height), (2, 1));
        assert_eq!(frame.color.pixel(0, 0), [100, 0, 0]);
        assert_eq!(frame.color.pixel(1, 0), [0, 0, 0]);
    }

    #[test]
    fn unit_scale_is_a_copy() {
        let img = RgbImage::filled(3, 2, [1, 2, 3]);
        let frame = preprocess_frame(&img.view(), &PreprocessParams::default());
        assert_eq!(frame.color, img);
        assert_eq!(frame.gray.width, 3);
        assert_eq!(frame.hsv.height, 2);
    }

    #[test]
    fn empty_frame_yields_empty_outputs() {
        let img = RgbImage::new(0, 0);
        let frame = preprocess_frame(&img.view(), &PreprocessParams { scale: 0.2 });
        assert!(frame.is_empty());
        assert!(frame.gray.data.is_empty());
        assert!(frame.hsv.data.is_empty());
    }
}
