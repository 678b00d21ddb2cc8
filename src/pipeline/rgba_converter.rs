use std::convert::TryFrom;

use anyhow::{Result, anyhow};
use image::{RgbaImage, imageops};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuv_nv21_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::{CameraFrame, Frame, PixelFormat, Rotation};

/// Converts a camera frame into the upright RGBA image the detector expects.
pub fn convert_camera_frame(frame: &CameraFrame) -> Result<Frame> {
    let meta = frame.metadata;
    let data = frame.data.as_slice();
    let (width, height) = (meta.width, meta.height);

    let (rgba, width, height) = match meta.format {
        PixelFormat::Nv12 => (nv12_to_rgba(data, width, height)?, width, height),
        PixelFormat::Nv21 => (nv21_to_rgba(data, width, height)?, width, height),
        PixelFormat::Yuyv => (yuyv_to_rgba(data, width, height)?, width, height),
        PixelFormat::Mjpeg => mjpeg_to_rgba(data)?,
        PixelFormat::Rgb => (raw_rgb_to_rgba(data, width, height)?, width, height),
        PixelFormat::Bgr => (raw_bgr_to_rgba(data, width, height)?, width, height),
        PixelFormat::Gray => (gray_to_rgba(data, width, height)?, width, height),
        PixelFormat::Rgba => (copy_rgba(data, width, height)?, width, height),
    };

    let (rgba, width, height) = rotate_rgba(rgba, width, height, meta.rotation)?;

    Ok(Frame {
        rgba,
        width,
        height,
        timestamp: frame.timestamp,
    })
}

pub fn rotate_rgba(
    rgba: Vec<u8>,
    width: u32,
    height: u32,
    rotation: Rotation,
) -> Result<(Vec<u8>, u32, u32)> {
    if rotation == Rotation::Deg0 {
        return Ok((rgba, width, height));
    }

    let image = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("RGBA buffer does not match {width}x{height}"))?;
    let rotated = match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => imageops::rotate90(&image),
        Rotation::Deg180 => imageops::rotate180(&image),
        Rotation::Deg270 => imageops::rotate270(&image),
    };

    let (width, height) = rotated.dimensions();
    Ok((rotated.into_raw(), width, height))
}

fn bi_planar_to_rgba(data: &[u8], width: u32, height: u32, swap_uv: bool) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;

    if data.len() < y_plane_len + uv_plane_len {
        return Err(anyhow!(
            "YUV420 buffer too small: got {}, expected {}",
            data.len(),
            y_plane_len + uv_plane_len
        ));
    }

    let y_plane = &data[..y_plane_len];
    let uv_plane = &data[y_plane_len..y_plane_len + uv_plane_len];
    let mut rgba = vec![0u8; y_plane_len * 4];

    let image = YuvBiPlanarImage {
        y_plane,
        y_stride: width,
        uv_plane,
        uv_stride: width,
        width,
        height,
    };

    let converted = if swap_uv {
        yuv_nv21_to_rgba(
            &image,
            &mut rgba,
            width * 4,
            YuvRange::Full,
            YuvStandardMatrix::Bt709,
            YuvConversionMode::Balanced,
        )
    } else {
        yuv_nv12_to_rgba(
            &image,
            &mut rgba,
            width * 4,
            YuvRange::Full,
            YuvStandardMatrix::Bt709,
            YuvConversionMode::Balanced,
        )
    };
    converted.map_err(|err| anyhow!("YUV420→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    bi_planar_to_rgba(data, width, height, false)
}

// Android cameras hand out NV21 (VU order) by default.
fn nv21_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    bi_planar_to_rgba(data, width, height, true)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 2;
    if data.len() < expected_len {
        return Err(anyhow!(
            "YUYV buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

/// MJPEG carries its own dimensions, so they come back with the pixels.
fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder returned no image info"))?;
    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width does not fit u32"))?;
    let height =
        u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height does not fit u32"))?;
    let expected_len = width as usize * height as usize * 4;
    if rgba.len() < expected_len {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {}",
            rgba.len(),
            expected_len
        ));
    }

    Ok((rgba, width, height))
}

fn raw_rgb_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    rgb_like_to_rgba(data, width, height, false)
}

fn raw_bgr_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    rgb_like_to_rgba(data, width, height, true)
}

fn rgb_like_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 3;
    if data.len() < expected_len {
        return Err(anyhow!(
            "RGB buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            if swap_rb {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            } else {
                dst[0] = src[0];
                dst[1] = src[1];
                dst[2] = src[2];
            }
            dst[3] = 255;
        });

    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize;
    if data.len() < expected_len {
        return Err(anyhow!(
            "GRAY buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; expected_len * 4];
    rgba.par_chunks_mut(4)
        .zip(data[..expected_len].par_iter().copied())
        .for_each(|(dst, value)| {
            dst[0] = value;
            dst[1] = value;
            dst[2] = value;
            dst[3] = 255;
        });

    Ok(rgba)
}

fn copy_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 4;
    if data.len() < expected_len {
        return Err(anyhow!(
            "RGBA buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }
    Ok(data[..expected_len].to_vec())
}
