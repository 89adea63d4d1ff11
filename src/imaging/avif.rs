//! AVIF decoding from memory: `avif-parse` (container) + `rav1d` (AV1 decode).
//!
//! The `image` crate only decodes AVIF through the C library dav1d, so the
//! AV1 payload is handed to `rav1d` (a pure Rust port) directly and the YUV
//! planes are converted to RGB8 here.

use super::backend::BackendError;
use image::DynamicImage;
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::Dav1dSettings;
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use std::ptr::NonNull;

fn failed(msg: impl Into<String>) -> BackendError {
    BackendError::ProcessingFailed(msg.into())
}

/// Decode an in-memory AVIF file to an RGB8 image.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(bytes))
        .map_err(|e| failed(format!("Failed to parse AVIF container: {e:?}")))?;
    let payload: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let Some(settings_ptr) = NonNull::new(settings.as_mut_ptr()) else {
        return Err(failed("rav1d settings allocation failed"));
    };
    unsafe { rav1d::src::lib::dav1d_default_settings(settings_ptr) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc =
        unsafe { rav1d::src::lib::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(failed(format!("rav1d open failed ({})", rc.0)));
    }

    // Every path below shares the single close after the closure returns.
    let decoded = (move || -> Result<(u32, u32, Vec<u8>), BackendError> {
        let mut data = Dav1dData::default();
        let buf =
            unsafe { rav1d::src::lib::dav1d_data_create(NonNull::new(&mut data), payload.len()) };
        if buf.is_null() {
            return Err(failed("rav1d data_create failed"));
        }
        unsafe { std::ptr::copy_nonoverlapping(payload.as_ptr(), buf, payload.len()) };

        let rc = unsafe { rav1d::src::lib::dav1d_send_data(ctx, NonNull::new(&mut data)) };
        if rc.0 != 0 {
            unsafe { rav1d::src::lib::dav1d_data_unref(NonNull::new(&mut data)) };
            return Err(failed(format!("rav1d send_data failed ({})", rc.0)));
        }

        let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
        let rc = unsafe { rav1d::src::lib::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
        if rc.0 != 0 {
            return Err(failed(format!("rav1d get_picture failed ({})", rc.0)));
        }

        let converted = picture_to_rgb(&pic);
        unsafe { rav1d::src::lib::dav1d_picture_unref(NonNull::new(&mut pic)) };
        converted
    })();

    unsafe { rav1d::src::lib::dav1d_close(NonNull::new(&mut ctx)) };

    let (width, height, rgb) = decoded?;
    image::RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| failed("Decoded AVIF buffer does not match its dimensions"))
}

/// Convert a decoded picture's planes to interleaved RGB8.
fn picture_to_rgb(pic: &Dav1dPicture) -> Result<(u32, u32, Vec<u8>), BackendError> {
    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let layout = pic.p.layout;

    let plane_ptr = |i: usize| -> Result<*const u8, BackendError> {
        pic.data[i]
            .map(|p| p.as_ptr() as *const u8)
            .ok_or_else(|| failed(format!("AVIF picture is missing plane {i}")))
    };
    let luma = plane_ptr(0)?;

    let planes = if layout == DAV1D_PIXEL_LAYOUT_I400 {
        Planes {
            luma,
            cb: luma,
            cr: luma,
            luma_stride: pic.stride[0],
            chroma_stride: 0,
            bit_depth: pic.p.bpc as u32,
            subsampling: None,
        }
    } else {
        let subsampling = match layout {
            DAV1D_PIXEL_LAYOUT_I420 => (true, true),
            DAV1D_PIXEL_LAYOUT_I422 => (true, false),
            DAV1D_PIXEL_LAYOUT_I444 => (false, false),
            other => return Err(failed(format!("Unsupported AVIF pixel layout: {other}"))),
        };
        Planes {
            luma,
            cb: plane_ptr(1)?,
            cr: plane_ptr(2)?,
            luma_stride: pic.stride[0],
            chroma_stride: pic.stride[1],
            bit_depth: pic.p.bpc as u32,
            subsampling: Some(subsampling),
        }
    };

    let len = rgb_buffer_len(width, height)
        .ok_or_else(|| failed(format!("AVIF dimensions {width}x{height} are too large")))?;
    Ok((width, height, planes.to_rgb(width, height, len)))
}

/// Byte length of an interleaved RGB8 buffer, `None` if it overflows `usize`.
fn rgb_buffer_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(3)
}

/// Borrowed YUV planes of a decoded picture.
struct Planes {
    luma: *const u8,
    cb: *const u8,
    cr: *const u8,
    luma_stride: isize,
    chroma_stride: isize,
    bit_depth: u32,
    /// Horizontal/vertical chroma subsampling; `None` for monochrome.
    subsampling: Option<(bool, bool)>,
}

impl Planes {
    fn sample(&self, plane: *const u8, stride: isize, x: u32, y: u32) -> f32 {
        if self.bit_depth <= 8 {
            (unsafe { *plane.offset(y as isize * stride + x as isize) }) as f32
        } else {
            // High bit depths are stored as native-endian u16.
            let offset = y as isize * stride + x as isize * 2;
            (unsafe { (plane.offset(offset) as *const u16).read_unaligned() }) as f32
        }
    }

    /// BT.601 YCbCr → RGB, scaled to 8 bits per channel.
    fn to_rgb(&self, width: u32, height: u32, len: usize) -> Vec<u8> {
        let scale = 255.0 / ((1u32 << self.bit_depth) - 1) as f32;
        let center = (1u32 << (self.bit_depth - 1)) as f32;
        let to_u8 = |v: f32| (v * scale).clamp(0.0, 255.0) as u8;

        let mut rgb = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                let luma = self.sample(self.luma, self.luma_stride, x, y);
                let Some((ss_x, ss_y)) = self.subsampling else {
                    let grey = to_u8(luma);
                    rgb.extend_from_slice(&[grey, grey, grey]);
                    continue;
                };
                let cx = if ss_x { x / 2 } else { x };
                let cy = if ss_y { y / 2 } else { y };
                let cb = self.sample(self.cb, self.chroma_stride, cx, cy) - center;
                let cr = self.sample(self.cr, self.chroma_stride, cx, cy) - center;
                rgb.extend_from_slice(&[
                    to_u8(luma + 1.402 * cr),
                    to_u8(luma - 0.344136 * cb - 0.714136 * cr),
                    to_u8(luma + 1.772 * cb),
                ]);
            }
        }
        rgb
    }
}
