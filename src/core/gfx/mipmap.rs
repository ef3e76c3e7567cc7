//! Box-filtered mipmap generation with premultiplied alpha.
//!
//! Colors are weighted by their alpha before averaging so that fully
//! transparent texels do not bleed their (meaningless) RGB into visible ones.

use crate::core::gfx::error::GfxResult;
use image::{Rgba, RgbaImage};
use std::borrow::Cow;

/// Deepest level a capped chain will produce.
pub const CAPPED_MAX_LEVELS: u32 = 4;

/// How many levels a backend can store below the base image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MipPolicy {
    /// The chain runs down to 1x1: `max(log2 w, log2 h)` levels.
    Full,
    /// The backend can limit the chain: `min(log2 w, log2 h, 4)` levels.
    Capped,
}

/// Number of levels below the base for a power-of-two `width` x `height`.
pub fn level_count(width: u32, height: u32, policy: MipPolicy) -> u32 {
    let lw = width.max(1).ilog2();
    let lh = height.max(1).ilog2();
    match policy {
        MipPolicy::Full => lw.max(lh),
        MipPolicy::Capped => lw.min(lh).min(CAPPED_MAX_LEVELS),
    }
}

/// Premultiplied average of two texels.
pub fn average(p1: Rgba<u8>, p2: Rgba<u8>) -> Rgba<u8> {
    let (a1, a2) = (u32::from(p1[3]), u32::from(p2[3]));
    let a_sum = a1 + a2;
    let div = a_sum.max(1);

    let mix = |c1: u8, c2: u8| ((u32::from(c1) * a1 + u32::from(c2) * a2) / div) as u8;
    Rgba([
        mix(p1[0], p2[0]),
        mix(p1[1], p2[1]),
        mix(p1[2], p2[2]),
        (a_sum >> 1) as u8,
    ])
}

/// Builds a `width` x `height` level from `src`, which is twice that size in
/// each dimension that is still larger than one texel.
pub fn generate_level(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let max_x = src.width().saturating_sub(1);
    let max_y = src.height().saturating_sub(1);

    RgbaImage::from_fn(width, height, |x, y| {
        let (x0, y0) = ((x << 1).min(max_x), (y << 1).min(max_y));
        let (x1, y1) = ((x0 + 1).min(max_x), (y0 + 1).min(max_y));

        let top = average(*src.get_pixel(x0, y0), *src.get_pixel(x1, y0));
        let bottom = average(*src.get_pixel(x0, y1), *src.get_pixel(x1, y1));
        average(top, bottom)
    })
}

/// One reduced level, placed where a partial update lands at that depth.
#[derive(Debug)]
pub struct MipLevel<'a> {
    pub level: u32,
    pub x: u32,
    pub y: u32,
    pub image: &'a RgbaImage,
}

/// Walks the chain below `base`, handing each level to `upload`.
///
/// Offsets and sizes halve per level (sizes never below 1). Only the previous
/// level is kept alive while the next one is built.
pub fn for_each_level<F>(base: &RgbaImage, x: u32, y: u32, levels: u32, mut upload: F) -> GfxResult<()>
where
    F: FnMut(MipLevel<'_>) -> GfxResult<()>,
{
    let (mut x, mut y) = (x, y);
    let (mut width, mut height) = base.dimensions();
    let mut prev: Cow<'_, RgbaImage> = Cow::Borrowed(base);

    for level in 1..=levels {
        x /= 2;
        y /= 2;
        if width > 1 {
            width /= 2;
        }
        if height > 1 {
            height /= 2;
        }

        let cur = generate_level(&prev, width, height);
        upload(MipLevel {
            level,
            x,
            y,
            image: &cur,
        })?;
        prev = Cow::Owned(cur);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MipPolicy, average, for_each_level, generate_level, level_count};
    use image::{Rgba, RgbaImage};

    #[test]
    fn opaque_block_averages_to_plain_mean() {
        let mut src = RgbaImage::new(2, 2);
        src.put_pixel(0, 0, Rgba([10, 200, 40, 255]));
        src.put_pixel(1, 0, Rgba([30, 100, 60, 255]));
        src.put_pixel(0, 1, Rgba([50, 0, 80, 255]));
        src.put_pixel(1, 1, Rgba([70, 100, 100, 255]));

        let out = generate_level(&src, 1, 1);
        assert_eq!(*out.get_pixel(0, 0), Rgba([40, 100, 70, 255]));
    }

    #[test]
    fn fully_transparent_block_stays_transparent_without_dividing_by_zero() {
        let src = RgbaImage::from_pixel(2, 2, Rgba([255, 128, 7, 0]));
        let out = generate_level(&src, 1, 1);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn transparent_texels_do_not_bleed_color() {
        let red = Rgba([255, 0, 0, 255]);
        let clear_green = Rgba([0, 255, 0, 0]);
        let avg = average(red, clear_green);
        assert_eq!(avg, Rgba([255, 0, 0, 127]), "got {avg:?}");
    }

    #[test]
    fn level_counts_follow_policy() {
        assert_eq!(level_count(256, 64, MipPolicy::Capped), 4);
        assert_eq!(level_count(256, 64, MipPolicy::Full), 8);
        assert_eq!(level_count(8, 4, MipPolicy::Capped), 2);
        assert_eq!(level_count(1, 1, MipPolicy::Full), 0);
    }

    #[test]
    fn chain_halves_sizes_and_offsets() {
        let base = RgbaImage::from_pixel(16, 4, Rgba([9, 9, 9, 255]));
        let mut seen = Vec::new();
        for_each_level(&base, 32, 8, 4, |lvl| {
            seen.push((lvl.level, lvl.x, lvl.y, lvl.image.dimensions()));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                (1, 16, 4, (8, 2)),
                (2, 8, 2, (4, 1)),
                (3, 4, 1, (2, 1)),
                (4, 2, 0, (1, 1)),
            ]
        );
    }

    #[test]
    fn upload_failure_stops_the_chain() {
        let base = RgbaImage::new(8, 8);
        let mut calls = 0;
        let res = for_each_level(&base, 0, 0, 3, |_| {
            calls += 1;
            Err(crate::core::gfx::GfxError::OutOfVideoMemory { op: "mip" })
        });
        assert!(res.is_err());
        assert_eq!(calls, 1);
    }
}
