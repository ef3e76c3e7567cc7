use crate::core::gfx::backend::Framebuffer;
use crate::core::gfx::error::{GfxError, GfxResult};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::io::Write;

/// Converts a readback into top-to-bottom, fully opaque RGBA rows.
pub fn normalize(fb: &Framebuffer) -> GfxResult<Vec<u8>> {
    let row = fb.width as usize * 4;
    let expected = row * fb.height as usize;
    if fb.pixels.len() != expected {
        return Err(GfxError::Driver {
            op: "Screenshot",
            message: format!(
                "read back {} bytes, expected {expected} for {}x{}",
                fb.pixels.len(),
                fb.width,
                fb.height
            ),
        });
    }

    let mut out = Vec::with_capacity(expected);
    if row == 0 {
        return Ok(out);
    }
    let mut push = |src: &[u8]| {
        out.extend(src.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2], 255]));
    };
    if fb.bottom_up {
        fb.pixels.chunks_exact(row).rev().for_each(&mut push);
    } else {
        fb.pixels.chunks_exact(row).for_each(&mut push);
    }
    Ok(out)
}

/// PNG-encodes `fb` into `out`.
pub fn encode_png<W: Write>(fb: &Framebuffer, out: W) -> GfxResult<()> {
    let rgba = normalize(fb)?;
    PngEncoder::new(out).write_image(&rgba, fb.width, fb.height, ExtendedColorType::Rgba8)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{encode_png, normalize};
    use crate::core::gfx::backend::Framebuffer;

    fn two_rows(bottom_up: bool) -> Framebuffer {
        Framebuffer {
            width: 1,
            height: 2,
            pixels: vec![1, 2, 3, 0, 4, 5, 6, 9],
            bottom_up,
        }
    }

    #[test]
    fn bottom_up_reads_are_flipped_and_made_opaque() {
        let rows = normalize(&two_rows(true)).unwrap();
        assert_eq!(rows, vec![4, 5, 6, 255, 1, 2, 3, 255]);

        let rows = normalize(&two_rows(false)).unwrap();
        assert_eq!(rows, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn short_readback_is_rejected() {
        let mut fb = two_rows(false);
        fb.pixels.truncate(4);
        assert!(normalize(&fb).is_err());
    }

    #[test]
    fn encoded_output_is_a_png() {
        let mut out = Vec::new();
        encode_png(&two_rows(true), &mut out).unwrap();
        assert_eq!(&out[..8], b"\x89PNG\r\n\x1a\n");
    }
}
