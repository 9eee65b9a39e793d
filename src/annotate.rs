use std::path::{Path, PathBuf};

use ab_glyph::{FontRef, PxScale};
use image::Rgb;
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_text_mut},
    rect::Rect,
};
use tracing::warn;

const BANNER_HEIGHT: u32 = 40;
const FONT_BYTES: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// Write a copy of the original with a black banner and the predicted label
/// across the top. Best-effort: any failure degrades to `None` and the caller
/// proceeds without a derivative.
pub fn annotate(original: &Path, dest: &Path, label: &str) -> Option<PathBuf> {
    match render(original, dest, label) {
        Ok(()) => Some(dest.to_path_buf()),
        Err(e) => {
            warn!(error = %e, original = %original.display(), "annotation failed");
            None
        }
    }
}

fn render(original: &Path, dest: &Path, label: &str) -> anyhow::Result<()> {
    let font = FontRef::try_from_slice(FONT_BYTES)
        .map_err(|e| anyhow::anyhow!("load embedded font: {e}"))?;

    let mut img = image::open(original)?.to_rgb8();
    let width = img.width();
    let banner_height = BANNER_HEIGHT.min(img.height());
    draw_filled_rect_mut(
        &mut img,
        Rect::at(0, 0).of_size(width, banner_height),
        Rgb([0u8, 0, 0]),
    );
    draw_text_mut(
        &mut img,
        Rgb([255u8, 255, 255]),
        10,
        10,
        PxScale::from(20.0),
        &font,
        &format!("Prediction: {label}"),
    );
    img.save(dest)?;
    Ok(())
}
