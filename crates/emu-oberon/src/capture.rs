//! Headless capture: PNG screenshots.
//!
//! Renders the framebuffer through the palette at the current mode's
//! depth. Monochrome pixels map to black/white; 4- and 8-bit pixels
//! index the palette, whose entries are `0x00RRGGBB` words. Within a
//! framebuffer word the lowest bits are the leftmost pixel.

use std::error::Error;
use std::fs;
use std::path::Path;

use crate::Oberon;

/// Save the current framebuffer as an RGBA PNG.
pub fn save_screenshot(oberon: &Oberon, path: &Path) -> Result<(), Box<dyn Error>> {
    let (mode, _) = oberon.display_mode();
    let fb = oberon.framebuffer();
    let palette = oberon.palette();
    let span = mode.span() as usize;
    let pixels_per_word = (32 / mode.depth) as usize;
    let mask = (1u32 << mode.depth) - 1;

    let mut rgba = Vec::with_capacity((mode.width * mode.height * 4) as usize);
    for y in 0..mode.height as usize {
        for x in 0..mode.width as usize {
            let word = fb[y * span + x / pixels_per_word];
            let value = (word >> ((x % pixels_per_word) as u32 * mode.depth)) & mask;
            let color = if mode.depth == 1 {
                if value != 0 { 0x00FF_FFFF } else { 0 }
            } else {
                palette[value as usize]
            };
            rgba.push(((color >> 16) & 0xFF) as u8);
            rgba.push(((color >> 8) & 0xFF) as u8);
            rgba.push((color & 0xFF) as u8);
            rgba.push(0xFF);
        }
    }

    let file = fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    let mut encoder = png::Encoder::new(writer, mode.width, mode.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut png_writer = encoder.write_header()?;
    png_writer.write_image_data(&rgba)?;
    Ok(())
}
