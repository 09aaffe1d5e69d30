//! Machine configuration.

use crate::display::DisplayMode;

/// Oberon machine configuration.
pub struct OberonConfig {
    /// General RAM in MiB (1-64); the framebuffer window sits above it.
    pub megabytes_ram: u32,
    /// Static display mode table; entry indexes are the values the
    /// guest writes to the mode-switch register.
    pub modes: Vec<DisplayMode>,
    /// Accept packed dynamic-resolution requests (and seamless mode).
    pub dynamic_display: bool,
    /// Advertise a wall-clock snapshot through the hardware enumerator.
    pub rtc: bool,
}

impl Default for OberonConfig {
    fn default() -> Self {
        Self {
            megabytes_ram: 1,
            modes: vec![DisplayMode {
                index: 0,
                width: 1024,
                height: 768,
                depth: 1,
            }],
            dynamic_display: false,
            rtc: false,
        }
    }
}

/// Parse a `--size` mode list: `WxH[xD]`, comma-separated, depth 1 when
/// omitted. Mode indexes follow list order.
pub fn parse_size_list(list: &str) -> Result<Vec<DisplayMode>, String> {
    let mut modes = Vec::new();
    for (index, part) in list.split(',').enumerate() {
        let fields: Vec<&str> = part.split('x').collect();
        if !(2..=3).contains(&fields.len()) {
            return Err(format!("Invalid mode {part:?} (expected WxH or WxHxD)"));
        }
        let width: u32 = fields[0]
            .parse()
            .map_err(|_| format!("Invalid width in {part:?}"))?;
        let height: u32 = fields[1]
            .parse()
            .map_err(|_| format!("Invalid height in {part:?}"))?;
        let depth: u32 = match fields.get(2) {
            Some(text) => text
                .parse()
                .map_err(|_| format!("Invalid depth in {part:?}"))?,
            None => 1,
        };
        if !matches!(depth, 1 | 4 | 8) {
            return Err(format!("Depth must be 1, 4 or 8, got {depth}"));
        }
        if width % 32 != 0 || width == 0 || width > 2048 {
            return Err(format!(
                "Width must be a positive multiple of 32 up to 2048, got {width}"
            ));
        }
        if height == 0 || height > 2048 {
            return Err(format!("Height must be 1-2048, got {height}"));
        }
        modes.push(DisplayMode {
            index: index as u32,
            width,
            height,
            depth,
        });
    }
    if modes.is_empty() {
        return Err("Empty mode list".into());
    }
    Ok(modes)
}
