//! Display modes and framebuffer damage tracking.
//!
//! The machine supports a static table of display modes plus, when
//! enabled, dynamically requested resolutions. A mode is selected by a
//! write to the display-mode register: either the index of a configured
//! mode, or a packed `mode<<30 | width<<15 | height` request. A packed
//! request of 0x0 width and height enters *seamless* mode, adopting
//! whatever size the host last hinted.
//!
//! Damage is tracked as the bounding box of all framebuffer stores since
//! the last read-out, in units of word columns by pixel rows. The host
//! reads it once per frame and repaints only that rectangle.

/// Widest supported framebuffer in pixels.
pub const MAX_WIDTH: u32 = 2048;
/// Tallest supported framebuffer in pixels.
pub const MAX_HEIGHT: u32 = 2048;

/// A display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    /// Value the guest writes to select this mode (packed request for
    /// dynamic modes).
    pub index: u32,
    /// Width in pixels; always a multiple of 32.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bits per pixel: 1, 4 or 8.
    pub depth: u32,
}

impl DisplayMode {
    /// Words per scanline.
    #[must_use]
    pub const fn span(&self) -> u32 {
        self.width / (32 / self.depth)
    }

    /// Framebuffer size in bytes.
    #[must_use]
    pub const fn byte_size(&self) -> u32 {
        self.span() * self.height * 4
    }
}

/// Bounding box of modified framebuffer cells, in word columns by pixel
/// rows. `x1 > x2` is the clean sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Damage {
    /// Whether nothing has been drawn since the last read-out.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.x1 > self.x2
    }
}

/// Display-mode manager and damage tracker.
pub struct DisplayState {
    modes: Vec<DisplayMode>,
    current: DisplayMode,
    dynamic: bool,
    seamless: bool,
    size_hint: (u32, u32),
    damage: Damage,
}

impl DisplayState {
    /// Create a display with the given mode table; the first entry is
    /// current. The damage rectangle starts clean.
    #[must_use]
    pub fn new(modes: Vec<DisplayMode>, dynamic: bool) -> Self {
        let current = modes[0];
        let mut display = Self {
            modes,
            current,
            dynamic,
            seamless: false,
            size_hint: (1024, 768),
            damage: Damage {
                x1: 0,
                y1: 0,
                x2: 0,
                y2: 0,
            },
        };
        display.damage = display.clean_sentinel();
        display
    }

    /// The configured mode table.
    #[must_use]
    pub fn modes(&self) -> &[DisplayMode] {
        &self.modes
    }

    /// Whether dynamic mode requests are accepted.
    #[must_use]
    pub const fn dynamic(&self) -> bool {
        self.dynamic
    }

    /// The current mode.
    #[must_use]
    pub const fn mode(&self) -> DisplayMode {
        self.current
    }

    /// Whether the current mode tracks the host's size hint.
    #[must_use]
    pub const fn seamless(&self) -> bool {
        self.seamless
    }

    /// Words per scanline of the current mode.
    #[must_use]
    pub const fn span(&self) -> u32 {
        self.current.span()
    }

    /// Record the host's preferred size for later seamless switches.
    pub fn set_size_hint(&mut self, width: u32, height: u32) {
        self.size_hint = (width, height);
    }

    /// Handle a write to the display-mode register. Returns true when
    /// the mode changed; any accepted switch marks the whole viewport
    /// damaged.
    pub fn switch(&mut self, value: u32) -> bool {
        if let Some(&mode) = self.modes.iter().find(|m| m.index == value) {
            self.current = mode;
            self.seamless = false;
            self.damage = self.full();
            return true;
        }
        if !self.dynamic {
            return false;
        }

        let mode = value >> 30;
        let mut width = (value >> 15) & 0x7FFF;
        let mut height = value & 0x7FFF;
        let seamless = width == 0 && height == 0;
        if seamless {
            width = (self.size_hint.0 & !31).clamp(64, MAX_WIDTH);
            height = self.size_hint.1.clamp(64, MAX_HEIGHT);
        } else if width % 32 != 0 || width > MAX_WIDTH || height > 2045 {
            return false;
        }
        let depth = match mode {
            1 => 1,
            2 => 8,
            3 => 4,
            _ => return false,
        };

        self.current = DisplayMode {
            index: value,
            width,
            height,
            depth,
        };
        self.seamless = seamless;
        self.damage = self.full();
        true
    }

    /// Record a store to framebuffer word `w` (relative to the start of
    /// the framebuffer window).
    pub fn update_damage(&mut self, w: u32) {
        let span = self.span();
        let row = w / span;
        let col = w % span;
        if row < self.current.height {
            self.damage.x1 = self.damage.x1.min(col);
            self.damage.x2 = self.damage.x2.max(col);
            self.damage.y1 = self.damage.y1.min(row);
            self.damage.y2 = self.damage.y2.max(row);
        }
    }

    /// Mark the whole viewport damaged (palette writes, mode switches).
    pub fn damage_all(&mut self) {
        self.damage = self.full();
    }

    /// Read the damage rectangle and reset it to the clean sentinel.
    pub fn take_damage(&mut self) -> Damage {
        let damage = self.damage;
        self.damage = self.clean_sentinel();
        damage
    }

    fn full(&self) -> Damage {
        Damage {
            x1: 0,
            y1: 0,
            x2: self.span() - 1,
            y2: self.current.height - 1,
        }
    }

    const fn clean_sentinel(&self) -> Damage {
        Damage {
            x1: self.span(),
            y1: self.current.height,
            x2: 0,
            y2: 0,
        }
    }
}
