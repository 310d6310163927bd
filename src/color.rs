use smart_leds::RGB8;

/// Packed pixel value, `0xWWRRGGBB`.
pub type Color = u32;

pub const BLACK: Color = 0;

pub const fn pack_rgb(r: u8, g: u8, b: u8) -> Color {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

pub const fn pack_rgbw(r: u8, g: u8, b: u8, w: u8) -> Color {
    (w as u32) << 24 | pack_rgb(r, g, b)
}

/// Splits a packed color into `(r, g, b, w)`.
pub const fn unpack(color: Color) -> (u8, u8, u8, u8) {
    (
        (color >> 16) as u8,
        (color >> 8) as u8,
        color as u8,
        (color >> 24) as u8,
    )
}

pub fn from_rgb8(c: RGB8) -> Color {
    pack_rgb(c.r, c.g, c.b)
}

pub fn to_rgb8(color: Color) -> RGB8 {
    let (r, g, b, _) = unpack(color);
    RGB8::new(r, g, b)
}

/// Integer brightness scaling, rounding down. 255 leaves the value unchanged.
pub const fn scale(component: u8, brightness: u8) -> u8 {
    (component as u32 * brightness as u32 / 255) as u8
}
