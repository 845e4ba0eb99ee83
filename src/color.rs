//! Hue/saturation and RGB conversions at full brightness.

use palette::{FromColor, Hsv, Srgb, encoding};

/// Converts a HomeKit hue (degrees) and saturation (percent) to an RGB triplet.
pub fn hs_to_rgb(hue: f64, saturation: f64) -> [u8; 3] {
    let hsv: Hsv<encoding::Srgb, f64> = Hsv::new(
        hue.rem_euclid(360.0),
        (saturation / 100.0).clamp(0.0, 1.0),
        1.0,
    );
    let rgb: Srgb<u8> = Srgb::<f64>::from_color(hsv).into_format();
    [rgb.red, rgb.green, rgb.blue]
}

/// Converts an RGB triplet back to `(hue, saturation)`, hue rounded to a whole degree.
pub fn rgb_to_hs(r: u8, g: u8, b: u8) -> (f64, f64) {
    let rgb: Srgb<f64> = Srgb::new(r, g, b).into_format();
    let hsv: Hsv<encoding::Srgb, f64> = Hsv::from_color(rgb);
    let hue = hsv.hue.into_positive_degrees().round() % 360.0;
    (hue, (hsv.saturation * 100.0).round())
}
