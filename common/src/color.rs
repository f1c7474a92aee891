use palette::{FromColor, Hsv, Srgb};

/// Pure HSV to RGB conversion. Hue, saturation, and value are unit-interval
/// floats as carried on the wire.
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> (u8, u8, u8) {
    let hsv = Hsv::new(hue * 360.0, saturation, value);
    let rgb = Srgb::from_color(hsv).into_format::<u8>();
    (rgb.red, rgb.green, rgb.blue)
}

pub fn hex_color(hue: f32, saturation: f32, value: f32) -> String {
    let (r, g, b) = hsv_to_rgb(hue, saturation, value);
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), (0, 0, 255));
    }

    #[test]
    fn zero_value_is_black() {
        assert_eq!(hsv_to_rgb(0.5, 1.0, 0.0), (0, 0, 0));
        assert_eq!(hex_color(0.5, 1.0, 0.0), "#000000");
    }

    #[test]
    fn white_when_unsaturated() {
        assert_eq!(hex_color(0.25, 0.0, 1.0), "#ffffff");
    }
}
