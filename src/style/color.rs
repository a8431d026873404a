/*!
 * Conversion between the render service's native color encoding and the
 * editor's color representation.
 *
 * Native colors are `&HAABBGGRR`: alpha first, then blue, green, red, with
 * alpha inverted (`00` opaque, `FF` fully transparent). UI colors are a
 * `#rrggbb` hex string with the alpha carried separately, since a CSS-style
 * hex swatch has no transparency of its own. Both directions are total: any
 * malformed input decodes to opaque white.
 */

use std::fmt;

use log::trace;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Color as the editor sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UiColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// 255 is opaque
    pub alpha: u8,
}

impl UiColor {
    pub const WHITE: UiColor = UiColor::rgb(255, 255, 255);
    pub const BLACK: UiColor = UiColor::rgb(0, 0, 0);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue, alpha: 255 }
    }

    pub const fn with_alpha(self, alpha: u8) -> Self {
        Self { alpha, ..self }
    }

    /// Parse `#rrggbb`, `#rgb` or the same without `#`, fully opaque
    ///
    /// Malformed input yields opaque white.
    pub fn from_hex(hex: &str) -> Self {
        Self::try_from_hex(hex).unwrap_or_else(|| {
            trace!("Malformed UI color {:?}, using white", hex);
            Self::WHITE
        })
    }

    /// Parse a hex swatch combined with a separate alpha
    pub fn from_hex_alpha(hex: &str, alpha: Option<u8>) -> Self {
        Self::from_hex(hex).with_alpha(alpha.unwrap_or(255))
    }

    fn try_from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match digits.len() {
            6 => {
                let value = u32::from_str_radix(digits, 16).ok()?;
                Some(Self::rgb((value >> 16) as u8, (value >> 8) as u8, value as u8))
            }
            3 => {
                let mut channels = digits.chars().map(|c| {
                    let nibble = c.to_digit(16).unwrap_or(0) as u8;
                    nibble * 16 + nibble
                });
                Some(Self::rgb(channels.next()?, channels.next()?, channels.next()?))
            }
            _ => None,
        }
    }

    /// Lowercase `#rrggbb` swatch, alpha not included
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }

    pub fn is_opaque(&self) -> bool {
        self.alpha == 255
    }
}

impl Default for UiColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for UiColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            write!(f, "{}", self.hex())
        } else {
            write!(f, "{} @{}", self.hex(), self.alpha)
        }
    }
}

/// Encode a UI color for the render service
pub fn to_native(color: &UiColor) -> String {
    format!(
        "&H{:02X}{:02X}{:02X}{:02X}",
        255 - color.alpha,
        color.blue,
        color.green,
        color.red
    )
}

/// Decode a render-service color
///
/// Accepts `&HAABBGGRR` and the alpha-less `&HBBGGRR`, with or without the
/// trailing `&`, in any case. Anything else yields opaque white.
pub fn to_ui(native: &str) -> UiColor {
    parse_native(native).unwrap_or_else(|| {
        trace!("Malformed native color {:?}, using white", native);
        UiColor::WHITE
    })
}

fn parse_native(native: &str) -> Option<UiColor> {
    let trimmed = native.trim();
    let body = trimmed
        .strip_prefix("&H")
        .or_else(|| trimmed.strip_prefix("&h"))?;
    let digits = body.strip_suffix('&').unwrap_or(body);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let value = u32::from_str_radix(digits, 16).ok()?;
    let (transparency, blue, green, red) = match digits.len() {
        8 => ((value >> 24) as u8, (value >> 16) as u8, (value >> 8) as u8, value as u8),
        6 => (0, (value >> 16) as u8, (value >> 8) as u8, value as u8),
        _ => return None,
    };

    Some(UiColor {
        red,
        green,
        blue,
        alpha: 255 - transparency,
    })
}

/// Wire form of a UI color: a bare hex string when opaque, an object otherwise
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum UiColorRepr {
    Hex(String),
    WithAlpha { hex: String, alpha: Option<u8> },
}

impl Serialize for UiColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = if self.is_opaque() {
            UiColorRepr::Hex(self.hex())
        } else {
            UiColorRepr::WithAlpha {
                hex: self.hex(),
                alpha: Some(self.alpha),
            }
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UiColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Unrecognized shapes fail closed like malformed hex
        let value = serde_json::Value::deserialize(deserializer)?;
        let color = match serde_json::from_value::<UiColorRepr>(value) {
            Ok(UiColorRepr::Hex(hex)) => UiColor::from_hex(&hex),
            Ok(UiColorRepr::WithAlpha { hex, alpha }) => UiColor::from_hex_alpha(&hex, alpha),
            Err(_) => UiColor::WHITE,
        };
        Ok(color)
    }
}
