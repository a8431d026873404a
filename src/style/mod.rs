/*!
 * Caption style model.
 *
 * `StyleDescriptor` is what the editor edits. Only its rendering-relevant
 * fields are modelled; anything else the editor stores alongside them (tab
 * selection, panel state, ...) lands in `extra` and is ignored by both the
 * cache key and the render request.
 *
 * - `color`: native/UI color conversion
 * - `key`: content keys for the preview cache
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use self::color::{to_native, UiColor};

pub mod color;
pub mod key;

pub use self::key::{compute_key, CacheKey};

/// Anchor of the caption block on screen, numbered like a keypad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
    MiddleLeft,
    MiddleCenter,
    MiddleRight,
    TopLeft,
    TopCenter,
    TopRight,
}

impl Alignment {
    /// Keypad code used by the render service
    pub fn code(&self) -> u8 {
        match self {
            Self::BottomLeft => 1,
            Self::BottomCenter => 2,
            Self::BottomRight => 3,
            Self::MiddleLeft => 4,
            Self::MiddleCenter => 5,
            Self::MiddleRight => 6,
            Self::TopLeft => 7,
            Self::TopCenter => 8,
            Self::TopRight => 9,
        }
    }
}

/// Rendering-relevant caption style
///
/// Absent fields deserialize to the values of `StyleDescriptor::default()`,
/// so "missing" and "explicitly default" are the same style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleDescriptor {
    pub font_family: String,
    pub font_size: f64,
    pub font_weight: u16,
    pub italic: bool,

    pub primary_color: UiColor,
    /// Color of not-yet-spoken words in karaoke-style effects
    pub secondary_color: UiColor,
    pub outline_color: UiColor,
    pub shadow_color: UiColor,
    pub background_color: UiColor,

    pub outline_width: f64,
    pub shadow_blur: f64,
    pub shadow_offset_x: f64,
    pub shadow_offset_y: f64,
    pub letter_spacing: f64,

    pub alignment: Alignment,
    pub margin_left: u32,
    pub margin_right: u32,
    pub margin_vertical: u32,

    /// Animation preset understood by the render service
    pub effect_id: Option<String>,
    /// Preset parameters, passed through untouched
    pub effect_config: Map<String, Value>,

    /// Editor-only state, never rendered
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for StyleDescriptor {
    fn default() -> Self {
        Self {
            font_family: "Inter".to_string(),
            font_size: 48.0,
            font_weight: 700,
            italic: false,
            primary_color: UiColor::WHITE,
            secondary_color: UiColor::rgb(255, 221, 0),
            outline_color: UiColor::BLACK,
            shadow_color: UiColor::BLACK.with_alpha(128),
            background_color: UiColor::BLACK.with_alpha(0),
            outline_width: 2.0,
            shadow_blur: 0.0,
            shadow_offset_x: 2.0,
            shadow_offset_y: 2.0,
            letter_spacing: 0.0,
            alignment: Alignment::default(),
            margin_left: 10,
            margin_right: 10,
            margin_vertical: 40,
            effect_id: None,
            effect_config: Map::new(),
            extra: Map::new(),
        }
    }
}

impl StyleDescriptor {
    /// Project onto the whitelisted fields in render-service form
    ///
    /// Field order is fixed by `NativeStyle`, colors are native-encoded and the
    /// effect configuration is normalized, so equal styles project to equal
    /// values.
    pub fn to_native(&self) -> NativeStyle {
        NativeStyle {
            font_name: self.font_family.trim().to_string(),
            font_size: normalize_float(self.font_size),
            font_weight: self.font_weight,
            italic: self.italic,
            primary_colour: to_native(&self.primary_color),
            secondary_colour: to_native(&self.secondary_color),
            outline_colour: to_native(&self.outline_color),
            shadow_colour: to_native(&self.shadow_color),
            back_colour: to_native(&self.background_color),
            outline: normalize_float(self.outline_width),
            shadow_blur: normalize_float(self.shadow_blur),
            shadow_offset_x: normalize_float(self.shadow_offset_x),
            shadow_offset_y: normalize_float(self.shadow_offset_y),
            spacing: normalize_float(self.letter_spacing),
            alignment: self.alignment.code(),
            margin_l: self.margin_left,
            margin_r: self.margin_right,
            margin_v: self.margin_vertical,
            effect: self
                .effect_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty() && *id != "none")
                .map(str::to_string),
            effect_config: normalize_value(&Value::Object(self.effect_config.clone())),
        }
    }
}

/// Whitelisted style fields as sent to the render service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeStyle {
    pub font_name: String,
    pub font_size: f64,
    pub font_weight: u16,
    pub italic: bool,
    pub primary_colour: String,
    pub secondary_colour: String,
    pub outline_colour: String,
    pub shadow_colour: String,
    pub back_colour: String,
    pub outline: f64,
    pub shadow_blur: f64,
    pub shadow_offset_x: f64,
    pub shadow_offset_y: f64,
    pub spacing: f64,
    pub alignment: u8,
    pub margin_l: u32,
    pub margin_r: u32,
    pub margin_v: u32,
    pub effect: Option<String>,
    pub effect_config: Value,
}

fn normalize_float(value: f64) -> f64 {
    // -0.0 and 0.0 serialize differently
    if value == 0.0 { 0.0 } else { value }
}

/// Largest magnitude below which every integral `f64` is exact
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Drop `null` members, order object keys and fold integral floats
fn normalize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut normalized = Map::new();
            for key in keys {
                let member = &map[key];
                if !member.is_null() {
                    normalized.insert(key.clone(), normalize_value(member));
                }
            }
            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        // 1.0 and 1 are the same editor value; -0.0 folds into 0
        Value::Number(number) => match number.as_f64() {
            Some(f) if number.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        other => other.clone(),
    }
}
