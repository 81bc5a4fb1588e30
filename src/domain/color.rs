// Color model and threshold color scales
use palette::{FromColor, Hsl, Lab, LinSrgb, Srgb};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub const WHITE: Color = Color::new(0xff, 0xff, 0xff);
    pub const GRAY: Color = Color::new(0x96, 0x96, 0x96);
    pub const BLACK: Color = Color::new(0x00, 0x00, 0x00);
    pub const GREEN: Color = Color::new(0x00, 0xe4, 0x00);
    pub const YELLOW: Color = Color::new(0xff, 0xff, 0x00);
    pub const ORANGE: Color = Color::new(0xff, 0x7e, 0x00);
    pub const RED: Color = Color::new(0xff, 0x00, 0x00);
    pub const PURPLE: Color = Color::new(0x8f, 0x3f, 0x97);
    pub const MAROON: Color = Color::new(0x7e, 0x00, 0x23);

    pub fn to_hex(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }

    fn to_srgb(self) -> Srgb {
        Srgb::new(self.red, self.green, self.blue).into_format::<f32>()
    }

    fn from_srgb(rgb: Srgb) -> Self {
        Self::new(
            channel_to_u8(rgb.red),
            channel_to_u8(rgb.green),
            channel_to_u8(rgb.blue),
        )
    }

    /// Blend two colors in CIE L*a*b*. `factor` is clamped to `[0, 1]`; the
    /// endpoints return the inputs untouched.
    pub fn mix(self, other: Color, factor: f64) -> Color {
        if factor <= 0.0 || factor.is_nan() {
            return self;
        }
        if factor >= 1.0 {
            return other;
        }

        let a: Lab = Lab::from_color(self.to_srgb());
        let b: Lab = Lab::from_color(other.to_srgb());
        let t = factor as f32;
        let mixed = Lab::new(
            a.l + (b.l - a.l) * t,
            a.a + (b.a - a.a) * t,
            a.b + (b.b - a.b) * t,
        );

        Self::from_srgb(Srgb::from_color(mixed))
    }

    /// Reduce HSL lightness by an absolute percentage (0-100).
    pub fn darken(self, percent: f32) -> Color {
        let mut hsl: Hsl = Hsl::from_color(self.to_srgb());
        hsl.lightness = (hsl.lightness - percent / 100.0).clamp(0.0, 1.0);
        Self::from_srgb(Srgb::from_color(hsl))
    }

    /// Relative luminance (WCAG definition).
    pub fn luminance(self) -> f32 {
        let linear: LinSrgb = self.to_srgb().into_linear();
        0.2126 * linear.red + 0.7152 * linear.green + 0.0722 * linear.blue
    }

    /// Text color that stays legible on top of this background.
    pub fn readable_text(self) -> Color {
        if let Some(text) = palette_text_color(self) {
            return text;
        }
        if self.luminance() > 0.179 {
            Color::BLACK
        } else {
            Color::WHITE
        }
    }
}

fn channel_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Fixed text colors for the named palette.
fn palette_text_color(background: Color) -> Option<Color> {
    let text = match background {
        Color::WHITE | Color::GRAY | Color::GREEN | Color::YELLOW => Color::BLACK,
        Color::BLACK | Color::ORANGE | Color::RED | Color::PURPLE | Color::MAROON => Color::WHITE,
        _ => return None,
    };
    Some(text)
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hex())
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rgb: Srgb<u8> = s
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid hex color {:?}: {}", s, e))?;
        Ok(Self::new(rgb.red, rgb.green, rgb.blue))
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Snap to the band the value falls in.
    Discrete,
    /// Interpolate between the surrounding bands.
    #[default]
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorBand {
    pub min: f64,
    pub color: Color,
}

impl ColorBand {
    pub const fn new(min: f64, color: Color) -> Self {
        Self { min, color }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    bands: Vec<ColorBand>,
}

impl ColorScale {
    pub fn new(bands: Vec<ColorBand>) -> anyhow::Result<Self> {
        if bands.is_empty() {
            anyhow::bail!("a color scale needs at least one band");
        }
        for pair in bands.windows(2) {
            if pair[1].min <= pair[0].min {
                anyhow::bail!(
                    "color band thresholds must increase: {} followed by {}",
                    pair[0].min,
                    pair[1].min
                );
            }
        }
        Ok(Self { bands })
    }

    /// EPA PM2.5 breakpoints.
    pub fn pm25() -> Self {
        Self {
            bands: vec![
                ColorBand::new(f64::NEG_INFINITY, Color::GREEN),
                ColorBand::new(12.0, Color::YELLOW),
                ColorBand::new(35.0, Color::ORANGE),
                ColorBand::new(55.0, Color::RED),
                ColorBand::new(150.0, Color::PURPLE),
                ColorBand::new(250.0, Color::MAROON),
            ],
        }
    }

    pub fn bands(&self) -> &[ColorBand] {
        &self.bands
    }

    /// Index of the band whose threshold is the largest one not above `value`.
    /// Values at or below zero map to the first band.
    pub fn level_for(&self, value: f64) -> usize {
        let last = self.bands.len() - 1;
        if value >= self.bands[last].min {
            return last;
        }
        if value <= 0.0 {
            return 0;
        }
        self.bands
            .iter()
            .rposition(|band| band.min <= value)
            .unwrap_or(0)
    }

    pub fn color_for(&self, value: f64, mode: BlendMode) -> Color {
        let last = &self.bands[self.bands.len() - 1];
        if value >= last.min {
            return last.color;
        }
        if value <= 0.0 {
            return self.bands[0].color;
        }

        let Some(i) = self.bands.iter().position(|band| band.min > value) else {
            tracing::error!(value, "color bands do not cover value");
            return Color::WHITE;
        };
        if i == 0 {
            tracing::error!(value, first_min = self.bands[0].min, "value falls below the first color band");
            return Color::WHITE;
        }

        let lo = &self.bands[i - 1];
        let hi = &self.bands[i];

        match mode {
            BlendMode::Discrete => lo.color,
            BlendMode::Continuous => {
                let span = if lo.min == f64::NEG_INFINITY {
                    hi.min
                } else {
                    hi.min - lo.min
                };
                let used = (span - (hi.min - value)) / span;
                lo.color.mix(hi.color, used)
            }
        }
    }
}

impl Default for ColorScale {
    fn default() -> Self {
        Self::pm25()
    }
}
