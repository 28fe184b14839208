//! Page setup for a conversion: paper size, margins, orientation and scale.
//!
//! Callers send loosely typed options (`"A4"`, `"1cm"`); they are merged over
//! the defaults and validated into [`PdfOptions`], which carries everything in
//! inches so the renderer can hand it to Chromium unchanged.

use std::str::FromStr;

use serde::Deserialize;

use crate::error::InputError;

const CSS_PX_PER_INCH: f64 = 96.0;
const CM_PER_INCH: f64 = 2.54;
const MM_PER_INCH: f64 = 25.4;

// Unit suffix and how many of that unit make an inch.
const LENGTH_UNITS: [(&str, f64); 4] = [
    ("px", CSS_PX_PER_INCH),
    ("in", 1.0),
    ("cm", CM_PER_INCH),
    ("mm", MM_PER_INCH),
];

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
}

impl PaperFormat {
    /// Portrait width and height in inches.
    pub fn size_inches(self) -> (f64, f64) {
        match self {
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
            PaperFormat::Tabloid => (11.0, 17.0),
            PaperFormat::Ledger => (17.0, 11.0),
            PaperFormat::A0 => (33.1, 46.8),
            PaperFormat::A1 => (23.4, 33.1),
            PaperFormat::A2 => (16.54, 23.4),
            PaperFormat::A3 => (11.7, 16.54),
            PaperFormat::A4 => (8.27, 11.7),
            PaperFormat::A5 => (5.83, 8.27),
            PaperFormat::A6 => (4.13, 5.83),
        }
    }
}

impl FromStr for PaperFormat {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = match s.trim().to_ascii_lowercase().as_str() {
            "letter" => PaperFormat::Letter,
            "legal" => PaperFormat::Legal,
            "tabloid" => PaperFormat::Tabloid,
            "ledger" => PaperFormat::Ledger,
            "a0" => PaperFormat::A0,
            "a1" => PaperFormat::A1,
            "a2" => PaperFormat::A2,
            "a3" => PaperFormat::A3,
            "a4" => PaperFormat::A4,
            "a5" => PaperFormat::A5,
            "a6" => PaperFormat::A6,
            _ => return Err(InputError::UnknownFormat(s.to_string())),
        };
        Ok(format)
    }
}

/// Page margins in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margins {
    fn default() -> Self {
        let one_cm = 1.0 / CM_PER_INCH;
        Self {
            top: one_cm,
            right: one_cm,
            bottom: one_cm,
            left: one_cm,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub format: PaperFormat,
    pub margin: Margins,
    pub print_background: bool,
    pub landscape: bool,
    pub scale: f64,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            format: PaperFormat::A4,
            margin: Margins::default(),
            print_background: true,
            landscape: false,
            scale: 1.0,
            header_template: None,
            footer_template: None,
        }
    }
}

impl PdfOptions {
    pub fn with_templates(mut self, header: Option<&str>, footer: Option<&str>) -> Self {
        self.header_template = header.map(str::to_string);
        self.footer_template = footer.map(str::to_string);
        self
    }

    pub fn displays_header_footer(&self) -> bool {
        self.header_template.is_some() || self.footer_template.is_some()
    }
}

/// A CSS length as sent by the caller: `"1cm"`, `"0.5in"`, `"20px"` or a bare
/// number of pixels.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LengthInput {
    Pixels(f64),
    Text(String),
}

impl LengthInput {
    fn to_inches(&self, side: &'static str) -> Result<f64, InputError> {
        let invalid = || InputError::InvalidMargin {
            side,
            value: self.to_string(),
        };

        let inches = match self {
            LengthInput::Pixels(px) => px / CSS_PX_PER_INCH,
            LengthInput::Text(text) => {
                let text = text.trim().to_ascii_lowercase();
                let (number, per_inch) = LENGTH_UNITS
                    .iter()
                    .find_map(|(unit, per_inch)| {
                        text.strip_suffix(*unit).map(|number| (number, *per_inch))
                    })
                    .unwrap_or((text.as_str(), CSS_PX_PER_INCH));
                let value: f64 = number.trim().parse().map_err(|_| invalid())?;
                value / per_inch
            }
        };

        if !inches.is_finite() || inches < 0.0 {
            return Err(invalid());
        }
        Ok(inches)
    }
}

impl std::fmt::Display for LengthInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LengthInput::Pixels(px) => write!(f, "{px}"),
            LengthInput::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarginInput {
    pub top: Option<LengthInput>,
    pub right: Option<LengthInput>,
    pub bottom: Option<LengthInput>,
    pub left: Option<LengthInput>,
}

/// Options exactly as they appear in a request body; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PdfOptionsInput {
    pub format: Option<String>,
    pub margin: Option<MarginInput>,
    pub print_background: Option<bool>,
    pub landscape: Option<bool>,
    pub scale: Option<f64>,
}

impl PdfOptionsInput {
    /// Merges the supplied fields over [`PdfOptions::default`].
    pub fn resolve(self) -> Result<PdfOptions, InputError> {
        let mut options = PdfOptions::default();

        if let Some(format) = self.format {
            options.format = format.parse()?;
        }

        if let Some(margin) = self.margin {
            let sides = [
                ("top", margin.top, &mut options.margin.top),
                ("right", margin.right, &mut options.margin.right),
                ("bottom", margin.bottom, &mut options.margin.bottom),
                ("left", margin.left, &mut options.margin.left),
            ];
            for (side, input, slot) in sides {
                if let Some(length) = input {
                    *slot = length.to_inches(side)?;
                }
            }
        }

        if let Some(print_background) = self.print_background {
            options.print_background = print_background;
        }
        if let Some(landscape) = self.landscape {
            options.landscape = landscape;
        }
        if let Some(scale) = self.scale {
            if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
                return Err(InputError::ScaleOutOfRange(scale));
            }
            options.scale = scale;
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(json: &str) -> PdfOptionsInput {
        serde_json::from_str(json).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_input_yields_defaults() {
        let options = input("{}").resolve().unwrap();
        assert_eq!(options, PdfOptions::default());
        assert_eq!(options.format, PaperFormat::A4);
        assert!(close(options.margin.top, 1.0 / 2.54));
        assert!(options.print_background);
        assert!(!options.landscape);
        assert!(close(options.scale, 1.0));
        assert!(!options.displays_header_footer());
    }

    #[test]
    fn partial_margin_keeps_other_defaults() {
        let options = input(r#"{"margin": {"top": "1in", "left": "10mm"}}"#)
            .resolve()
            .unwrap();
        assert!(close(options.margin.top, 1.0));
        assert!(close(options.margin.left, 10.0 / 25.4));
        assert!(close(options.margin.right, 1.0 / 2.54));
        assert!(close(options.margin.bottom, 1.0 / 2.54));
    }

    #[test]
    fn margin_units() {
        let options = input(
            r#"{"margin": {"top": "96px", "right": 48, "bottom": " 2.54 CM ", "left": "0"}}"#,
        )
        .resolve()
        .unwrap();
        assert!(close(options.margin.top, 1.0));
        assert!(close(options.margin.right, 0.5));
        assert!(close(options.margin.bottom, 1.0));
        assert!(close(options.margin.left, 0.0));
    }

    #[test]
    fn margin_numbers_with_exponents() {
        let options = input(r#"{"margin": {"top": "1e1mm", "left": "2.5E-1in"}}"#)
            .resolve()
            .unwrap();
        assert!(close(options.margin.top, 10.0 / 25.4));
        assert!(close(options.margin.left, 0.25));
    }

    #[test]
    fn rejects_bad_margins() {
        for bad in [
            r#""1pt""#,
            r#""abc""#,
            r#""-1cm""#,
            r#""""#,
            r#""cm""#,
            r#""nan""#,
        ] {
            let json = format!(r#"{{"margin": {{"top": {bad}}}}}"#);
            let err = input(&json).resolve().unwrap_err();
            assert!(
                matches!(err, InputError::InvalidMargin { side: "top", .. }),
                "{bad} -> {err}"
            );
        }
    }

    #[test]
    fn format_is_case_insensitive() {
        let options = input(r#"{"format": "letter", "landscape": true}"#)
            .resolve()
            .unwrap();
        assert_eq!(options.format, PaperFormat::Letter);
        assert!(options.landscape);
        assert_eq!("a3".parse::<PaperFormat>().unwrap(), PaperFormat::A3);
    }

    #[test]
    fn rejects_unknown_format() {
        let err = input(r#"{"format": "B5"}"#).resolve().unwrap_err();
        assert_eq!(err.to_string(), "Unknown paper format: B5");
    }

    #[test]
    fn scale_bounds() {
        assert!(input(r#"{"scale": 0.1}"#).resolve().is_ok());
        assert!(input(r#"{"scale": 2.0}"#).resolve().is_ok());
        assert!(matches!(
            input(r#"{"scale": 2.5}"#).resolve(),
            Err(InputError::ScaleOutOfRange(_))
        ));
        assert!(input(r#"{"scale": 0}"#).resolve().is_err());
    }

    #[test]
    fn templates_enable_header_footer() {
        let options = PdfOptions::default().with_templates(None, Some("<span></span>"));
        assert!(options.displays_header_footer());
        assert_eq!(options.header_template, None);
    }

    #[test]
    fn ledger_is_landscape_tabloid() {
        let (w, h) = PaperFormat::Ledger.size_inches();
        assert_eq!((h, w), PaperFormat::Tabloid.size_inches());
    }
}
