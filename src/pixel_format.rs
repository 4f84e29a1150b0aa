//! Symbolic pixel formats and their bijection with raw driver codes.
//!
//! The multimedia stack reports pixel formats as small integers. Only a
//! closed set of them is understood here; anything else is a lookup error so
//! an out-of-date table shows up immediately instead of being papered over
//! with a default.

use crate::assert_invariant;
use crate::errors::CameraError;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PixelFormat {
    #[serde(rename = "RGB24")]
    Rgb24,
    #[serde(rename = "BGR24")]
    Bgr24,
    #[serde(rename = "YUV422P")]
    Yuv422p,
    #[serde(rename = "JPG")]
    Jpg,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 4] = [
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Yuv422p,
        PixelFormat::Jpg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
            PixelFormat::Yuv422p => "YUV422P",
            PixelFormat::Jpg => "JPG",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::ALL
            .iter()
            .copied()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CameraError::UnknownPixelFormatName(s.to_string()))
    }
}

/// Forward table: driver code to symbolic format.
const KNOWN_CODES: [(u32, PixelFormat); 4] = [
    (4, PixelFormat::Rgb24),
    (11, PixelFormat::Bgr24),
    (18, PixelFormat::Yuv422p),
    (30, PixelFormat::Jpg),
];

/// Both directions of the code table, built once and never mutated.
pub struct PixelFormatTable {
    by_code: HashMap<u32, PixelFormat>,
    by_format: HashMap<PixelFormat, u32>,
}

impl PixelFormatTable {
    fn build(entries: &[(u32, PixelFormat)]) -> Self {
        let by_code: HashMap<u32, PixelFormat> = entries.iter().copied().collect();
        let by_format: HashMap<PixelFormat, u32> = by_code
            .iter()
            .map(|(code, format)| (*format, *code))
            .collect();

        assert_invariant!(
            by_code.len() == entries.len() && by_format.len() == by_code.len(),
            "Pixel format table is a bijection",
            "pixel_format::build"
        );

        Self { by_code, by_format }
    }

    pub fn name_of(&self, code: u32) -> Result<PixelFormat, CameraError> {
        self.by_code
            .get(&code)
            .copied()
            .ok_or(CameraError::UnknownPixelFormat(code))
    }

    pub fn code_of(&self, format: PixelFormat) -> u32 {
        // Every enum variant is in KNOWN_CODES, checked at build time.
        self.by_format[&format]
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

lazy_static! {
    static ref TABLE: PixelFormatTable = {
        let table = PixelFormatTable::build(&KNOWN_CODES);
        assert_invariant!(
            PixelFormat::ALL.iter().all(|f| table.by_format.contains_key(f)),
            "Every pixel format has a driver code",
            "pixel_format::TABLE"
        );
        table
    };
}

pub fn table() -> &'static PixelFormatTable {
    &TABLE
}

/// Symbolic format for a raw driver code.
pub fn name_of(code: u32) -> Result<PixelFormat, CameraError> {
    TABLE.name_of(code)
}

/// Raw driver code for a symbolic format.
pub fn code_of(format: PixelFormat) -> u32 {
    TABLE.code_of(format)
}
