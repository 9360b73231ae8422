//! Discount-code normalization.
//!
//! Every adapter maps its provider's promotion tag onto [`Promotion`] so
//! records from different sites compare on the same volume factors.

use serde::{Deserialize, Serialize};

/// Provider promotion codes, as sent by API-key sites in `status.discount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Discount {
    #[default]
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "_2X_FREE")]
    DoubleFree,
    #[serde(rename = "_2X_PERCENT_50")]
    DoubleHalf,
    #[serde(rename = "_2X")]
    Double,
    #[serde(rename = "PERCENT_50")]
    Half,
    #[serde(rename = "PERCENT_30")]
    Thirty,
    #[serde(rename = "FREE")]
    Free,
}

/// Canonical promotion fields carried by every record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub free: bool,
    #[serde(rename = "2xfree")]
    pub double_free: bool,
    pub download_factor: f64,
    pub upload_factor: f64,
}

impl Default for Promotion {
    fn default() -> Self {
        Discount::Normal.factors()
    }
}

impl Discount {
    pub const ALL: [Discount; 7] = [
        Discount::Normal,
        Discount::DoubleFree,
        Discount::DoubleHalf,
        Discount::Double,
        Discount::Half,
        Discount::Thirty,
        Discount::Free,
    ];

    /// Parse a wire code. Unknown or missing codes are treated as NORMAL.
    pub fn parse(code: &str) -> Self {
        match code.trim() {
            "_2X_FREE" => Discount::DoubleFree,
            "_2X_PERCENT_50" => Discount::DoubleHalf,
            "_2X" => Discount::Double,
            "PERCENT_50" => Discount::Half,
            "PERCENT_30" => Discount::Thirty,
            "FREE" => Discount::Free,
            _ => Discount::Normal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Discount::Normal => "NORMAL",
            Discount::DoubleFree => "_2X_FREE",
            Discount::DoubleHalf => "_2X_PERCENT_50",
            Discount::Double => "_2X",
            Discount::Half => "PERCENT_50",
            Discount::Thirty => "PERCENT_30",
            Discount::Free => "FREE",
        }
    }

    pub fn factors(&self) -> Promotion {
        let (free, double_free, download_factor, upload_factor) = match self {
            Discount::Normal => (false, false, 1.0, 1.0),
            Discount::DoubleFree => (true, true, 0.0, 2.0),
            Discount::DoubleHalf => (true, true, 0.5, 2.0),
            Discount::Double => (true, true, 1.0, 2.0),
            Discount::Half => (false, false, 0.5, 1.0),
            Discount::Thirty => (false, false, 0.3, 1.0),
            Discount::Free => (true, false, 0.0, 1.0),
        };
        Promotion {
            free,
            double_free,
            download_factor,
            upload_factor,
        }
    }
}

/// Shorthand for `Discount::parse(code).factors()`, tolerating a missing code.
pub fn normalize(code: Option<&str>) -> Promotion {
    code.map(Discount::parse).unwrap_or_default().factors()
}

/// Promotion derived from raw volume factors, as listed by HTML sites.
pub fn from_factors(download_factor: f64, upload_factor: f64) -> Promotion {
    let double = upload_factor >= 2.0;
    Promotion {
        free: download_factor == 0.0 || double,
        double_free: double,
        download_factor,
        upload_factor,
    }
}
