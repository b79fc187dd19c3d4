//! Per-instrument validation rules

use crate::{BadImageReason, ImageMetadata};

/// Default minimum data completeness for AIA frames, in percent
pub const DEFAULT_MIN_PERCENTD: f64 = 75.0;

/// Thresholds applied to parsed headers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationRules {
    /// AIA frames with a lower `PERCENTD` are rejected
    pub min_percentd: f64,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_percentd: DEFAULT_MIN_PERCENTD,
        }
    }
}

impl ValidationRules {
    /// Check an image, returning the rejection reason if it is bad
    pub fn check(&self, image: &ImageMetadata) -> Result<(), BadImageReason> {
        match image.instrument.to_ascii_uppercase().as_str() {
            "AIA" => self.check_aia(image),
            "LASCO" => check_lasco(image),
            _ => Ok(()),
        }
    }

    fn check_aia(&self, image: &ImageMetadata) -> Result<(), BadImageReason> {
        if image
            .header_value("IMG_TYPE")
            .is_some_and(|t| t.eq_ignore_ascii_case("DARK"))
        {
            return Err(BadImageReason::Dark);
        }

        // Frames without PERCENTD are accepted.
        if let Some(percent) = image
            .header_value("PERCENTD")
            .and_then(|p| p.parse::<f64>().ok())
        {
            if percent < self.min_percentd {
                return Err(BadImageReason::PercentD);
            }
        }

        Ok(())
    }
}

fn check_lasco(image: &ImageMetadata) -> Result<(), BadImageReason> {
    let Some(scale) = image
        .header_value("HCOMP_SF")
        .and_then(|v| v.parse::<f64>().ok())
    else {
        return Ok(());
    };

    let wrong = match image.detector.to_ascii_uppercase().as_str() {
        "C2" => scale == 32.0,
        "C3" => scale == 64.0,
        _ => false,
    };

    if wrong {
        Err(BadImageReason::WrongMask)
    } else {
        Ok(())
    }
}
