use std::str::FromStr;

use num::Zero;
use serde::{Deserialize, Serialize};

use crate::timeline::Rational;
use crate::{Error, Result};

/// Metrical strength of an onset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OnsetLevel {
    #[default]
    Lower,
    SubBeat,
    Beat,
    Downbeat,
}

impl OnsetLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            OnsetLevel::Lower => 0,
            OnsetLevel::SubBeat => 1,
            OnsetLevel::Beat => 2,
            OnsetLevel::Downbeat => 3,
        }
    }
}

/// A time signature. Lengths are in whole notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meter {
    pub numerator: u8,
    pub denominator: u8,
}

impl Meter {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Compound meters (6/8, 9/8, 12/8) group three sub-beats into a beat.
    pub fn is_compound(&self) -> bool {
        self.numerator > 3 && self.numerator % 3 == 0
    }

    /// `(measure, beat, sub_beat)` lengths.
    pub fn level_lengths(&self) -> (Rational, Rational, Rational) {
        let measure = Rational::new(self.numerator as i64, self.denominator as i64);
        if self.is_compound() {
            let sub_beat = Rational::new(1, self.denominator as i64);
            (measure, sub_beat * 3, sub_beat)
        } else {
            let beat = Rational::new(1, self.denominator as i64);
            (measure, beat, beat / 2)
        }
    }

    /// Level of an onset `beat` whole notes after the start of its measure.
    ///
    /// `pickup_offset` shifts partial (anacrusis) measures so their onsets
    /// line up with a full measure's grid.
    pub fn level_of(&self, beat: Rational, pickup_offset: Rational) -> OnsetLevel {
        let (measure, beat_len, sub_beat_len) = self.level_lengths();
        let position = beat + pickup_offset;

        if (position % measure).is_zero() {
            OnsetLevel::Downbeat
        } else if (position % beat_len).is_zero() {
            OnsetLevel::Beat
        } else if (position % sub_beat_len).is_zero() {
            OnsetLevel::SubBeat
        } else {
            OnsetLevel::Lower
        }
    }
}

impl FromStr for Meter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::MalformedAnnotation {
            piece: String::new(),
            detail: format!("invalid time signature {s:?}"),
        };
        let (num, den) = s.split_once('/').ok_or_else(malformed)?;
        let numerator: u8 = num.trim().parse().map_err(|_| malformed())?;
        let denominator: u8 = den.trim().parse().map_err(|_| malformed())?;
        if numerator == 0 || denominator == 0 {
            return Err(malformed());
        }
        Ok(Meter::new(numerator, denominator))
    }
}
