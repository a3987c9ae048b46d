use num::{rational::Ratio, Zero};
use serde::{Deserialize, Serialize};

use crate::meter::OnsetLevel;
use crate::range::ChordRange;
use crate::{Error, Result};

/// Exact musical time, in whole notes.
pub type Rational = Ratio<i64>;

/// One input step: an onset with the notes that start or sound there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub onset: Rational,
    /// Distance to the next frame's onset (or to the piece end for the last one).
    pub duration: Rational,
    #[serde(default)]
    pub level: OnsetLevel,
    /// MIDI note numbers sounding at this frame.
    #[serde(default)]
    pub pitches: Vec<u8>,
    /// Lowest sounding MIDI note, when the producer knows it separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bass: Option<u8>,
}

impl Frame {
    pub fn new(onset: Rational, duration: Rational, level: OnsetLevel, pitches: Vec<u8>) -> Self {
        Self {
            onset,
            duration,
            level,
            pitches,
            bass: None,
        }
    }

    /// Bit mask over the 12 pitch classes present in this frame.
    pub fn pitch_class_mask(&self) -> u16 {
        self.pitches
            .iter()
            .fold(0u16, |mask, &p| mask | 1 << (p % 12))
    }

    pub fn bass_pitch_class(&self) -> Option<u8> {
        self.bass
            .or_else(|| self.pitches.iter().copied().min())
            .map(|p| p % 12)
    }

    /// Duration as a float, used to weight pitch evidence.
    pub fn weight(&self) -> f64 {
        *self.duration.numer() as f64 / *self.duration.denom() as f64
    }
}

/// Ordered, immutable sequence of frames for one piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Frame>", into = "Vec<Frame>")]
pub struct Timeline {
    frames: Vec<Frame>,
}

impl Timeline {
    pub fn new(frames: Vec<Frame>) -> Result<Self> {
        if frames.is_empty() {
            return Err(Error::Timeline {
                frame: 0,
                detail: "no frames".into(),
            });
        }

        for (index, frame) in frames.iter().enumerate() {
            if frame.duration < Rational::zero() {
                return Err(Error::Timeline {
                    frame: index,
                    detail: format!("negative duration {}", frame.duration),
                });
            }
            if let Some(&pitch) = frame.pitches.iter().find(|&&p| p > 127) {
                return Err(Error::Timeline {
                    frame: index,
                    detail: format!("pitch {pitch} outside MIDI range"),
                });
            }
            if index > 0 && frame.onset < frames[index - 1].onset {
                return Err(Error::Timeline {
                    frame: index,
                    detail: format!(
                        "onset {} precedes previous onset {}",
                        frame.onset,
                        frames[index - 1].onset
                    ),
                });
            }
        }

        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Frames covered by a range. Ranges past the end are clipped.
    pub fn window(&self, range: ChordRange) -> &[Frame] {
        let end = range.end.min(self.frames.len());
        let start = range.start.min(end);
        &self.frames[start..end]
    }

    /// Duration from each frame's onset to the following frame's onset.
    pub fn duration_cache(&self) -> Vec<Rational> {
        self.frames.iter().map(|f| f.duration).collect()
    }

    pub fn duration_of(&self, range: ChordRange) -> Rational {
        self.window(range)
            .iter()
            .fold(Rational::zero(), |acc, f| acc + f.duration)
    }
}

impl TryFrom<Vec<Frame>> for Timeline {
    type Error = Error;

    fn try_from(frames: Vec<Frame>) -> Result<Self> {
        Timeline::new(frames)
    }
}

impl From<Timeline> for Vec<Frame> {
    fn from(timeline: Timeline) -> Self {
        timeline.frames
    }
}
