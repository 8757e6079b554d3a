//! Gap-tracking duplicate detection for one publisher message chain.
//!
//! The detector keeps an ascending list of half-open gaps `(lower, upper]`
//! that may still hold unseen messages. The newest gap is always open-ended
//! (`upper == NumberPair::MAX`). A message `(previous, current]` is unseen
//! exactly when it fits inside one gap; marking it shrinks, splits or
//! removes that gap.

use std::collections::VecDeque;
use std::fmt;

use super::number_pair::NumberPair;
use crate::events::DetectorError;

/// Default bound on tracked gaps per message chain.
pub const DEFAULT_MAX_NUMBER_OF_GAPS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gap {
    lower: NumberPair,
    upper: NumberPair,
}

#[derive(Debug, Clone)]
pub struct DuplicateMessageDetector {
    max_number_of_gaps: usize,
    gaps: VecDeque<Gap>,
}

impl DuplicateMessageDetector {
    pub fn new(max_number_of_gaps: usize) -> Self {
        Self {
            max_number_of_gaps,
            gaps: VecDeque::new(),
        }
    }

    /// Mark `(previous, current]` as seen.
    ///
    /// Returns `Ok(true)` when the message had not been seen before and
    /// `Ok(false)` for a duplicate. Errors leave the state untouched.
    pub fn mark_and_check(
        &mut self,
        previous: Option<NumberPair>,
        current: NumberPair,
    ) -> Result<bool, DetectorError> {
        if let Some(previous) = previous {
            if previous >= current {
                return Err(DetectorError::InvalidNumbering { previous, current });
            }
        }

        if self.gaps.is_empty() {
            self.gaps.push_back(Gap {
                lower: current,
                upper: NumberPair::MAX,
            });
            return Ok(true);
        }

        // Without a reference only the open-ended gap can be advanced.
        let Some(previous) = previous else {
            return Ok(match self.gaps.back_mut() {
                Some(last) if current > last.lower => {
                    last.lower = current;
                    true
                }
                _ => false,
            });
        };

        for i in (0..self.gaps.len()).rev() {
            let Gap { lower, upper } = self.gaps[i];
            if previous >= upper {
                return Ok(false);
            }
            if lower >= current {
                continue;
            }
            if previous >= lower && upper >= current {
                match (previous == lower, current == upper) {
                    (true, true) => {
                        self.gaps.remove(i);
                    }
                    (true, false) => self.gaps[i].lower = current,
                    (false, true) => self.gaps[i].upper = previous,
                    (false, false) => {
                        self.gaps[i].upper = previous;
                        self.gaps.insert(
                            i + 1,
                            Gap {
                                lower: current,
                                upper,
                            },
                        );
                    }
                }
                if self.gaps.len() > self.max_number_of_gaps {
                    self.gaps.pop_front();
                }
                return Ok(true);
            }
            return Err(DetectorError::GapMisMatch {
                state: self.to_string(),
                previous,
                current,
            });
        }
        Ok(false)
    }

    pub fn number_of_gaps(&self) -> usize {
        self.gaps.len()
    }
}

impl Default for DuplicateMessageDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NUMBER_OF_GAPS)
    }
}

impl fmt::Display for DuplicateMessageDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, gap) in self.gaps.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "({}, {}]", gap.lower, gap.upper)?;
        }
        Ok(())
    }
}
