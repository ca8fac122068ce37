//! Call sets: predicates over call indices.
//!
//! A [`CallSet`] selects which calls an action (snapshot, compare) applies
//! to. It is either a named *frequency* — every frame-ending call, every
//! draw call — or a union of inclusive index ranges.
//!
//! # Textual form
//!
//! ```text
//! frame            every frame-ending or render-target-swapping call
//! draw             every draw call
//! 4                the single call 4
//! 2-8              calls 2..=8
//! 100-             calls 100 and up
//! -50              calls up to 50
//! 1,5-9,40-        unions, comma-separated
//! ```
//!
//! An empty set contains nothing; the replay pipeline treats empty
//! snapshot/compare sets as "feature off".

use crate::trace::Call;
use std::fmt;
use std::str::FromStr;

/// Named call frequencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Freq {
    /// Index test only.
    All,
    /// Calls after which the visible image is complete: frame ends and
    /// render-target swaps. This is what per-frame snapshotting needs —
    /// an offscreen target rebind discards an image just as a swap does.
    Frame,
    /// Draw calls (RENDER flag).
    Draw,
}

/// One inclusive index range with a frequency filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CallRange {
    start: u32,
    stop: u32,
    freq: Freq,
}

impl CallRange {
    fn contains(&self, call: &Call) -> bool {
        if call.no < self.start || call.no > self.stop {
            return false;
        }
        match self.freq {
            Freq::All => true,
            Freq::Frame => call.ends_frame() || call.swaps_render_target(),
            Freq::Draw => call.is_draw(),
        }
    }
}

/// Union of index ranges and named frequencies.
///
/// `Default` is the empty set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallSet {
    items: Vec<CallRange>,
}

impl CallSet {
    /// The empty set: contains no call.
    pub fn empty() -> CallSet {
        CallSet::default()
    }

    /// Every frame-ending or render-target-swapping call.
    pub fn frame() -> CallSet {
        CallSet {
            items: vec![CallRange {
                start: 0,
                stop: u32::MAX,
                freq: Freq::Frame,
            }],
        }
    }

    /// Every draw call.
    pub fn draw() -> CallSet {
        CallSet {
            items: vec![CallRange {
                start: 0,
                stop: u32::MAX,
                freq: Freq::Draw,
            }],
        }
    }

    /// True for the empty set.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Membership test.
    pub fn contains(&self, call: &Call) -> bool {
        self.items.iter().any(|range| range.contains(call))
    }
}

/// Parse failure for the textual call-set form.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CallSetParseError {
    /// The set string (or one comma item) is empty.
    Empty,
    /// A range bound is not a decimal `u32`.
    BadNumber { item: String },
    /// A range has more than one `-`, or `start > stop`.
    BadRange { item: String },
}

impl fmt::Display for CallSetParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty call set"),
            Self::BadNumber { item } => write!(f, "bad call number in {item:?}"),
            Self::BadRange { item } => write!(f, "bad call range {item:?}"),
        }
    }
}

impl std::error::Error for CallSetParseError {}

fn parse_bound(text: &str, item: &str) -> Result<u32, CallSetParseError> {
    text.parse::<u32>().map_err(|_| CallSetParseError::BadNumber {
        item: item.to_string(),
    })
}

fn parse_range(item: &str) -> Result<CallRange, CallSetParseError> {
    let item = item.trim();
    if item.is_empty() {
        return Err(CallSetParseError::Empty);
    }
    let range = match item.split_once('-') {
        None => {
            let no = parse_bound(item, item)?;
            CallRange {
                start: no,
                stop: no,
                freq: Freq::All,
            }
        }
        Some((start, stop)) => {
            if stop.contains('-') {
                return Err(CallSetParseError::BadRange {
                    item: item.to_string(),
                });
            }
            let start = if start.is_empty() {
                0
            } else {
                parse_bound(start, item)?
            };
            let stop = if stop.is_empty() {
                u32::MAX
            } else {
                parse_bound(stop, item)?
            };
            CallRange {
                start,
                stop,
                freq: Freq::All,
            }
        }
    };
    if range.start > range.stop {
        return Err(CallSetParseError::BadRange {
            item: item.to_string(),
        });
    }
    Ok(range)
}

impl FromStr for CallSet {
    type Err = CallSetParseError;

    fn from_str(spec: &str) -> Result<CallSet, CallSetParseError> {
        let spec = spec.trim();
        match spec {
            "" => Err(CallSetParseError::Empty),
            "frame" => Ok(CallSet::frame()),
            "draw" => Ok(CallSet::draw()),
            _ => {
                let items = spec
                    .split(',')
                    .map(parse_range)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CallSet { items })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Call, CallOp};

    fn draw(no: u32) -> Call {
        Call::new(no, 0, CallOp::Clear { color: [0; 4] })
    }

    fn present(no: u32) -> Call {
        Call::new(no, 0, CallOp::Present)
    }

    fn viewport(no: u32) -> Call {
        Call::new(
            no,
            0,
            CallOp::Viewport {
                width: 1,
                height: 1,
            },
        )
    }

    #[test]
    fn empty_contains_nothing() {
        let set = CallSet::empty();
        assert!(set.is_empty());
        assert!(!set.contains(&present(1)));
    }

    #[test]
    fn frame_frequency_matches_visible_image_changes() {
        let set: CallSet = "frame".parse().unwrap();
        assert!(set.contains(&present(7)));
        assert!(set.contains(&Call::new(3, 0, CallOp::FrameEnd)));
        assert!(set.contains(&Call::new(4, 0, CallOp::BindTarget { target: 2 })));
        assert!(!set.contains(&draw(7)));
    }

    #[test]
    fn draw_frequency_matches_render_calls() {
        let set: CallSet = "draw".parse().unwrap();
        assert!(set.contains(&draw(1)));
        assert!(!set.contains(&viewport(1)));
        assert!(!set.contains(&present(1)));
    }

    #[test]
    fn range_forms() {
        let set: CallSet = "4".parse().unwrap();
        assert!(set.contains(&viewport(4)));
        assert!(!set.contains(&viewport(5)));

        let set: CallSet = "2-8".parse().unwrap();
        assert!(set.contains(&viewport(2)));
        assert!(set.contains(&viewport(8)));
        assert!(!set.contains(&viewport(9)));

        let set: CallSet = "100-".parse().unwrap();
        assert!(!set.contains(&viewport(99)));
        assert!(set.contains(&viewport(u32::MAX)));

        let set: CallSet = "-50".parse().unwrap();
        assert!(set.contains(&viewport(0)));
        assert!(!set.contains(&viewport(51)));
    }

    #[test]
    fn union_of_items() {
        let set: CallSet = "1,5-9,40-".parse().unwrap();
        assert!(set.contains(&viewport(1)));
        assert!(!set.contains(&viewport(2)));
        assert!(set.contains(&viewport(6)));
        assert!(set.contains(&viewport(41)));
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<CallSet>(), Err(CallSetParseError::Empty));
        assert!(matches!(
            "x".parse::<CallSet>(),
            Err(CallSetParseError::BadNumber { .. })
        ));
        assert!(matches!(
            "9-1".parse::<CallSet>(),
            Err(CallSetParseError::BadRange { .. })
        ));
        assert!(matches!(
            "1-2-3".parse::<CallSet>(),
            Err(CallSetParseError::BadRange { .. })
        ));
    }
}
