//! The closed set of metric families.

/// A metric family: the aggregation discipline applied to a metric name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Counter,
    Gauge,
    Averager,
    Timer,
    Accumulator,
    Meter,
}

impl Family {
    /// All registered families, in a stable order used for serialization
    /// (the live-log snapshot's `int32 family` tag is this index).
    pub const ALL: [Family; 6] = [
        Family::Counter,
        Family::Gauge,
        Family::Averager,
        Family::Timer,
        Family::Accumulator,
        Family::Meter,
    ];

    pub fn tag(self) -> i32 {
        Self::ALL.iter().position(|f| *f == self).unwrap() as i32
    }

    pub fn from_tag(tag: i32) -> Option<Family> {
        Self::ALL.get(usize::try_from(tag).ok()?).copied()
    }
}
