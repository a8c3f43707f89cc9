//! Compile-time per-family metadata: channels, defaults, persistence.
//!
//! `persist` governs seeding only — whether a fresh/restored entry's
//! running state is primed from the channel's last datastore value via
//! `LatestBefore` (see `entry::seed_values`). Every channel is written
//! to the datastore on a minute that received input regardless of
//! `persist`; only gauge and accumulator hold state across minutes in
//! a form their own last output can seed back into.

use crate::family::Family;

/// Static description of one family's output channels.
pub struct FamilyDescriptor {
    pub channels: &'static [&'static str],
    pub defaults: &'static [f64],
    pub persist: &'static [bool],
}

const NAN: f64 = f64::NAN;

const COUNTER: FamilyDescriptor = FamilyDescriptor {
    channels: &["counter"],
    defaults: &[0.0],
    persist: &[false],
};

const GAUGE: FamilyDescriptor = FamilyDescriptor {
    channels: &["gauge"],
    defaults: &[0.0],
    persist: &[true],
};

const AVERAGER: FamilyDescriptor = FamilyDescriptor {
    channels: &["avg", "avg-cnt"],
    defaults: &[NAN, 0.0],
    persist: &[false, false],
};

const TIMER: FamilyDescriptor = FamilyDescriptor {
    channels: &[
        "timer-min",
        "timer-quart1",
        "timer-median",
        "timer-quart3",
        "timer-max",
        "timer-cnt",
    ],
    defaults: &[NAN, NAN, NAN, NAN, NAN, 0.0],
    persist: &[false, false, false, false, false, false],
};

const ACCUMULATOR: FamilyDescriptor = FamilyDescriptor {
    channels: &["acc"],
    defaults: &[0.0],
    persist: &[true],
};

const METER: FamilyDescriptor = FamilyDescriptor {
    channels: &["meter"],
    defaults: &[0.0],
    persist: &[false],
};

/// Returns the static descriptor for a family.
pub fn descriptor(family: Family) -> &'static FamilyDescriptor {
    match family {
        Family::Counter => &COUNTER,
        Family::Gauge => &GAUGE,
        Family::Averager => &AVERAGER,
        Family::Timer => &TIMER,
        Family::Accumulator => &ACCUMULATOR,
        Family::Meter => &METER,
    }
}
