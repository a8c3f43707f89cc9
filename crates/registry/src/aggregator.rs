//! Query-time aggregators: re-combine per-minute channel tuples into
//! wider windows for archive queries and archive watchers (spec.md §4.2).
//!
//! Every registered family gets a working aggregator, including
//! `Averager` — the source left its averager aggregator an unfinished
//! stub (`aggregator: nil // TODO`); this port completes it, since
//! `Log`/`Watch` are generic operations required to work uniformly
//! across families.

use crate::family::Family;
use crate::state::timer_stats;

/// Aggregates a sequence of per-minute channel tuples into one windowed
/// value per feed channel. `feed_channels` lists which of the family's
/// channels (by index) must be supplied to `put`/`init` — always the
/// full working set a family needs internally, not necessarily the
/// subset the caller asked to see; callers project `get()`'s output
/// onto their requested channel indices themselves.
pub trait Aggregator: Send {
    fn feed_channels(&self) -> &[usize];
    fn init(&mut self, data: &[f64]);
    fn put(&mut self, data: &[f64]);
    fn get(&mut self) -> Vec<f64>;
}

pub struct CounterAggregator {
    sum: f64,
}

impl Aggregator for CounterAggregator {
    fn feed_channels(&self) -> &[usize] {
        &[0]
    }
    fn init(&mut self, _data: &[f64]) {
        self.sum = 0.0;
    }
    fn put(&mut self, data: &[f64]) {
        self.sum += data[0];
    }
    fn get(&mut self) -> Vec<f64> {
        let sum = self.sum;
        self.sum = 0.0;
        vec![sum]
    }
}

pub struct GaugeAggregator {
    value: f64,
}

impl Aggregator for GaugeAggregator {
    fn feed_channels(&self) -> &[usize] {
        &[0]
    }
    fn init(&mut self, data: &[f64]) {
        self.value = data[0];
    }
    fn put(&mut self, data: &[f64]) {
        self.value = data[0];
    }
    fn get(&mut self) -> Vec<f64> {
        vec![self.value]
    }
}

/// Re-weights a sequence of per-minute `[avg, cnt]` tuples into one
/// combined average over the whole window, resetting on read like the
/// counter aggregator.
pub struct AveragerAggregator {
    sum: f64,
    count: f64,
}

impl Aggregator for AveragerAggregator {
    fn feed_channels(&self) -> &[usize] {
        &[0, 1]
    }
    fn init(&mut self, _data: &[f64]) {
        self.sum = 0.0;
        self.count = 0.0;
    }
    fn put(&mut self, data: &[f64]) {
        let (avg, cnt) = (data[0], data[1]);
        if cnt > 0.0 && !avg.is_nan() {
            self.sum += avg * cnt;
            self.count += cnt;
        }
    }
    fn get(&mut self) -> Vec<f64> {
        let (sum, count) = (self.sum, self.count);
        self.sum = 0.0;
        self.count = 0.0;
        if count > 0.0 {
            vec![sum / count, count]
        } else {
            vec![f64::NAN, 0.0]
        }
    }
}

pub struct AccumulatorAggregator {
    value: f64,
}

impl Aggregator for AccumulatorAggregator {
    fn feed_channels(&self) -> &[usize] {
        &[0]
    }
    fn init(&mut self, data: &[f64]) {
        self.value = data[0];
    }
    fn put(&mut self, data: &[f64]) {
        self.value = data[0];
    }
    fn get(&mut self) -> Vec<f64> {
        vec![self.value]
    }
}

pub struct MeterAggregator {
    sum: f64,
}

impl Aggregator for MeterAggregator {
    fn feed_channels(&self) -> &[usize] {
        &[0]
    }
    fn init(&mut self, _data: &[f64]) {
        self.sum = 0.0;
    }
    fn put(&mut self, data: &[f64]) {
        self.sum += data[0];
    }
    fn get(&mut self) -> Vec<f64> {
        let sum = self.sum;
        self.sum = 0.0;
        vec![sum]
    }
}

/// Re-feeds already-computed 5-stat tuples as new weighted samples,
/// exactly as the source's `timerAggregator` does (each of the five
/// positional stats is weighted by the minute's sample count).
pub struct TimerAggregator {
    data: Vec<f64>,
    cnt: Vec<f64>,
}

impl Aggregator for TimerAggregator {
    fn feed_channels(&self) -> &[usize] {
        &[0, 1, 2, 3, 4, 5]
    }
    fn init(&mut self, _data: &[f64]) {
        self.data.clear();
        self.cnt.clear();
    }
    fn put(&mut self, data: &[f64]) {
        let cnt = data[5];
        if cnt <= 0.0 || data[0].is_nan() {
            return;
        }
        self.data.extend_from_slice(&data[0..5]);
        self.cnt.extend(std::iter::repeat(cnt).take(5));
    }
    fn get(&mut self) -> Vec<f64> {
        let mut stats = timer_stats(&self.data, &self.cnt);
        stats[5] /= 5.0;
        self.data.clear();
        self.cnt.clear();
        stats
    }
}

/// Builds a fresh query-time aggregator for `family`, working over its
/// full channel set (see [`Aggregator::feed_channels`]).
pub fn create_aggregator(family: Family) -> Box<dyn Aggregator> {
    match family {
        Family::Counter => Box::new(CounterAggregator { sum: 0.0 }),
        Family::Gauge => Box::new(GaugeAggregator { value: f64::NAN }),
        Family::Averager => Box::new(AveragerAggregator {
            sum: 0.0,
            count: 0.0,
        }),
        Family::Timer => Box::new(TimerAggregator {
            data: Vec::new(),
            cnt: Vec::new(),
        }),
        Family::Accumulator => Box::new(AccumulatorAggregator { value: 0.0 }),
        Family::Meter => Box::new(MeterAggregator { sum: 0.0 }),
    }
}
