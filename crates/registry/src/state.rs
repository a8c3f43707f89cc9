//! Per-metric state machines: `init`, `inject`, `tick`, `flush`.
//!
//! Mirrors the source's narrow `metric` interface. Each family owns its
//! accumulators; `tick` contributes to the running minute, `flush`
//! finalizes it (spec.md §4.2).

use metricsd_core::{Error, Result};

/// Narrow vtable shared by every metric family's live state.
pub trait MetricState: Send {
    /// Seeds the state from the family's defaults or restored values,
    /// one per channel in declaration order.
    fn init(&mut self, data: &[f64]);
    /// Applies one measurement. Only `Meter` can reject (negative value).
    fn inject(&mut self, value: f64, sample_rate: f64) -> Result<()>;
    /// Per-second snapshot, one value per channel.
    fn tick(&mut self) -> Vec<f64>;
    /// Per-minute snapshot; resets the minute accumulator.
    fn flush(&mut self) -> Vec<f64>;
}

#[derive(Default)]
pub struct CounterState {
    tick_sum: f64,
    sum: f64,
}

impl MetricState for CounterState {
    fn init(&mut self, data: &[f64]) {
        self.sum = data[0];
        self.tick_sum = 0.0;
    }
    fn inject(&mut self, value: f64, sample_rate: f64) -> Result<()> {
        self.tick_sum += value / sample_rate;
        Ok(())
    }
    fn tick(&mut self) -> Vec<f64> {
        let sum = self.tick_sum;
        self.sum += sum;
        self.tick_sum = 0.0;
        vec![sum]
    }
    fn flush(&mut self) -> Vec<f64> {
        let sum = self.sum;
        self.sum = 0.0;
        vec![sum]
    }
}

#[derive(Default)]
pub struct GaugeState {
    value: f64,
}

impl MetricState for GaugeState {
    fn init(&mut self, data: &[f64]) {
        self.value = data[0];
    }
    fn inject(&mut self, value: f64, _sample_rate: f64) -> Result<()> {
        self.value = value;
        Ok(())
    }
    fn tick(&mut self) -> Vec<f64> {
        vec![self.value]
    }
    fn flush(&mut self) -> Vec<f64> {
        vec![self.value]
    }
}

#[derive(Default)]
pub struct AveragerState {
    tick_sum: f64,
    tick_count: f64,
    sum: f64,
    count: f64,
}

impl MetricState for AveragerState {
    fn init(&mut self, data: &[f64]) {
        self.sum = if data[1] > 0.0 { data[0] * data[1] } else { 0.0 };
        self.count = data[1];
        self.tick_sum = 0.0;
        self.tick_count = 0.0;
    }
    fn inject(&mut self, value: f64, sample_rate: f64) -> Result<()> {
        self.tick_sum += value / sample_rate;
        self.tick_count += 1.0 / sample_rate;
        Ok(())
    }
    fn tick(&mut self) -> Vec<f64> {
        let (sum, count) = (self.tick_sum, self.tick_count);
        self.tick_sum = 0.0;
        self.tick_count = 0.0;
        self.sum += sum;
        self.count += count;
        vec![sum / count, count]
    }
    fn flush(&mut self) -> Vec<f64> {
        let (sum, count) = (self.sum, self.count);
        self.sum = 0.0;
        self.count = 0.0;
        vec![sum / count, count]
    }
}

#[derive(Default)]
pub struct AccumulatorState {
    value: f64,
}

impl MetricState for AccumulatorState {
    fn init(&mut self, data: &[f64]) {
        self.value = data[0];
    }
    fn inject(&mut self, value: f64, sample_rate: f64) -> Result<()> {
        self.value += value / sample_rate;
        Ok(())
    }
    fn tick(&mut self) -> Vec<f64> {
        vec![self.value]
    }
    fn flush(&mut self) -> Vec<f64> {
        vec![self.value]
    }
}

#[derive(Default)]
pub struct MeterState {
    tick_sum: f64,
    sum: f64,
}

impl MetricState for MeterState {
    fn init(&mut self, data: &[f64]) {
        self.sum = data[0];
        self.tick_sum = 0.0;
    }
    fn inject(&mut self, value: f64, sample_rate: f64) -> Result<()> {
        if value < 0.0 {
            return Err(Error::NegativeMeter);
        }
        self.tick_sum += value / sample_rate;
        Ok(())
    }
    fn tick(&mut self) -> Vec<f64> {
        let sum = self.tick_sum;
        self.sum += sum;
        self.tick_sum = 0.0;
        vec![sum]
    }
    fn flush(&mut self) -> Vec<f64> {
        let sum = self.sum;
        self.sum = 0.0;
        vec![sum]
    }
}

#[derive(Default)]
pub struct TimerState {
    tick_data: Vec<f64>,
    tick_cnt: Vec<f64>,
    data: Vec<f64>,
    cnt: Vec<f64>,
}

impl MetricState for TimerState {
    fn init(&mut self, _data: &[f64]) {
        self.tick_data.clear();
        self.tick_cnt.clear();
        self.data.clear();
        self.cnt.clear();
    }
    fn inject(&mut self, value: f64, sample_rate: f64) -> Result<()> {
        self.tick_data.push(value);
        self.tick_cnt.push(1.0 / sample_rate);
        Ok(())
    }
    fn tick(&mut self) -> Vec<f64> {
        let stats = timer_stats(&self.tick_data, &self.tick_cnt);
        self.data.extend(self.tick_data.drain(..));
        self.cnt.extend(self.tick_cnt.drain(..));
        stats
    }
    fn flush(&mut self) -> Vec<f64> {
        let stats = timer_stats(&self.data, &self.cnt);
        self.data.clear();
        self.cnt.clear();
        stats
    }
}

/// Weighted min/quartile1/median/quartile3/max/count over `data`, each
/// sample weighted by the matching entry in `cnt` (reciprocal of its
/// sample rate). Returns all-NaN with a zero count when `data` is empty.
pub fn timer_stats(data: &[f64], cnt: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return vec![f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, 0.0];
    }

    let n: f64 = cnt.iter().sum();
    let mut pairs: Vec<(f64, f64)> = data.iter().copied().zip(cnt.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let (mut quart1, mut median, mut quart3) = (0.0, 0.0, 0.0);
    let mut m = 0.0;
    for (value, weight) in &pairs {
        if m + weight >= n * 0.25 && m < n * 0.25 {
            quart1 = *value;
        }
        if m + weight >= n * 0.50 && m < n * 0.50 {
            median = *value;
        }
        if m + weight >= n * 0.75 && m < n * 0.75 {
            quart3 = *value;
        }
        m += weight;
    }

    vec![
        pairs.first().unwrap().0,
        quart1,
        median,
        quart3,
        pairs.last().unwrap().0,
        n,
    ]
}

/// Builds a fresh per-metric state object for `family`.
pub fn create_state(family: crate::family::Family) -> Box<dyn MetricState> {
    use crate::family::Family;
    match family {
        Family::Counter => Box::new(CounterState::default()),
        Family::Gauge => Box::new(GaugeState::default()),
        Family::Averager => Box::new(AveragerState::default()),
        Family::Timer => Box::new(TimerState::default()),
        Family::Accumulator => Box::new(AccumulatorState::default()),
        Family::Meter => Box::new(MeterState::default()),
    }
}
