use crate::error::AppError;
use crate::measurement::{canonical_name, decode, Phase, Statistic};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-phase mapping from canonical measurement name to its aggregate.
pub type PhaseBucket = BTreeMap<String, AggregateValue>;

/// Cumulative device counters, remapped to canonical names.
pub type Counters = BTreeMap<String, f64>;

/// Statistical summary of one measurement across the window. `sum` is only
/// present for cumulative energy quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeAggregate {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateValue {
    Scalar(f64),
    Range(RangeAggregate),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub actual_energy: f64,
    pub actual_energy_returned: f64,
    pub actual_power: f64,
    pub actual_power_returned: f64,
}

/// The rollup of one closed window of minute samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupResult {
    pub phase_a: PhaseBucket,
    pub phase_b: PhaseBucket,
    pub phase_c: PhaseBucket,
    pub neutral: PhaseBucket,
    pub totals: Totals,
    pub counters: Counters,
    pub record_count: usize,
}

#[derive(Debug, Default)]
pub struct PhaseBuckets {
    pub phase_a: PhaseBucket,
    pub phase_b: PhaseBucket,
    pub phase_c: PhaseBucket,
    pub neutral: PhaseBucket,
}

impl PhaseBuckets {
    pub fn bucket(&self, phase: Phase) -> &PhaseBucket {
        match phase {
            Phase::A => &self.phase_a,
            Phase::B => &self.phase_b,
            Phase::C => &self.phase_c,
            Phase::Neutral => &self.neutral,
        }
    }

    fn bucket_mut(&mut self, phase: Phase) -> &mut PhaseBucket {
        match phase {
            Phase::A => &mut self.phase_a,
            Phase::B => &mut self.phase_b,
            Phase::C => &mut self.phase_c,
            Phase::Neutral => &mut self.neutral,
        }
    }
}

/// Raw (min, max, avg, sum) components collected for one (phase, measurement)
/// pair. Components may arrive in any column order; missing ones finalize to
/// zero, mirroring what the device reports for idle channels.
#[derive(Debug, Default, Clone, Copy)]
struct PartialAggregate {
    min: Option<f64>,
    max: Option<f64>,
    avg: Option<f64>,
    sum: Option<f64>,
}

impl PartialAggregate {
    fn finalize(self) -> RangeAggregate {
        RangeAggregate {
            min: self.min.unwrap_or(0.0),
            max: self.max.unwrap_or(0.0),
            avg: self.avg.unwrap_or(0.0),
            sum: self.sum,
        }
    }
}

/// Rounds to 4 decimal places, half up, on the decimal representation.
///
/// The shift happens in the printed decimal form rather than by multiplying,
/// so repeated aggregation of already-rounded values stays stable.
pub fn round4(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let shifted: f64 = format!("{value}e4").parse().unwrap_or(value * 1e4);
    let rounded = (shifted + 0.5).floor();
    format!("{rounded}e-4").parse().unwrap_or(rounded / 1e4)
}

const SYNTHESIZED_SUFFIXES: [&str; 2] = ["act_power", "aprt_power"];

/// Appends a `<phase>_avg_<suffix>` column halfway between the min and max
/// columns wherever the device omitted the average. Running it again is a
/// no-op because the average column then exists.
pub fn synthesize_columns(keys: &mut Vec<String>, values: &mut Vec<Vec<f64>>) {
    for prefix in ["a", "b", "c"] {
        for suffix in SYNTHESIZED_SUFFIXES {
            let avg_key = format!("{prefix}_avg_{suffix}");
            if keys.iter().any(|k| *k == avg_key) {
                continue;
            }

            let min_index = keys.iter().position(|k| *k == format!("{prefix}_min_{suffix}"));
            let max_index = keys.iter().position(|k| *k == format!("{prefix}_max_{suffix}"));
            if let (Some(min_index), Some(max_index)) = (min_index, max_index) {
                keys.push(avg_key);
                for row in values.iter_mut() {
                    row.push((row[max_index] + row[min_index]) / 2.0);
                }
            }
        }
    }
}

/// Folds the decoded columns into per-phase buckets. Columns whose first
/// fragment is not a phase prefix are skipped. Every row must be as wide as
/// `keys`; `rollup` checks this before calling.
pub fn accumulate(keys: &[String], values: &[Vec<f64>]) -> PhaseBuckets {
    let mut partials: BTreeMap<(Phase, String), PartialAggregate> = BTreeMap::new();
    let mut scalars: Vec<(Phase, String, f64)> = Vec::new();

    for (n, key) in keys.iter().enumerate() {
        let Some(decoded) = decode(key) else {
            continue;
        };

        let column: Vec<f64> = values.iter().map(|row| row[n]).collect();
        let slot = (decoded.phase, decoded.measurement);
        match decoded.statistic {
            Statistic::Min => {
                partials.entry(slot).or_default().min = Some(round4(column_min(&column)));
            }
            Statistic::Max => {
                partials.entry(slot).or_default().max = Some(round4(column_max(&column)));
            }
            Statistic::Avg => {
                partials.entry(slot).or_default().avg = Some(round4(column_mean(&column)));
            }
            Statistic::EnergyTotal => {
                let partial = partials.entry(slot).or_default();
                partial.min = Some(round4(column_min(&column)));
                partial.max = Some(round4(column_max(&column)));
                partial.avg = Some(round4(column_mean(&column)));
                partial.sum = Some(round4(column_sum(&column)));
            }
            Statistic::Plain => {
                scalars.push((slot.0, slot.1, round4(column_mean(&column))));
            }
        }
    }

    let mut buckets = PhaseBuckets::default();
    for (phase, measurement, value) in scalars {
        buckets
            .bucket_mut(phase)
            .insert(measurement, AggregateValue::Scalar(value));
    }
    for ((phase, measurement), partial) in partials {
        buckets
            .bucket_mut(phase)
            .insert(measurement, AggregateValue::Range(partial.finalize()));
    }
    buckets
}

/// Derives the quantities the raw feed cannot be trusted for: per-phase
/// average power from the energy delta, cross-phase totals rederived from the
/// summed energy, and counters remapped to canonical names.
pub fn synthesize(
    mut buckets: PhaseBuckets,
    record_count: usize,
    raw_counters: &BTreeMap<String, f64>,
) -> Result<RollupResult, AppError> {
    if record_count == 0 {
        return Err(AppError::EmptyWindow);
    }

    let phases = [Phase::A, Phase::B, Phase::C];
    let mut energy_sums = [0.0; 3];
    let mut returned_sums = [0.0; 3];
    for (i, phase) in phases.into_iter().enumerate() {
        let bucket = buckets.bucket(phase);
        energy_sums[i] = energy_sum(bucket, phase, "actualEnergy")?;
        returned_sums[i] = energy_sum(bucket, phase, "actualEnergyReturned")?;
    }

    // The energy-delta derivation replaces the device's own power average;
    // it is the one consistent with the reported energy sums.
    let minutes = record_count as f64;
    for (i, phase) in phases.into_iter().enumerate() {
        let avg = round4((energy_sums[i] - returned_sums[i]) * 60.0 / minutes);
        set_range_avg(buckets.bucket_mut(phase), "actualPower", avg);
    }

    let actual_energy = round4(energy_sums.iter().sum::<f64>());
    let actual_energy_returned = round4(returned_sums.iter().sum::<f64>());
    let totals = Totals {
        actual_energy,
        actual_energy_returned,
        actual_power: round4(actual_energy * 60.0 / minutes),
        actual_power_returned: round4(actual_energy_returned * 60.0 / minutes),
    };

    Ok(RollupResult {
        phase_a: buckets.phase_a,
        phase_b: buckets.phase_b,
        phase_c: buckets.phase_c,
        neutral: buckets.neutral,
        totals,
        counters: normalize_counters(raw_counters),
        record_count,
    })
}

/// Processes one closed window: synthesis, accumulation, derivation.
pub fn rollup(
    mut keys: Vec<String>,
    mut values: Vec<Vec<f64>>,
    raw_counters: &BTreeMap<String, f64>,
) -> Result<RollupResult, AppError> {
    if keys.is_empty() {
        return Err(AppError::MissingKeys);
    }
    if values.is_empty() {
        return Err(AppError::EmptyWindow);
    }
    if let Some(row) = values.iter().find(|row| row.len() != keys.len()) {
        return Err(AppError::Other(anyhow::anyhow!(
            "sample row has {} columns, expected {}",
            row.len(),
            keys.len()
        )));
    }

    synthesize_columns(&mut keys, &mut values);
    let record_count = values.len();
    let buckets = accumulate(&keys, &values);
    synthesize(buckets, record_count, raw_counters)
}

/// Remaps a raw counters snapshot through the canonical dictionary. Names
/// without a canonical entry are kept unchanged.
pub fn normalize_counters(raw: &BTreeMap<String, f64>) -> Counters {
    raw.iter()
        .map(|(key, value)| {
            let name = canonical_name(key)
                .map(str::to_string)
                .unwrap_or_else(|| key.clone());
            (name, *value)
        })
        .collect()
}

fn energy_sum(bucket: &PhaseBucket, phase: Phase, name: &str) -> Result<f64, AppError> {
    match bucket.get(name) {
        Some(AggregateValue::Range(range)) => range.sum.ok_or_else(|| missing(phase, name)),
        _ => Err(missing(phase, name)),
    }
}

fn missing(phase: Phase, name: &str) -> AppError {
    AppError::IncompleteData(format!("phase {phase:?} is missing the {name} aggregate"))
}

fn set_range_avg(bucket: &mut PhaseBucket, name: &str, avg: f64) {
    match bucket.get_mut(name) {
        Some(AggregateValue::Range(range)) => range.avg = avg,
        _ => {
            bucket.insert(
                name.to_string(),
                AggregateValue::Range(RangeAggregate {
                    min: 0.0,
                    max: 0.0,
                    avg,
                    sum: None,
                }),
            );
        }
    }
}

fn column_min(data: &[f64]) -> f64 {
    data.iter().copied().fold(f64::INFINITY, f64::min)
}

fn column_max(data: &[f64]) -> f64 {
    data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn column_sum(data: &[f64]) -> f64 {
    data.iter().sum()
}

fn column_mean(data: &[f64]) -> f64 {
    column_sum(data) / data.len() as f64
}
