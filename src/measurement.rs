/// One of the three AC lines or the neutral conductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    A,
    B,
    C,
    Neutral,
}

/// Which statistic a history column carries for its measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Min,
    Max,
    Avg,
    Plain,
    EnergyTotal,
}

/// Decoded form of one raw column name.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementKey {
    pub phase: Phase,
    pub statistic: Statistic,
    pub measurement: String,
}

/// Maps a raw measurement fragment to its stable external name.
///
/// Fragments the device may add in future firmware are not an error; callers
/// fall back to the raw spelling when this returns `None`.
pub fn canonical_name(raw: &str) -> Option<&'static str> {
    match raw {
        "total_act_energy" => Some("actualEnergy"),
        "fund_act_energy" => Some("fundamentalActualEnergy"),
        "total_act_ret_energy" => Some("actualEnergyReturned"),
        "fund_act_ret_energy" => Some("fundamentalActualEnergyReturned"),
        "lag_react_energy" => Some("laggingReactiveEnergy"),
        "lead_react_energy" => Some("leadingReactiveEnergy"),
        "act_power" => Some("actualPower"),
        "aprt_power" => Some("apparentPower"),
        "a_total_act_energy" => Some("actualEnergyPhaseA"),
        "a_total_act_ret_energy" => Some("actualEnergyReturnedPhaseA"),
        "b_total_act_energy" => Some("actualEnergyPhaseB"),
        "b_total_act_ret_energy" => Some("actualEnergyReturnedPhaseB"),
        "c_total_act_energy" => Some("actualEnergyPhaseC"),
        "c_total_act_ret_energy" => Some("actualEnergyReturnedPhaseC"),
        "total_act" => Some("actualEnergy"),
        "total_act_ret" => Some("actualEnergyReturned"),
        _ => None,
    }
}

fn measurement_code(fragments: &[&str]) -> String {
    let joined = fragments.join("_");
    match canonical_name(&joined) {
        Some(name) => name.to_string(),
        None => joined,
    }
}

/// Decodes a raw history column name.
///
/// Column names follow `<phase>[_<min|max|avg>]_<measurement>[_energy]`.
/// Returns `None` when the first fragment is not a phase prefix; such
/// columns are not phase telemetry and are skipped by the caller.
pub fn decode(key: &str) -> Option<MeasurementKey> {
    let parts: Vec<&str> = key.split('_').collect();
    let (prefix, rest) = parts.split_first()?;

    let phase = match *prefix {
        "a" => Phase::A,
        "b" => Phase::B,
        "c" => Phase::C,
        "n" => Phase::Neutral,
        _ => return None,
    };

    let (statistic, fragments) = match rest.first().copied() {
        Some("min") => (Statistic::Min, &rest[1..]),
        Some("max") => (Statistic::Max, &rest[1..]),
        Some("avg") => (Statistic::Avg, &rest[1..]),
        _ if rest.last() == Some(&"energy") => (Statistic::EnergyTotal, rest),
        _ => (Statistic::Plain, rest),
    };

    Some(MeasurementKey {
        phase,
        statistic,
        measurement: measurement_code(fragments),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_min_statistic_keys() {
        let key = decode("a_min_act_power").unwrap();
        assert_eq!(key.phase, Phase::A);
        assert_eq!(key.statistic, Statistic::Min);
        assert_eq!(key.measurement, "actualPower");
    }

    #[test]
    fn decodes_energy_total_keys() {
        let key = decode("b_total_act_ret_energy").unwrap();
        assert_eq!(key.phase, Phase::B);
        assert_eq!(key.statistic, Statistic::EnergyTotal);
        assert_eq!(key.measurement, "actualEnergyReturned");
    }

    #[test]
    fn decodes_neutral_plain_keys() {
        let key = decode("n_current").unwrap();
        assert_eq!(key.phase, Phase::Neutral);
        assert_eq!(key.statistic, Statistic::Plain);
        assert_eq!(key.measurement, "current");
    }

    #[test]
    fn unknown_fragments_pass_through_verbatim() {
        let key = decode("b_xyz_newmetric").unwrap();
        assert_eq!(key.phase, Phase::B);
        assert_eq!(key.statistic, Statistic::Plain);
        assert_eq!(key.measurement, "xyz_newmetric");
    }

    #[test]
    fn statistic_prefix_wins_over_energy_suffix() {
        let key = decode("a_min_act_ret_energy").unwrap();
        assert_eq!(key.statistic, Statistic::Min);
        assert_eq!(key.measurement, "act_ret_energy");
    }

    #[test]
    fn unknown_max_measurement_keeps_raw_spelling() {
        let key = decode("c_max_frequency").unwrap();
        assert_eq!(key.phase, Phase::C);
        assert_eq!(key.statistic, Statistic::Max);
        assert_eq!(key.measurement, "frequency");
    }

    #[test]
    fn non_phase_keys_are_rejected() {
        assert!(decode("total_act_energy").is_none());
        assert!(decode("period").is_none());
        assert!(decode("").is_none());
    }

    #[test]
    fn dictionary_maps_device_counters() {
        assert_eq!(canonical_name("a_total_act_energy"), Some("actualEnergyPhaseA"));
        assert_eq!(canonical_name("total_act"), Some("actualEnergy"));
        assert_eq!(canonical_name("total_act_ret"), Some("actualEnergyReturned"));
        assert_eq!(canonical_name("frequency"), None);
    }
}
