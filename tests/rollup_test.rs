use pretty_assertions::assert_eq;
use serial_test::serial;
use shelly_em_rollup::config::Config;
use shelly_em_rollup::error::AppError;
use shelly_em_rollup::rollup::{rollup, AggregateValue, RangeAggregate};
use std::collections::BTreeMap;

fn window_keys() -> Vec<String> {
    [
        "a_min_act_power",
        "a_max_act_power",
        "a_total_act_energy",
        "a_total_act_ret_energy",
        "b_total_act_energy",
        "b_total_act_ret_energy",
        "c_total_act_energy",
        "c_total_act_ret_energy",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

fn window_values() -> Vec<Vec<f64>> {
    vec![
        vec![10.0, 20.0, 0.5, 0.1, 0.4, 0.05, 0.3, 0.02],
        vec![12.0, 22.0, 0.6, 0.1, 0.5, 0.05, 0.4, 0.02],
    ]
}

/// Two one-minute samples through the whole pipeline.
#[test]
fn rolls_up_a_two_sample_window() {
    let mut counters = BTreeMap::new();
    counters.insert("a_total_act_energy".to_string(), 1234.5);
    counters.insert("total_act".to_string(), 9999.0);
    counters.insert("mystery_counter".to_string(), 7.0);

    let result = rollup(window_keys(), window_values(), &counters).unwrap();

    assert_eq!(result.record_count, 2);

    // The synthesized a_avg_act_power column is [15, 17]; its mean feeds the
    // accumulator, then the energy-delta derivation replaces the average.
    assert_eq!(
        result.phase_a.get("actualEnergy"),
        Some(&AggregateValue::Range(RangeAggregate {
            min: 0.5,
            max: 0.6,
            avg: 0.55,
            sum: Some(1.1),
        }))
    );
    assert_eq!(
        result.phase_a.get("actualPower"),
        Some(&AggregateValue::Range(RangeAggregate {
            min: 10.0,
            max: 22.0,
            avg: 27.0,
            sum: None,
        }))
    );

    assert_eq!(
        result.phase_b.get("actualEnergy"),
        Some(&AggregateValue::Range(RangeAggregate {
            min: 0.4,
            max: 0.5,
            avg: 0.45,
            sum: Some(0.9),
        }))
    );

    // Counters are remapped through the canonical dictionary; unknown names
    // stay as reported.
    assert_eq!(result.counters.get("actualEnergyPhaseA"), Some(&1234.5));
    assert_eq!(result.counters.get("actualEnergy"), Some(&9999.0));
    assert_eq!(result.counters.get("mystery_counter"), Some(&7.0));
}

/// Totals are rederived from the summed energy, not from the per-phase
/// power averages.
#[test]
fn totals_are_consistent_with_phase_energy_sums() {
    let result = rollup(window_keys(), window_values(), &BTreeMap::new()).unwrap();

    assert_eq!(result.totals.actual_energy, 2.7);
    assert_eq!(result.totals.actual_energy_returned, 0.34);
    assert_eq!(result.totals.actual_power, 81.0);
    assert_eq!(result.totals.actual_power_returned, 10.2);
}

/// Downstream consumers see the original output field names.
#[test]
fn serializes_with_device_independent_field_names() {
    let result = rollup(window_keys(), window_values(), &BTreeMap::new()).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["recordCount"], 2);
    assert_eq!(json["phaseA"]["actualEnergy"]["sum"], 1.1);
    assert_eq!(json["phaseA"]["actualPower"]["avg"], 27.0);
    assert_eq!(json["totals"]["actualPower"], 81.0);
    // Only cumulative energy aggregates carry a sum.
    assert!(json["phaseA"]["actualPower"].get("sum").is_none());
    assert!(json["neutral"].as_object().unwrap().is_empty());
}

#[test]
fn missing_phase_energy_yields_no_result() {
    let keys: Vec<String> = [
        "a_total_act_energy",
        "a_total_act_ret_energy",
        "c_total_act_energy",
        "c_total_act_ret_energy",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect();
    let values = vec![vec![0.5, 0.1, 0.3, 0.02]];

    let err = rollup(keys, values, &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, AppError::IncompleteData(_)));
}

#[test]
#[serial]
fn loads_config_from_yaml() {
    let config_str = r#"
device:
  addr: "10.0.0.42"

poll:
  interval_minutes: 1

mqtt:
  host: "localhost"
  port: 1883
  client_id: "test-client"
  topic: "energy/test/rollup"
  qos: 1
"#;

    let temp_file = std::env::temp_dir().join(format!("em-rollup-config-{}.yaml", std::process::id()));
    std::fs::write(&temp_file, config_str).unwrap();

    let original = std::env::var("SHELLY_DEVICE_ADDR").ok();
    std::env::remove_var("SHELLY_DEVICE_ADDR");

    let config = Config::load(&temp_file).unwrap();

    assert_eq!(config.device.addr, "10.0.0.42");
    assert_eq!(config.poll.interval_minutes, 1);
    assert_eq!(config.mqtt.topic, "energy/test/rollup");
    assert_eq!(config.mqtt.username, None);

    if let Some(val) = original {
        std::env::set_var("SHELLY_DEVICE_ADDR", val);
    }
    std::fs::remove_file(&temp_file).ok();
}

#[test]
#[serial]
fn device_addr_env_overrides_config() {
    let config_str = r#"
device:
  addr: "10.0.0.42"

mqtt:
  host: "localhost"
  topic: "energy/test/rollup"
"#;

    let temp_file =
        std::env::temp_dir().join(format!("em-rollup-config-env-{}.yaml", std::process::id()));
    std::fs::write(&temp_file, config_str).unwrap();

    let original = std::env::var("SHELLY_DEVICE_ADDR").ok();
    std::env::set_var("SHELLY_DEVICE_ADDR", "192.168.1.99");

    let config = Config::load(&temp_file).unwrap();
    assert_eq!(config.device.addr, "192.168.1.99");
    // Defaults fill the fields the file omits.
    assert_eq!(config.poll.interval_minutes, 5);
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.qos, 1);

    if let Some(val) = original {
        std::env::set_var("SHELLY_DEVICE_ADDR", val);
    } else {
        std::env::remove_var("SHELLY_DEVICE_ADDR");
    }
    std::fs::remove_file(&temp_file).ok();
}
