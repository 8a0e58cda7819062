use chrono::{DateTime, Utc};
use shelly_em_rollup::config::Config;
use shelly_em_rollup::error::AppError;
use shelly_em_rollup::mqtt;
use shelly_em_rollup::rollup::rollup;
use shelly_em_rollup::shelly::ShellyClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let cfg_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.example.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!(device = %cfg.device.addr, "loaded config");

    let client = ShellyClient::new(&cfg.device.addr);

    let keep_alive = cfg.mqtt.keep_alive_secs.unwrap_or(30);
    let opts = mqtt::build_options(
        &cfg.mqtt.host,
        cfg.mqtt.port,
        &cfg.mqtt.client_id,
        &cfg.mqtt.username,
        &cfg.mqtt.password,
        keep_alive,
    );
    let (publisher, eventloop) = mqtt::new(opts);
    tokio::spawn(mqtt::drive(eventloop));
    info!(
        host = %cfg.mqtt.host,
        topic = %cfg.mqtt.topic,
        "publishing rollups over MQTT"
    );

    // One cycle in flight at a time; a slow cycle delays the next tick
    // instead of overlapping it.
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(cfg.poll.interval_minutes * 60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_to_ts: Option<i64> = None;

    let sig = tokio::signal::ctrl_c();
    tokio::pin!(sig);
    loop {
        tokio::select! {
            biased;
            _ = &mut sig => {
                info!("shutdown requested");
                break;
            }
            _ = interval.tick() => {
                let to_ts = Utc::now().timestamp() / 60 * 60;
                let from_ts = last_to_ts.unwrap_or(to_ts - 60);
                // The window advances even when the cycle fails, so a bad
                // window is never refetched forever.
                last_to_ts = Some(to_ts);

                if let Err(e) = run_cycle(&client, &publisher, &cfg, from_ts, to_ts).await {
                    error!(from_ts, to_ts, error = %e, "update cycle failed");
                }
            }
        }
    }

    Ok(())
}

async fn run_cycle(
    client: &ShellyClient,
    publisher: &mqtt::AsyncClient,
    cfg: &Config,
    from_ts: i64,
    to_ts: i64,
) -> Result<(), AppError> {
    let counters = client.get_status().await?;
    let window = client.fetch_window(from_ts, to_ts).await?;
    let result = rollup(window.keys, window.values, &counters)?;

    let payload = serde_json::to_vec(&result)?;
    mqtt::publish(publisher, &cfg.mqtt.topic, mqtt::qos(cfg.mqtt.qos), payload).await?;

    info!(
        "[{}] {} - {}",
        result.record_count,
        format_time(from_ts),
        format_time(to_ts)
    );
    Ok(())
}

fn format_time(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_default()
}
