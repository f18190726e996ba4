//! Connected demo against a live TwinCAT target
//!
//! ```bash
//! cargo run --bin demo -- 192.168.0.50 192.168.0.50.1.1
//! ```

use std::env;

use anyhow::{Context, Result};
use voltage_ads::{
    AdsClient, AdsConnectionConfig, AdsDataType, AdsIoHandler, AdsValue, HandlerState, ItemConfig,
    ItemDirection,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let target_net_id = args.next().unwrap_or_else(|| "127.0.0.1.1.1".to_string());

    println!("{}", voltage_ads::info());

    let config = AdsConnectionConfig::new(
        host,
        target_net_id.parse().context("invalid target net id")?,
        "192.168.0.2.1.1".parse().expect("static net id"),
    );

    // One-shot command-level access
    let mut client = AdsClient::connect(&config).await?;
    let info = client.read_device_info().await?;
    println!(
        "Device: {} v{}.{}.{}",
        info.name, info.major, info.minor, info.build
    );
    let (state, device_state) = client.read_state().await?;
    println!("Run state: {state} (device state {device_state})");
    client.close().await?;

    // Cyclic engine with two inputs and one output
    let items = vec![
        ItemConfig::new("MAIN.temperature", AdsDataType::Real, ItemDirection::Input),
        ItemConfig::new("MAIN.counter", AdsDataType::Int, ItemDirection::Input),
        ItemConfig::new("MAIN.setpoint", AdsDataType::Real, ItemDirection::Output),
    ];
    let mut handler = AdsIoHandler::new(config, items)?;
    handler.prepare();
    handler.set_output(2, AdsValue::Real(21.5))?;

    for cycle in 0..50 {
        let outcome = handler.run().await;
        if outcome.state == HandlerState::Transceiving {
            let temperature = handler.item_state(0).expect("registered item");
            let counter = handler.item_state(1).expect("registered item");
            println!(
                "cycle {cycle}: temperature={} ({}) counter={} fully_transferred={}",
                temperature.value, temperature.status, counter.value, outcome.fully_transferred
            );
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    handler.stop().await;
    Ok(())
}
