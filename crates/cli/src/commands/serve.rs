//! `luminous serve`: start the HTTP relay.

use tracing::info;

use super::{load_config, require_api_key};

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;
    require_api_key(&config)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Luminous relay");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Storage:    {}", config.storage.backend);
    println!(
        "   Reflection: {}",
        if config.reflection.enabled {
            format!(
                "every {}s, p = {}",
                config.reflection.interval_secs, config.reflection.probability
            )
        } else {
            "disabled".into()
        }
    );

    info!(
        reflection = config.reflection.enabled,
        storage = %config.storage.backend,
        "Relay configured"
    );
    luminous_gateway::start(config).await?;

    Ok(())
}
