//! `luminous status`: show configuration and the stored session.

use luminous_config::AppConfig;

use super::{load_config, stored_session};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    println!("Luminous Status");
    println!("===============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", config.default_model);
    println!("  Temperature:  {}", config.default_temperature);
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Max rounds:   {}", config.agent.max_rounds);
    println!(
        "  Reflection:   {}",
        if config.reflection.enabled { "enabled" } else { "disabled" }
    );
    println!("  webSearch:    {}", configured(config.tools.serpapi_key.is_some()));
    println!(
        "  shopify:      {}",
        configured(
            config.tools.shopify_store.is_some() && config.tools.shopify_access_token.is_some()
        )
    );

    let store = stored_session(&config).await?;
    println!();
    println!("  Storage:      {} ({})", store.backend_name(), store.key());
    match store.load().await {
        Ok(session) => {
            println!("  Turns:        {}", session.history.len());
            println!("  Keepsake:     {}", session.keepsake.as_deref().unwrap_or("(none)"));
            println!(
                "  State:        {}",
                serde_json::to_string_pretty(&session.state.to_json())?
            );
        }
        Err(e) => {
            println!("  Session:      unreadable ({e})");
            println!("  Run `luminous reset` to start over.");
        }
    }

    Ok(())
}

fn configured(yes: bool) -> &'static str {
    if yes { "configured" } else { "not configured" }
}
