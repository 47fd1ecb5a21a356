//! `luminous reflect`: run one autonomous reflection now.

use std::sync::Arc;

use luminous_core::event::EventBus;

use super::{load_config, print_exchange, print_failure, require_api_key};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    require_api_key(&config)?;

    let runner = luminous_gateway::open_runner(&config, Arc::new(EventBus::default())).await?;
    match runner.try_reflect().await {
        Ok(exchange) => {
            print_exchange(&exchange, true);
            Ok(())
        }
        Err(failure) => {
            tracing::warn!(kind = failure.error.kind(), "Reflection failed");
            print_failure(&failure);
            Err(failure.into())
        }
    }
}
