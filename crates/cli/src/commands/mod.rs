pub mod chat;
pub mod onboard;
pub mod reflect;
pub mod reset;
pub mod serve;
pub mod status;

use luminous_agent::{AdvanceFailure, Exchange, Persona};
use luminous_config::AppConfig;
use luminous_memory::ConversationStore;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    tracing::debug!(
        provider = %config.default_provider,
        storage = %config.storage.backend,
        "Config loaded"
    );
    Ok(config)
}

/// Fail early with setup instructions when no LLM key is available.
pub fn require_api_key(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.has_api_key() {
        return Ok(());
    }
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    LUMINOUS_API_KEY, GEMINI_API_KEY or API_KEY");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    Err("No API key found. See above for setup instructions.".into())
}

/// The stored session, seeded from the configured persona. Needs no provider.
pub async fn stored_session(
    config: &AppConfig,
) -> Result<ConversationStore, Box<dyn std::error::Error>> {
    let backend = luminous_memory::open_store(&config.storage).await?;
    let seed = Persona::from_config(&config.persona).seed_session();
    Ok(ConversationStore::new(backend, config.storage.session_key.clone()).with_seed(seed))
}

/// Print tool activity and the session log to stderr, the reply to stdout.
pub fn print_exchange(exchange: &Exchange, verbose: bool) {
    for message in &exchange.tool_messages {
        eprintln!("  [{message}]");
    }
    if verbose {
        for line in &exchange.log {
            eprintln!("  · {line}");
        }
    }
    if !exchange.saved {
        eprintln!("  [warning] session was not saved");
    }
    match &exchange.reply {
        Some(reply) => {
            for line in reply.lines() {
                println!("  Luminous > {line}");
            }
        }
        None => println!("  (nothing to add)"),
    }
}

pub fn print_failure(failure: &AdvanceFailure) {
    eprintln!("  [Error] {}: {}", failure.error.kind(), failure.error);
    for line in &failure.log {
        eprintln!("  · {line}");
    }
}
