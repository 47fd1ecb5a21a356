//! `luminous reset`: replace the stored session with the persona seed.

use super::{load_config, stored_session};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = stored_session(&config).await?;
    let session = store.reset().await?;
    println!(
        "Session '{}' reset on {} storage ({} seed turns).",
        store.key(),
        store.backend_name(),
        session.history.len()
    );
    Ok(())
}
