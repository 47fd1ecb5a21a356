//! `luminous chat`: interactive or single-message mode against the stored session.

use std::sync::Arc;

use luminous_core::event::EventBus;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{load_config, print_exchange, print_failure, require_api_key};

pub async fn run(message: Option<String>, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    require_api_key(&config)?;

    let runner = luminous_gateway::open_runner(&config, Arc::new(EventBus::default())).await?;

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let result = runner.submit(msg).await;
        eprint!("\r              \r");
        return match result {
            Ok(exchange) => {
                print_exchange(&exchange, verbose);
                Ok(())
            }
            Err(failure) => {
                print_failure(&failure);
                Err(failure.into())
            }
        };
    }

    let session = runner.snapshot().await;
    println!();
    println!("  Luminous, interactive mode");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", runner.agent().model());
    println!("  Storage:   {} ({})", config.storage.backend, config.storage.session_key);
    println!("  History:   {} turns", session.history.len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"  You > ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let result = runner.submit(line).await;
        eprint!("\r     \r");
        match result {
            Ok(exchange) => print_exchange(&exchange, verbose),
            Err(failure) => print_failure(&failure),
        }
        println!();
    }

    println!();
    println!("  Goodbye.");
    Ok(())
}
