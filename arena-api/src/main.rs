//! Arena Gateway Server
//!
//! Main entry point for the Arena Gateway fleet routing service

use arena_api::start_server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    start_server().await?;
    Ok(())
}
