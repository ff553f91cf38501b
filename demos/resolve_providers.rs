use nila_oidc_discovery::prelude::*;
use std::env;
use std::fs;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Usage: cargo run --example resolve_providers -- demos/providers.yaml [--watch]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .unwrap_or_else(|| "demos/providers.yaml".to_string());
    let watch = args.any(|arg| arg == "--watch");

    let providers_str = fs::read_to_string(&path)?;
    let providers: Vec<ProviderRecord> = serde_yaml::from_str(&providers_str)?;
    info!(path = %path, count = providers.len(), "Loaded provider records");

    let config = DiscoveryConfigBuilder::new()
        .failure_backoff(Duration::from_secs(30))
        .build()?;
    let service = DiscoveryService::new(config)?;
    info!(config = ?service.config(), "Discovery service ready");

    resolve_all(&service, &providers).await;
    if !watch {
        return Ok(());
    }

    // Re-resolve periodically; cached documents make these rounds cheap.
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => resolve_all(&service, &providers).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                for provider in &providers {
                    service.clear_cache(&provider.base_url).await;
                }
                return Ok(());
            }
        }
    }
}

async fn resolve_all(service: &DiscoveryService, providers: &[ProviderRecord]) {
    for provider in providers {
        let effective = resolve_service_config(service, provider).await;
        let verification = &effective.verification;
        let name = provider.display_name.as_deref().unwrap_or(&provider.id);

        match verification.disabled_reason() {
            Some(reason) => error!(provider = name, %reason, "JWT verification disabled"),
            None if verification.verify_jwt() => {
                println!(
                    "{}: verifying with {} key(s){}",
                    name,
                    verification.jwt_public_keys().len().max(1),
                    verification
                        .jwks_uri()
                        .map(|uri| format!(" from {}", uri))
                        .unwrap_or_default()
                );
                for entry in verification.jwt_public_keys().iter() {
                    println!("  [{}]\n{}", entry.label(), entry.pem);
                }
            }
            None => println!("{}: JWT verification not requested", name),
        }
    }
}
