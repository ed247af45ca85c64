//! Provision a principal.

use anyhow::{Context, Result};
use colored::Colorize;
use rotor_core::RotorConfig;
use rotor_types::Grant;

use crate::ui::progress;

pub async fn execute(config: &RotorConfig, name: &str, schedule: bool) -> Result<()> {
    let principal = super::principal(name)?;
    let (engine, database) = super::engine(config).await?;
    let grants = Grant::application_defaults(&database, &config.backend.schema);

    println!("{} principal: {}", "Provisioning".green().bold(), principal.to_string().cyan());
    for grant in &grants {
        println!("  {}", grant.to_string().dimmed());
    }

    let pb = progress::spinner("Creating principal...");
    let secret = engine.provision(&principal, &grants).await;
    pb.finish_and_clear();
    let secret = secret.context("Failed to provision principal")?;

    println!("{}", "Secret (shown once):".bold());
    println!("{}", secret.expose());

    if schedule {
        let ttl = engine.settings().default_ttl;
        let outcome = engine
            .expiry()
            .schedule(&principal, ttl)
            .await
            .context("Principal provisioned but expiry could not be scheduled")?;
        println!(
            "  Expires: {}",
            outcome.schedule.expires_at.format("%Y-%m-%d %H:%M UTC").to_string().yellow()
        );
    }

    println!("{} Provisioned {}", "✓".green().bold(), principal.to_string().cyan());
    Ok(())
}
