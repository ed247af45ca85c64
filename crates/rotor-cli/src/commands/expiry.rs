//! Expiry tracking commands.

use anyhow::{Context, Result};
use colored::Colorize;
use rotor_core::time::{fuzzy_time, pretty_duration};
use rotor_core::RotorConfig;

pub async fn schedule(config: &RotorConfig, name: &str, ttl: Option<&str>) -> Result<()> {
    let principal = super::principal(name)?;
    let settings = super::settings(config)?;
    let ttl = super::duration_or(ttl, settings.default_ttl)?;

    let outcome = super::expiry_tracker(config)?
        .schedule(&principal, ttl)
        .await
        .context("Failed to schedule expiry")?;

    let expires = outcome.schedule.expires_at.format("%Y-%m-%d %H:%M UTC").to_string();
    if outcome.created {
        println!("{} {} expires {}", "✓".green().bold(), principal.to_string().cyan(), expires.yellow());
    } else {
        println!(
            "{} {} already scheduled to expire {} (use `rotor renew` to replace)",
            "-".yellow().bold(),
            principal.to_string().cyan(),
            expires.yellow()
        );
    }
    Ok(())
}

pub async fn renew(config: &RotorConfig, name: &str, ttl: Option<&str>) -> Result<()> {
    let principal = super::principal(name)?;
    let settings = super::settings(config)?;
    let ttl = super::duration_or(ttl, settings.default_ttl)?;

    let schedule = super::expiry_tracker(config)?
        .renew(&principal, ttl)
        .await
        .context("Failed to renew expiry")?;

    println!(
        "{} {} now expires {}",
        "✓".green().bold(),
        principal.to_string().cyan(),
        schedule.expires_at.format("%Y-%m-%d %H:%M UTC").to_string().yellow()
    );
    Ok(())
}

pub async fn expiring(config: &RotorConfig, horizon: Option<&str>) -> Result<()> {
    let settings = super::settings(config)?;
    let horizon = super::duration_or(horizon, settings.expiry_horizon)?;

    let entries = super::expiry_tracker(config)?
        .scan_expiring_soon(horizon)
        .await
        .context("Failed to scan expiry schedules")?;

    if entries.is_empty() {
        println!("{} Nothing expires within {}", "✓".green().bold(), pretty_duration(horizon));
        return Ok(());
    }

    for entry in &entries {
        let when = entry.schedule.expires_at.format("%Y-%m-%d %H:%M UTC").to_string();
        let status = if entry.expired {
            format!("expired {}", fuzzy_time(entry.schedule.expires_at)).red()
        } else {
            format!("expires {}", fuzzy_time(entry.schedule.expires_at)).yellow()
        };
        println!("  {:<32} {}  {}", entry.schedule.principal.cyan(), when, status);
    }
    Ok(())
}
