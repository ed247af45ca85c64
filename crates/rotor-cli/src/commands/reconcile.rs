//! Find unfinished dual rotations.

use anyhow::{Context, Result};
use colored::Colorize;
use rotor_core::RotorConfig;
use rotor_engine::{PendingRotation, PendingState};

pub async fn execute(config: &RotorConfig) -> Result<()> {
    let (engine, _) = super::engine(config).await?;

    let pending = engine.reconcile_scan().await.context("Reconciliation scan failed")?;

    if pending.is_empty() {
        println!("{} No leftover shadow principals", "✓".green().bold());
        return Ok(());
    }

    println!("{}", "Leftover shadow principals:".bold());
    for entry in &pending {
        print_entry(entry);
    }

    let resumable = pending.iter().filter(|p| p.needs_resume()).count();
    if resumable > 0 {
        println!(
            "\n{} {} rotation(s) need `rotor resume <principal>`",
            "!".red().bold(),
            resumable
        );
    }

    Ok(())
}

fn print_entry(entry: &PendingRotation) {
    let state = match entry.state {
        PendingState::StaleShadow => entry.state.to_string().yellow(),
        PendingState::Partial(_) => entry.state.to_string().red(),
    };
    let original = if entry.original_exists { "present" } else { "missing" };

    println!(
        "  {} -> {}  {}  (original {})",
        entry.principal.to_string().cyan(),
        entry.shadow,
        state,
        original
    );
}
