//! Audit history.

use anyhow::{Context, Result};
use colored::Colorize;
use rotor_core::RotorConfig;
use rotor_types::{HistoryOrder, RotationRecord};

pub async fn execute(config: &RotorConfig, principal: Option<&str>, oldest_first: bool, json: bool) -> Result<()> {
    let audit = super::audit_log(config)?;
    let order = if oldest_first { HistoryOrder::Ascending } else { HistoryOrder::Descending };

    let records = match principal {
        Some(name) => audit.history_for(name, order).await,
        None => audit.history(order).await,
    }
    .context("Failed to read audit history")?;

    if json {
        for record in &records {
            println!("{}", serde_json::to_string(record)?);
        }
        return Ok(());
    }

    if records.is_empty() {
        println!("No rotations recorded");
        return Ok(());
    }

    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &RotationRecord) {
    let outcome = if record.is_success() {
        record.outcome.to_string().green()
    } else {
        record.outcome.to_string().red()
    };

    let mut detail = record.note.clone();
    if let Some(failure) = record.failure {
        detail = match record.step {
            Some(step) => format!("{} at {}: {}", failure, step, detail),
            None => format!("{}: {}", failure, detail),
        };
    }

    println!(
        "{}  {:<24} {:<6} {:<7} {}",
        record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        record.principal.cyan(),
        record.rotation_type,
        outcome,
        detail.dimmed()
    );
}
