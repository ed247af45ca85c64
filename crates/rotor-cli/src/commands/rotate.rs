//! Rotation commands.

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::Confirm;
use rotor_core::time::{parse_duration, pretty_duration, to_std};
use rotor_core::RotorConfig;
use rotor_engine::{RotationControl, RotationReport};
use rotor_types::{PartialState, RotationError};
use tracing::warn;

use crate::ui::progress;

pub async fn single(config: &RotorConfig, name: &str, verify: bool) -> Result<()> {
    let principal = super::principal(name)?;
    let (engine, _) = super::engine(config).await?;

    println!("{} secret for: {}", "Rotating".yellow().bold(), principal.to_string().cyan());

    let pb = progress::spinner("Applying new secret...");
    let report = engine.rotate_single_with(&principal, verify).await;
    pb.finish_and_clear();

    finish(report, "Rotated")
}

pub async fn dual(config: &RotorConfig, name: &str, window: Option<&str>) -> Result<()> {
    let principal = super::principal(name)?;
    let (engine, _) = super::engine(config).await?;

    let window = match window {
        Some(raw) => parse_duration(raw).with_context(|| format!("Invalid window '{}'", raw))?,
        None => chrono::Duration::from_std(engine.settings().transition_window)
            .context("Configured transition window is out of range")?,
    };

    println!(
        "{} {} through a shadow principal ({} transition window, Ctrl-C cancels)",
        "Rotating".yellow().bold(),
        principal.to_string().cyan(),
        pretty_duration(window)
    );

    let control = RotationControl::new();
    let token = control.token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling transition");
            token.cancel();
        }
    });

    let pb = progress::spinner("Rotating");
    let follower = progress::follow_state(pb.clone(), "Rotating".to_string(), control.subscribe());

    let report = engine.rotate_dual_with(&principal, to_std(window), &control).await;

    interrupt.abort();
    follower.abort();
    pb.finish_and_clear();

    finish(report, "Rotated")
}

pub async fn resume(config: &RotorConfig, name: &str, yes: bool) -> Result<()> {
    let principal = super::principal(name)?;

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Retire '{}' and promote its shadow? Clients must already use the new secret",
                principal
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "Cancelled".yellow());
            return Ok(());
        }
    }

    let (engine, _) = super::engine(config).await?;

    let pb = progress::spinner("Resuming rotation...");
    let report = engine.resume_dual(&principal).await;
    pb.finish_and_clear();

    finish(report, "Resumed")
}

/// Print a rotation report and turn its outcome into the command result.
///
/// The secret is printed even for partial rotations, where it is already
/// in effect on the shadow principal.
fn finish(report: RotationReport, verb: &str) -> Result<()> {
    if let Some(error) = report.audit_error() {
        eprintln!("{} audit record not written: {}", "Warning:".yellow().bold(), error);
    }

    if let Some(secret) = &report.secret {
        println!("{}", "New secret (shown once):".bold());
        println!("{}", secret.expose());
    }

    match report.outcome {
        Ok(()) => {
            println!(
                "{} {} {} ({})",
                "✓".green().bold(),
                verb,
                report.record.principal.cyan(),
                report.record.note
            );
            Ok(())
        }
        Err(e) => {
            match &e {
                RotationError::PartialRotation { state: PartialState::Renamed, principal, .. } => {
                    eprintln!(
                        "{} run `rotor rotate {}` to set a working secret",
                        "Partial rotation:".red().bold(),
                        principal
                    );
                }
                RotationError::PartialRotation { principal, .. } => {
                    eprintln!(
                        "{} run `rotor reconcile` and `rotor resume {}` to finish",
                        "Partial rotation:".red().bold(),
                        principal
                    );
                }
                _ => {}
            }
            Err(e.into())
        }
    }
}
