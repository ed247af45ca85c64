//! Generate a secret locally.

use anyhow::{Context, Result};
use rotor_core::RotorConfig;

pub async fn execute(config: &RotorConfig, length: Option<usize>) -> Result<()> {
    let generator = super::generator(config)?;
    let secret = match length {
        Some(length) => generator.generate_len(length),
        None => generator.generate(),
    }
    .context("Failed to generate secret")?;

    println!("{}", secret.expose());
    Ok(())
}
