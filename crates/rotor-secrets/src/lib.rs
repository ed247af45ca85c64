//! # Rotor Secrets
//!
//! Cryptographically strong secret generation.
//!
//! Secrets are sampled from the operating system's random source and must
//! contain at least one lowercase letter, one uppercase letter, one digit,
//! and one symbol from a fixed set. Candidates that miss a class are
//! resampled whole, a bounded number of times.
//!
//! ```
//! use rotor_secrets::SecretGenerator;
//!
//! let generator = SecretGenerator::default();
//! let secret = generator.generate().unwrap();
//! assert_eq!(secret.len(), 32);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod generator;

pub use generator::{SecretGenerator, SecretPolicy, MIN_LENGTH};
