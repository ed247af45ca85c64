//! Random secret generation with a composition policy.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{CryptoRng, RngCore};
use rotor_types::config::RotationSettings;
use rotor_types::{Result, RotationError, Secret};
use tracing::debug;

/// Shortest secret the generator will produce.
pub const MIN_LENGTH: usize = 12;

/// Symbols a generated secret must include at least one of.
pub const DEFAULT_SYMBOLS: &str = "!@#$%^&*";

/// Candidates sampled before giving up on the composition policy.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";

/// Composition policy for generated secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretPolicy {
    /// Number of characters per secret
    pub length: usize,
    /// Characters sampled from
    pub alphabet: String,
    /// Symbol set the secret must draw at least one character from
    pub symbols: String,
    /// Candidates sampled before failing
    pub max_attempts: u32,
}

impl Default for SecretPolicy {
    fn default() -> Self {
        Self::with_symbols(32, DEFAULT_SYMBOLS)
    }
}

impl SecretPolicy {
    /// Policy over letters, digits, and the given symbols.
    pub fn with_symbols(length: usize, symbols: &str) -> Self {
        Self {
            length,
            alphabet: format!("{}{}{}{}", LOWERCASE, UPPERCASE, DIGITS, symbols),
            symbols: symbols.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Policy described by rotation settings.
    pub fn from_settings(settings: &RotationSettings) -> Self {
        Self::with_symbols(settings.secret_length, &settings.symbols)
    }

    /// Whether `candidate` has a lowercase letter, an uppercase letter,
    /// a digit, and one of the policy's symbols.
    pub fn is_satisfied_by(&self, candidate: &str) -> bool {
        let has_lower = candidate.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = candidate.chars().any(|c| c.is_ascii_uppercase());
        let has_digit = candidate.chars().any(|c| c.is_ascii_digit());
        let has_symbol = candidate.chars().any(|c| self.symbols.contains(c));

        has_lower && has_upper && has_digit && has_symbol
    }
}

/// Secret generator.
#[derive(Debug, Clone)]
pub struct SecretGenerator {
    policy: SecretPolicy,
    alphabet: Vec<char>,
}

impl SecretGenerator {
    /// Create a generator for a policy.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the length is below [`MIN_LENGTH`],
    /// the alphabet is empty, or no attempts are allowed.
    pub fn new(policy: SecretPolicy) -> Result<Self> {
        Self::check_length(policy.length)?;
        if policy.max_attempts == 0 {
            return Err(RotationError::Validation(
                "Secret policy must allow at least one attempt".to_string(),
            ));
        }

        let alphabet = distinct_chars(&policy.alphabet);
        if alphabet.is_empty() {
            return Err(RotationError::Validation("Secret alphabet is empty".to_string()));
        }

        Ok(Self { policy, alphabet })
    }

    /// The policy this generator enforces.
    pub fn policy(&self) -> &SecretPolicy {
        &self.policy
    }

    /// Generate a secret of the policy's length from the OS random source.
    pub fn generate(&self) -> Result<Secret> {
        self.generate_with(self.policy.length, &mut OsRng)
    }

    /// Generate a secret of a specific length from the OS random source.
    pub fn generate_len(&self, length: usize) -> Result<Secret> {
        self.generate_with(length, &mut OsRng)
    }

    /// Generate a secret from a caller-supplied cryptographic RNG.
    ///
    /// Whole candidates are resampled until one satisfies the policy, up to
    /// `max_attempts` times.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::GenerationFailed`] when no candidate within
    /// the attempt bound satisfies the policy.
    pub fn generate_with<R: RngCore + CryptoRng>(&self, length: usize, rng: &mut R) -> Result<Secret> {
        Self::check_length(length)?;

        for attempt in 1..=self.policy.max_attempts {
            let candidate: String = (0..length)
                .filter_map(|_| self.alphabet.choose(rng))
                .collect();

            if self.policy.is_satisfied_by(&candidate) {
                debug!(attempt, length, "Generated secret");
                return Ok(Secret::new(candidate));
            }
        }

        Err(RotationError::GenerationFailed {
            attempts: self.policy.max_attempts,
        })
    }

    fn check_length(length: usize) -> Result<()> {
        if length < MIN_LENGTH {
            return Err(RotationError::Validation(format!(
                "Secret length {} is below the minimum of {}",
                length, MIN_LENGTH
            )));
        }
        Ok(())
    }
}

impl Default for SecretGenerator {
    fn default() -> Self {
        let policy = SecretPolicy::default();
        let alphabet = distinct_chars(&policy.alphabet);
        Self { policy, alphabet }
    }
}

/// Sorted, duplicate-free characters of `alphabet`.
///
/// Duplicates would skew sampling towards the repeated characters.
fn distinct_chars(alphabet: &str) -> Vec<char> {
    let mut chars: Vec<char> = alphabet.chars().collect();
    chars.sort_unstable();
    chars.dedup();
    chars
}
