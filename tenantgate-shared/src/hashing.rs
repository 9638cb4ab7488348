/// Secret hashing for end-user credentials
///
/// Credential storage goes through the [`SecretHasher`] trait so the policy
/// can be swapped without touching signup, login or query building.
///
/// - [`Argon2Hasher`]: Argon2id, PHC string output. The default.
/// - [`PlaintextHasher`]: stores the secret unchanged. Only for namespaces
///   populated by older cleartext deployments and for fast tests.
///
/// # Security
///
/// Default Argon2id parameters:
///
/// - **Memory**: 64 MB (65536 KB)
/// - **Iterations**: 3 passes
/// - **Parallelism**: 4 lanes
/// - **Output**: 32-byte hash
///
/// # Example
///
/// ```
/// use tenantgate_shared::hashing::{Argon2Hasher, SecretHasher};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hasher = Argon2Hasher::default();
/// let stored = hasher.hash("super_secret_password_123")?;
///
/// assert!(hasher.verify("super_secret_password_123", &stored)?);
/// assert!(!hasher.verify("wrong_password", &stored)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, ParamsBuilder, Version,
};

/// Error type for hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password
    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    /// Invalid password hash format
    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

/// Turns a secret into its stored form and checks candidates against it
pub trait SecretHasher: Send + Sync {
    /// Short policy name for logs and configuration
    fn name(&self) -> &'static str;

    /// Produces the value written to the secret column
    fn hash(&self, secret: &str) -> Result<String, PasswordError>;

    /// Checks a candidate secret against a stored value
    ///
    /// `Ok(false)` means "does not match"; errors are reserved for stored
    /// values the policy cannot interpret.
    fn verify(&self, secret: &str, stored: &str) -> Result<bool, PasswordError>;
}

/// Argon2id hasher
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    m_cost: u32,
    t_cost: u32,
    p_cost: u32,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Argon2Hasher {
            m_cost: 65536, // 64 MB
            t_cost: 3,
            p_cost: 4,
        }
    }
}

impl Argon2Hasher {
    /// Creates a hasher with explicit cost parameters
    ///
    /// Lower costs are only appropriate for tests.
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Self {
        Argon2Hasher {
            m_cost,
            t_cost,
            p_cost,
        }
    }

    fn params(&self) -> Result<Params, PasswordError> {
        ParamsBuilder::new()
            .m_cost(self.m_cost)
            .t_cost(self.t_cost)
            .p_cost(self.p_cost)
            .output_len(32)
            .build()
            .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))
    }
}

impl SecretHasher for Argon2Hasher {
    fn name(&self) -> &'static str {
        "argon2"
    }

    fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, self.params()?);

        let hash = argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

        Ok(hash.to_string())
    }

    fn verify(&self, secret: &str, stored: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(stored)
            .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

        // Parameters are embedded in the PHC string
        match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
        }
    }
}

/// Stores secrets unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextHasher;

impl SecretHasher for PlaintextHasher {
    fn name(&self) -> &'static str {
        "plaintext"
    }

    fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        Ok(secret.to_string())
    }

    fn verify(&self, secret: &str, stored: &str) -> Result<bool, PasswordError> {
        Ok(constant_time_eq(secret.as_bytes(), stored.as_bytes()))
    }
}

/// Byte comparison whose running time depends only on the lengths
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Builds a hasher from its configuration name
///
/// Returns `None` for unknown names.
pub fn hasher_from_name(name: &str) -> Option<Box<dyn SecretHasher>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "argon2" | "argon2id" => Some(Box::new(Argon2Hasher::default())),
        "plaintext" => Some(Box::new(PlaintextHasher)),
        _ => None,
    }
}
