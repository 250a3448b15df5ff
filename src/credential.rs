use crate::error::{AnalysisError, Result};

pub const DEFAULT_API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Opaque API credential. The secret is never shown by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(AnalysisError::Credential(
                "API key must not be empty".to_string(),
            ));
        }
        Ok(Self(secret))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Display-level obfuscation: keeps the last four characters.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 4 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{}", tail)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

/// Source of the API credential, resolved once at process start.
pub trait CredentialProvider {
    fn resolve(&self) -> Result<Credential>;
}

/// Reads the credential from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredential {
    fn default() -> Self {
        Self::new(DEFAULT_API_KEY_VAR)
    }
}

impl CredentialProvider for EnvCredential {
    fn resolve(&self) -> Result<Credential> {
        let value = std::env::var(&self.var).map_err(|_| {
            AnalysisError::Credential(format!("{} must be set", self.var))
        })?;
        Credential::new(value)
    }
}

/// A credential entered by the user.
#[derive(Debug, Clone)]
pub struct StaticCredential(Credential);

impl StaticCredential {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        Credential::new(secret).map(Self)
    }
}

impl CredentialProvider for StaticCredential {
    fn resolve(&self) -> Result<Credential> {
        Ok(self.0.clone())
    }
}
