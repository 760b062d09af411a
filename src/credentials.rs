//! Credential sourcing is pluggable: `CredentialProvider` is the capability
//! interface, and `StaticCredentialProvider` is the one concrete
//! implementation shipped here. Other sourcing strategies — a secrets
//! manager, a refreshed token — can implement the trait without the client
//! itself changing.

use async_trait::async_trait;
use std::fmt;

/// A resolved username/password pair for one request attempt.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("username", &self.username).field("password", &"***").finish()
    }
}

/// Capability for sourcing credentials and a user-agent string. Implementors
/// may read a static pair, call out to a secrets manager, or refresh a
/// short-lived token; the client only ever calls these two methods.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> crate::error::Result<Credentials>;

    fn user_agent(&self) -> String;
}

/// Fixed username/password pair, supplied once at construction.
pub struct StaticCredentialProvider {
    username: String,
    password: String,
    user_agent: String,
}

impl StaticCredentialProvider {
    pub fn new(username: impl Into<String>, password: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into(), user_agent: user_agent.into() }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credentials(&self) -> crate::error::Result<Credentials> {
        Ok(Credentials { username: self.username.clone(), password: self.password.clone() })
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_fixed_credentials() {
        let provider = StaticCredentialProvider::new("admin", "s3cret", "test-agent/1.0");
        let creds = provider.credentials().await.unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "s3cret");
        assert_eq!(provider.user_agent(), "test-agent/1.0");
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials { username: "admin".into(), password: "s3cret".into() };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("s3cret"));
    }
}
