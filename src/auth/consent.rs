//! Operator consent for browser-based logins

use crate::config::InteractiveMode;
use crate::credential::Provider;
use crate::error::{LadningError, Result};
use std::fmt;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Presents an authorization URL and returns what the browser was redirected to
#[async_trait::async_trait]
pub trait ConsentPrompt: Send + Sync {
    async fn resolve(&self, provider: Provider, authorization_url: &str) -> Result<String>;
}

/// Consent capability selected once at startup
#[derive(Clone)]
pub enum ConsentResolver {
    Interactive(Arc<dyn ConsentPrompt>),
    Unavailable,
}

impl fmt::Debug for ConsentResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsentResolver::Interactive(_) => f.write_str("ConsentResolver::Interactive"),
            ConsentResolver::Unavailable => f.write_str("ConsentResolver::Unavailable"),
        }
    }
}

impl ConsentResolver {
    /// Pick the terminal prompt or headless mode from configuration
    pub fn from_mode(mode: InteractiveMode) -> Self {
        let interactive = match mode {
            InteractiveMode::Always => true,
            InteractiveMode::Never => false,
            InteractiveMode::Auto => std::io::stdin().is_terminal(),
        };
        if interactive {
            ConsentResolver::Interactive(Arc::new(StdinConsentPrompt))
        } else {
            ConsentResolver::Unavailable
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ConsentResolver::Interactive(_))
    }

    /// Ask the operator to authorize; headless runs get `ReauthRequired`
    pub async fn resolve(&self, provider: Provider, authorization_url: &str) -> Result<String> {
        match self {
            ConsentResolver::Interactive(prompt) => {
                let callback = prompt.resolve(provider, authorization_url).await?;
                let callback = callback.trim().to_string();
                if callback.is_empty() {
                    return Err(LadningError::reauth_required(
                        provider.as_str(),
                        "no callback value was entered",
                    ));
                }
                Ok(callback)
            }
            ConsentResolver::Unavailable => Err(LadningError::reauth_required(
                provider.as_str(),
                "interactive login is not available on this host",
            )),
        }
    }
}

/// Prints the URL on stderr and reads the redirected URL from stdin
pub struct StdinConsentPrompt;

#[async_trait::async_trait]
impl ConsentPrompt for StdinConsentPrompt {
    async fn resolve(&self, provider: Provider, authorization_url: &str) -> Result<String> {
        eprintln!();
        eprintln!("Log in to your {} account by opening this URL:", provider);
        eprintln!();
        eprintln!("  {}", authorization_url);
        eprintln!();
        eprintln!("After logging in the browser lands on a page that does not load.");
        eprintln!("Paste the full URL of that page here and press Enter:");

        // Blocking read on its own thread so shutdown can abandon it
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let read = std::io::stdin()
                .read_line(&mut line)
                .map(|n| (n > 0).then_some(line));
            let _ = tx.send(read);
        });
        match rx.await {
            Ok(Ok(Some(line))) => Ok(line),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(None)) | Err(_) => Err(LadningError::reauth_required(
                provider.as_str(),
                "stdin closed before a callback URL was entered",
            )),
        }
    }
}
