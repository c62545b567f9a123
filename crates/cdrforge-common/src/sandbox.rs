use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::CdrForgeError;

/// An HTTP client that only talks to approved hosts.
///
/// The default allowlist holds the structure repository; the hosts of the
/// configured generation and numbering endpoints are added at startup.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default allowlist and a 30 second request timeout.
    pub fn new() -> Result<Self, CdrForgeError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Creates a client with the default allowlist and the given request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, CdrForgeError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "files.rcsb.org", // PDB downloads
            "localhost",      // Locally hosted model services
            "127.0.0.1",      // Localhost alt
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("cdrforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CdrForgeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Appends the host of `url` to the allowlist.
    pub fn allow_url(&mut self, url: &str) -> Result<(), CdrForgeError> {
        let parsed = Url::parse(url)
            .map_err(|e| CdrForgeError::Config(format!("invalid endpoint URL {}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CdrForgeError::Config(format!("endpoint URL {} has no host", url)))?;
        self.allow_domain(host);
        Ok(())
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Check exact match or if it's a subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn check(&self, url: &str) -> Result<(), CdrForgeError> {
        if !self.is_allowed(url) {
            return Err(CdrForgeError::Security(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }
        Ok(())
    }

    /// Builds a GET request to an allowlisted URL.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, CdrForgeError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    /// Builds a POST request to an allowlisted URL.
    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, CdrForgeError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allowlist() {
        let client = SandboxClient::new().unwrap();
        assert!(client.is_allowed("https://files.rcsb.org/download/1YY9.pdb"));
        assert!(client.is_allowed("http://127.0.0.1:8000/v1/antibody/generate"));
        assert!(!client.is_allowed("https://example.org/steal"));
        assert!(!client.is_allowed("not a url"));
    }

    #[test]
    fn test_allow_url_adds_host() {
        let mut client = SandboxClient::new().unwrap();
        assert!(client.get("https://api.biomodels.test/v1/generate").is_err());
        client.allow_url("https://api.biomodels.test/v1/generate").unwrap();
        assert!(client.post("https://api.biomodels.test/v1/generate").is_ok());
        assert!(client.is_allowed("https://eu.api.biomodels.test/x"));
    }

    #[test]
    fn test_allow_url_rejects_garbage() {
        let mut client = SandboxClient::new().unwrap();
        assert!(matches!(client.allow_url("::"), Err(CdrForgeError::Config(_))));
    }
}
