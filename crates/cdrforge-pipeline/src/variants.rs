//! Antibody variant generation through the external inverse-folding service.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cdrforge_common::sandbox::SandboxClient as Client;
use cdrforge_common::{
    CdrForgeError, CdrRegion, ChainRoles, GenerationParams, Result, StructureRecord, Variant, VariantBatch,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::artifacts::{write_artifact, TargetArtifacts};

/// Request body sent to the generation service.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest<'a> {
    pub structure: &'a str,
    pub heavy_chain: &'a str,
    pub light_chain: &'a str,
    pub antigen_chain: &'a str,
    pub num_seqs: u32,
    pub sampling_temp: f64,
    pub design_regions: Vec<CdrRegion>,
}

#[derive(Deserialize)]
struct GenerationResponse {
    sequences: Vec<Variant>,
}

/// External service that designs antibody variants against a structure.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Submit one request and return the raw response body.
    async fn submit(
        &self,
        request: &GenerationRequest<'_>,
        credential: &SecretString,
    ) -> anyhow::Result<String>;
}

/// HTTP client for a hosted generation endpoint.
pub struct HttpGenerationService {
    client: Client,
    endpoint: String,
}

impl HttpGenerationService {
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    #[instrument(skip(self, request, credential), fields(num_seqs = request.num_seqs))]
    async fn submit(
        &self,
        request: &GenerationRequest<'_>,
        credential: &SecretString,
    ) -> anyhow::Result<String> {
        debug!(endpoint = %self.endpoint, "Submitting generation request");
        let resp = self
            .client
            .post(&self.endpoint)?
            .bearer_auth(credential.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let excerpt: String = body.chars().take(300).collect();
            anyhow::bail!("service returned {}: {}", status, excerpt.trim());
        }
        Ok(body)
    }
}

/// Produces a [`VariantBatch`] per target.
pub struct VariantGenerator {
    service: Arc<dyn GenerationService>,
    credential: Option<SecretString>,
    params: GenerationParams,
}

impl VariantGenerator {
    pub fn new(
        service: Arc<dyn GenerationService>,
        credential: Option<SecretString>,
        params: GenerationParams,
    ) -> Self {
        Self {
            service,
            credential,
            params,
        }
    }

    /// The configured credential, or an authentication error naming `target`.
    pub fn credential_for(&self, target: &str) -> Result<&SecretString> {
        match &self.credential {
            Some(c) if !c.expose_secret().trim().is_empty() => Ok(c),
            _ => Err(CdrForgeError::Authentication {
                target: target.to_string(),
            }),
        }
    }

    /// Generate variants for one target.
    ///
    /// The credential is checked before anything is sent. The raw response
    /// is persisted before it is parsed so reporting can be re-run later
    /// without regenerating.
    pub async fn generate(
        &self,
        record: &StructureRecord,
        roles: &ChainRoles,
        artifacts: &TargetArtifacts,
    ) -> Result<VariantBatch> {
        let credential = self.credential_for(&record.target)?;

        let request = GenerationRequest {
            structure: &record.text,
            heavy_chain: &roles.heavy,
            light_chain: &roles.light,
            antigen_chain: &roles.antigen,
            num_seqs: self.params.variant_count,
            sampling_temp: self.params.sampling_temperature,
            design_regions: self.params.regions.iter().copied().collect(),
        };

        info!(
            "Requesting {} variants for {} (temperature {})",
            request.num_seqs, record.target, request.sampling_temp
        );
        let body = self
            .service
            .submit(&request, credential)
            .await
            .map_err(|e| CdrForgeError::Generation {
                target: record.target.clone(),
                reason: format!("{e:#}"),
            })?;

        write_artifact(&artifacts.variants_json, body.as_bytes()).await?;

        let batch = parse_batch(&record.target, &body)?;
        if batch.len() != self.params.variant_count as usize {
            warn!(
                "{}: service returned {} variants, {} requested",
                record.target,
                batch.len(),
                self.params.variant_count
            );
        }
        Ok(batch)
    }
}

/// Parse a raw service response into a batch for `target`.
pub fn parse_batch(target: &str, body: &str) -> Result<VariantBatch> {
    let response: GenerationResponse =
        serde_json::from_str(body).map_err(|e| CdrForgeError::Generation {
            target: target.to_string(),
            reason: format!("malformed response: {}", e),
        })?;
    Ok(VariantBatch::new(target, response.sequences))
}

/// Reload a batch persisted by an earlier run.
pub async fn load_persisted(target: &str, path: &Path) -> Result<VariantBatch> {
    let body = fs::read_to_string(path).await?;
    parse_batch(target, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::testing::serve_once;
    use cdrforge_common::TargetSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingService {
        calls: AtomicUsize,
        body: String,
    }

    impl CountingService {
        fn with_variants(n: usize) -> Self {
            let seqs: Vec<_> = (0..n)
                .map(|i| {
                    serde_json::json!({
                        "heavy": "EVQLVESGGG", "light": "DIQMTQSPSS",
                        "score": 1.0 + i as f64, "global_score": 0.5,
                        "mutations": i, "seq_recovery": 0.9
                    })
                })
                .collect();
            Self {
                calls: AtomicUsize::new(0),
                body: serde_json::json!({ "sequences": seqs }).to_string(),
            }
        }
    }

    #[async_trait]
    impl GenerationService for CountingService {
        async fn submit(
            &self,
            request: &GenerationRequest<'_>,
            credential: &SecretString,
        ) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(credential.expose_secret(), "test-key");
            assert!(request.num_seqs > 0);
            Ok(self.body.clone())
        }
    }

    struct FailingService;

    #[async_trait]
    impl GenerationService for FailingService {
        async fn submit(&self, _: &GenerationRequest<'_>, _: &SecretString) -> anyhow::Result<String> {
            anyhow::bail!("service returned 503 Service Unavailable")
        }
    }

    fn record(target: &str) -> StructureRecord {
        StructureRecord {
            target: target.to_string(),
            structure_id: "XXXX".to_string(),
            text: "ATOM".into(),
        }
    }

    fn params(n: u32) -> GenerationParams {
        GenerationParams {
            variant_count: n,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_any_call() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let roles = ChainRoles::new("H", "L", "A");

        let service = Arc::new(CountingService::with_variants(5));
        let no_key = VariantGenerator::new(service.clone(), None, params(5));
        let egfr = store.for_target(&TargetSpec::new("EGFR", "1YY9", roles.clone()));
        let err = no_key.generate(&record("EGFR"), &roles, &egfr).await.unwrap_err();
        assert!(matches!(err, CdrForgeError::Authentication { ref target } if target == "EGFR"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert!(!egfr.variants_json.exists());

        // A sibling target with a credential is unaffected.
        let keyed = VariantGenerator::new(
            service.clone(),
            Some(SecretString::from("test-key".to_string())),
            params(5),
        );
        let pdl1 = store.for_target(&TargetSpec::new("PDL1", "5XXY", roles.clone()));
        let batch = keyed.generate(&record("PDL1"), &roles, &pdl1).await.unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_credential_is_rejected() {
        let generator = VariantGenerator::new(
            Arc::new(FailingService),
            Some(SecretString::from("   ".to_string())),
            params(1),
        );
        assert!(generator.credential_for("HER2").is_err());
    }

    #[tokio::test]
    async fn test_raw_response_persisted_verbatim() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let roles = ChainRoles::new("H", "L", "A");
        let handle = store.for_target(&TargetSpec::new("VEGFA", "1BJ1", roles.clone()));
        let service = Arc::new(CountingService::with_variants(3));
        let generator = VariantGenerator::new(
            service.clone(),
            Some(SecretString::from("test-key".to_string())),
            params(3),
        );

        let batch = generator.generate(&record("VEGFA"), &roles, &handle).await.unwrap();
        assert_eq!(std::fs::read_to_string(&handle.variants_json).unwrap(), service.body);

        let reloaded = load_persisted("VEGFA", &handle.variants_json).await.unwrap();
        assert_eq!(batch, reloaded);
        assert_eq!(reloaded.variants[2].mutation_count, Some(2));
    }

    #[tokio::test]
    async fn test_service_failure_is_generation_error() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let roles = ChainRoles::new("H", "L", "A");
        let handle = store.for_target(&TargetSpec::new("HER2", "1N8Z", roles.clone()));
        let generator = VariantGenerator::new(
            Arc::new(FailingService),
            Some(SecretString::from("test-key".to_string())),
            params(3),
        );
        let err = generator.generate(&record("HER2"), &roles, &handle).await.unwrap_err();
        assert!(matches!(err, CdrForgeError::Generation { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_malformed_body_is_generation_error() {
        let err = parse_batch("EGFR", "{\"oops\": true}").unwrap_err();
        assert!(matches!(err, CdrForgeError::Generation { .. }));
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_request_wire_format() {
        let req = GenerationRequest {
            structure: "ATOM",
            heavy_chain: "H",
            light_chain: "L",
            antigen_chain: "A",
            num_seqs: 100,
            sampling_temp: 0.8,
            design_regions: vec![CdrRegion::H3],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["num_seqs"], 100);
        assert_eq!(json["design_regions"][0], "CDRH3");
    }

    fn request() -> GenerationRequest<'static> {
        GenerationRequest {
            structure: "ATOM",
            heavy_chain: "H",
            light_chain: "L",
            antigen_chain: "A",
            num_seqs: 4,
            sampling_temp: 0.5,
            design_regions: vec![CdrRegion::H3],
        }
    }

    #[tokio::test]
    async fn test_http_service_posts_json_with_bearer_token() {
        let body = CountingService::with_variants(4).body;
        let (base, captured) = serve_once(200, &body).await;
        let service = HttpGenerationService::new(Client::new().unwrap(), &format!("{base}/v1/antibody/generate"));

        let raw = service
            .submit(&request(), &SecretString::from("test-key".to_string()))
            .await
            .unwrap();
        assert_eq!(parse_batch("EGFR", &raw).unwrap().len(), 4);

        let captured = captured.await.unwrap();
        let lowered = captured.to_ascii_lowercase();
        assert!(captured.starts_with("POST /v1/antibody/generate "), "{captured}");
        assert!(lowered.contains("authorization: bearer test-key"));
        assert!(lowered.contains("content-type: application/json"));
        assert!(captured.contains("\"num_seqs\":4"));
        assert!(captured.contains("\"design_regions\":[\"CDRH3\"]"));
    }

    #[tokio::test]
    async fn test_http_service_error_status_carries_excerpt() {
        let (base, _captured) = serve_once(503, "model is warming up").await;
        let service = HttpGenerationService::new(Client::new().unwrap(), &base);

        let err = service
            .submit(&request(), &SecretString::from("test-key".to_string()))
            .await
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("503"), "{message}");
        assert!(message.contains("model is warming up"), "{message}");
        assert!(!message.contains("test-key"));
    }

    #[tokio::test]
    async fn test_http_service_refuses_unlisted_host() {
        let service = HttpGenerationService::new(Client::new().unwrap(), "https://example.org/generate");
        let err = service
            .submit(&request(), &SecretString::from("test-key".to_string()))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<CdrForgeError>().is_some_and(|e| matches!(e, CdrForgeError::Security(_))));
    }
}
