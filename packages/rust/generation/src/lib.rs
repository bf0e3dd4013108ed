//! Generation gateway for SocialFlow.
//!
//! Every model call in the system goes through [`GenerationGateway::generate`]:
//! one backend call per request, limits applied verbatim, no retry. Backend
//! failures surface as upstream failures at the generation stage.

mod gemini;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use socialflow_shared::{GenerationRequest, Result, SocialFlowError};
use tracing::{debug, info, instrument, warn};

pub use gemini::GeminiBackend;

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// A text-generation service. Implementations perform exactly one remote call
/// per invocation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier used in logs (model name, fake name, ...).
    fn name(&self) -> &str;

    /// Produce text for `request`.
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Sole path to the generation backend.
#[derive(Clone)]
pub struct GenerationGateway {
    backend: Arc<dyn GenerationBackend>,
}

impl GenerationGateway {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Issue one generation call bounded by `timeout`.
    ///
    /// Out-of-range limits are rejected before any I/O. The backend text is
    /// returned verbatim; an empty or whitespace-only response is a failure.
    #[instrument(skip_all, fields(backend = %self.backend.name(), history = request.history.len()))]
    pub async fn generate(&self, request: &GenerationRequest, timeout: Duration) -> Result<String> {
        request.limits.validate()?;
        if request.primary_content.trim().is_empty() {
            return Err(SocialFlowError::validation(
                "generation request has no primary content",
            ));
        }

        let fingerprint = request.fingerprint();
        debug!(
            %fingerprint,
            max_output_units = request.limits.max_output_units,
            temperature = request.limits.temperature,
            "calling generation backend"
        );

        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.backend.complete(request)).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let text = match outcome {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(%fingerprint, latency_ms, error = %err, "generation backend failed");
                return Err(as_generation_failure(err));
            }
            Err(_) => {
                warn!(%fingerprint, latency_ms, timeout_ms = timeout.as_millis() as u64, "generation timed out");
                return Err(SocialFlowError::generation(format!(
                    "backend did not respond within {}s",
                    timeout.as_secs_f32()
                )));
            }
        };

        if text.trim().is_empty() {
            warn!(%fingerprint, latency_ms, "generation backend returned empty text");
            return Err(SocialFlowError::generation("backend returned an empty response"));
        }

        info!(%fingerprint, latency_ms, chars = text.chars().count(), "generation complete");
        Ok(text)
    }
}

/// Backend errors are reported at the generation stage whatever their origin.
fn as_generation_failure(err: SocialFlowError) -> SocialFlowError {
    match err {
        SocialFlowError::Upstream { .. } => err,
        other => SocialFlowError::generation(other.cause()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialflow_shared::{ErrorKind, GenerationLimits, UpstreamStage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake backend with a scripted reply that counts its calls.
    struct ScriptedBackend {
        reply: Result<String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(err: SocialFlowError) -> Self {
            Self {
                reply: Err(err),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(err) => Err(SocialFlowError::generation(err.cause())),
            }
        }
    }

    fn request(limits: GenerationLimits) -> GenerationRequest {
        GenerationRequest {
            instruction: "Summarize.".into(),
            primary_content: "a transcript".into(),
            history: Vec::new(),
            limits,
        }
    }

    fn limits() -> GenerationLimits {
        GenerationLimits {
            max_output_units: 512,
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn returns_backend_text_verbatim() {
        let backend = Arc::new(ScriptedBackend::replying("  Summary\n"));
        let gateway = GenerationGateway::new(backend.clone());
        let text = gateway
            .generate(&request(limits()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "  Summary\n");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_limits_never_reach_backend() {
        let backend = Arc::new(ScriptedBackend::replying("unused"));
        let gateway = GenerationGateway::new(backend.clone());
        let err = gateway
            .generate(
                &request(GenerationLimits {
                    max_output_units: 512,
                    temperature: 1.5,
                }),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_response_is_upstream_failure() {
        let backend = Arc::new(ScriptedBackend::replying("   \n"));
        let gateway = GenerationGateway::new(backend);
        let err = gateway
            .generate(&request(limits()), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SocialFlowError::Upstream {
                stage: UpstreamStage::Generation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn backend_failure_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::failing(SocialFlowError::generation(
            "quota exceeded",
        )));
        let gateway = GenerationGateway::new(backend.clone());
        let err = gateway
            .generate(&request(limits()), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert!(err.cause().contains("quota exceeded"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let backend = Arc::new(ScriptedBackend {
            reply: Ok("late".into()),
            delay: Duration::from_millis(500),
            calls: AtomicUsize::new(0),
        });
        let gateway = GenerationGateway::new(backend);
        let err = gateway
            .generate(&request(limits()), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not respond"));
    }

    #[test]
    fn non_upstream_errors_are_reported_at_generation_stage() {
        let err = as_generation_failure(SocialFlowError::validation("bad role"));
        assert!(matches!(
            err,
            SocialFlowError::Upstream {
                stage: UpstreamStage::Generation,
                ..
            }
        ));
    }
}
