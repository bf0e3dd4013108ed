//! Pipeline orchestration: summarize, discuss, translate.
//!
//! Every operation moves through [`OperationStage`]s and ends in `Done` or
//! `Failed`. All model calls go through the [`GenerationGateway`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use socialflow_generation::GenerationGateway;
use socialflow_shared::{
    ContentType, GenerationRecord, GenerationRequest, HistoryEntry, HistoryMode, Message,
    Operation, PipelineConfig, Result, SocialFlowError, TopicId,
};
use socialflow_transcript::{TranscriptProvider, flatten_segments, parse_topic_ref};
use tracing::{debug, info, instrument, warn};

use crate::conversation::{ConversationStore, TopicLocks};
use crate::journal::GenerationJournal;
use crate::prompt::{assemble_discussion, assemble_grounded, translation_instruction};
use crate::templates::select_template;

// ---------------------------------------------------------------------------
// Stages and progress
// ---------------------------------------------------------------------------

/// Lifecycle of a single pipeline operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStage {
    Assembling,
    Generating,
    Persisting,
    Done,
    Failed,
}

impl OperationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assembling => "assembling",
            Self::Generating => "generating",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called on every stage transition.
    fn stage(&self, operation: Operation, stage: OperationStage);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _operation: Operation, _stage: OperationStage) {}
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Input of [`Pipeline::discuss`].
#[derive(Debug, Clone)]
pub struct DiscussRequest {
    pub topic_id: TopicId,
    pub question: String,
    /// Summary the conversation is grounded in.
    pub grounding: String,
    /// Rolling history, only accepted when the pipeline runs client-held.
    pub history: Option<Vec<HistoryEntry>>,
}

/// Result of [`Pipeline::discuss`].
#[derive(Debug, Clone, Serialize)]
pub struct DiscussOutcome {
    pub answer: String,
    /// The appended assistant message (persisted mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_message: Option<Message>,
}

/// Result of [`Pipeline::summarize_reference`].
#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutcome {
    pub topic_id: TopicId,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Composes template selection, prompt assembly, generation, and the
/// conversation store.
pub struct Pipeline {
    gateway: GenerationGateway,
    store: Arc<dyn ConversationStore>,
    journal: Option<Arc<dyn GenerationJournal>>,
    progress: Arc<dyn ProgressReporter>,
    locks: Arc<TopicLocks>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        gateway: GenerationGateway,
        store: Arc<dyn ConversationStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            journal: None,
            progress: Arc::new(SilentProgress),
            locks: Arc::new(TopicLocks::new()),
            config,
        }
    }

    /// Record every successful generation in `journal`.
    pub fn with_journal(mut self, journal: Arc<dyn GenerationJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Serialize discuss turns through `locks`. Share the same locks with an
    /// [`InMemoryConversationStore`](crate::InMemoryConversationStore) so that
    /// capacity eviction never drops a topic mid-turn.
    pub fn with_turn_locks(mut self, locks: Arc<TopicLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Summarize a transcript with the template for `content_type`.
    #[instrument(skip_all, fields(content_type = content_type.as_str(), chars = transcript.len()))]
    pub async fn summarize(&self, content_type: ContentType, transcript: &str) -> Result<String> {
        let start = Instant::now();
        let result = self.summarize_for(None, content_type, transcript).await;
        self.finish(Operation::Summarize, start, result)
    }

    /// Resolve `topic_ref`, fetch its transcript, and summarize it.
    #[instrument(skip_all, fields(topic_ref = %topic_ref))]
    pub async fn summarize_reference(
        &self,
        provider: &dyn TranscriptProvider,
        topic_ref: &str,
        content_tag: Option<&str>,
    ) -> Result<SummaryOutcome> {
        let start = Instant::now();
        let result = self.fetch_and_summarize(provider, topic_ref, content_tag).await;
        self.finish(Operation::Summarize, start, result)
    }

    /// Answer a follow-up question grounded in a summary.
    ///
    /// In persisted mode the whole turn runs under the topic lock: the user
    /// message is appended before generation and stays in the log if
    /// generation fails; the assistant message is appended only on success.
    /// In client-held mode the caller owns the history and no storage I/O
    /// happens.
    #[instrument(skip_all, fields(topic = %request.topic_id, mode = ?self.config.history_mode))]
    pub async fn discuss(&self, request: DiscussRequest) -> Result<DiscussOutcome> {
        let start = Instant::now();
        let result = match validate_discuss(&request) {
            Err(e) => Err(e),
            Ok(()) => match self.config.history_mode {
                HistoryMode::Persisted => self.discuss_persisted(request).await,
                HistoryMode::ClientHeld => self.discuss_client_held(request).await,
            },
        };
        self.finish(Operation::Discuss, start, result)
    }

    /// Translate `text` into `target_language`, keeping its formatting.
    #[instrument(skip_all, fields(target = %target_language.trim(), chars = text.len()))]
    pub async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        let start = Instant::now();
        let result = self.run_translate(text, target_language).await;
        self.finish(Operation::Translate, start, result)
    }

    /// The stored conversation for `topic`, oldest first.
    pub async fn history(&self, topic: &TopicId) -> Result<Vec<Message>> {
        self.store.list(topic).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn fetch_and_summarize(
        &self,
        provider: &dyn TranscriptProvider,
        topic_ref: &str,
        content_tag: Option<&str>,
    ) -> Result<SummaryOutcome> {
        let topic_id = parse_topic_ref(topic_ref)?;

        let segments = provider.fetch(&topic_id).await?;
        let transcript = flatten_segments(&segments);
        if transcript.is_empty() {
            return Err(SocialFlowError::transcript(format!(
                "transcript for {topic_id} contains no text"
            )));
        }
        debug!(
            topic = %topic_id,
            segments = segments.len(),
            chars = transcript.len(),
            "transcript flattened"
        );

        let content_type = ContentType::from_tag(content_tag);
        let summary = self
            .summarize_for(Some(&topic_id), content_type, &transcript)
            .await?;
        Ok(SummaryOutcome { topic_id, summary })
    }

    async fn run_translate(&self, text: &str, target_language: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(SocialFlowError::validation("text to translate is required"));
        }
        if target_language.trim().is_empty() {
            return Err(SocialFlowError::validation("target language is required"));
        }

        self.enter(Operation::Translate, OperationStage::Assembling);
        let request = assemble_grounded(
            &translation_instruction(target_language),
            text,
            self.config.translate.limits,
        )?;
        self.generate(
            Operation::Translate,
            None,
            request,
            self.config.translate.timeout,
        )
        .await
    }

    async fn summarize_for(
        &self,
        topic: Option<&TopicId>,
        content_type: ContentType,
        transcript: &str,
    ) -> Result<String> {
        self.enter(Operation::Summarize, OperationStage::Assembling);
        let request = assemble_grounded(
            select_template(content_type),
            transcript,
            self.config.summarize.limits,
        )?;
        self.generate(
            Operation::Summarize,
            topic,
            request,
            self.config.summarize.timeout,
        )
        .await
    }

    async fn discuss_persisted(&self, request: DiscussRequest) -> Result<DiscussOutcome> {
        if request.history.as_ref().is_some_and(|h| !h.is_empty()) {
            return Err(SocialFlowError::validation(
                "caller-supplied history is not accepted when history_mode is persisted",
            ));
        }

        let topic = &request.topic_id;
        let _guard = self.locks.acquire(topic).await;

        self.enter(Operation::Discuss, OperationStage::Assembling);
        let prior: Vec<HistoryEntry> = self
            .store
            .list(topic)
            .await?
            .iter()
            .map(HistoryEntry::from)
            .collect();
        let generation_request = assemble_discussion(
            &request.grounding,
            &request.question,
            &prior,
            self.config.discuss.limits,
        )?;

        self.enter(Operation::Discuss, OperationStage::Persisting);
        self.store
            .append(topic, &Message::user(request.question.trim()))
            .await?;

        let answer = self
            .generate(
                Operation::Discuss,
                Some(topic),
                generation_request,
                self.config.discuss.timeout,
            )
            .await?;

        self.enter(Operation::Discuss, OperationStage::Persisting);
        let assistant = Message::assistant(answer.clone());
        self.store.append(topic, &assistant).await?;
        debug!(prior_turns = prior.len(), "discussion turn persisted");

        Ok(DiscussOutcome {
            answer,
            assistant_message: Some(assistant),
        })
    }

    async fn discuss_client_held(&self, request: DiscussRequest) -> Result<DiscussOutcome> {
        self.enter(Operation::Discuss, OperationStage::Assembling);
        let prior = request.history.unwrap_or_default();
        let generation_request = assemble_discussion(
            &request.grounding,
            &request.question,
            &prior,
            self.config.discuss.limits,
        )?;

        let answer = self
            .generate(
                Operation::Discuss,
                Some(&request.topic_id),
                generation_request,
                self.config.discuss.timeout,
            )
            .await?;

        Ok(DiscussOutcome {
            answer,
            assistant_message: None,
        })
    }

    /// One gateway call, then a best-effort journal entry.
    async fn generate(
        &self,
        operation: Operation,
        topic: Option<&TopicId>,
        request: GenerationRequest,
        timeout: Duration,
    ) -> Result<String> {
        self.enter(operation, OperationStage::Generating);
        let text = self.gateway.generate(&request, timeout).await?;

        if let Some(journal) = &self.journal {
            let record = GenerationRecord::new(operation, topic.cloned(), request, text.as_str());
            if let Err(e) = journal.record(&record).await {
                warn!(
                    operation = operation.as_str(),
                    fingerprint = %record.fingerprint,
                    error = %e,
                    "failed to journal generation (non-fatal)"
                );
            }
        }
        Ok(text)
    }

    fn enter(&self, operation: Operation, stage: OperationStage) {
        debug!(operation = operation.as_str(), stage = stage.as_str(), "stage");
        self.progress.stage(operation, stage);
    }

    fn finish<T>(&self, operation: Operation, start: Instant, result: Result<T>) -> Result<T> {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                self.progress.stage(operation, OperationStage::Done);
                info!(
                    operation = operation.as_str(),
                    stage = OperationStage::Done.as_str(),
                    elapsed_ms,
                    "operation complete"
                );
            }
            Err(e) => {
                self.progress.stage(operation, OperationStage::Failed);
                warn!(
                    operation = operation.as_str(),
                    stage = OperationStage::Failed.as_str(),
                    kind = e.kind().as_str(),
                    elapsed_ms,
                    error = %e,
                    "operation failed"
                );
            }
        }
        result
    }
}

fn validate_discuss(request: &DiscussRequest) -> Result<()> {
    if request.question.trim().is_empty() {
        return Err(SocialFlowError::validation("question is required"));
    }
    if request.grounding.trim().is_empty() {
        return Err(SocialFlowError::validation("grounding text is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::InMemoryConversationStore;
    use async_trait::async_trait;
    use socialflow_generation::GenerationBackend;
    use socialflow_shared::{
        BackendRole, ErrorKind, OperationLimits, RetentionPolicy, Sender, TranscriptSegment,
        UpstreamStage,
    };
    use socialflow_storage::Storage;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // -- fakes --------------------------------------------------------------

    /// Echoes the primary content back, or fails while `failing` is set.
    /// Records every request it sees.
    #[derive(Default)]
    struct EchoBackend {
        failing: AtomicBool,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl EchoBackend {
        fn requests(&self) -> Vec<GenerationRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &GenerationRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            tokio::task::yield_now().await;
            if self.failing.load(Ordering::SeqCst) {
                return Err(SocialFlowError::generation("backend unreachable"));
            }
            Ok(format!("echo: {}", request.primary_content))
        }
    }

    /// Store wrapper that counts every call.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryConversationStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConversationStore for CountingStore {
        async fn append(&self, topic: &TopicId, message: &Message) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.append(topic, message).await
        }

        async fn list(&self, topic: &TopicId) -> Result<Vec<Message>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list(topic).await
        }
    }

    struct BrokenJournal;

    #[async_trait]
    impl GenerationJournal for BrokenJournal {
        async fn record(&self, _record: &GenerationRecord) -> Result<()> {
            Err(SocialFlowError::Persistence("disk full".into()))
        }
    }

    struct FixedTranscript(Result<Vec<TranscriptSegment>>);

    #[async_trait]
    impl TranscriptProvider for FixedTranscript {
        async fn fetch(&self, _topic: &TopicId) -> Result<Vec<TranscriptSegment>> {
            match &self.0 {
                Ok(segments) => Ok(segments.clone()),
                Err(e) => Err(SocialFlowError::transcript(e.cause())),
            }
        }
    }

    // -- helpers ------------------------------------------------------------

    fn pipeline_with(
        backend: Arc<EchoBackend>,
        store: Arc<dyn ConversationStore>,
        mode: HistoryMode,
    ) -> Pipeline {
        let config = PipelineConfig {
            history_mode: mode,
            ..PipelineConfig::default()
        };
        Pipeline::new(GenerationGateway::new(backend), store, config)
    }

    fn persisted(backend: Arc<EchoBackend>) -> (Pipeline, Arc<InMemoryConversationStore>) {
        let store = Arc::new(InMemoryConversationStore::default());
        let pipeline = pipeline_with(backend, store.clone(), HistoryMode::Persisted);
        (pipeline, store)
    }

    fn v1() -> TopicId {
        TopicId::new("v1").unwrap()
    }

    fn ask(question: &str) -> DiscussRequest {
        DiscussRequest {
            topic_id: v1(),
            question: question.into(),
            grounding: "Video is about X.".into(),
            history: None,
        }
    }

    fn segment(text: &str) -> TranscriptSegment {
        TranscriptSegment {
            text: text.into(),
            start_secs: 0.0,
            duration_secs: 1.0,
        }
    }

    // -- summarize ----------------------------------------------------------

    #[tokio::test]
    async fn summarize_uses_template_and_returns_backend_text() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, _) = persisted(backend.clone());

        let summary = pipeline
            .summarize(ContentType::from_tag(Some("programming")), "let x = 5;")
            .await
            .unwrap();
        assert_eq!(summary, "echo: let x = 5;");

        let seen = backend.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].instruction, select_template(ContentType::Programming));
        assert!(seen[0].history.is_empty());
        assert_eq!(seen[0].limits, pipeline.config().summarize.limits);
    }

    #[tokio::test]
    async fn summarize_rejects_empty_transcript_without_calling_backend() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, _) = persisted(backend.clone());

        let err = pipeline.summarize(ContentType::General, "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn summarize_reference_fetches_and_flattens() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, _) = persisted(backend.clone());
        let provider = FixedTranscript(Ok(vec![segment("hello"), segment("world")]));

        let outcome = pipeline
            .summarize_reference(
                &provider,
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                Some("podcast"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.topic_id.as_str(), "dQw4w9WgXcQ");
        assert_eq!(outcome.summary, "echo: hello world");
        assert_eq!(
            backend.requests()[0].instruction,
            select_template(ContentType::Podcast)
        );
    }

    #[tokio::test]
    async fn summarize_reference_reports_transcript_stage() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, _) = persisted(backend.clone());
        let provider = FixedTranscript(Err(SocialFlowError::transcript("no captions")));

        let err = pipeline
            .summarize_reference(&provider, "dQw4w9WgXcQ", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SocialFlowError::Upstream {
                stage: UpstreamStage::Transcript,
                ..
            }
        ));
        assert!(backend.requests().is_empty());

        let err = pipeline
            .summarize_reference(&provider, "   ", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    }

    // -- discuss (persisted) ------------------------------------------------

    #[tokio::test]
    async fn two_turns_append_user_assistant_pairs() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, store) = persisted(backend.clone());

        let first = pipeline.discuss(ask("What does it mean?")).await.unwrap();
        pipeline.discuss(ask("What does it mean?")).await.unwrap();

        let log = store.list(&v1()).await.unwrap();
        let senders: Vec<Sender> = log.iter().map(|m| m.sender).collect();
        assert_eq!(
            senders,
            [Sender::User, Sender::Assistant, Sender::User, Sender::Assistant]
        );
        assert_eq!(first.assistant_message.as_ref(), Some(&log[1]));
        assert_eq!(log[1].content, first.answer);

        // The second turn saw the first pair as history, with backend roles.
        let second_request = &backend.requests()[1];
        let roles: Vec<BackendRole> = second_request.history.iter().map(|t| t.role).collect();
        assert_eq!(roles, [BackendRole::User, BackendRole::Model]);
        assert!(second_request.primary_content.starts_with("Context: "));
    }

    #[tokio::test]
    async fn failed_generation_keeps_only_the_user_message() {
        let backend = Arc::new(EchoBackend::default());
        backend.failing.store(true, Ordering::SeqCst);
        let (pipeline, store) = persisted(backend.clone());

        let err = pipeline.discuss(ask("Anyone there?")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);

        let log = store.list(&v1()).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, Sender::User);
        assert_eq!(log[0].content, "Anyone there?");
    }

    #[tokio::test]
    async fn persisted_mode_rejects_caller_history() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, store) = persisted(backend.clone());

        let mut request = ask("q");
        request.history = Some(vec![HistoryEntry::new(Sender::User, "smuggled")]);
        let err = pipeline.discuss(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert!(store.list(&v1()).await.unwrap().is_empty());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn blank_question_fails_before_any_io() {
        let backend = Arc::new(EchoBackend::default());
        let store = Arc::new(CountingStore::default());
        let pipeline = pipeline_with(backend.clone(), store.clone(), HistoryMode::Persisted);

        let err = pipeline.discuss(ask("  ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_turns_on_one_topic_never_interleave() {
        const N: usize = 8;
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, store) = persisted(backend.clone());
        let pipeline = Arc::new(pipeline);

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move { pipeline.discuss(ask(&format!("question {i}"))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let log = store.list(&v1()).await.unwrap();
        assert_eq!(log.len(), 2 * N);
        for pair in log.chunks(2) {
            assert_eq!(pair[0].sender, Sender::User);
            assert_eq!(pair[1].sender, Sender::Assistant);
            assert!(pair[1].content.ends_with(&pair[0].content));
        }

        // Each turn saw every earlier pair and nothing half-written.
        let mut history_lens: Vec<usize> =
            backend.requests().iter().map(|r| r.history.len()).collect();
        history_lens.sort_unstable();
        assert_eq!(history_lens, (0..N).map(|k| 2 * k).collect::<Vec<_>>());
    }

    /// Parks inside `complete` until released.
    #[derive(Default)]
    struct GatedBackend {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl GenerationBackend for GatedBackend {
        fn name(&self) -> &str {
            "gated"
        }

        async fn complete(&self, _request: &GenerationRequest) -> Result<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("answer".into())
        }
    }

    #[tokio::test]
    async fn eviction_waits_for_an_open_turn_to_finish() {
        let locks = Arc::new(TopicLocks::new());
        let store = Arc::new(
            InMemoryConversationStore::new(RetentionPolicy {
                max_topics: Some(1),
                ttl: None,
            })
            .with_turn_locks(Arc::clone(&locks)),
        );
        let backend = Arc::new(GatedBackend::default());
        let pipeline = Arc::new(
            Pipeline::new(
                GenerationGateway::new(backend.clone()),
                store.clone(),
                PipelineConfig::default(),
            )
            .with_turn_locks(locks),
        );

        let turn = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.discuss(ask("what is X?")).await })
        };
        backend.entered.notified().await;

        // Another topic arrives while v1 is waiting on the backend.
        let other = TopicId::new("v2").unwrap();
        store.append(&other, &Message::user("hi")).await.unwrap();

        backend.release.notify_one();
        turn.await.unwrap().unwrap();

        let senders: Vec<Sender> = store
            .list(&v1())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.sender)
            .collect();
        assert_eq!(senders, [Sender::User, Sender::Assistant]);
        assert_eq!(store.list(&other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn database_store_backs_persisted_mode() {
        let path = std::env::temp_dir().join(format!("sf_test_{}.db", uuid::Uuid::now_v7()));
        let db = Arc::new(Storage::open(&path).await.unwrap());
        let backend = Arc::new(EchoBackend::default());
        let pipeline = pipeline_with(backend, db.clone(), HistoryMode::Persisted)
            .with_journal(db.clone());

        let outcome = pipeline.discuss(ask("Why?")).await.unwrap();
        let history = pipeline.history(&v1()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].id, outcome.assistant_message.unwrap().id);

        let fingerprint =
            assemble_discussion("Video is about X.", "Why?", &[], pipeline.config().discuss.limits)
                .unwrap()
                .fingerprint();
        let records = db.generation_records(&fingerprint).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, Operation::Discuss);
        assert_eq!(records[0].topic_id, Some(v1()));
        let _ = std::fs::remove_file(&path);
    }

    // -- discuss (client-held) ----------------------------------------------

    #[tokio::test]
    async fn client_held_mode_does_no_storage_io() {
        let backend = Arc::new(EchoBackend::default());
        let store = Arc::new(CountingStore::default());
        let pipeline = pipeline_with(backend.clone(), store.clone(), HistoryMode::ClientHeld);

        let mut request = ask("And then?");
        request.history = Some(vec![
            HistoryEntry::new(Sender::User, "What happens first?"),
            HistoryEntry::new(Sender::Assistant, "X happens."),
        ]);
        let outcome = pipeline.discuss(request).await.unwrap();

        assert!(outcome.assistant_message.is_none());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        let roles: Vec<BackendRole> = backend.requests()[0]
            .history
            .iter()
            .map(|t| t.role)
            .collect();
        assert_eq!(roles, [BackendRole::User, BackendRole::Model]);
    }

    #[tokio::test]
    async fn malformed_client_history_is_an_assembly_failure() {
        let backend = Arc::new(EchoBackend::default());
        let store = Arc::new(InMemoryConversationStore::default());
        let pipeline = pipeline_with(backend.clone(), store, HistoryMode::ClientHeld);

        let mut request = ask("q");
        request.history = Some(vec![HistoryEntry {
            role: Some(Sender::Assistant),
            content: None,
        }]);
        let err = pipeline.discuss(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AssemblyFailure);
        assert!(backend.requests().is_empty());
    }

    // -- translate ----------------------------------------------------------

    #[tokio::test]
    async fn translate_chain_keeps_output_non_empty() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, store) = persisted(backend.clone());

        let french = pipeline.translate("# Title\n- point", "French").await.unwrap();
        let english = pipeline.translate(&french, "English").await.unwrap();
        assert!(!french.trim().is_empty());
        assert!(!english.trim().is_empty());

        let seen = backend.requests();
        assert!(seen[0].instruction.contains("French"));
        assert!(seen[1].instruction.contains("English"));
        assert_eq!(store.topic_count().await, 0);
    }

    #[tokio::test]
    async fn translate_requires_text_and_language() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, _) = persisted(backend.clone());

        assert_eq!(
            pipeline.translate("", "Hindi").await.unwrap_err().kind(),
            ErrorKind::ValidationFailure
        );
        assert_eq!(
            pipeline.translate("text", " ").await.unwrap_err().kind(),
            ErrorKind::ValidationFailure
        );
        assert!(backend.requests().is_empty());
    }

    // -- limits, journal, progress ------------------------------------------

    #[tokio::test]
    async fn out_of_range_limits_are_rejected_not_clamped() {
        let backend = Arc::new(EchoBackend::default());
        let store = Arc::new(InMemoryConversationStore::default());
        let mut config = PipelineConfig::default();
        config.translate = OperationLimits {
            limits: socialflow_shared::GenerationLimits {
                max_output_units: 100,
                temperature: 2.0,
            },
            timeout: Duration::from_secs(5),
        };
        let pipeline = Pipeline::new(GenerationGateway::new(backend.clone()), store, config);

        let err = pipeline.translate("text", "Odia").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn journal_failure_does_not_fail_the_operation() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, _) = persisted(backend);
        let pipeline = pipeline.with_journal(Arc::new(BrokenJournal));

        let text = pipeline.translate("namaste", "English").await.unwrap();
        assert_eq!(text, "echo: namaste");
    }

    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<(Operation, OperationStage)>>);

    impl ProgressReporter for RecordingProgress {
        fn stage(&self, operation: Operation, stage: OperationStage) {
            self.0.lock().unwrap().push((operation, stage));
        }
    }

    #[tokio::test]
    async fn stages_are_reported_in_order() {
        let backend = Arc::new(EchoBackend::default());
        let (pipeline, _) = persisted(backend.clone());
        let progress = Arc::new(RecordingProgress::default());
        let pipeline = pipeline.with_progress(progress.clone());

        pipeline.discuss(ask("q")).await.unwrap();
        let stages: Vec<OperationStage> =
            progress.0.lock().unwrap().iter().map(|(_, s)| *s).collect();
        assert_eq!(
            stages,
            [
                OperationStage::Assembling,
                OperationStage::Persisting,
                OperationStage::Generating,
                OperationStage::Persisting,
                OperationStage::Done,
            ]
        );

        backend.failing.store(true, Ordering::SeqCst);
        progress.0.lock().unwrap().clear();
        let _ = pipeline.summarize(ContentType::General, "t").await;
        assert_eq!(
            progress.0.lock().unwrap().last(),
            Some(&(Operation::Summarize, OperationStage::Failed))
        );
    }
}
