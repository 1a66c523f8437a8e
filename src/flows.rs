//! The two request flows: document chat and contract debug/generate.
//!
//! Both follow the same shape:
//!
//! 1. Empty (whitespace-only) input is ignored: no network call, no state change.
//! 2. The session is claimed; if a request is already in flight the caller
//!    gets [`Outcome::Pending`] straight away.
//! 3. The outbound call runs under a bounded timeout and the session's
//!    cancellation token.
//! 4. The result is reported as [`Outcome::Resolved`] or [`Outcome::Failed`].
//!
//! Only the chat flow writes to the transcript, and only on success, so a
//! failed or cancelled question leaves no half-recorded exchange behind.
//! Nothing is retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Secrets};
use crate::embedding::OpenAIEmbeddings;
use crate::llm::{ChatModel, OpenAIChatModel};
use crate::models::ContractMode;
use crate::prompts::contract_prompt;
use crate::query::{QueryEngine, QueryResponse, RetrievalQueryEngine};
use crate::session::Session;
use crate::store::mongo::MongoVectorStore;

/// Why a request did not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    Cancelled,
    Upstream,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Upstream => "upstream",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub reason: FailureReason,
    pub message: String,
}

/// Result of submitting one request in a session.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// Input was empty; nothing happened.
    Ignored,
    /// Another request in this session is still outstanding.
    Pending,
    Resolved(T),
    Failed(Failure),
}

impl<T> Outcome<T> {
    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Ignored => "ignored",
            Outcome::Pending => "pending",
            Outcome::Resolved(_) => "resolved",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// Drive `fut` to completion unless `timeout` elapses or `token` fires first.
pub async fn run_bounded<T, F>(
    timeout: Duration,
    token: &CancellationToken,
    fut: F,
) -> Result<T, Failure>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(Failure {
            reason: FailureReason::Cancelled,
            message: "request was cancelled".to_string(),
        }),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Failure {
                reason: FailureReason::Upstream,
                message: format!("{:#}", e),
            }),
            Err(_) => Err(Failure {
                reason: FailureReason::Timeout,
                message: format!("request timed out after {}s", timeout.as_secs()),
            }),
        },
    }
}

/// Entry points for both flows, shared by every session.
pub struct Flows {
    engine: Arc<dyn QueryEngine>,
    llm: Arc<dyn ChatModel>,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl Flows {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        llm: Arc<dyn ChatModel>,
        timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            llm,
            timeout,
            shutdown,
        }
    }

    /// Wire the flows to the hosted services named in `config`.
    ///
    /// Opens the document-store client once; it is shared by every session
    /// until the process exits.
    pub async fn connect(
        config: &Config,
        secrets: &Secrets,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let embedder = Arc::new(OpenAIEmbeddings::new(
            &config.embedding,
            &secrets.api_token,
        )?);
        let llm: Arc<dyn ChatModel> =
            Arc::new(OpenAIChatModel::new(&config.llm, &secrets.api_token)?);
        let store =
            Arc::new(MongoVectorStore::connect(&secrets.mongodb_uri, &config.store).await?);
        let engine = Arc::new(RetrievalQueryEngine::new(
            embedder,
            store,
            llm.clone(),
            config.store.similarity_top_k,
        ));

        Ok(Self::new(
            engine,
            llm,
            Duration::from_secs(config.server.request_timeout_secs),
            shutdown,
        ))
    }

    /// Server-wide token; cancelling it aborts every outstanding request.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Document chat flow.
    ///
    /// The question goes to the query engine verbatim. On success the
    /// question and answer are appended to the session transcript as one
    /// (user, assistant) pair.
    pub async fn ask(&self, session: &Arc<Session>, question: &str) -> Outcome<QueryResponse> {
        if question.trim().is_empty() {
            return Outcome::Ignored;
        }

        let inflight = match session.try_begin(&self.shutdown) {
            Some(guard) => guard,
            None => return Outcome::Pending,
        };

        tracing::info!(session = %session.id(), "chat query");
        match run_bounded(self.timeout, inflight.token(), self.engine.query(question)).await {
            Ok(answer) => {
                session.record_exchange(question, &answer.response);
                Outcome::Resolved(answer)
            }
            Err(failure) => {
                tracing::warn!(
                    session = %session.id(),
                    reason = failure.reason.as_str(),
                    error = %failure.message,
                    "chat query failed"
                );
                Outcome::Failed(failure)
            }
        }
    }

    /// Contract debug/generate flow.
    ///
    /// The pasted text is interpolated into the template for `mode` and sent
    /// straight to the chat model; the raw reply is returned untransformed.
    pub async fn submit_contract(
        &self,
        session: &Arc<Session>,
        mode: ContractMode,
        code: &str,
    ) -> Outcome<String> {
        if code.trim().is_empty() {
            return Outcome::Ignored;
        }

        let inflight = match session.try_begin(&self.shutdown) {
            Some(guard) => guard,
            None => return Outcome::Pending,
        };

        let prompt = contract_prompt(mode, code);
        tracing::info!(session = %session.id(), %mode, "contract request");
        match run_bounded(self.timeout, inflight.token(), self.llm.complete(&prompt)).await {
            Ok(output) => Outcome::Resolved(output),
            Err(failure) => {
                tracing::warn!(
                    session = %session.id(),
                    reason = failure.reason.as_str(),
                    error = %failure.message,
                    "contract request failed"
                );
                Outcome::Failed(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeEngine {
        calls: Mutex<Vec<String>>,
        delay: Duration,
        fail: bool,
    }

    impl FakeEngine {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl QueryEngine for FakeEngine {
        async fn query(&self, question: &str) -> Result<QueryResponse> {
            self.calls.lock().unwrap().push(question.to_string());
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("index unavailable");
            }
            Ok(QueryResponse {
                response: format!("answer to {}", question),
                sources: Vec::new(),
            })
        }
    }

    struct FakeModel {
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl FakeModel {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        fn model_name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("```solidity\ncontract Fixed {}\n```".to_string())
        }
    }

    fn flows(engine: Arc<FakeEngine>, model: Arc<FakeModel>, timeout: Duration) -> Flows {
        Flows::new(engine, model, timeout, CancellationToken::new())
    }

    fn session() -> Arc<Session> {
        SessionStore::new(Duration::from_secs(60)).get_or_create(None).0
    }

    #[tokio::test]
    async fn test_ask_appends_user_then_assistant() {
        let engine = Arc::new(FakeEngine::new());
        let f = flows(engine.clone(), Arc::new(FakeModel::new()), Duration::from_secs(5));
        let s = session();

        let outcome = f.ask(&s, "What is ArbOS?").await;
        assert_eq!(outcome.status(), "resolved");

        let transcript = s.transcript();
        let turns = transcript.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, crate::models::Role::User);
        assert_eq!(turns[0].content, "What is ArbOS?");
        assert_eq!(turns[1].role, crate::models::Role::Assistant);
        assert_eq!(turns[1].content, "answer to What is ArbOS?");
        assert_eq!(*engine.calls.lock().unwrap(), vec!["What is ArbOS?"]);
    }

    #[tokio::test]
    async fn test_ask_passes_question_verbatim() {
        let engine = Arc::new(FakeEngine::new());
        let f = flows(engine.clone(), Arc::new(FakeModel::new()), Duration::from_secs(5));
        let s = session();

        f.ask(&s, "  spaced question  ").await;
        assert_eq!(*engine.calls.lock().unwrap(), vec!["  spaced question  "]);
        assert_eq!(s.transcript().turns()[0].content, "  spaced question  ");
    }

    #[tokio::test]
    async fn test_empty_inputs_are_ignored() {
        let engine = Arc::new(FakeEngine::new());
        let model = Arc::new(FakeModel::new());
        let f = flows(engine.clone(), model.clone(), Duration::from_secs(5));
        let s = session();

        assert_eq!(f.ask(&s, "").await.status(), "ignored");
        assert_eq!(f.ask(&s, "   \n").await.status(), "ignored");
        assert_eq!(
            f.submit_contract(&s, ContractMode::Debug, "").await.status(),
            "ignored"
        );

        assert!(engine.calls.lock().unwrap().is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert!(s.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_failed_query_leaves_transcript_untouched() {
        let engine = Arc::new(FakeEngine {
            fail: true,
            ..FakeEngine::new()
        });
        let f = flows(engine, Arc::new(FakeModel::new()), Duration::from_secs(5));
        let s = session();

        match f.ask(&s, "What are oracles?").await {
            Outcome::Failed(failure) => {
                assert_eq!(failure.reason, FailureReason::Upstream);
                assert!(failure.message.contains("index unavailable"));
            }
            other => panic!("expected failure, got {}", other.status()),
        }
        assert!(s.transcript().is_empty());
        assert!(!s.is_pending());
    }

    #[tokio::test]
    async fn test_timeout_reports_failure() {
        let engine = Arc::new(FakeEngine {
            delay: Duration::from_secs(10),
            ..FakeEngine::new()
        });
        let f = flows(engine, Arc::new(FakeModel::new()), Duration::from_millis(20));
        let s = session();

        match f.ask(&s, "slow").await {
            Outcome::Failed(failure) => assert_eq!(failure.reason, FailureReason::Timeout),
            other => panic!("expected timeout, got {}", other.status()),
        }
        assert!(s.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_second_request_while_pending() {
        let engine = Arc::new(FakeEngine {
            delay: Duration::from_millis(200),
            ..FakeEngine::new()
        });
        let f = Arc::new(flows(engine, Arc::new(FakeModel::new()), Duration::from_secs(5)));
        let s = session();

        let first = {
            let f = f.clone();
            let s = s.clone();
            tokio::spawn(async move { f.ask(&s, "first").await.status() })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(f.ask(&s, "second").await.status(), "pending");
        assert_eq!(first.await.unwrap(), "resolved");
        assert_eq!(s.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_request() {
        let engine = Arc::new(FakeEngine {
            delay: Duration::from_secs(10),
            ..FakeEngine::new()
        });
        let f = Arc::new(flows(engine, Arc::new(FakeModel::new()), Duration::from_secs(30)));
        let s = session();

        let task = {
            let f = f.clone();
            let s = s.clone();
            tokio::spawn(async move {
                match f.ask(&s, "slow").await {
                    Outcome::Failed(failure) => Some(failure.reason),
                    _ => None,
                }
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(s.cancel());

        assert_eq!(task.await.unwrap(), Some(FailureReason::Cancelled));
        assert!(s.transcript().is_empty());
        assert!(!s.is_pending());
    }

    #[tokio::test]
    async fn test_contract_modes_send_distinct_prompts() {
        let model = Arc::new(FakeModel::new());
        let f = flows(Arc::new(FakeEngine::new()), model.clone(), Duration::from_secs(5));
        let s = session();
        let code = "pragma solidity ^0.8.0;\ncontract A {}";

        let debug = f.submit_contract(&s, ContractMode::Debug, code).await;
        let generate = f.submit_contract(&s, ContractMode::Generate, code).await;

        match (debug, generate) {
            (Outcome::Resolved(a), Outcome::Resolved(b)) => {
                assert_eq!(a, "```solidity\ncontract Fixed {}\n```");
                assert_eq!(a, b);
            }
            _ => panic!("expected both to resolve"),
        }

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts[0], contract_prompt(ContractMode::Debug, code));
        assert_eq!(prompts[1], contract_prompt(ContractMode::Generate, code));
        assert_ne!(prompts[0], prompts[1]);
        assert!(s.transcript().is_empty());
    }
}
