//! Natural language → graph query synthesis with validation feedback.
//!
//! Each attempt asks the LLM for a query against the graph schema, strips
//! any code fence, and validates it by executing it with a one-row limit.
//! A failed attempt feeds the previous query and its error, verbatim, into
//! the next prompt. The loop is bounded by `1 + max_retries` attempts and
//! by an overall timeout.

use std::sync::Arc;
use std::time::Duration;

use docmirror_core::graph::GraphStore;
use docmirror_core::llm::{strip_code_fence, CompletionProvider};

use crate::error::{MirrorError, Result};

pub struct QuerySynthesizer {
    llm: Arc<dyn CompletionProvider>,
    graph: Arc<dyn GraphStore>,
    max_retries: u32,
    timeout: Duration,
}

/// The query and error of a rejected attempt.
struct Rejection {
    query: String,
    error: String,
}

impl QuerySynthesizer {
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        graph: Arc<dyn GraphStore>,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            graph,
            max_retries,
            timeout,
        }
    }

    fn prompt(&self, question: &str, previous: Option<&Rejection>) -> String {
        let mut prompt = format!(
            "Translate the question into a single read-only SQLite query over this schema.\n\n\
             {}\n\n\
             Return only the query, with no explanation.\n\n\
             Question: {}\n",
            self.graph.schema_description(),
            question
        );
        if let Some(rejection) = previous {
            prompt.push_str(&format!(
                "\nYour previous query was:\n{}\nIt failed with this error:\n{}\n\
                 Write a corrected query.\n",
                rejection.query, rejection.error
            ));
        }
        prompt
    }

    /// Returns a query that executes against the live graph store.
    pub async fn generate_query(&self, question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(MirrorError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }

        match tokio::time::timeout(self.timeout, self.attempt_loop(question)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "query synthesis timed out");
                Err(MirrorError::SynthesisTimeout(self.timeout.as_secs()))
            }
        }
    }

    async fn attempt_loop(&self, question: &str) -> Result<String> {
        let attempts = self.max_retries + 1;
        let mut previous: Option<Rejection> = None;

        for attempt in 1..=attempts {
            let reply = self
                .llm
                .complete(&self.prompt(question, previous.as_ref()))
                .await?;
            let query = strip_code_fence(&reply).to_string();

            match self.graph.execute_query(&query, 1).await {
                Ok(_) => {
                    tracing::info!(attempt, "graph query validated");
                    return Ok(query);
                }
                Err(e) => {
                    let error = e.to_string();
                    tracing::warn!(attempt, attempts, %error, "synthesized query rejected");
                    previous = Some(Rejection { query, error });
                }
            }
        }

        Err(MirrorError::QuerySynthesis {
            attempts,
            last_error: previous.map(|r| r.error).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_sqlite::SqliteGraphStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays scripted replies and records every prompt.
    struct ScriptedLlm {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Self {
            let mut replies: Vec<String> = replies.iter().map(|s| s.to_string()).collect();
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            Ok(replies.pop().unwrap_or_else(|| "SELECT missing FROM nowhere".to_string()))
        }
    }

    struct HangingLlm;

    #[async_trait]
    impl CompletionProvider for HangingLlm {
        fn model_name(&self) -> &str {
            "hanging"
        }
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    async fn graph() -> (tempfile::TempDir, Arc<dyn GraphStore>) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("q.sqlite"))
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        (tmp, Arc::new(SqliteGraphStore::new(pool)))
    }

    #[tokio::test]
    async fn first_valid_query_is_returned() {
        let (_tmp, graph) = graph().await;
        let llm = Arc::new(ScriptedLlm::new(&["```sql\nSELECT name FROM graph_entities\n```"]));
        let synth = QuerySynthesizer::new(llm.clone(), graph, 3, Duration::from_secs(5));

        let query = synth.generate_query("list entities").await.unwrap();
        assert_eq!(query, "SELECT name FROM graph_entities");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn error_is_fed_back_verbatim() {
        let (_tmp, graph) = graph().await;
        let llm = Arc::new(ScriptedLlm::new(&[
            "SELECT nme FROM graph_entities",
            "SELECT name FROM graph_entities",
        ]));
        let synth = QuerySynthesizer::new(llm.clone(), graph, 3, Duration::from_secs(5));

        synth.generate_query("list entities").await.unwrap();
        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("previous query"));
        assert!(prompts[1].contains("SELECT nme FROM graph_entities"));
        assert!(prompts[1].contains("no such column: nme"));
    }

    #[tokio::test]
    async fn gives_up_after_four_attempts() {
        let (_tmp, graph) = graph().await;
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let synth = QuerySynthesizer::new(llm.clone(), graph, 3, Duration::from_secs(5));

        let err = synth.generate_query("anything").await.unwrap_err();
        assert_eq!(llm.calls(), 4);
        match err {
            MirrorError::QuerySynthesis {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("no such table: nowhere"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn write_statements_never_validate() {
        let (_tmp, graph) = graph().await;
        let llm = Arc::new(ScriptedLlm::new(&["DELETE FROM graph_entities"; 4]));
        let synth = QuerySynthesizer::new(llm.clone(), graph, 3, Duration::from_secs(5));
        assert!(matches!(
            synth.generate_query("drop it").await,
            Err(MirrorError::QuerySynthesis { attempts: 4, .. })
        ));
    }

    #[tokio::test]
    async fn overall_timeout_is_enforced() {
        let (_tmp, graph) = graph().await;
        let synth =
            QuerySynthesizer::new(Arc::new(HangingLlm), graph, 3, Duration::from_millis(50));
        assert!(matches!(
            synth.generate_query("slow").await,
            Err(MirrorError::SynthesisTimeout(_))
        ));
    }
}
