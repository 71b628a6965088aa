use async_trait::async_trait;
use qualcode::prelude::*;
use qualcode_chat::{ChatConfig, ChatError, CostEstimate, TokenUsage};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// What the mock client observed.
#[derive(Default)]
struct Calls {
    opened: Vec<OpenedSession>,
    batches: Vec<Vec<String>>,
}

struct OpenedSession {
    api_key: String,
    model: String,
    system_prompt: Option<String>,
    seed: Option<i64>,
    max_attempts: usize,
}

#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    /// Codes the last word of each text as the favorite fruit.
    LastWord,
    FailInit,
    FailExtraction,
    DropRow,
    NoCost,
    /// Never finishes the batch.
    Hang,
}

#[derive(Clone)]
struct MockChat {
    calls: Arc<Mutex<Calls>>,
    behavior: Behavior,
}

impl MockChat {
    fn new(behavior: Behavior) -> Self {
        Self {
            calls: Arc::default(),
            behavior,
        }
    }

    fn opened(&self) -> usize {
        self.calls.lock().unwrap().opened.len()
    }

    fn batches(&self) -> usize {
        self.calls.lock().unwrap().batches.len()
    }
}

struct MockSession {
    calls: Arc<Mutex<Calls>>,
    behavior: Behavior,
}

#[async_trait]
impl StructuredChat for MockChat {
    async fn open_session(&self, config: &ChatConfig) -> Result<Box<dyn ChatSession>, ChatError> {
        self.calls.lock().unwrap().opened.push(OpenedSession {
            api_key: config.api_key.expose_secret().to_string(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            seed: config.seed,
            max_attempts: config.extraction.max_attempts,
        });
        if self.behavior == Behavior::FailInit {
            return Err(ChatError::Init("connection refused".to_string()));
        }
        Ok(Box::new(MockSession {
            calls: Arc::clone(&self.calls),
            behavior: self.behavior,
        }))
    }
}

#[async_trait]
impl ChatSession for MockSession {
    async fn extract_batch(&self, inputs: Vec<String>, _schema: &Schema) -> Result<Vec<Value>, ChatError> {
        self.calls.lock().unwrap().batches.push(inputs.clone());
        if self.behavior == Behavior::Hang {
            std::future::pending::<()>().await;
        }
        if self.behavior == Behavior::FailExtraction {
            return Err(ChatError::Provider {
                row: 1,
                message: "Rate limit reached for gpt-4o-mini".to_string(),
            });
        }
        let mut results: Vec<Value> = inputs
            .iter()
            .map(|text| {
                let fruit = text.split_whitespace().last().unwrap_or_default();
                json!({ "favorite_fruits": fruit })
            })
            .collect();
        if self.behavior == Behavior::DropRow {
            results.pop();
        }
        Ok(results)
    }

    fn cost(&self) -> Result<CostEstimate, ChatError> {
        if self.behavior == Behavior::NoCost {
            return Err(ChatError::Cost("not tracked".to_string()));
        }
        Ok(CostEstimate::new("gpt-4o-mini", TokenUsage::single(20, 10)))
    }
}

fn fruit_schema() -> Schema {
    Schema::object(vec![Field::new("favorite_fruits", Schema::string())])
}

fn fruit_table() -> Table {
    let mut table = Table::new(["id", "text"]).unwrap();
    table.push_row(vec![Cell::Int(1), "I like bananas".into()]).unwrap();
    table.push_row(vec![Cell::Int(2), "I prefer apples".into()]).unwrap();
    table
}

fn coder(chat: &MockChat) -> Coder {
    Coder::new(chat.clone())
        .credentials(StaticCredentials::new().with("OPENAI_API_KEY", "sk-env"))
        .confirm(AlwaysDeny)
}

#[tokio::test]
async fn test_include_source_appends_fields() {
    let chat = MockChat::new(Behavior::LastWord);

    let coded = coder(&chat)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap();

    let records: Vec<Value> = coded.to_records().into_iter().map(Value::Object).collect();
    assert_eq!(
        records,
        vec![
            json!({"id": 1, "text": "I like bananas", "favorite_fruits": "bananas"}),
            json!({"id": 2, "text": "I prefer apples", "favorite_fruits": "apples"}),
        ]
    );
    assert_eq!(chat.batches(), 1);
}

#[tokio::test]
async fn test_without_source_returns_bare_results() {
    let chat = MockChat::new(Behavior::LastWord);

    let coded = coder(&chat)
        .include_source(false)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap();

    assert_eq!(
        coded,
        Coded::Results(vec![
            json!({"favorite_fruits": "bananas"}),
            json!({"favorite_fruits": "apples"}),
        ])
    );
}

#[tokio::test]
async fn test_flat_texts_equal_single_column_table() {
    let chat = MockChat::new(Behavior::LastWord);
    let texts = vec!["I like bananas", "I prefer apples"];

    let from_texts = coder(&chat)
        .code(texts.clone(), &fruit_schema(), 0)
        .await
        .unwrap();
    let from_table = coder(&chat)
        .code(Table::from_texts(texts), &fruit_schema(), 0)
        .await
        .unwrap();

    assert_eq!(from_texts, from_table);
    match from_texts {
        Coded::Table(table) => assert_eq!(table.columns(), ["text", "favorite_fruits"]),
        Coded::Results(_) => panic!("expected a table"),
    }
}

#[tokio::test]
async fn test_row_order_and_count_preserved() {
    let chat = MockChat::new(Behavior::LastWord);
    let texts: Vec<String> = (0..50).map(|i| format!("row {i}")).collect();

    let coded = coder(&chat)
        .include_source(false)
        .code(texts, &fruit_schema(), 0)
        .await
        .unwrap();

    let Coded::Results(results) = coded else {
        panic!("expected results");
    };
    assert_eq!(results.len(), 50);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result["favorite_fruits"], i.to_string());
    }
}

#[tokio::test]
async fn test_missing_credential_makes_no_request() {
    let chat = MockChat::new(Behavior::LastWord);

    let err = Coder::new(chat.clone())
        .credentials(StaticCredentials::new())
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap_err();

    assert!(matches!(err, CodingError::MissingCredential { .. }));
    assert_eq!(chat.opened(), 0);
    assert_eq!(chat.batches(), 0);
}

#[tokio::test]
async fn test_environment_credential_is_used_but_not_returned() {
    let chat = MockChat::new(Behavior::LastWord);

    let coded = coder(&chat)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap();

    assert_eq!(chat.calls.lock().unwrap().opened[0].api_key, "sk-env");
    let rendered = serde_json::to_string(&coded.to_records()).unwrap();
    assert!(!rendered.contains("sk-env"));
}

#[tokio::test]
async fn test_explicit_credential_wins() {
    let chat = MockChat::new(Behavior::LastWord);

    coder(&chat)
        .model(ModelConfig::new("gpt-4.1-mini").with_api_key("sk-explicit").with_seed(9))
        .session(SessionConfig::default().with_system_prompt("Name the fruit."))
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap();

    let calls = chat.calls.lock().unwrap();
    let opened = &calls.opened[0];
    assert_eq!(opened.api_key, "sk-explicit");
    assert_eq!(opened.model, "gpt-4.1-mini");
    assert_eq!(opened.system_prompt.as_deref(), Some("Name the fruit."));
    assert_eq!(opened.seed, Some(9));
    assert_eq!(opened.max_attempts, 3);
}

#[tokio::test]
async fn test_large_input_declined_aborts_before_extraction() {
    let chat = MockChat::new(Behavior::LastWord);

    let err = coder(&chat)
        .char_warning_threshold(10)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap_err();

    match &err {
        CodingError::AbortedByUser {
            total_chars,
            threshold,
        } => {
            assert_eq!(*total_chars, 29);
            assert_eq!(*threshold, 10);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_cancellation());
    assert_eq!(chat.opened(), 0);
    assert_eq!(chat.batches(), 0);
}

struct Unavailable;

impl Confirm for Unavailable {
    fn confirm(&self, _question: &str) -> Confirmation {
        Confirmation::Unavailable
    }
}

#[tokio::test]
async fn test_large_input_without_confirmation_channel_aborts() {
    let chat = MockChat::new(Behavior::LastWord);

    let err = coder(&chat)
        .confirm(Unavailable)
        .char_warning_threshold(10)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap_err();

    assert!(matches!(err, CodingError::AbortedByUser { .. }));
    assert_eq!(chat.batches(), 0);
}

#[tokio::test]
async fn test_large_input_confirmed_proceeds() {
    let chat = MockChat::new(Behavior::LastWord);

    let coded = coder(&chat)
        .confirm(AlwaysAllow)
        .char_warning_threshold(10)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap();

    assert_eq!(coded.len(), 2);
}

#[tokio::test]
async fn test_threshold_is_inclusive() {
    let chat = MockChat::new(Behavior::LastWord);

    // 29 characters in total; equal to the threshold needs no confirmation.
    let coded = coder(&chat)
        .char_warning_threshold(29)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap();

    assert_eq!(coded.len(), 2);
}

#[tokio::test]
async fn test_extraction_failure_wraps_client_message() {
    let chat = MockChat::new(Behavior::FailExtraction);

    let err = coder(&chat)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap_err();

    assert!(matches!(err, CodingError::Extraction(_)));
    assert!(err.to_string().contains("Rate limit reached for gpt-4o-mini"));
}

#[tokio::test]
async fn test_session_init_failure_is_not_retried() {
    let chat = MockChat::new(Behavior::FailInit);

    let err = coder(&chat)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap_err();

    assert!(matches!(err, CodingError::SessionInit(_)));
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(chat.opened(), 1);
    assert_eq!(chat.batches(), 0);
}

#[tokio::test]
async fn test_short_result_is_an_extraction_error() {
    let chat = MockChat::new(Behavior::DropRow);

    let err = coder(&chat)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CodingError::Extraction(ChatError::CountMismatch {
            expected: 2,
            actual: 1
        })
    ));
}

#[tokio::test]
async fn test_cost_failure_is_not_fatal() {
    let chat = MockChat::new(Behavior::NoCost);

    let coded = coder(&chat)
        .code(fruit_table(), &fruit_schema(), "text")
        .await
        .unwrap();

    assert_eq!(coded.len(), 2);
}

#[tokio::test]
async fn test_argument_errors_precede_network() {
    let chat = MockChat::new(Behavior::LastWord);

    let err = coder(&chat)
        .code(fruit_table(), &Schema::string(), "text")
        .await
        .unwrap_err();
    assert!(matches!(err, CodingError::SchemaType(_)));

    let err = coder(&chat)
        .code(fruit_table(), &fruit_schema(), "answer")
        .await
        .unwrap_err();
    assert!(matches!(err, CodingError::ColumnNotFound { .. }));
    assert!(err.to_string().contains("id, text"));

    let clashing = Schema::object(vec![Field::new("text", Schema::string())]);
    let err = coder(&chat)
        .code(fruit_table(), &clashing, "text")
        .await
        .unwrap_err();
    assert!(matches!(err, CodingError::InvalidArgument { argument: "schema", .. }));

    assert_eq!(chat.opened(), 0);
}

#[tokio::test]
async fn test_clashing_field_allowed_without_source() {
    let chat = MockChat::new(Behavior::LastWord);
    let clashing = Schema::object(vec![Field::new("text", Schema::string())]);

    let coded = coder(&chat)
        .include_source(false)
        .code(fruit_table(), &clashing, "text")
        .await
        .unwrap();

    assert_eq!(coded.len(), 2);
}

#[tokio::test]
async fn test_null_text_is_sent_as_empty_string() {
    let chat = MockChat::new(Behavior::LastWord);
    let mut table = Table::new(["text"]).unwrap();
    table.push_row(vec![Cell::Null]).unwrap();
    table.push_row(vec![Cell::Int(42)]).unwrap();

    coder(&chat)
        .code(table, &fruit_schema(), "text")
        .await
        .unwrap();

    let calls = chat.calls.lock().unwrap();
    assert_eq!(calls.batches[0], vec![String::new(), "42".to_string()]);
}

#[tokio::test]
async fn test_cancellation_during_extraction_is_aborted() {
    let chat = MockChat::new(Behavior::Hang);
    let stop = Arc::new(Notify::new());
    stop.notify_one();

    let cancel = {
        let stop = Arc::clone(&stop);
        async move { stop.notified().await }
    };
    let err = coder(&chat)
        .code_until(fruit_table(), &fruit_schema(), "text", cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, CodingError::Aborted));
    assert!(err.is_cancellation());
}

#[tokio::test]
async fn test_completion_wins_when_not_cancelled() {
    let chat = MockChat::new(Behavior::LastWord);

    let coded = coder(&chat)
        .code_until(fruit_table(), &fruit_schema(), "text", std::future::pending::<()>())
        .await
        .unwrap();

    assert_eq!(coded.len(), 2);
}

/// Signals when asked, then blocks until released.
struct WaitingConfirm {
    asked: Arc<Notify>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl Confirm for WaitingConfirm {
    fn confirm(&self, _question: &str) -> Confirmation {
        self.asked.notify_one();
        let _ = self
            .release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5));
        Confirmation::Yes
    }
}

#[tokio::test]
async fn test_cancellation_interrupts_pending_confirmation() {
    let chat = MockChat::new(Behavior::LastWord);
    let asked = Arc::new(Notify::new());
    let (release, waiting) = mpsc::channel();

    let cancel = {
        let asked = Arc::clone(&asked);
        async move { asked.notified().await }
    };
    let result = coder(&chat)
        .confirm(WaitingConfirm {
            asked,
            release: Mutex::new(waiting),
        })
        .char_warning_threshold(10)
        .code_until(fruit_table(), &fruit_schema(), "text", cancel)
        .await;
    release.send(()).unwrap();

    assert!(matches!(result, Err(CodingError::Aborted)));
    assert_eq!(chat.opened(), 0);
}

#[tokio::test]
async fn test_duplicate_schema_fields_rejected() {
    let chat = MockChat::new(Behavior::LastWord);
    let schema = Schema::object(vec![
        Field::new("code", Schema::string()),
        Field::new("code", Schema::integer()),
    ]);

    let err = coder(&chat)
        .code(fruit_table(), &schema, "text")
        .await
        .unwrap_err();

    assert!(matches!(err, CodingError::SchemaType(_)));
    assert!(err.to_string().contains("duplicate field 'code'"));
    assert_eq!(chat.opened(), 0);
}

#[test]
fn test_non_object_results_are_kept() {
    let coded = Coded::Results(vec![json!({"code": 1}), json!("bananas")]);

    let records: Vec<Value> = coded.to_records().into_iter().map(Value::Object).collect();

    assert_eq!(records, vec![json!({"code": 1}), json!({"value": "bananas"})]);
}
