//! QaService 端到端：规划 → 执行图 → 会话历史
//!
//! LLM 用脚本化的 MockLlmClient，检索走真实的本地索引，联网搜索与会话存储用记录调用的替身。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use docqa::config::AppConfig;
use docqa::core::{Action, QaError, QaServiceBuilder};
use docqa::llm::{MockLlmClient, MockReply};
use docqa::memory::{ConversationTurn, InMemorySessionMemory, RagIndex, SessionMemory};
use docqa::web_search::{WebSearch, NO_RESULT};
use docqa::QaService;

struct CountingWeb {
    calls: AtomicUsize,
    reply: String,
}

impl CountingWeb {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for CountingWeb {
    async fn search(&self, _query: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

/// 读写都失败的会话存储
struct BrokenMemory;

#[async_trait]
impl SessionMemory for BrokenMemory {
    async fn history(&self, _session_id: &str) -> anyhow::Result<Vec<ConversationTurn>> {
        anyhow::bail!("redis unreachable")
    }

    async fn append_turn(&self, _session_id: &str, _turn: ConversationTurn) -> anyhow::Result<()> {
        anyhow::bail!("redis unreachable")
    }

    async fn clear(&self, _session_id: &str) -> anyhow::Result<()> {
        anyhow::bail!("redis unreachable")
    }
}

async fn seeded_index() -> Arc<RagIndex> {
    let index = Arc::new(RagIndex::new(1000, None));
    index
        .index_document("ownership", "Rust ownership rules: each value has a single owner.")
        .await;
    index
        .index_document("borrowing", "Borrowing lets code use a value without taking ownership.")
        .await;
    index
        .index_document("lifetimes", "Lifetimes describe how long ownership references stay valid.")
        .await;
    index
}

fn service(
    llm: MockLlmClient,
    index: Arc<RagIndex>,
    web: Arc<CountingWeb>,
    memory: Arc<dyn SessionMemory>,
) -> QaService {
    QaServiceBuilder::new(AppConfig::default())
        .with_llm(Arc::new(llm))
        .with_index(index)
        .with_web_search(web)
        .with_session_memory(memory)
        .build()
        .expect("service builds")
}

const RETRIEVE_ANSWER: &str = r#"[{"action": "RETRIEVE", "args": {"k": 5}}, {"action": "ANSWER"}]"#;

#[tokio::test]
async fn answers_from_local_documents() {
    let web = CountingWeb::new("unused");
    let memory = Arc::new(InMemorySessionMemory::default());
    let svc = service(
        MockLlmClient::with_replies([RETRIEVE_ANSWER, "Each value has one owner [1]."]),
        seeded_index().await,
        web.clone(),
        memory.clone(),
    );

    let resp = svc.ask("s1", "explain ownership").await.unwrap();
    assert_eq!(resp.answer, "Each value has one owner [1].");
    assert_eq!(resp.sources.len(), 3);
    assert!(resp.sources.contains(&"ownership".to_string()));
    assert_eq!(resp.plan, vec![Action::Retrieve { k: 5 }, Action::Answer]);
    assert_eq!(web.calls(), 0);

    let history = svc.history("s1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, "explain ownership");
    assert_eq!(history[0].sources, resp.sources);
}

#[tokio::test]
async fn empty_index_detours_to_web() {
    let web = CountingWeb::new("Rust 1.80 shipped in July 2024.");
    let svc = service(
        MockLlmClient::with_replies([RETRIEVE_ANSWER, "July 2024 [1]."]),
        Arc::new(RagIndex::new(100, None)),
        web.clone(),
        Arc::new(InMemorySessionMemory::default()),
    );

    let resp = svc.ask("s1", "when did rust 1.80 ship?").await.unwrap();
    assert_eq!(resp.sources, vec!["web"]);
    assert_eq!(web.calls(), 1);
}

#[tokio::test]
async fn web_answer_admitting_ignorance_does_not_fall_back() {
    let web = CountingWeb::new(NO_RESULT);
    let svc = service(
        MockLlmClient::with_replies([
            r#"[{"action": "SEARCH_WEB"}, {"action": "ANSWER"}]"#,
            "Sorry, I don't have that information",
        ]),
        seeded_index().await,
        web.clone(),
        Arc::new(InMemorySessionMemory::default()),
    );

    let resp = svc.ask("s1", "tomorrow's weather?").await.unwrap();
    assert_eq!(resp.answer, "Sorry, I don't have that information");
    assert_eq!(resp.sources, vec!["web"]);
    assert_eq!(resp.plan, vec![Action::SearchWeb, Action::Answer]);
    assert_eq!(web.calls(), 1);
}

#[tokio::test]
async fn uninformative_answer_triggers_single_web_fallback() {
    let web = CountingWeb::new("Fresh web context.");
    let svc = service(
        MockLlmClient::with_replies([
            RETRIEVE_ANSWER,
            "I am unable to find this in the documents.",
            "Still unable to say, sorry.",
        ]),
        seeded_index().await,
        web.clone(),
        Arc::new(InMemorySessionMemory::default()),
    );

    let resp = svc.ask("s1", "ownership in 2030?").await.unwrap();
    assert_eq!(web.calls(), 1);
    assert_eq!(resp.sources, vec!["web"]);
    assert_eq!(resp.answer, "Still unable to say, sorry.");
    assert_eq!(
        resp.plan,
        vec![Action::Retrieve { k: 5 }, Action::SearchWeb, Action::Answer]
    );
}

#[tokio::test]
async fn history_flows_into_the_next_question() {
    let llm = Arc::new(MockLlmClient::with_replies([
        RETRIEVE_ANSWER,
        "Borrowing avoids moves [1].",
        RETRIEVE_ANSWER,
        "Lifetimes bound references [1].",
    ]));
    let svc = QaServiceBuilder::new(AppConfig::default())
        .with_llm(llm.clone())
        .with_index(seeded_index().await)
        .with_web_search(CountingWeb::new("unused"))
        .build()
        .unwrap();

    svc.ask("s1", "what is borrowing?").await.unwrap();
    svc.ask("s1", "and how long does it last?").await.unwrap();

    let calls = llm.calls();
    assert_eq!(calls.len(), 4);
    // 第二次规划的 prompt 带上了上一轮问答
    assert!(calls[2][0].content.contains("Q: what is borrowing?"));
    // 第二次综合的消息里包含上一轮的 user/assistant
    assert!(calls[3].iter().any(|m| m.content == "Borrowing avoids moves [1]."));

    svc.clear("s1").await.unwrap();
    assert!(svc.history("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn session_store_failures_do_not_fail_the_question() {
    let svc = service(
        MockLlmClient::with_replies([RETRIEVE_ANSWER, "Owner [1]."]),
        seeded_index().await,
        CountingWeb::new("unused"),
        Arc::new(BrokenMemory),
    );

    let resp = svc.ask("s1", "ownership?").await.unwrap();
    assert_eq!(resp.answer, "Owner [1].");
    assert!(matches!(svc.history("s1").await, Err(QaError::Storage(_))));
}

#[tokio::test]
async fn synthesis_failure_is_surfaced_and_not_recorded() {
    let llm = MockLlmClient::with_replies([RETRIEVE_ANSWER]);
    llm.push(MockReply::Fail("HTTP 500".into()));
    let memory = Arc::new(InMemorySessionMemory::default());
    let svc = service(llm, seeded_index().await, CountingWeb::new("unused"), memory.clone());

    let err = svc.ask("s1", "ownership?").await.unwrap_err();
    assert!(matches!(err, QaError::Synthesis(_)));
    assert!(memory.history("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_question_is_rejected() {
    let svc = service(
        MockLlmClient::new(),
        seeded_index().await,
        CountingWeb::new("unused"),
        Arc::new(InMemorySessionMemory::default()),
    );
    assert!(matches!(svc.ask("s1", "   ").await, Err(QaError::EmptyQuestion)));
}

#[tokio::test]
async fn retrieve_debug_clamps_k() {
    let svc = service(
        MockLlmClient::new(),
        seeded_index().await,
        CountingWeb::new("unused"),
        Arc::new(InMemorySessionMemory::default()),
    );
    assert_eq!(svc.retrieve_debug("ownership", Some(0)).await.unwrap().len(), 1);
    assert_eq!(svc.retrieve_debug("ownership", None).await.unwrap().len(), 3);
    assert_eq!(svc.clear_index().await, 3);
    assert!(svc.retrieve_debug("ownership", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_config_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = docqa::create_service_from_config(Some(dir.path().join("absent.toml")))
        .await
        .err()
        .unwrap();
    assert!(matches!(err.downcast_ref::<QaError>(), Some(QaError::Config(_))));
}
