//! Response orchestration.
//!
//! `Assistant::answer` walks a fixed chain of states and stops at the first
//! one that produces text. Every stage, the async search included, runs
//! under a panic guard and store failures count as zero candidates, so every
//! path ends in a non-empty response.

use std::{
    any::Any,
    collections::{BTreeMap, HashSet},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    action::{action_response, detect_action},
    catalog::{Catalog, DomainDescriptor, MenuItem, ScopeMode},
    formatter,
    intent::{classify, Intent, IntentKind},
    models::{AnswerResponse, CandidateRecord, DomainSummary, Resolution},
    query_builder, ranker,
    store::{DocumentStore, Scope},
    text::contains_any,
};

pub const DEFAULT_MAX_CANDIDATES: usize = 200;

const FAQ_TRIGGERS: &[&str] = &[
    "よくある質問",
    "faq",
    "パスワード",
    "ログイン",
    "退会",
    "問い合わせ",
];

const HELP_TRIGGERS: &[&str] = &[
    "使い方",
    "ヘルプ",
    "help",
    "何ができ",
    "なにができ",
    "どうやって",
    "how to",
    "操作方法",
];

/// Used when the catalog carries no FAQ entries of its own.
const BUILTIN_FAQ: &str = "よくある質問:\n\n\
Q. パスワードを忘れました\n\
A. ログイン画面の「パスワードを忘れた方」から再設定できます。\n\n\
Q. その他のお問い合わせ\n\
A. 設定ページの「お問い合わせ」からご連絡ください。";

const FINAL_FALLBACK: &str =
    "すみません、うまく回答できませんでした。質問の言い方を変えて、もう一度お試しください。";

/// Result of one orchestrator stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Ready(T),
    Empty,
    Failed(String),
}

impl<T> StageOutcome<Option<T>> {
    fn flatten(self) -> StageOutcome<T> {
        match self {
            Self::Ready(Some(value)) => StageOutcome::Ready(value),
            Self::Ready(None) | Self::Empty => StageOutcome::Empty,
            Self::Failed(reason) => StageOutcome::Failed(reason),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn guarded<T>(stage: &'static str, f: impl FnOnce() -> T) -> StageOutcome<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => StageOutcome::Ready(value),
        Err(payload) => StageOutcome::Failed(format!(
            "{stage} stage panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

/// What a domain search produced.
#[derive(Debug, Clone)]
pub struct ContextResult {
    pub domain: IntentKind,
    pub label: String,
    pub records: Vec<CandidateRecord>,
    pub formatted: String,
    pub page_url: Option<String>,
}

struct Reply {
    resolution: Resolution,
    text: String,
    page_url: Option<String>,
}

type TextStage = fn(&Assistant, &str, &Intent) -> Option<Reply>;

/// Fallback states, tried in order once no search result was produced.
const FALLBACK_CHAIN: &[(&str, TextStage)] = &[
    ("faq", Assistant::faq_reply),
    ("help", Assistant::help_reply),
    ("generic", Assistant::generic_reply),
    ("domain_no_result", Assistant::no_result_reply),
];

#[derive(Clone)]
pub struct Assistant {
    catalog: Arc<Catalog>,
    store: Arc<dyn DocumentStore>,
    max_candidates: usize,
    log_queries: bool,
}

impl Assistant {
    pub fn new(catalog: Arc<Catalog>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            catalog,
            store,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            log_queries: false,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn domains(&self) -> Vec<DomainSummary> {
        self.catalog
            .searchable_menus()
            .map(|(menu, descriptor)| DomainSummary {
                menu_id: menu.id.clone(),
                label: menu.label.clone(),
                intent: menu.intent,
                collection: descriptor.collection.clone(),
                url: menu.url.clone(),
            })
            .collect()
    }

    pub async fn answer(&self, query: &str, caller_id: &str) -> AnswerResponse {
        let trace_id = Uuid::new_v4().to_string();
        if self.log_queries {
            debug!(trace_id = %trace_id, caller = %caller_id, query = %query, "Answering query");
        }

        let action = guarded("action", || {
            detect_action(query).map(|request| (request.tag(), action_response(&request)))
        });
        match action.flatten() {
            StageOutcome::Ready((tag, response)) if !response.text.trim().is_empty() => {
                return respond(
                    trace_id,
                    tag,
                    Reply {
                        resolution: Resolution::ActionMatched,
                        text: response.text,
                        page_url: Some(response.page_url),
                    },
                );
            }
            StageOutcome::Failed(reason) => warn!(trace_id = %trace_id, "{reason}"),
            _ => {}
        }

        let intent = match guarded("classify", || classify(query, &self.catalog)) {
            StageOutcome::Ready(intent) => intent,
            StageOutcome::Failed(reason) => {
                warn!(trace_id = %trace_id, "{reason}");
                Intent::unknown()
            }
            StageOutcome::Empty => Intent::unknown(),
        };
        let tag = intent.kind.as_str().to_string();

        if intent.kind != IntentKind::Unknown {
            let search = AssertUnwindSafe(self.search(query, caller_id, &intent))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    StageOutcome::Failed(format!(
                        "search stage panicked: {}",
                        panic_message(payload.as_ref())
                    ))
                });
            match search {
                StageOutcome::Ready(context) => {
                    if let Some(reply) = reply_from_context(&trace_id, context) {
                        return respond(trace_id, tag, reply);
                    }
                }
                StageOutcome::Empty => {
                    debug!(trace_id = %trace_id, intent = %tag, "Search produced nothing")
                }
                StageOutcome::Failed(reason) => {
                    warn!(trace_id = %trace_id, intent = %tag, "{reason}")
                }
            }
        }

        for &(stage, run) in FALLBACK_CHAIN {
            match guarded(stage, || run(self, query, &intent)).flatten() {
                StageOutcome::Ready(reply) if !reply.text.trim().is_empty() => {
                    return respond(trace_id, tag, reply);
                }
                StageOutcome::Failed(reason) => warn!(trace_id = %trace_id, "{reason}"),
                _ => {}
            }
        }

        respond(
            trace_id,
            tag,
            Reply {
                resolution: Resolution::FinalFallback,
                text: FINAL_FALLBACK.to_string(),
                page_url: None,
            },
        )
    }

    fn search_menu(&self, intent: &Intent) -> Option<(&MenuItem, &DomainDescriptor)> {
        let menu = intent
            .bound_menu_id
            .as_deref()
            .and_then(|id| self.catalog.menu(id))
            .or_else(|| self.catalog.menu_for_intent(intent.kind))?;
        menu.search.as_ref().map(|descriptor| (menu, descriptor))
    }

    async fn search(
        &self,
        query: &str,
        caller_id: &str,
        intent: &Intent,
    ) -> StageOutcome<ContextResult> {
        let Some((menu, descriptor)) = self.search_menu(intent) else {
            return StageOutcome::Empty;
        };

        let limit = descriptor.default_limit.clamp(1, self.max_candidates);
        let candidates = self.fetch(descriptor, caller_id, limit).await;
        if candidates.is_empty() {
            return StageOutcome::Empty;
        }
        let fetched = candidates.len();

        let (structured, records) = match guarded("rank", || {
            let structured = query_builder::build(query, descriptor, &self.catalog);
            let records = ranker::filter(candidates, &structured, query, descriptor);
            (!records.is_empty()).then_some((structured, records))
        })
        .flatten()
        {
            StageOutcome::Ready(ranked) => ranked,
            StageOutcome::Empty => return StageOutcome::Empty,
            StageOutcome::Failed(reason) => return StageOutcome::Failed(reason),
        };
        debug!(
            domain = %menu.id,
            candidates = fetched,
            matched = records.len(),
            "Ranked candidates"
        );

        let formatted = match guarded("format", || {
            formatter::format(
                &records,
                descriptor,
                &menu.label,
                &structured,
                Some(menu.url.as_str()),
            )
        }) {
            StageOutcome::Ready(text) => text,
            StageOutcome::Failed(reason) => {
                error!(domain = %menu.id, "{reason}");
                String::new()
            }
            StageOutcome::Empty => String::new(),
        };

        StageOutcome::Ready(ContextResult {
            domain: intent.kind,
            label: menu.label.clone(),
            records,
            formatted,
            page_url: Some(menu.url.clone()),
        })
    }

    async fn fetch(
        &self,
        descriptor: &DomainDescriptor,
        caller_id: &str,
        limit: usize,
    ) -> Vec<CandidateRecord> {
        let collection = descriptor.collection.as_str();
        match descriptor.scope {
            ScopeMode::ByTenant => {
                let company = match self.store.company_of(caller_id).await {
                    Ok(Some(company)) => company,
                    Ok(None) => {
                        warn!(
                            caller = %caller_id,
                            collection,
                            "Caller has no company; tenant-scoped search skipped"
                        );
                        return Vec::new();
                    }
                    Err(err) => {
                        warn!(caller = %caller_id, collection, "Company lookup failed: {err}");
                        return Vec::new();
                    }
                };
                self.fetch_scope(collection, &Scope::Tenant(company), limit).await
            }
            ScopeMode::ByOwner => {
                let owned = Scope::Owner(caller_id.to_string());
                let shared = Scope::SharedWith(caller_id.to_string());
                let (owned, shared) = tokio::join!(
                    self.fetch_scope(collection, &owned, limit),
                    self.fetch_scope(collection, &shared, limit)
                );
                merge_newest_first(owned, shared, limit)
            }
            ScopeMode::None => self.fetch_scope(collection, &Scope::Unscoped, limit).await,
        }
    }

    async fn fetch_scope(
        &self,
        collection: &str,
        scope: &Scope,
        limit: usize,
    ) -> Vec<CandidateRecord> {
        match self.store.find_by_scope(collection, scope, limit).await {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    collection,
                    ?scope,
                    "Store fetch failed; continuing without these candidates: {err}"
                );
                Vec::new()
            }
        }
    }

    fn faq_reply(&self, query: &str, intent: &Intent) -> Option<Reply> {
        if intent.kind != IntentKind::Unknown
            || !contains_any(&query.to_lowercase(), FAQ_TRIGGERS)
        {
            return None;
        }
        let entries = self.catalog.faq();
        let text = if entries.is_empty() {
            BUILTIN_FAQ.to_string()
        } else {
            let body = entries
                .iter()
                .map(|entry| format!("Q. {}\nA. {}", entry.question, entry.answer))
                .collect::<Vec<_>>()
                .join("\n\n");
            format!("よくある質問:\n\n{body}")
        };
        Some(Reply {
            resolution: Resolution::UnknownFaq,
            text,
            page_url: None,
        })
    }

    fn help_reply(&self, query: &str, intent: &Intent) -> Option<Reply> {
        if intent.kind != IntentKind::Unknown
            || !contains_any(&query.to_lowercase(), HELP_TRIGGERS)
        {
            return None;
        }

        // Categories keep the order of their first menu.
        let mut order = Vec::new();
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for menu in self.catalog.menus() {
            if menu.examples.is_empty() {
                continue;
            }
            let category = if menu.category.trim().is_empty() {
                menu.label.as_str()
            } else {
                menu.category.as_str()
            };
            if !grouped.contains_key(category) {
                order.push(category);
            }
            grouped
                .entry(category)
                .or_default()
                .extend(menu.examples.iter().map(String::as_str));
        }
        if order.is_empty() {
            return None;
        }

        let sections = order
            .iter()
            .map(|category| {
                let examples = grouped
                    .get(category)
                    .map(|examples| {
                        examples
                            .iter()
                            .map(|example| format!("・「{example}」"))
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default();
                format!("【{category}】\n{examples}")
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        Some(Reply {
            resolution: Resolution::UnknownHelp,
            text: format!("こんな質問ができます:\n\n{sections}"),
            page_url: None,
        })
    }

    fn generic_reply(&self, _query: &str, intent: &Intent) -> Option<Reply> {
        if intent.kind != IntentKind::Unknown || self.catalog.menus().is_empty() {
            return None;
        }
        let lines = self
            .catalog
            .menus()
            .iter()
            .map(|menu| {
                if menu.description.trim().is_empty() {
                    format!("・{}", menu.label)
                } else {
                    format!("・{}: {}", menu.label, menu.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Some(Reply {
            resolution: Resolution::UnknownGeneric,
            text: format!(
                "このアシスタントでは次の情報を調べたり、操作方法を案内したりできます。\n\n{lines}\n\n「使い方」と入力すると質問の例を表示します。"
            ),
            page_url: None,
        })
    }

    fn no_result_reply(&self, _query: &str, intent: &Intent) -> Option<Reply> {
        let page = self.catalog.page_context(intent.kind)?;
        let mut text = format!("{}で該当する情報が見つかりませんでした。", page.label);
        if !page.description.trim().is_empty() {
            text.push_str(&format!(
                "\n\n{}ページ（{}）では{}ができます。",
                page.label, page.url, page.description
            ));
        }
        if !page.operations.is_empty() {
            let operations = page
                .operations
                .iter()
                .map(|operation| format!("・{}", operation.label))
                .collect::<Vec<_>>()
                .join("\n");
            text.push_str(&format!("\n\nこのページでできること:\n{operations}"));
        }
        Some(Reply {
            resolution: Resolution::DomainNoResult,
            text,
            page_url: Some(page.url.to_string()),
        })
    }
}

fn reply_from_context(trace_id: &str, context: ContextResult) -> Option<Reply> {
    if !context.formatted.trim().is_empty() {
        return Some(Reply {
            resolution: Resolution::DomainResultFormatted,
            text: context.formatted,
            page_url: context.page_url,
        });
    }
    if context.records.is_empty() {
        return None;
    }

    error!(
        trace_id = %trace_id,
        domain = context.domain.as_str(),
        records = context.records.len(),
        "Formatter produced no output for matched records"
    );
    Some(Reply {
        resolution: Resolution::DomainResultEmptyButHasItems,
        text: format!(
            "{}で{}件見つかりましたが、内容を表示できませんでした。{}ページで直接ご確認ください。",
            context.label,
            context.records.len(),
            context.label
        ),
        page_url: context.page_url,
    })
}

/// Owned and shared candidates, deduplicated by id, newest first.
fn merge_newest_first(
    owned: Vec<CandidateRecord>,
    shared: Vec<CandidateRecord>,
    limit: usize,
) -> Vec<CandidateRecord> {
    let mut seen = HashSet::new();
    let mut merged = owned
        .into_iter()
        .chain(shared)
        .filter(|record| seen.insert(record.id.clone()))
        .collect::<Vec<_>>();
    merged.sort_by(|a, b| b.sort_date().cmp(a.sort_date()).then_with(|| a.id.cmp(&b.id)));
    merged.truncate(limit);
    merged
}

fn respond(trace_id: String, intent_tag: String, reply: Reply) -> AnswerResponse {
    info!(
        trace_id = %trace_id,
        intent = %intent_tag,
        resolution = ?reply.resolution,
        "Answered query"
    );
    AnswerResponse {
        response_text: reply.text,
        intent_tag,
        page_url: reply.page_url,
        resolution: reply.resolution,
        trace_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::fixtures::sample_catalog,
        error::StoreError,
        store::{fixtures::*, SqliteStore},
    };
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingStore;

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn find_by_scope(
            &self,
            _collection: &str,
            _scope: &Scope,
            _limit: usize,
        ) -> Result<Vec<CandidateRecord>, StoreError> {
            Err(StoreError::Poisoned)
        }

        async fn company_of(&self, _user_id: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    struct PanickingStore;

    #[async_trait]
    impl DocumentStore for PanickingStore {
        async fn find_by_scope(
            &self,
            _collection: &str,
            _scope: &Scope,
            _limit: usize,
        ) -> Result<Vec<CandidateRecord>, StoreError> {
            panic!("find_by_scope exploded")
        }

        async fn company_of(&self, _user_id: &str) -> Result<Option<String>, StoreError> {
            panic!("company_of exploded")
        }
    }

    fn assistant_with(store: Arc<dyn DocumentStore>) -> Assistant {
        Assistant::new(Arc::new(sample_catalog()), store)
    }

    async fn seeded_assistant() -> Assistant {
        let store = SqliteStore::open_in_memory().expect("in-memory store");
        store
            .upsert_many(vec![
                user("u1", "山田商事"),
                doc(
                    "contracts",
                    "c1",
                    json!({
                        "title": "Signal.",
                        "company": "山田商事",
                        "updatedAt": "2024-05-01",
                        "sections": {"pricing": "月額1万円", "features": ["通話", "チャット"]}
                    }),
                ),
                doc(
                    "contracts",
                    "c2",
                    json!({
                        "title": "Beacon",
                        "company": "山田商事",
                        "updatedAt": "2024-04-01",
                        "sections": {"pricing": "月額2万円"}
                    }),
                ),
                doc(
                    "salesOpportunities",
                    "s1",
                    json!({"title": "A社 新規", "ownerId": "u1", "updatedAt": "2024-02-01"}),
                ),
                doc(
                    "salesOpportunities",
                    "s2",
                    json!({"title": "B社 更新", "ownerId": "u2", "sharedWith": ["u1"], "updatedAt": "2024-03-01"}),
                ),
                doc(
                    "salesOpportunities",
                    "s3",
                    json!({"title": "C社 非公開", "ownerId": "u2"}),
                ),
            ])
            .await
            .expect("seed");
        assistant_with(Arc::new(store))
    }

    #[tokio::test]
    async fn every_answer_is_non_empty_even_when_the_store_fails() {
        let assistant = assistant_with(Arc::new(FailingStore));
        for query in [
            "",
            "   ",
            "Signal.の料金について教えて",
            "契約書一覧を見たい",
            "顧客リストを見せて",
            "受注した商談",
            "議事録を見せて",
            "パスワードを忘れた",
            "使い方を教えて",
            "今日の天気は？",
            "山田商事様に請求書を作成して",
            "🙂",
        ] {
            let response = assistant.answer(query, "u1").await;
            assert!(
                !response.response_text.trim().is_empty(),
                "empty response for {query:?}"
            );
            assert!(!response.trace_id.is_empty());
        }
    }

    #[tokio::test]
    async fn failing_store_degrades_to_domain_page_context() {
        let assistant = assistant_with(Arc::new(FailingStore));
        let response = assistant.answer("Signal.の料金について教えて", "u1").await;
        assert_eq!(response.resolution, Resolution::DomainNoResult);
        assert_eq!(response.intent_tag, "contract");
        assert_eq!(response.page_url.as_deref(), Some("/contracts"));
        assert!(response.response_text.contains("契約書管理を登録する"));
    }

    #[tokio::test]
    async fn panicking_store_is_contained_by_the_search_stage() {
        let assistant = assistant_with(Arc::new(PanickingStore));
        let handle = tokio::spawn(async move {
            let tenant = assistant.answer("契約書一覧を見たい", "u1").await;
            let owner = assistant.answer("商談一覧", "u1").await;
            (tenant, owner)
        });
        let (tenant, owner) = handle.await.expect("answer must not panic");

        assert_eq!(tenant.resolution, Resolution::DomainNoResult);
        assert_eq!(tenant.page_url.as_deref(), Some("/contracts"));
        assert!(!tenant.response_text.trim().is_empty());
        assert_eq!(owner.intent_tag, "sales_opportunity");
        assert!(!owner.response_text.trim().is_empty());
    }

    #[tokio::test]
    async fn status_queries_against_the_demo_seed_are_formatted() {
        let store = SqliteStore::open_in_memory().expect("in-memory store");
        let seed = std::path::Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/seed.json"));
        store.seed_from_file(seed).await.expect("demo seed");
        let assistant = Assistant::new(
            Arc::new(Catalog::builtin().expect("builtin catalog")),
            Arc::new(store),
        );

        for (query, tag, expected) in [
            ("受注した商談", "sales_opportunity", "佐藤工業"),
            ("取引中の顧客", "customer", "山田商事"),
            ("未完了のタスク", "todo", "見積書送付"),
        ] {
            let response = assistant.answer(query, "local-dev").await;
            assert_eq!(
                response.resolution,
                Resolution::DomainResultFormatted,
                "{query}: {}",
                response.response_text
            );
            assert_eq!(response.intent_tag, tag);
            assert!(response.response_text.contains(expected), "{query}");
        }

        let won = assistant.answer("受注した商談", "local-dev").await;
        assert!(won.response_text.contains("1件"));
        assert!(!won.response_text.contains("追加ライセンス"));
    }

    #[tokio::test]
    async fn action_wins_over_search_keywords() {
        let assistant = seeded_assistant().await;
        let response = assistant
            .answer("山田商事様に請求書を作成して、契約書一覧も見たい", "u1")
            .await;
        assert_eq!(response.resolution, Resolution::ActionMatched);
        assert_eq!(response.intent_tag, "action:create:invoice");
        assert_eq!(response.page_url.as_deref(), Some("/invoices/new"));
    }

    #[tokio::test]
    async fn english_words_containing_verbs_still_search() {
        let assistant = seeded_assistant().await;
        let response = assistant.answer("show me credit card contracts", "u1").await;
        assert_ne!(response.resolution, Resolution::ActionMatched);
        assert_eq!(response.intent_tag, "contract");
    }

    #[tokio::test]
    async fn title_and_section_query_returns_only_that_section() {
        let assistant = seeded_assistant().await;
        let response = assistant.answer("Signal.の料金について教えて", "u1").await;
        assert_eq!(response.resolution, Resolution::DomainResultFormatted);
        assert_eq!(response.intent_tag, "contract");
        assert!(response.response_text.contains("月額1万円"));
        assert!(!response.response_text.contains("月額2万円"));
        assert!(!response.response_text.contains("チャット"));
        assert_eq!(response.page_url.as_deref(), Some("/contracts"));
    }

    #[tokio::test]
    async fn general_listing_returns_every_candidate() {
        let assistant = seeded_assistant().await;
        let response = assistant.answer("契約書一覧を見たい", "u1").await;
        assert_eq!(response.resolution, Resolution::DomainResultFormatted);
        assert!(response.response_text.contains("2件"));
        assert!(response.response_text.contains("Signal."));
        assert!(response.response_text.contains("Beacon"));
    }

    #[tokio::test]
    async fn owner_scope_merges_owned_and_shared_records() {
        let assistant = seeded_assistant().await;
        let response = assistant.answer("商談一覧", "u1").await;
        assert_eq!(response.intent_tag, "sales_opportunity");
        let text = &response.response_text;
        assert!(text.contains("2件"));
        assert!(!text.contains("C社"));
        let shared = text.find("B社").expect("shared record listed");
        let owned = text.find("A社").expect("owned record listed");
        assert!(shared < owned, "newest record comes first");
    }

    #[tokio::test]
    async fn unknown_queries_walk_faq_help_then_generic() {
        let assistant = seeded_assistant().await;

        let faq = assistant.answer("パスワードを忘れた", "u1").await;
        assert_eq!(faq.resolution, Resolution::UnknownFaq);
        assert!(faq.response_text.contains("再設定"));

        let help = assistant.answer("使い方を教えて", "u1").await;
        assert_eq!(help.resolution, Resolution::UnknownHelp);
        assert!(help.response_text.contains("【業務】"));
        assert!(help.response_text.contains("契約書管理一覧を見せて"));

        let generic = assistant.answer("今日の天気は？", "u1").await;
        assert_eq!(generic.resolution, Resolution::UnknownGeneric);
        assert_eq!(generic.intent_tag, "unknown");
        assert!(generic.response_text.contains("顧客管理"));
    }

    #[tokio::test]
    async fn bound_domain_without_search_gets_page_context() {
        let assistant = seeded_assistant().await;
        let response = assistant.answer("議事録を見せて", "u1").await;
        assert_eq!(response.resolution, Resolution::DomainNoResult);
        assert_eq!(response.intent_tag, "meeting");
        assert_eq!(response.page_url.as_deref(), Some("/meetings"));
    }

    #[test]
    fn guarded_turns_panics_into_failures() {
        let outcome: StageOutcome<()> = guarded("boom", || panic!("formatter bug"));
        match outcome {
            StageOutcome::Failed(reason) => assert!(reason.contains("formatter bug")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn unformattable_matches_degrade_to_item_count() {
        let reply = reply_from_context(
            "trace",
            ContextResult {
                domain: IntentKind::Contract,
                label: "契約書管理".to_string(),
                records: vec![CandidateRecord::new("c1", json!({}))],
                formatted: String::new(),
                page_url: Some("/contracts".to_string()),
            },
        )
        .expect("reply");
        assert_eq!(reply.resolution, Resolution::DomainResultEmptyButHasItems);
        assert!(reply.text.contains("1件"));
    }

    #[test]
    fn merge_drops_duplicates_and_sorts_by_date_then_id() {
        let owned = vec![
            CandidateRecord::new("b", json!({"updatedAt": "2024-01-01"})),
            CandidateRecord::new("a", json!({"updatedAt": "2024-01-01"})),
        ];
        let shared = vec![
            CandidateRecord::new("a", json!({"updatedAt": "2024-01-01"})),
            CandidateRecord::new("c", json!({"createdAt": "2024-06-01"})),
        ];
        let merged = merge_newest_first(owned, shared, 10);
        let ids = merged.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
