//! Detects write requests ("請求書を作成して") before any search happens.
//!
//! A hit here short-circuits the whole search path: the caller gets a deep
//! link to the page that performs the operation instead of a "not found".

use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;
use serde::Serialize;
use tracing::error;

use crate::text::contains_any;

pub const CUSTOMER_NAME: &str = "customerName";
pub const TASK_NAME: &str = "taskName";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVerb {
    Create,
    Check,
    Update,
    Delete,
}

impl ActionVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Check => "check",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDomain {
    Invoice,
    Todo,
    Customer,
    Contract,
    Document,
}

impl ActionDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Todo => "todo",
            Self::Customer => "customer",
            Self::Contract => "contract",
            Self::Document => "document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub verb: ActionVerb,
    pub domain: ActionDomain,
    pub entities: BTreeMap<String, String>,
}

impl ActionRequest {
    pub fn tag(&self) -> String {
        format!("action:{}:{}", self.verb.as_str(), self.domain.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub text: String,
    pub page_url: String,
}

// Tiers are tested in this order. Retrieval verbs ("教えて", "見せて",
// "tell me", "show me") must never appear here.
const VERB_TIERS: &[(ActionVerb, &[&str])] = &[
    (
        ActionVerb::Create,
        &[
            "作成して",
            "作成したい",
            "作成する",
            "作って",
            "登録して",
            "登録したい",
            "追加して",
            "追加したい",
            "新規作成",
            "create",
            "add new",
        ],
    ),
    (
        ActionVerb::Check,
        &[
            "確認したい",
            "確認して",
            "確認する",
            "チェックして",
            "チェックしたい",
            "verify",
        ],
    ),
    (
        ActionVerb::Update,
        &[
            "更新して",
            "更新したい",
            "変更して",
            "変更したい",
            "編集して",
            "編集したい",
            "修正して",
            "修正したい",
            "update",
            "edit",
        ],
    ),
    (
        ActionVerb::Delete,
        &["削除して", "削除したい", "消して", "消したい", "delete", "remove"],
    ),
];

const DOMAIN_KEYWORDS: &[(ActionDomain, &[&str])] = &[
    (ActionDomain::Invoice, &["請求書", "請求", "invoice"]),
    (ActionDomain::Todo, &["todo", "タスク", "やること"]),
    (
        ActionDomain::Customer,
        &["顧客", "お客様", "取引先", "customer"],
    ),
    (ActionDomain::Contract, &["契約", "contract"]),
    (
        ActionDomain::Document,
        &["書類", "資料", "ドキュメント", "document"],
    ),
];

/// Words that are never a subject on their own.
const GENERIC_TOKENS: &[&str] = &[
    "作成", "追加", "登録", "更新", "変更", "編集", "修正", "削除", "確認", "新規", "タスク",
    "todo", "請求書", "契約書", "顧客", "書類", "資料",
];

const CUSTOMER_PATTERNS: &[&str] = &[
    r"([^\s、。「」をのはが]+?)(?:様|さま)(?:に|へ)",
    r"([^\s、。「」をのはが]+?)さん(?:に|へ)",
    r"([^\s、。「」をのはが]+?)への",
];

const TASK_PATTERNS: &[&str] = &[
    r"「([^」]+)」",
    r"『([^』]+)』",
    r"([^\s、。「」をのはがにへ]+?)を(?:作成|追加|登録|更新|変更|編集|削除|確認)",
    r"([^\s、。「」をのはがにへ]+?)の(?:作成|追加|登録|更新|変更|編集|削除|確認)",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                error!(pattern = %pattern, "Invalid entity pattern: {err}");
                None
            }
        })
        .collect()
}

/// One tier of phrases. Japanese phrases match as substrings; ASCII phrases
/// match only as whole words, so "credit" never reads as "edit".
struct PhraseSet<T> {
    tag: T,
    native: Vec<&'static str>,
    words: Option<Regex>,
}

impl<T> PhraseSet<T> {
    fn matches(&self, q: &str) -> bool {
        contains_any(q, &self.native)
            || self.words.as_ref().is_some_and(|words| words.is_match(q))
    }
}

/// `suffix` is appended to every ASCII alternative, e.g. `s?` for plural nouns.
fn phrase_sets<T: Copy>(table: &[(T, &[&'static str])], suffix: &str) -> Vec<PhraseSet<T>> {
    table
        .iter()
        .map(|&(tag, phrases)| {
            let (words, native): (Vec<&'static str>, Vec<&'static str>) =
                phrases.iter().copied().partition(|phrase| phrase.is_ascii());
            let words = (!words.is_empty())
                .then(|| {
                    let alternatives = words
                        .iter()
                        .map(|word| regex::escape(word))
                        .collect::<Vec<_>>()
                        .join("|");
                    format!(r"(?:^|[^a-z0-9])(?:{alternatives}){suffix}(?:$|[^a-z0-9])")
                })
                .and_then(|pattern| match Regex::new(&pattern) {
                    Ok(regex) => Some(regex),
                    Err(err) => {
                        error!(pattern = %pattern, "Invalid phrase pattern: {err}");
                        None
                    }
                });
            PhraseSet { tag, native, words }
        })
        .collect()
}

fn verb_tiers() -> &'static [PhraseSet<ActionVerb>] {
    static TIERS: OnceLock<Vec<PhraseSet<ActionVerb>>> = OnceLock::new();
    TIERS.get_or_init(|| phrase_sets(VERB_TIERS, ""))
}

fn domain_keywords() -> &'static [PhraseSet<ActionDomain>] {
    static KEYWORDS: OnceLock<Vec<PhraseSet<ActionDomain>>> = OnceLock::new();
    KEYWORDS.get_or_init(|| phrase_sets(DOMAIN_KEYWORDS, "s?"))
}

fn customer_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile(CUSTOMER_PATTERNS))
}

fn task_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile(TASK_PATTERNS))
}

pub fn detect_action(query: &str) -> Option<ActionRequest> {
    let q = query.to_lowercase();

    let verb = verb_tiers().iter().find(|tier| tier.matches(&q))?.tag;
    let domain = domain_keywords().iter().find(|set| set.matches(&q))?.tag;

    let mut entities = BTreeMap::new();
    if let Some(name) = extract_entity(query, customer_patterns()) {
        entities.insert(CUSTOMER_NAME.to_string(), name);
    }
    if let Some(task) = extract_entity(query, task_patterns()) {
        entities.insert(TASK_NAME.to_string(), task);
    }

    Some(ActionRequest {
        verb,
        domain,
        entities,
    })
}

/// First pattern with an acceptable capture wins. Runs on original casing.
fn extract_entity(query: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(query)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|text| !text.is_empty())
            .filter(|text| !GENERIC_TOKENS.contains(&text.to_lowercase().as_str()))
    })
}

struct ActionTarget {
    noun: &'static str,
    page: &'static str,
    list_url: &'static str,
    new_url: &'static str,
}

fn target(domain: ActionDomain) -> ActionTarget {
    match domain {
        ActionDomain::Invoice => ActionTarget {
            noun: "請求書",
            page: "請求書",
            list_url: "/invoices",
            new_url: "/invoices/new",
        },
        ActionDomain::Todo => ActionTarget {
            noun: "タスク",
            page: "TODO",
            list_url: "/todos",
            new_url: "/todos/new",
        },
        ActionDomain::Customer => ActionTarget {
            noun: "顧客情報",
            page: "顧客管理",
            list_url: "/customers",
            new_url: "/customers/new",
        },
        ActionDomain::Contract => ActionTarget {
            noun: "契約書",
            page: "契約書管理",
            list_url: "/contracts",
            new_url: "/contracts/new",
        },
        ActionDomain::Document => ActionTarget {
            noun: "書類",
            page: "テンプレート",
            list_url: "/templates",
            new_url: "/templates/new",
        },
    }
}

/// Pure formatting: no store access, no side effects.
pub fn action_response(request: &ActionRequest) -> ActionResponse {
    let target = target(request.domain);
    let customer = request.entities.get(CUSTOMER_NAME);
    let task = request.entities.get(TASK_NAME);

    let subject = match (customer, task) {
        (Some(customer), _) => format!("{customer}様の"),
        (None, Some(task)) => format!("「{task}」の"),
        (None, None) => String::new(),
    };

    let (text, page_url) = match request.verb {
        ActionVerb::Create => {
            let lead = match (request.domain, task, customer) {
                (ActionDomain::Todo, Some(task), _) => {
                    format!("「{task}」をタスクとして追加するには")
                }
                (_, _, Some(customer)) => format!("{customer}様の{}を作成するには", target.noun),
                _ => format!("{}を新しく作成するには", target.noun),
            };
            (
                format!(
                    "{lead}、「{}」ページの新規作成画面を開いてください。\n🔗 {}",
                    target.page, target.new_url
                ),
                target.new_url,
            )
        }
        ActionVerb::Check => (
            format!(
                "{subject}{}は「{}」ページで確認できます。\n🔗 {}",
                target.noun, target.page, target.list_url
            ),
            target.list_url,
        ),
        ActionVerb::Update => (
            format!(
                "{subject}{}を変更するには、「{}」ページで対象を開き「編集」を選択してください。\n🔗 {}",
                target.noun, target.page, target.list_url
            ),
            target.list_url,
        ),
        ActionVerb::Delete => (
            format!(
                "{subject}{}を削除するには、「{}」ページで対象を開き「削除」を選択してください。削除した内容は元に戻せません。\n🔗 {}",
                target.noun, target.page, target.list_url
            ),
            target.list_url,
        ),
    };

    ActionResponse {
        text,
        page_url: page_url.to_string(),
    }
}
