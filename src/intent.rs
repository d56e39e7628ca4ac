//! Intent classification: which business domain does a question concern?
//!
//! Lookup order:
//! 1. Generic "how do I use this" phrasing resolves to `Unknown`.
//! 2. The contract domain gets first refusal.
//! 3. Every other searchable domain is scored; highest wins, catalog order breaks ties.
//! 4. A coarse keyword table catches what scoring missed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    catalog::{Catalog, DomainDescriptor, MenuItem},
    text::contains_any,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Contract,
    Customer,
    SalesOpportunity,
    ProgressNote,
    Meeting,
    Todo,
    Event,
    Pdca,
    Template,
    #[default]
    Unknown,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Customer => "customer",
            Self::SalesOpportunity => "sales_opportunity",
            Self::ProgressNote => "progress_note",
            Self::Meeting => "meeting",
            Self::Todo => "todo",
            Self::Event => "event",
            Self::Pdca => "pdca",
            Self::Template => "template",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub kind: IntentKind,
    pub bound_menu_id: Option<String>,
}

impl Intent {
    pub fn unknown() -> Self {
        Self {
            kind: IntentKind::Unknown,
            bound_menu_id: None,
        }
    }

    fn bound(kind: IntentKind, menu: Option<&MenuItem>) -> Self {
        Self {
            kind,
            bound_menu_id: menu.map(|menu| menu.id.clone()),
        }
    }
}

/// Questions about the app itself; these get the help response, never a search.
const USAGE_PHRASES: &[&str] = &[
    "使い方",
    "使いかた",
    "操作方法",
    "how to use",
    "how do i use",
    "ヘルプ",
    "help",
];

const CONTRACT_KEYWORDS: &[&str] = &["契約", "contract", "サービス資料", "料金", "価格"];

/// Substring → domain, first hit wins. Document words map to the contract
/// domain: contracts are the only document-shaped collection.
const FALLBACK_KEYWORDS: &[(&str, IntentKind)] = &[
    ("顧客", IntentKind::Customer),
    ("customer", IntentKind::Customer),
    ("商談", IntentKind::SalesOpportunity),
    ("案件", IntentKind::SalesOpportunity),
    ("営業", IntentKind::SalesOpportunity),
    ("進捗", IntentKind::ProgressNote),
    ("日報", IntentKind::ProgressNote),
    ("議事録", IntentKind::Meeting),
    ("会議", IntentKind::Meeting),
    ("ミーティング", IntentKind::Meeting),
    ("meeting", IntentKind::Meeting),
    ("todo", IntentKind::Todo),
    ("タスク", IntentKind::Todo),
    ("イベント", IntentKind::Event),
    ("event", IntentKind::Event),
    ("書類", IntentKind::Contract),
    ("資料", IntentKind::Contract),
    ("ドキュメント", IntentKind::Contract),
    ("document", IntentKind::Contract),
];

pub fn classify(query: &str, catalog: &Catalog) -> Intent {
    let q = query.trim().to_lowercase();
    if q.is_empty() || contains_any(&q, USAGE_PHRASES) {
        return Intent::unknown();
    }

    if let Some(intent) = contract_first_refusal(&q, catalog) {
        return intent;
    }

    if let Some(menu) = best_scoring_menu(&q, catalog) {
        if menu.intent != IntentKind::Unknown {
            return Intent::bound(menu.intent, Some(menu));
        }
        debug!(menu = %menu.id, "Best scoring domain has no usable intent; falling through");
    }

    fallback_lookup(&q, catalog)
}

fn contract_first_refusal(q: &str, catalog: &Catalog) -> Option<Intent> {
    let menu = catalog.menu_for_intent(IntentKind::Contract);

    // Field-mapping names ("概要", "よくある質問", ...) are not consulted
    // here; they only select sections once the domain is bound.
    let field_hit = menu
        .and_then(|menu| menu.search.as_ref())
        .is_some_and(|search| {
            search.searchable_fields.iter().any(|field| {
                field
                    .display_names
                    .iter()
                    .map(|name| name.to_lowercase())
                    .any(|name| !name.is_empty() && q.contains(&name))
            })
        });

    if field_hit || contains_any(q, CONTRACT_KEYWORDS) {
        return Some(Intent::bound(IntentKind::Contract, menu));
    }
    None
}

fn best_scoring_menu<'a>(q: &str, catalog: &'a Catalog) -> Option<&'a MenuItem> {
    let mut best: Option<(&MenuItem, usize)> = None;

    for (menu, descriptor) in catalog.searchable_menus() {
        if menu.intent == IntentKind::Contract || !descriptor.is_matchable() {
            continue;
        }

        let score = score_menu(q, menu, descriptor);
        if score == 0 {
            continue;
        }

        // Strictly greater: on a tie the earlier menu keeps the slot.
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((menu, score));
        }
    }

    best.map(|(menu, score)| {
        debug!(menu = %menu.id, score, "Domain selected by keyword score");
        menu
    })
}

pub(crate) fn score_menu(q: &str, menu: &MenuItem, descriptor: &DomainDescriptor) -> usize {
    let mut score = 0;

    let label = menu.label.trim().to_lowercase();
    if !label.is_empty() {
        if q == label {
            score += 100;
        } else if q.contains(&label) {
            score += 50;
        }
    }

    let description = menu.description.trim().to_lowercase();
    if !description.is_empty() && q.contains(&description) {
        score += 30;
    }

    for field in &descriptor.searchable_fields {
        for name in &field.display_names {
            let name = name.trim().to_lowercase();
            if !name.is_empty() && q.contains(&name) {
                score += name.chars().count();
            }
        }
    }

    score
}

fn fallback_lookup(q: &str, catalog: &Catalog) -> Intent {
    FALLBACK_KEYWORDS
        .iter()
        .find(|(keyword, _)| q.contains(keyword))
        .map(|(_, kind)| Intent::bound(*kind, catalog.menu_for_intent(*kind)))
        .unwrap_or_else(Intent::unknown)
}
