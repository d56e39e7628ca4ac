//! Declarative domain catalog: menus, their pages and optional search schemas.
//!
//! The catalog is immutable once built. Menu order is fixed at construction
//! by `(priority, declaration index)` so every "first match wins" rule in the
//! router is stable regardless of how the source list was assembled.

use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{error::CatalogError, intent::IntentKind};

const BUILTIN_CATALOG: &str = include_str!("../catalog/default.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    ByTenant,
    ByOwner,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchableField {
    pub name: String,
    pub display_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub canonical_key: String,
    pub display_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDescriptor {
    pub collection: String,
    #[serde(default)]
    pub scope: ScopeMode,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default)]
    pub searchable_fields: Vec<SearchableField>,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
}

impl DomainDescriptor {
    /// A descriptor without searchable fields can still be fetched from, but
    /// never wins keyword scoring.
    pub fn is_matchable(&self) -> bool {
        self.searchable_fields
            .iter()
            .any(|field| field.display_names.iter().any(|name| !name.trim().is_empty()))
    }
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub intent: IntentKind,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub search: Option<DomainDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    menus: Vec<MenuItem>,
    #[serde(default)]
    faq: Vec<FaqEntry>,
}

#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub label: &'a str,
    pub description: &'a str,
    pub url: &'a str,
    pub operations: &'a [Operation],
}

#[derive(Debug, Clone)]
pub struct Catalog {
    menus: Vec<MenuItem>,
    faq: Vec<FaqEntry>,
}

impl Catalog {
    pub fn new(menus: Vec<MenuItem>, faq: Vec<FaqEntry>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for menu in &menus {
            if !seen.insert(menu.id.clone()) {
                return Err(CatalogError::DuplicateMenu(menu.id.clone()));
            }
            if let Some(search) = &menu.search {
                if !search.is_matchable() {
                    warn!(
                        menu = %menu.id,
                        collection = %search.collection,
                        "Search descriptor has no searchable fields; domain is excluded from keyword scoring"
                    );
                }
            }
        }

        let mut indexed = menus.into_iter().enumerate().collect::<Vec<_>>();
        indexed.sort_by_key(|(idx, menu)| (menu.priority, *idx));

        Ok(Self {
            menus: indexed.into_iter().map(|(_, menu)| menu).collect(),
            faq,
        })
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        Self::new(file.menus, file.faq)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// All menus in priority order.
    pub fn menus(&self) -> &[MenuItem] {
        &self.menus
    }

    pub fn menu(&self, id: &str) -> Option<&MenuItem> {
        self.menus.iter().find(|menu| menu.id == id)
    }

    /// Menus that carry a search descriptor, in priority order.
    pub fn searchable_menus(&self) -> impl Iterator<Item = (&MenuItem, &DomainDescriptor)> {
        self.menus
            .iter()
            .filter_map(|menu| menu.search.as_ref().map(|search| (menu, search)))
    }

    /// First menu for the intent, preferring one that can be searched.
    pub fn menu_for_intent(&self, intent: IntentKind) -> Option<&MenuItem> {
        if intent == IntentKind::Unknown {
            return None;
        }
        self.menus
            .iter()
            .find(|menu| menu.intent == intent && menu.search.is_some())
            .or_else(|| self.menus.iter().find(|menu| menu.intent == intent))
    }

    pub fn page_context(&self, intent: IntentKind) -> Option<PageContext<'_>> {
        self.menu_for_intent(intent).map(|menu| PageContext {
            label: &menu.label,
            description: &menu.description,
            url: &menu.url,
            operations: &menu.operations,
        })
    }

    pub fn faq(&self) -> &[FaqEntry] {
        &self.faq
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn field(name: &str, display_names: &[&str]) -> SearchableField {
        SearchableField {
            name: name.to_string(),
            display_names: display_names.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn mapping(canonical_key: &str, display_names: &[&str]) -> FieldMapping {
        FieldMapping {
            canonical_key: canonical_key.to_string(),
            display_names: display_names.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn descriptor(
        collection: &str,
        scope: ScopeMode,
        fields: Vec<SearchableField>,
        mappings: Vec<FieldMapping>,
    ) -> DomainDescriptor {
        DomainDescriptor {
            collection: collection.to_string(),
            scope,
            default_limit: 50,
            searchable_fields: fields,
            field_mappings: mappings,
        }
    }

    pub fn menu(
        id: &str,
        label: &str,
        intent: IntentKind,
        search: Option<DomainDescriptor>,
    ) -> MenuItem {
        MenuItem {
            id: id.to_string(),
            label: label.to_string(),
            description: format!("{label}の管理"),
            url: format!("/{id}"),
            category: "業務".to_string(),
            intent,
            priority: 0,
            operations: vec![Operation {
                label: format!("{label}を登録する"),
            }],
            examples: vec![format!("{label}一覧を見せて")],
            search,
        }
    }

    pub fn contract_descriptor() -> DomainDescriptor {
        descriptor(
            "contracts",
            ScopeMode::ByTenant,
            vec![
                field("title", &["サービス名", "契約名"]),
                field("customerName", &["契約先"]),
            ],
            vec![
                mapping("overview", &["概要"]),
                mapping("pricing", &["料金", "価格"]),
                mapping("features", &["機能"]),
                mapping("faq", &["よくある質問"]),
            ],
        )
    }

    /// A small synthetic catalog covering every classifier path.
    pub fn sample_catalog() -> Catalog {
        let menus = vec![
            menu(
                "contracts",
                "契約書管理",
                IntentKind::Contract,
                Some(contract_descriptor()),
            ),
            menu(
                "customers",
                "顧客管理",
                IntentKind::Customer,
                Some(descriptor(
                    "customers",
                    ScopeMode::ByTenant,
                    vec![
                        field("companyName", &["会社名", "顧客リスト"]),
                        field("industry", &["業種"]),
                    ],
                    vec![
                        mapping("prospect", &["見込み"]),
                        mapping("active", &["取引中"]),
                    ],
                )),
            ),
            menu(
                "sales",
                "商談管理",
                IntentKind::SalesOpportunity,
                Some(descriptor(
                    "salesOpportunities",
                    ScopeMode::ByOwner,
                    vec![
                        field("title", &["商談名"]),
                        field("summary", &["リスト"]),
                    ],
                    vec![mapping("won", &["受注"]), mapping("lost", &["失注"])],
                )),
            ),
            menu(
                "invoices",
                "請求書",
                IntentKind::Unknown,
                Some(descriptor(
                    "invoices",
                    ScopeMode::ByTenant,
                    vec![field("billTo", &["請求先"])],
                    Vec::new(),
                )),
            ),
            menu(
                "templates",
                "テンプレート",
                IntentKind::Template,
                Some(descriptor(
                    "templates",
                    ScopeMode::None,
                    Vec::new(),
                    Vec::new(),
                )),
            ),
            menu("meetings", "議事録", IntentKind::Meeting, None),
            menu("settings", "設定", IntentKind::Unknown, None),
        ];
        let faq = vec![FaqEntry {
            question: "パスワードを忘れました".to_string(),
            answer: "ログイン画面の「パスワードを忘れた方」から再設定できます。".to_string(),
        }];
        Catalog::new(menus, faq).expect("sample catalog is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn builtin_catalog_parses_and_binds_every_search_intent() {
        let catalog = Catalog::builtin().expect("builtin catalog parses");
        assert!(catalog.menus().len() >= 8);
        for intent in [
            IntentKind::Contract,
            IntentKind::Customer,
            IntentKind::SalesOpportunity,
            IntentKind::ProgressNote,
            IntentKind::Meeting,
            IntentKind::Todo,
            IntentKind::Event,
        ] {
            let menu = catalog
                .menu_for_intent(intent)
                .unwrap_or_else(|| panic!("missing menu for {intent:?}"));
            assert!(menu.search.is_some(), "{} has no search descriptor", menu.id);
        }
    }

    #[test]
    fn priority_orders_menus_and_ties_keep_declaration_order() {
        let mut late = menu("b", "B", IntentKind::Customer, None);
        late.priority = 1;
        let menus = vec![
            late,
            menu("a", "A", IntentKind::Customer, None),
            menu("c", "C", IntentKind::Customer, None),
        ];
        let catalog = Catalog::new(menus, Vec::new()).expect("valid catalog");
        let ids = catalog
            .menus()
            .iter()
            .map(|menu| menu.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn duplicate_menu_ids_are_rejected() {
        let menus = vec![
            menu("a", "A", IntentKind::Customer, None),
            menu("a", "A2", IntentKind::Meeting, None),
        ];
        assert!(matches!(
            Catalog::new(menus, Vec::new()),
            Err(CatalogError::DuplicateMenu(id)) if id == "a"
        ));
    }

    #[test]
    fn descriptor_without_fields_is_not_matchable() {
        let catalog = sample_catalog();
        let templates = catalog.menu("templates").and_then(|m| m.search.as_ref());
        assert!(templates.is_some_and(|d| !d.is_matchable()));
    }

    #[test]
    fn page_context_prefers_searchable_menu() {
        let catalog = sample_catalog();
        let context = catalog
            .page_context(IntentKind::Contract)
            .expect("contract page");
        assert_eq!(context.url, "/contracts");
        assert!(catalog.page_context(IntentKind::Unknown).is_none());
    }
}
