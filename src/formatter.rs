//! Renders filtered records as chat text.

use serde_json::Value;

use crate::{
    catalog::DomainDescriptor,
    models::CandidateRecord,
    query_builder::{SectionFilter, StructuredQuery},
};

const SEPARATOR: &str = "\n\n---\n\n";

/// Blocks shown before the listing is cut short.
const MAX_LISTED: usize = 10;

/// Section content as display text. Anything that is not a string or a list
/// of strings / `{title, content}` items renders as nothing.
pub fn stringify_section(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(stringify_item)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn stringify_item(item: &Value) -> Option<String> {
    match item {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| format!("• {text}"))
        }
        Value::Object(entry) => {
            let half = |key: &str| {
                entry
                    .get(key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or_default()
            };
            match (half("title"), half("content")) {
                ("", "") => None,
                (title, "") => Some(format!("• {title}")),
                ("", content) => Some(format!("• {content}")),
                (title, content) => Some(format!("• {title}\n  {content}")),
            }
        }
        _ => None,
    }
}

/// Plain-text rendering of a record field, used for display and substring checks.
pub fn field_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Array(items) => items
            .iter()
            .map(field_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("、"),
        Value::Null | Value::Object(_) => String::new(),
    }
}

fn section_text(record: &CandidateRecord, canonical_key: &str) -> Option<String> {
    record
        .section(canonical_key)
        .map(stringify_section)
        .filter(|content| !content.is_empty())
}

fn section_block(record: &CandidateRecord, filter: &SectionFilter) -> Option<String> {
    let content = section_text(record, &filter.canonical_key)?;
    let heading = match record.display_title() {
        Some((_, title)) => format!("📄 {title}｜{}", filter.display_name),
        None => format!("📄 {}", filter.display_name),
    };
    Some(format!("{heading}\n{content}"))
}

fn field_block(record: &CandidateRecord, descriptor: &DomainDescriptor) -> Option<String> {
    let title = record.display_title();
    let mut lines = Vec::new();
    if let Some((_, title)) = title {
        lines.push(format!("📄 {title}"));
    }

    for field in &descriptor.searchable_fields {
        if title.is_some_and(|(key, _)| key == field.name) {
            continue;
        }
        let Some(text) = record.get(&field.name).map(field_text) else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        let label = field
            .display_names
            .first()
            .map(String::as_str)
            .unwrap_or(field.name.as_str());
        lines.push(format!("{label}: {text}"));
    }

    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Returns an empty string when records were given but none produced a block;
/// the caller treats that as a formatting failure.
pub fn format(
    records: &[CandidateRecord],
    descriptor: &DomainDescriptor,
    domain_label: &str,
    query: &StructuredQuery,
    page_url: Option<&str>,
) -> String {
    if records.is_empty() {
        return format!(
            "{domain_label}で該当するデータが見つかりませんでした。キーワードを変えてもう一度お試しください。"
        );
    }

    // A mapping that names a status rather than a stored section leaves every
    // record without that section; such listings render in field mode.
    let section = query.section_filter.as_ref().filter(|filter| {
        records
            .iter()
            .any(|record| section_text(record, &filter.canonical_key).is_some())
    });
    let blocks = records
        .iter()
        .filter_map(|record| match section {
            Some(filter) => section_block(record, filter),
            None => field_block(record, descriptor),
        })
        .collect::<Vec<_>>();
    if blocks.is_empty() {
        return String::new();
    }

    let total = blocks.len();
    let mut text = format!("{domain_label}: {total}件見つかりました\n\n");
    text.push_str(
        &blocks
            .iter()
            .take(MAX_LISTED)
            .cloned()
            .collect::<Vec<_>>()
            .join(SEPARATOR),
    );
    if total > MAX_LISTED {
        text.push_str(&format!("\n\n…ほか{}件", total - MAX_LISTED));
    }
    if let Some(url) = page_url {
        text.push_str(&format!("\n\n🔗 {domain_label}を開く: {url}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        fixtures::{contract_descriptor, descriptor, field, mapping},
        ScopeMode,
    };
    use serde_json::json;

    fn pricing_query() -> StructuredQuery {
        StructuredQuery {
            section_filter: Some(SectionFilter {
                canonical_key: "pricing".to_string(),
                display_name: "料金".to_string(),
            }),
            title_filter: Some("Signal.".to_string()),
            free_keywords: vec!["Signal.".to_string()],
            ..StructuredQuery::default()
        }
    }

    #[test]
    fn stringify_handles_each_section_shape() {
        assert_eq!(stringify_section(&json!("  月額1万円 ")), "月額1万円");
        assert_eq!(stringify_section(&json!(["A", " ", "B"])), "• A\n• B");
        assert_eq!(
            stringify_section(&json!([
                {"title": "基本", "content": "月額1万円"},
                {"title": "", "content": "初期費用なし"},
                {"title": "オプション"},
                {"title": " ", "content": ""}
            ])),
            "• 基本\n  月額1万円\n• 初期費用なし\n• オプション"
        );
        assert_eq!(stringify_section(&json!({"plan": "basic"})), "");
        assert_eq!(stringify_section(&json!(42)), "");
    }

    #[test]
    fn zero_records_names_the_domain() {
        let text = format(
            &[],
            &contract_descriptor(),
            "契約書管理",
            &StructuredQuery::default(),
            None,
        );
        assert!(text.contains("契約書管理"));
        assert!(text.contains("見つかりませんでした"));
    }

    #[test]
    fn section_mode_renders_only_that_section() {
        let record = CandidateRecord::new(
            "c1",
            json!({
                "title": "Signal.",
                "sections": {
                    "pricing": "月額1万円",
                    "features": ["チャット", "通話"]
                }
            }),
        );
        let text = format(
            &[record],
            &contract_descriptor(),
            "契約書管理",
            &pricing_query(),
            Some("/contracts"),
        );
        assert!(text.contains("月額1万円"));
        assert!(!text.contains("チャット"));
        assert!(text.contains("1件"));
        assert!(text.ends_with("/contracts"));
    }

    #[test]
    fn records_with_empty_sections_are_dropped() {
        let records = vec![
            CandidateRecord::new("c1", json!({"title": "A", "sections": {"pricing": ""}})),
            CandidateRecord::new("c2", json!({"title": "B", "sections": {"pricing": "有料"}})),
        ];
        let text = format(&records, &contract_descriptor(), "契約書管理", &pricing_query(), None);
        assert!(text.starts_with("契約書管理: 1件"));
        assert!(!text.contains("📄 A"));
    }

    #[test]
    fn status_mapping_without_stored_sections_renders_fields() {
        let deals = descriptor(
            "salesOpportunities",
            ScopeMode::ByOwner,
            vec![field("title", &["商談名"]), field("customerName", &["商談先"])],
            vec![mapping("won", &["受注"])],
        );
        let query = StructuredQuery {
            section_filter: Some(SectionFilter {
                canonical_key: "won".to_string(),
                display_name: "受注".to_string(),
            }),
            ..StructuredQuery::default()
        };
        let record = CandidateRecord::new(
            "deal-002",
            json!({"title": "新規導入", "customerName": "佐藤工業", "status": "won"}),
        );
        let text = format(&[record], &deals, "商談管理", &query, None);
        assert!(text.starts_with("商談管理: 1件"));
        assert!(text.contains("📄 新規導入"));
        assert!(text.contains("商談先: 佐藤工業"));
    }

    #[test]
    fn field_mode_labels_values_with_first_display_name() {
        let record = CandidateRecord::new(
            "c1",
            json!({"title": "Signal.", "customerName": "山田商事"}),
        );
        let text = format(
            &[record],
            &contract_descriptor(),
            "契約書管理",
            &StructuredQuery::default(),
            None,
        );
        assert!(text.contains("📄 Signal."));
        assert!(text.contains("契約先: 山田商事"));
        assert!(!text.contains("サービス名: Signal."));
    }

    #[test]
    fn all_blocks_empty_yields_empty_text() {
        let record = CandidateRecord::new("c1", json!({"unrelated": true}));
        let text = format(
            &[record],
            &contract_descriptor(),
            "契約書管理",
            &StructuredQuery::default(),
            None,
        );
        assert!(text.is_empty());
    }

    #[test]
    fn long_listings_are_truncated() {
        let records = (0..12)
            .map(|idx| CandidateRecord::new(format!("c{idx}"), json!({"title": format!("契約{idx}")})))
            .collect::<Vec<_>>();
        let text = format(
            &records,
            &contract_descriptor(),
            "契約書管理",
            &StructuredQuery::default(),
            None,
        );
        assert!(text.starts_with("契約書管理: 12件"));
        assert!(text.contains("ほか2件"));
        assert!(!text.contains("契約11"));
    }
}
