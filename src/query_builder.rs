//! Turns a question plus a domain descriptor into a `StructuredQuery`.
//!
//! Two passes: structured slots first ("X の Y について" → title + section),
//! then whatever text is left becomes free keywords.

use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;
use serde::Serialize;
use tracing::error;

use crate::{
    catalog::{Catalog, DomainDescriptor},
    text::{is_general_listing, overlaps, strip_fillers, tokenize},
};

const TITLE_SECTION_PATTERN: &str = r"^\s*(.+?)の(.+?)(?:について|に関して)";
const SUBJECT_PATTERN: &str = r"^\s*(.+?)(?:について|に関して)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionFilter {
    pub canonical_key: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub free_keywords: Vec<String>,
    pub field_queries: BTreeMap<String, Vec<String>>,
    pub section_filter: Option<SectionFilter>,
    pub title_filter: Option<String>,
}

#[derive(Debug, Default)]
struct Slots {
    subject: Option<String>,
    section: Option<String>,
}

fn slot_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [TITLE_SECTION_PATTERN, SUBJECT_PATTERN]
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    error!(pattern = %pattern, "Invalid slot pattern: {err}");
                    None
                }
            })
            .collect()
    })
}

fn extract_slots(query: &str) -> Slots {
    for pattern in slot_patterns() {
        let Some(caps) = pattern.captures(query) else {
            continue;
        };
        let capture = |idx: usize| {
            caps.get(idx)
                .map(|m| m.as_str().trim().to_string())
                .filter(|text| !text.is_empty())
        };
        return Slots {
            subject: capture(1),
            section: capture(2),
        };
    }
    Slots::default()
}

/// A subject that names a menu is a navigation request, not a document title.
fn names_a_menu(subject: &str, catalog: &Catalog) -> bool {
    let subject = subject.to_lowercase();
    catalog
        .menus()
        .iter()
        .any(|menu| overlaps(&subject, &menu.label.trim().to_lowercase()))
}

fn resolve_section(section: &str, descriptor: &DomainDescriptor) -> Option<SectionFilter> {
    let section = section.to_lowercase();
    descriptor.field_mappings.iter().find_map(|mapping| {
        mapping
            .display_names
            .iter()
            .find(|name| overlaps(&section, &name.trim().to_lowercase()))
            .map(|name| SectionFilter {
                canonical_key: mapping.canonical_key.clone(),
                display_name: name.clone(),
            })
    })
}

fn implicit_section(lowered: &str, descriptor: &DomainDescriptor) -> Option<SectionFilter> {
    descriptor.field_mappings.iter().find_map(|mapping| {
        mapping
            .display_names
            .iter()
            .find(|name| {
                let name = name.trim().to_lowercase();
                !name.is_empty() && lowered.contains(&name)
            })
            .map(|name| SectionFilter {
                canonical_key: mapping.canonical_key.clone(),
                display_name: name.clone(),
            })
    })
}

pub fn build(query: &str, descriptor: &DomainDescriptor, catalog: &Catalog) -> StructuredQuery {
    let mut structured = StructuredQuery::default();
    let lowered = query.to_lowercase();
    let slots = extract_slots(query);

    if let Some(subject) = slots.subject {
        if !names_a_menu(&subject, catalog) {
            structured.title_filter = Some(subject);
        }
    }

    structured.section_filter = match &slots.section {
        Some(section) => resolve_section(section, descriptor),
        None if !is_general_listing(query) => implicit_section(&lowered, descriptor),
        None => None,
    };

    // Everything below works on the text the slots did not consume.
    let mut remaining = lowered.clone();
    if let Some(title) = &structured.title_filter {
        remaining = remaining.replace(&title.to_lowercase(), " ");
    }
    match (&slots.section, &structured.section_filter) {
        (Some(section), _) => remaining = remaining.replace(&section.to_lowercase(), " "),
        (None, Some(filter)) => {
            remaining = remaining.replace(&filter.display_name.to_lowercase(), " ")
        }
        (None, None) => {}
    }

    for field in &descriptor.searchable_fields {
        let hits = field
            .display_names
            .iter()
            .filter(|name| {
                let name = name.trim().to_lowercase();
                !name.is_empty() && remaining.contains(&name)
            })
            .cloned()
            .collect::<Vec<_>>();
        if hits.is_empty() {
            continue;
        }
        for hit in &hits {
            remaining = remaining.replace(&hit.trim().to_lowercase(), " ");
        }
        structured.field_queries.insert(field.name.clone(), hits);
    }

    let mut keywords = tokenize(&strip_fillers(&remaining));
    if let Some(title) = &structured.title_filter {
        let title_tokens = tokenize(&title.to_lowercase());
        keywords.retain(|token| !title_tokens.iter().any(|t| overlaps(token, t)));
        keywords.push(title.clone());
    }
    structured.free_keywords = keywords;

    structured
}
