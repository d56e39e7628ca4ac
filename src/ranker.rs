//! Narrows fetched candidates down to the ones the question is about.
//!
//! Rules are evaluated per record and the first applicable one decides. The
//! order matters: the most specific filter wins and later rules only act as
//! fallbacks when earlier ones did not apply.

use tracing::debug;

use crate::{
    catalog::{DomainDescriptor, FieldMapping},
    formatter::{field_text, stringify_section},
    models::CandidateRecord,
    query_builder::StructuredQuery,
    text::{is_general_listing, overlaps},
};

/// Record keys that carry a workflow status.
const STATUS_KEYS: &[&str] = &["status", "stage", "phase", "state"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Section,
    Field,
    Status,
    Keyword,
    Title,
}

struct Plan<'a> {
    query: &'a StructuredQuery,
    title: Option<String>,
    status: Option<&'a FieldMapping>,
    keywords: Vec<String>,
}

impl<'a> Plan<'a> {
    fn new(query: &'a StructuredQuery, raw_query: &str, descriptor: &'a DomainDescriptor) -> Self {
        let raw = raw_query.to_lowercase();
        let status = descriptor.field_mappings.iter().find(|mapping| {
            mapping.display_names.iter().any(|name| {
                let name = name.trim().to_lowercase();
                !name.is_empty() && raw.contains(&name)
            })
        });
        Self {
            query,
            title: query.title_filter.as_ref().map(|title| title.trim().to_lowercase()),
            status,
            keywords: query
                .free_keywords
                .iter()
                .map(|keyword| keyword.to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        }
    }

    fn admit(&self, record: &CandidateRecord) -> Option<Reason> {
        if let Some(title) = &self.title {
            let matches = record
                .display_title()
                .is_some_and(|(_, display)| overlaps(&display.to_lowercase(), title));
            if !matches {
                return None;
            }
        }

        if let Some(section) = &self.query.section_filter {
            let filled = record
                .section(&section.canonical_key)
                .is_some_and(|value| !stringify_section(value).is_empty());
            if self.title.is_some() {
                return filled.then_some(Reason::Section);
            }
            if filled {
                return Some(Reason::Section);
            }
        }

        let field_hit = self.query.field_queries.iter().any(|(field, needles)| {
            let text = record.get(field).map(field_text).unwrap_or_default().to_lowercase();
            !text.is_empty()
                && needles
                    .iter()
                    .any(|needle| text.contains(&needle.trim().to_lowercase()))
        });
        if field_hit {
            return Some(Reason::Field);
        }

        if let Some(mapping) = self.status {
            let status_hit = STATUS_KEYS.iter().any(|key| {
                record
                    .get(key)
                    .and_then(|value| value.as_str())
                    .is_some_and(|status| status.trim().eq_ignore_ascii_case(&mapping.canonical_key))
            });
            if status_hit {
                return Some(Reason::Status);
            }
        }

        if !self.keywords.is_empty() {
            let blob = record.search_blob();
            if self.keywords.iter().any(|keyword| blob.contains(keyword.as_str())) {
                return Some(Reason::Keyword);
            }
        }

        let unconstrained =
            self.query.section_filter.is_none() && self.query.field_queries.is_empty();
        if self.title.is_some() && unconstrained {
            return Some(Reason::Title);
        }

        None
    }
}

/// Order-preserving subset of `records` relevant to the query.
pub fn filter(
    records: Vec<CandidateRecord>,
    query: &StructuredQuery,
    raw_query: &str,
    descriptor: &DomainDescriptor,
) -> Vec<CandidateRecord> {
    if is_general_listing(raw_query) {
        debug!(candidates = records.len(), "General listing; every candidate kept");
        return records;
    }

    let plan = Plan::new(query, raw_query, descriptor);
    let total = records.len();
    let kept = records
        .into_iter()
        .filter(|record| match plan.admit(record) {
            Some(reason) => {
                debug!(id = %record.id, ?reason, "Candidate kept");
                true
            }
            None => false,
        })
        .collect::<Vec<_>>();

    debug!(candidates = total, matched = kept.len(), "Candidates filtered");
    kept
}
