//! Federated entity search
//!
//! A person search walks a fixed sequence of states:
//!
//! ```text
//! INIT -> QUERY_RELATIONAL -> QUERY_DOCUMENT -> QUERY_GRAPH -> MERGE -> DONE
//! ```
//!
//! A backend without a session handle is skipped. A failing lookup drops
//! that backend's whole contribution and leaves a note; the search always
//! reaches MERGE. Sections are never deduplicated across backends.

use scholar_query::{BackendKind, ConnectionRegistry, RecordSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::queries::{Category, QueryCatalogue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Init,
    QueryRelational,
    QueryDocument,
    QueryGraph,
    Merge,
    Done,
}

impl SearchState {
    pub fn next(self) -> Self {
        match self {
            SearchState::Init => SearchState::QueryRelational,
            SearchState::QueryRelational => SearchState::QueryDocument,
            SearchState::QueryDocument => SearchState::QueryGraph,
            SearchState::QueryGraph => SearchState::Merge,
            SearchState::Merge | SearchState::Done => SearchState::Done,
        }
    }

    /// Backend queried in this state
    pub fn backend(self) -> Option<BackendKind> {
        match self {
            SearchState::QueryRelational => Some(BackendKind::Relational),
            SearchState::QueryDocument => Some(BackendKind::Document),
            SearchState::QueryGraph => Some(BackendKind::Graph),
            _ => None,
        }
    }
}

/// Records one backend returned for one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub backend: BackendKind,
    pub category: Category,
    pub records: RecordSet,
}

impl ReportSection {
    pub fn title(&self) -> String {
        let what = match (self.backend, self.category) {
            (BackendKind::Graph, Category::Profile) => "Person Information",
            (_, Category::Profile) => "Faculty Information",
            (_, Category::Publications) => "Publications",
            (_, Category::Collaborators) => "Top Collaborators",
        };
        format!("{} - {}", self.backend.label(), what)
    }
}

/// Merged search output, grouped by backend then category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonReport {
    pub name: String,
    pub sections: Vec<ReportSection>,
    /// Backends that were skipped or failed
    pub notes: Vec<String>,
}

impl PersonReport {
    pub fn total_records(&self) -> usize {
        self.sections.iter().map(|s| s.records.len()).sum()
    }

    pub fn sections_for(&self, backend: BackendKind) -> impl Iterator<Item = &ReportSection> {
        self.sections.iter().filter(move |s| s.backend == backend)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Found(PersonReport),
    /// No backend returned a record; distinct from any backend error
    NotFound {
        name: String,
        message: String,
        notes: Vec<String>,
    },
}

impl SearchOutcome {
    pub fn not_found(name: &str, notes: Vec<String>) -> Self {
        SearchOutcome::NotFound {
            name: name.to_string(),
            message: format!("No information found for '{}' in any database.", name),
            notes,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found(_))
    }

    pub fn notes(&self) -> &[String] {
        match self {
            SearchOutcome::Found(report) => &report.notes,
            SearchOutcome::NotFound { notes, .. } => notes,
        }
    }
}

pub struct FederatedSearch<'a> {
    registry: &'a ConnectionRegistry,
    catalogue: &'a QueryCatalogue,
}

impl<'a> FederatedSearch<'a> {
    pub fn new(registry: &'a ConnectionRegistry, catalogue: &'a QueryCatalogue) -> Self {
        Self {
            registry,
            catalogue,
        }
    }

    pub async fn run(&self, name: &str) -> SearchOutcome {
        let mut state = SearchState::Init;
        let mut sections = Vec::new();
        let mut notes = Vec::new();
        let mut outcome = None;

        while state != SearchState::Done {
            debug!("person search '{}': {:?}", name, state);

            if let Some(kind) = state.backend() {
                match self.query_backend(kind, name).await {
                    Ok(found) => sections.extend(found),
                    Err(note) => notes.push(note),
                }
            } else if state == SearchState::Merge {
                let merged = merge(
                    name,
                    std::mem::take(&mut sections),
                    std::mem::take(&mut notes),
                );
                outcome = Some(merged);
            }

            state = state.next();
        }

        outcome.unwrap_or_else(|| SearchOutcome::not_found(name, Vec::new()))
    }

    /// Non-empty sections from one backend, or a note explaining its absence
    async fn query_backend(
        &self,
        kind: BackendKind,
        name: &str,
    ) -> Result<Vec<ReportSection>, String> {
        let Some(adapter) = self.registry.available(kind).await else {
            debug!("{} unavailable, skipping", kind.label());
            return Err(format!("{} connection not available", kind.label()));
        };

        let mut sections = Vec::new();
        for (category, lookup) in self.catalogue.person_lookups(kind, name) {
            match lookup.fetch(adapter.as_ref()).await {
                Ok(records) if records.is_empty() => {}
                Ok(records) => sections.push(ReportSection {
                    backend: kind,
                    category,
                    records,
                }),
                Err(e) => {
                    warn!("{} person search failed: {}", kind.label(), e);
                    return Err(format!("{} person search failed: {}", kind.label(), e));
                }
            }
        }

        Ok(sections)
    }
}

fn merge(name: &str, sections: Vec<ReportSection>, notes: Vec<String>) -> SearchOutcome {
    if sections.is_empty() {
        info!("No information found for '{}'", name);
        return SearchOutcome::not_found(name, notes);
    }

    let report = PersonReport {
        name: name.to_string(),
        sections,
        notes,
    };
    info!(
        "Person search '{}': {} records in {} sections",
        name,
        report.total_records(),
        report.sections.len()
    );
    SearchOutcome::Found(report)
}
