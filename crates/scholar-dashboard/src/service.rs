use chrono::Local;
use scholar_query::aggregate::{self, KeywordExplosion, SYNTHETIC_DAYS};
use scholar_query::{
    AggregationResult, BackendAdapter, BackendKind, ChartPayload, ConnectionRegistry, QueryError,
    RecordSet, ScalarValue, ScatterPoint, SourceTag,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::queries::{Lookup, QueryCatalogue};
use crate::requests::{comparison_terms, Request};
use crate::search::{FederatedSearch, SearchOutcome};

/// Keywords shown in a university breakdown
pub const TOP_KEYWORDS: usize = 10;
/// Venues shown in a faculty breakdown
pub const TOP_VENUES: usize = 10;
/// Bins of the citation histogram
pub const CITATION_BINS: usize = 20;

/// Answer to one request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Response {
    Chart(AggregationResult),
    Report(SearchOutcome),
    Universities(Vec<String>),
}

impl Response {
    pub fn summary(&self) -> String {
        match self {
            Response::Chart(result) => result.summary.clone(),
            Response::Report(SearchOutcome::Found(report)) => format!(
                "Found {} records for '{}' in {} sections",
                report.total_records(),
                report.name,
                report.sections.len()
            ),
            Response::Report(SearchOutcome::NotFound { message, .. }) => message.clone(),
            Response::Universities(names) => format!("{} universities", names.len()),
        }
    }
}

/// Request dispatcher over the shared connection registry
///
/// Every method returns a displayable value: unavailable backends, failed
/// queries and invalid input all become an empty payload with an
/// explanation.
pub struct DashboardService {
    registry: Arc<ConnectionRegistry>,
    catalogue: QueryCatalogue,
    keywords: KeywordExplosion,
}

impl DashboardService {
    pub fn new(registry: Arc<ConnectionRegistry>, catalogue: QueryCatalogue) -> Self {
        Self {
            registry,
            catalogue,
            keywords: KeywordExplosion::default(),
        }
    }

    pub fn with_keyword_rules(mut self, keywords: KeywordExplosion) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn catalogue(&self) -> &QueryCatalogue {
        &self.catalogue
    }

    /// Validate and dispatch one request
    pub async fn handle(&self, request: Request) -> Response {
        let request = match request.validate() {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected request: {}", e);
                return Response::Chart(AggregationResult::message(e.to_string()));
            }
        };

        info!("Handling {} request", request.kind());
        match request {
            Request::KeywordSearch { text } => Response::Chart(self.keyword_search(&text).await),
            Request::ListAll => Response::Chart(self.list_all().await),
            Request::CompareKeywords { terms } => {
                Response::Chart(self.compare_keywords(&terms).await)
            }
            Request::ListUniversities => Response::Universities(self.list_universities().await),
            Request::UniversityTopKeywords { university } => {
                Response::Chart(self.university_top_keywords(&university).await)
            }
            Request::FacultyPublications { name } => {
                Response::Chart(self.faculty_publications(&name).await)
            }
            Request::PersonSearch { name } => Response::Report(self.person_search(&name).await),
            Request::PublicationsTimeseries => {
                Response::Chart(self.publications_timeseries().await)
            }
        }
    }

    async fn relational(&self) -> Result<Arc<dyn BackendAdapter>, AggregationResult> {
        self.registry
            .available(BackendKind::Relational)
            .await
            .ok_or_else(|| unavailable(BackendKind::Relational))
    }

    async fn fetch_relational(
        &self,
        lookup: Lookup,
        context: &str,
    ) -> Result<RecordSet, AggregationResult> {
        let adapter = self.relational().await?;
        lookup
            .fetch(adapter.as_ref())
            .await
            .map_err(|e| failure(context, &e))
    }

    pub async fn keyword_search(&self, text: &str) -> AggregationResult {
        let records = match self
            .fetch_relational(self.catalogue.keyword_search(text), "Error searching publications")
            .await
        {
            Ok(records) => records,
            Err(result) => return result,
        };

        if records.is_empty() {
            return AggregationResult::new(
                ChartPayload::empty(format!("No publications found containing '{}'", text)),
                format!("No publications found for keyword: {}", text),
            );
        }

        let by_year = aggregate::group_count(&records, "year");
        let citations = aggregate::scalar_stats(&records, "citations");
        let venues = aggregate::scalar_stats(&records, "venue");

        AggregationResult::new(
            ChartPayload::bar_from_partitions(
                format!("Publications containing '{}' by Year", text),
                "Year",
                "Number of Publications",
                &by_year,
            ),
            format!(
                "Found {} publications | Avg Citations: {:.1} | Top Venue: {}",
                records.len(),
                citations.mean,
                venues.mode
            ),
        )
    }

    pub async fn list_all(&self) -> AggregationResult {
        let records = match self
            .fetch_relational(self.catalogue.list_all(), "Error retrieving publications")
            .await
        {
            Ok(records) => records,
            Err(result) => return result,
        };

        if records.is_empty() {
            return AggregationResult::message("No publications found in database");
        }

        let citations = aggregate::scalar_stats(&records, "citations");

        AggregationResult::new(
            ChartPayload::Scatter {
                title: "All Publications: Citations vs Year".to_string(),
                x_label: "Year".to_string(),
                y_label: "Citations".to_string(),
                points: scatter_points(&records, "year", "citations", &["venue", "authors"]),
            },
            format!(
                "Showing {} publications | Avg Citations: {:.1} | Max Citations: {}",
                records.len(),
                citations.mean,
                citations.max_label()
            ),
        )
    }

    pub async fn compare_keywords(&self, terms: &[String]) -> AggregationResult {
        let terms = match comparison_terms(terms) {
            Ok(terms) => terms,
            Err(e) => return AggregationResult::message(e.to_string()),
        };
        let adapter = match self.relational().await {
            Ok(adapter) => adapter,
            Err(result) => return result,
        };

        let mut counts = Vec::with_capacity(terms.len());
        let mut averages = Vec::with_capacity(terms.len());

        for term in &terms {
            let stats = match self.catalogue.keyword_stats(term).fetch(adapter.as_ref()).await {
                Ok(stats) => stats,
                Err(e) => return failure("Error comparing keywords", &e),
            };

            let count = stats
                .get(0, "publication_count")
                .and_then(ScalarValue::as_i64)
                .map_or(0, |c| c.max(0) as u64);
            let average = stats
                .get(0, "avg_citations")
                .and_then(ScalarValue::as_f64)
                .unwrap_or(0.0);

            debug!("'{}': {} publications, {:.1} avg citations", term, count, average);
            counts.push(count);
            averages.push(average);
        }

        let total: u64 = counts.iter().sum();
        let overall = averages.iter().sum::<f64>() / averages.len() as f64;
        let most_popular = first_max(&counts).map_or("None", |idx| terms[idx].as_str());
        let highest_cited = first_max(&averages).map_or("None", |idx| terms[idx].as_str());

        let summary = format!(
            "Total Publications: {} | Avg Citations: {:.1} | Most Popular: {} | Highest Cited: {}",
            total, overall, most_popular, highest_cited
        );

        AggregationResult::new(
            ChartPayload::Comparison {
                title: "Keyword Comparison: Publication Count vs Average Citations".to_string(),
                categories: terms,
                counts,
                averages,
            },
            summary,
        )
    }

    /// Dropdown source; empty when the backend is down or the query fails
    pub async fn list_universities(&self) -> Vec<String> {
        let Some(adapter) = self.registry.available(BackendKind::Relational).await else {
            warn!("PostgreSQL not connected for university list");
            return Vec::new();
        };

        match self.catalogue.universities().fetch(adapter.as_ref()).await {
            Ok(records) => records
                .column("university")
                .map(|values| values.filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            Err(e) => {
                error!("Error getting universities: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn university_top_keywords(&self, university: &str) -> AggregationResult {
        let rows = match self
            .fetch_relational(
                self.catalogue.university_keywords(university),
                "Error analyzing university keywords",
            )
            .await
        {
            Ok(rows) => rows,
            Err(result) => return result,
        };

        if rows.is_empty() {
            return AggregationResult::message(format!("No data found for {}", university));
        }

        let exploded = self.keywords.explode(&rows, "keywords", Some("keyword_count"));
        let unique = exploded.len();
        let top = aggregate::rank(exploded, TOP_KEYWORDS);

        let Some((most_common, _)) = top.first() else {
            return AggregationResult::message(format!("No keywords found for {}", university));
        };

        let total: u64 = top.iter().map(|(_, count)| count).sum();
        let summary = format!(
            "Total Keyword Mentions: {} | Most Common: {} | Unique Keywords: {}",
            total, most_common, unique
        );

        AggregationResult::new(
            ChartPayload::Distribution {
                title: format!("Top {} Research Keywords at {}", TOP_KEYWORDS, university),
                labels: top.iter().map(|(keyword, _)| keyword.clone()).collect(),
                values: top.iter().map(|(_, count)| *count as f64).collect(),
            },
            summary,
        )
    }

    pub async fn faculty_publications(&self, name: &str) -> AggregationResult {
        let records = match self
            .fetch_relational(
                self.catalogue.faculty_publications(name),
                "Error searching faculty publications",
            )
            .await
        {
            Ok(records) => records,
            Err(result) => return result,
        };

        if records.is_empty() {
            return AggregationResult::new(
                ChartPayload::empty(format!(
                    "No publications found for faculty member '{}'",
                    name
                )),
                format!("No publications found for faculty member: {}", name),
            );
        }

        let citations: Vec<i64> = records
            .column("citations")
            .map(|values| values.filter_map(ScalarValue::as_i64).collect())
            .unwrap_or_default();
        let years: Vec<i64> = records
            .column("year")
            .map(|values| values.filter_map(ScalarValue::as_i64).collect())
            .unwrap_or_default();

        let citation_stats = aggregate::scalar_stats(&records, "citations");
        let venue_stats = aggregate::scalar_stats(&records, "venue");
        let first_label = |field: &str| {
            records
                .get(0, field)
                .map_or_else(|| "N/A".to_string(), ScalarValue::label)
        };

        let summary = format!(
            "Total Publications: {} | Total Citations: {} | Avg Citations: {:.1} | H-index: {} | \
             Years Active: {} | Top Venue: {} | University: {} | Department: {}",
            records.len(),
            citations.iter().sum::<i64>(),
            citation_stats.mean,
            aggregate::h_index(citations.iter().copied()),
            aggregate::years_active(years),
            venue_stats.mode,
            first_label("university"),
            first_label("department"),
        );

        let panels = vec![
            ChartPayload::bar_from_partitions(
                "Publications by Year",
                "Year",
                "Number of Publications",
                &aggregate::group_count(&records, "year"),
            ),
            ChartPayload::Histogram {
                title: "Citations Distribution".to_string(),
                values: citations.iter().map(|c| *c as f64).collect(),
                bins: CITATION_BINS,
            },
            ChartPayload::bar_from_partitions(
                "Top Venues",
                "Venue",
                "Number of Publications",
                &aggregate::top_n(&records, "venue", TOP_VENUES),
            ),
            ChartPayload::Scatter {
                title: "Research Timeline".to_string(),
                x_label: "Year".to_string(),
                y_label: "Citations".to_string(),
                points: scatter_points(&records, "year", "citations", &["venue"]),
            },
        ];

        AggregationResult::new(
            ChartPayload::Panels {
                title: format!("Publications by {}", name),
                panels,
            },
            summary,
        )
    }

    pub async fn person_search(&self, name: &str) -> SearchOutcome {
        FederatedSearch::new(&self.registry, &self.catalogue)
            .run(name)
            .await
    }

    /// Daily publication counts from the first backend holding dated
    /// records, in fan-out order, else the synthetic series
    pub async fn publications_timeseries(&self) -> AggregationResult {
        let mut candidates = Vec::new();

        for kind in BackendKind::ALL {
            let Some(adapter) = self.registry.available(kind).await else {
                debug!("{} unavailable for publication dates", kind.label());
                continue;
            };

            match self
                .catalogue
                .daily_publications(kind)
                .fetch(adapter.as_ref())
                .await
            {
                Ok(records) => {
                    let dated = has_dates(&records);
                    candidates.push(records);
                    if dated {
                        break;
                    }
                }
                Err(e) => warn!("{} publications query failed: {}", kind.label(), e),
            }
        }

        let series = {
            let mut rng = rand::thread_rng();
            aggregate::daily_series_or_fallback(candidates, Local::now().date_naive(), &mut rng)
        };
        if series.source.is_synthetic() {
            info!(
                "No dated publications in any backend, showing {} synthetic days",
                SYNTHETIC_DAYS
            );
        }

        let summary = format!(
            "Total Publications: {} | Avg Daily: {:.1} | Source: {}",
            series.total(),
            series.mean(),
            source_label(series.source)
        );

        AggregationResult::new(
            ChartPayload::TimeSeries {
                title: "Publications Over Time".to_string(),
                series,
            },
            summary,
        )
    }
}

fn unavailable(kind: BackendKind) -> AggregationResult {
    AggregationResult::message(format!("{} connection not available", kind.label()))
}

fn failure(context: &str, err: &QueryError) -> AggregationResult {
    error!("{}: {}", context, err);
    AggregationResult::new(
        ChartPayload::empty(format!("Error: {}", err)),
        format!("{}: {}", context, err),
    )
}

fn source_label(source: SourceTag) -> &'static str {
    match source.backend() {
        Some(kind) => kind.label(),
        None => "Sample Data",
    }
}

fn has_dates(records: &RecordSet) -> bool {
    records
        .column("date")
        .is_some_and(|mut values| values.any(|v| v.as_date().is_some()))
}

/// Index of the first maximum
fn first_max<T: PartialOrd + Copy>(values: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (idx, value) in values.iter().copied().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Points for records holding both coordinates; the title is the label
fn scatter_points(records: &RecordSet, x: &str, y: &str, details: &[&str]) -> Vec<ScatterPoint> {
    (0..records.len())
        .filter_map(|row| {
            let x_value = records.get(row, x)?.as_f64()?;
            let y_value = records.get(row, y)?.as_f64()?;
            let detail_map: BTreeMap<String, String> = details
                .iter()
                .filter_map(|field| {
                    records
                        .get(row, field)
                        .map(|value| (field.to_string(), value.label()))
                })
                .collect();

            Some(ScatterPoint {
                x: x_value,
                y: y_value,
                label: records
                    .get(row, "title")
                    .map_or_else(String::new, ScalarValue::label),
                details: detail_map,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholar_query::{FieldDef, FieldSchema};

    #[test]
    fn test_first_max_prefers_earliest() {
        assert_eq!(first_max(&[3_u64, 7, 7, 1]), Some(1));
        assert_eq!(first_max(&[0.5_f64, 0.5]), Some(0));
        assert_eq!(first_max::<u64>(&[]), None);
    }

    #[test]
    fn test_source_label() {
        assert_eq!(source_label(SourceTag::Relational), "PostgreSQL");
        assert_eq!(source_label(SourceTag::SyntheticFallback), "Sample Data");
    }

    #[test]
    fn test_scatter_skips_records_without_coordinates() {
        let schema = FieldSchema::new(vec![
            FieldDef::text("title"),
            FieldDef::integer("year"),
            FieldDef::integer("citations"),
            FieldDef::text("venue"),
        ]);
        let mut records = RecordSet::empty(BackendKind::Relational, schema);
        records.push(vec![
            "Graph Mining".into(),
            ScalarValue::Integer(2019),
            ScalarValue::Integer(40),
            "KDD".into(),
        ]);
        records.push(vec![
            "Undated".into(),
            ScalarValue::Null,
            ScalarValue::Integer(3),
            ScalarValue::Null,
        ]);

        let points = scatter_points(&records, "year", "citations", &["venue"]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].label, "Graph Mining");
        assert_eq!(points[0].details["venue"], "KDD");
    }

    #[test]
    fn test_failure_message_carries_explanation() {
        let result = failure(
            "Error searching publications",
            &QueryError::Malformed("column \"titel\" does not exist".into()),
        );
        assert!(result.payload.is_empty());
        assert!(result
            .summary
            .starts_with("Error searching publications: Malformed query"));
    }
}
