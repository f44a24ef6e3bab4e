//! Widget requests against scripted backends

use scholar_dashboard::{DashboardService, QueryCatalogue, Request, Response};
use scholar_query::testing::ScriptedAdapter;
use scholar_query::{
    BackendKind, ChartPayload, ConnectionRegistry, DataRow, QueryError, RawRows, SourceTag,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn tuples(columns: &[&str], rows: Vec<Vec<Value>>) -> RawRows {
    RawRows::Tuples {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

async fn service_with(adapters: Vec<Arc<ScriptedAdapter>>) -> DashboardService {
    let registry = Arc::new(ConnectionRegistry::new());
    for adapter in adapters {
        let _ = registry.attach(adapter).await;
    }
    DashboardService::new(registry, QueryCatalogue::default())
}

fn chart(response: Response) -> (ChartPayload, String) {
    match response {
        Response::Chart(result) => (result.payload, result.summary),
        other => panic!("expected a chart, got {:?}", other),
    }
}

#[tokio::test]
async fn test_keyword_search_summary_and_year_bars() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).respond(
        "p.abstract, string_agg",
        tuples(
            &["title", "year", "venue", "citations", "abstract", "authors"],
            vec![
                vec![
                    json!("ML Survey"),
                    json!(2020),
                    json!("NeurIPS"),
                    json!(150),
                    json!("A survey"),
                    json!("Ada Lovelace"),
                ],
                vec![
                    json!("Graph Nets"),
                    json!(2020),
                    json!("ICML"),
                    json!(30),
                    Value::Null,
                    json!("Alan Turing, Grace Hopper"),
                ],
                vec![
                    json!("Old Results"),
                    json!(2018),
                    json!("NeurIPS"),
                    json!(0),
                    Value::Null,
                    Value::Null,
                ],
            ],
        ),
    ));
    let service = service_with(vec![relational]).await;

    let (payload, summary) = chart(
        service
            .handle(Request::KeywordSearch {
                text: " learning ".into(),
            })
            .await,
    );

    assert_eq!(
        summary,
        "Found 3 publications | Avg Citations: 60.0 | Top Venue: NeurIPS"
    );
    match payload {
        ChartPayload::Bar {
            title,
            categories,
            values,
            ..
        } => {
            assert_eq!(title, "Publications containing 'learning' by Year");
            assert_eq!(categories, vec!["2018", "2020"]);
            assert_eq!(values, vec![1.0, 2.0]);
        }
        other => panic!("expected bars, got {:?}", other),
    }
}

#[tokio::test]
async fn test_keyword_search_without_matches() {
    let service = service_with(vec![Arc::new(ScriptedAdapter::new(BackendKind::Relational))]).await;

    let result = service.keyword_search("quantum basket weaving").await;
    assert!(result.payload.is_empty());
    assert_eq!(
        result.summary,
        "No publications found for keyword: quantum basket weaving"
    );
}

#[tokio::test]
async fn test_relational_down_is_explained() {
    let service = service_with(vec![Arc::new(ScriptedAdapter::unreachable(
        BackendKind::Relational,
    ))])
    .await;

    for request in [
        Request::KeywordSearch { text: "AI".into() },
        Request::ListAll,
        Request::UniversityTopKeywords {
            university: "State University".into(),
        },
        Request::FacultyPublications { name: "Ada".into() },
    ] {
        let (payload, summary) = chart(service.handle(request).await);
        assert!(payload.is_empty());
        assert_eq!(summary, "PostgreSQL connection not available");
    }

    assert_eq!(
        service.handle(Request::ListUniversities).await,
        Response::Universities(Vec::new())
    );
}

#[tokio::test]
async fn test_query_error_is_explained() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).fail(
        "LIMIT 50",
        QueryError::Malformed("relation \"publication\" does not exist".into()),
    ));
    let service = service_with(vec![relational]).await;

    let (payload, summary) = chart(service.handle(Request::ListAll).await);
    assert!(payload.is_empty());
    assert!(summary.starts_with("Error retrieving publications: Malformed query"));
}

#[tokio::test]
async fn test_persistent_connection_loss_retries_once() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).fail(
        "LIMIT 50",
        QueryError::ConnectionLost("server closed the connection".into()),
    ));
    let service = service_with(vec![relational.clone()]).await;

    let (_, summary) = chart(service.handle(Request::ListAll).await);
    assert!(summary.starts_with("Error retrieving publications: Connection lost"));
    assert_eq!(relational.connect_attempts(), 2);
    assert_eq!(relational.executed().len(), 2);
}

#[tokio::test]
async fn test_list_all_scatter() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).respond(
        "LIMIT 50",
        tuples(
            &["title", "year", "venue", "citations", "authors"],
            vec![
                vec![
                    json!("ML Survey"),
                    json!(2020),
                    json!("NeurIPS"),
                    json!(150),
                    json!("Ada Lovelace"),
                ],
                vec![
                    json!("Graph Nets"),
                    json!(2019),
                    json!("ICML"),
                    json!(50),
                    Value::Null,
                ],
            ],
        ),
    ));
    let service = service_with(vec![relational]).await;

    let (payload, summary) = chart(service.handle(Request::ListAll).await);
    assert_eq!(
        summary,
        "Showing 2 publications | Avg Citations: 100.0 | Max Citations: 150"
    );
    match payload {
        ChartPayload::Scatter { points, .. } => {
            assert_eq!(points.len(), 2);
            assert_eq!(points[0].label, "ML Survey");
            assert_eq!(points[0].details["authors"], "Ada Lovelace");
            assert_eq!(points[1].details["authors"], "N/A");
        }
        other => panic!("expected scatter, got {:?}", other),
    }
}

#[tokio::test]
async fn test_comparison_rejects_single_term_without_backend_call() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational));
    let service = service_with(vec![relational.clone()]).await;

    let (payload, summary) = chart(
        service
            .handle(Request::CompareKeywords {
                terms: vec!["AI".into(), "  ".into()],
            })
            .await,
    );

    assert!(payload.is_empty());
    assert_eq!(summary, "Please enter at least 2 keywords to compare");
    assert!(relational.executed().is_empty());
}

#[tokio::test]
async fn test_comparison_accepts_duplicate_terms() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).respond(
        "AS publication_count",
        tuples(
            &[
                "publication_count",
                "avg_citations",
                "max_citations",
                "earliest_year",
                "latest_year",
                "unique_venues",
            ],
            vec![vec![
                json!(3),
                json!(12.5),
                json!(40),
                json!(2015),
                json!(2022),
                json!(2),
            ]],
        ),
    ));
    let service = service_with(vec![relational.clone()]).await;

    let (payload, summary) = chart(
        service
            .handle(Request::CompareKeywords {
                terms: vec!["AI".into(), "AI".into()],
            })
            .await,
    );

    assert_eq!(
        summary,
        "Total Publications: 6 | Avg Citations: 12.5 | Most Popular: AI | Highest Cited: AI"
    );
    match payload {
        ChartPayload::Comparison {
            categories,
            counts,
            averages,
            ..
        } => {
            assert_eq!(categories, vec!["AI", "AI"]);
            assert_eq!(counts, vec![3, 3]);
            assert_eq!(averages, vec![12.5, 12.5]);
        }
        other => panic!("expected comparison, got {:?}", other),
    }
    assert_eq!(relational.executed().len(), 2);
}

#[tokio::test]
async fn test_university_keywords_are_exploded() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).respond(
        "AS keyword_count",
        tuples(
            &["keywords", "keyword_count"],
            vec![
                vec![json!("AI, Machine Learning"), json!(3)],
                vec![json!("ai,NLP"), json!(2)],
                vec![json!("Databases, ML"), json!(1)],
            ],
        ),
    ));
    let service = service_with(vec![relational]).await;

    let (payload, summary) = chart(
        service
            .handle(Request::UniversityTopKeywords {
                university: "State University".into(),
            })
            .await,
    );

    // "ai" is kept (3 chars), "ml" is dropped
    assert_eq!(
        summary,
        "Total Keyword Mentions: 11 | Most Common: ai | Unique Keywords: 4"
    );
    match payload {
        ChartPayload::Distribution {
            title,
            labels,
            values,
        } => {
            assert_eq!(title, "Top 10 Research Keywords at State University");
            assert_eq!(labels, vec!["ai", "machine learning", "nlp", "databases"]);
            assert_eq!(values, vec![5.0, 3.0, 2.0, 1.0]);
        }
        other => panic!("expected distribution, got {:?}", other),
    }
}

#[tokio::test]
async fn test_university_without_rows() {
    let service = service_with(vec![Arc::new(ScriptedAdapter::new(BackendKind::Relational))]).await;

    let result = service.university_top_keywords("Nowhere College").await;
    assert_eq!(result.summary, "No data found for Nowhere College");
}

#[tokio::test]
async fn test_list_universities() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).respond(
        "SELECT DISTINCT university",
        tuples(
            &["university"],
            vec![vec![json!("MIT")], vec![json!("State University")]],
        ),
    ));
    let service = service_with(vec![relational]).await;

    assert_eq!(
        service.list_universities().await,
        vec!["MIT".to_string(), "State University".to_string()]
    );
}

#[tokio::test]
async fn test_faculty_publications_panels() {
    let row = |title: &str, year: i64, venue: &str, citations: i64| {
        vec![
            json!(title),
            json!(year),
            json!(venue),
            json!(citations),
            Value::Null,
            json!("databases"),
            json!("Ada Lovelace"),
            json!("State University"),
            json!("CS"),
        ]
    };
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).respond(
        "AS faculty_name",
        tuples(
            &[
                "title",
                "year",
                "venue",
                "citations",
                "abstract",
                "keywords",
                "faculty_name",
                "university",
                "department",
            ],
            vec![
                row("Engines", 2020, "KDD", 10),
                row("Notes", 2018, "VLDB", 6),
                row("Tables", 2018, "KDD", 3),
                row("Letters", 2015, "ICDE", 1),
            ],
        ),
    ));
    let service = service_with(vec![relational]).await;

    let (payload, summary) = chart(
        service
            .handle(Request::FacultyPublications { name: "Ada".into() })
            .await,
    );

    assert_eq!(
        summary,
        "Total Publications: 4 | Total Citations: 20 | Avg Citations: 5.0 | H-index: 3 | \
         Years Active: 6 | Top Venue: KDD | University: State University | Department: CS"
    );

    let ChartPayload::Panels { title, panels } = payload else {
        panic!("expected panels");
    };
    assert_eq!(title, "Publications by Ada");
    assert_eq!(panels.len(), 4);
    match &panels[2] {
        ChartPayload::Bar {
            categories, values, ..
        } => {
            assert_eq!(categories[0], "KDD");
            assert_eq!(values[0], 2.0);
        }
        other => panic!("expected venue bars, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeseries_from_relational() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).respond(
        "publication_date::date",
        tuples(
            &["date", "count"],
            vec![
                vec![json!("2024-01-02"), json!(3)],
                vec![json!("2024-01-01"), json!(2)],
            ],
        ),
    ));
    let document = Arc::new(ScriptedAdapter::new(BackendKind::Document));
    let service = service_with(vec![relational, document.clone()]).await;

    let (payload, summary) = chart(service.handle(Request::PublicationsTimeseries).await);

    assert_eq!(
        summary,
        "Total Publications: 5 | Avg Daily: 2.5 | Source: PostgreSQL"
    );
    let ChartPayload::TimeSeries { series, .. } = payload else {
        panic!("expected a time series");
    };
    assert_eq!(series.source, SourceTag::Relational);
    assert_eq!(series.points[0].date.to_string(), "2024-01-01");
    assert!(document.executed().is_empty());
}

#[tokio::test]
async fn test_timeseries_falls_back_to_document_pipeline() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational));
    let document = Arc::new(ScriptedAdapter::new(BackendKind::Document).respond(
        "aggregate publications",
        RawRows::Documents(vec![json!({"date": "2024-03-01", "count": 4})
            .as_object()
            .cloned()
            .unwrap_or_default()]),
    ));
    let graph = Arc::new(ScriptedAdapter::new(BackendKind::Graph));
    let service = service_with(vec![relational.clone(), document, graph.clone()]).await;

    let result = service.publications_timeseries().await;

    assert_eq!(
        result.summary,
        "Total Publications: 4 | Avg Daily: 4.0 | Source: MongoDB"
    );
    assert_eq!(relational.executed().len(), 1);
    assert!(graph.executed().is_empty());
}

#[tokio::test]
async fn test_timeseries_uses_graph_when_others_fail() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational).fail(
        "publication_date",
        QueryError::Malformed("column \"publication_date\" does not exist".into()),
    ));
    let record: DataRow = serde_json::from_value(json!({"date": "2023-05-04", "count": 7}))
        .expect("record is an object");
    let graph = Arc::new(
        ScriptedAdapter::new(BackendKind::Graph)
            .respond("MATCH (p:Publication)", RawRows::Records(vec![record])),
    );
    let service = service_with(vec![relational, graph]).await;

    let result = service.publications_timeseries().await;
    assert!(result.summary.ends_with("Source: Neo4j"));
}

#[tokio::test]
async fn test_timeseries_synthetic_fallback_is_tagged() {
    let service = service_with(Vec::new()).await;

    let (payload, summary) = chart(service.handle(Request::PublicationsTimeseries).await);

    assert!(summary.ends_with("Source: Sample Data"));
    let ChartPayload::TimeSeries { series, .. } = payload else {
        panic!("expected a time series");
    };
    assert_eq!(series.source, SourceTag::SyntheticFallback);
    assert_eq!(series.points.len(), 365);
    assert!(series.points.windows(2).all(|w| w[0].date < w[1].date));
}

#[tokio::test]
async fn test_blank_input_is_rejected_before_any_query() {
    let relational = Arc::new(ScriptedAdapter::new(BackendKind::Relational));
    let service = service_with(vec![relational.clone()]).await;

    let (_, summary) = chart(
        service
            .handle(Request::PersonSearch {
                name: "\t ".into(),
            })
            .await,
    );

    assert_eq!(summary, "Person name must not be empty");
    assert!(relational.executed().is_empty());
}

#[tokio::test]
async fn test_response_wire_format() {
    let service = service_with(Vec::new()).await;

    let json = serde_json::to_value(service.handle(Request::ListAll).await).unwrap();
    assert_eq!(json["type"], "chart");
    assert_eq!(json["data"]["payload"]["chart"], "empty");
    assert_eq!(json["data"]["summary"], "PostgreSQL connection not available");
}
