//! Native queries behind every dashboard widget
//!
//! Each [`Lookup`] pairs a backend-native query with the field projection
//! its results are normalized against. Relational lookups select columns
//! in projection order because tuples are zipped positionally.

use scholar_query::aggregate::daily_count_schema;
use scholar_query::{
    normalize, regex_contains, BackendAdapter, BackendKind, FieldDef, FieldSchema, FindQuery,
    NativeQuery, QueryError, RecordSet, ScalarValue,
};
use serde_json::json;

use crate::config::SchemaNames;

/// Rows returned by a keyword search
pub const KEYWORD_SEARCH_LIMIT: i64 = 20;
/// Rows shown by the publication listing
pub const LISTING_LIMIT: i64 = 50;
/// Distinct keyword strings read per university
pub const UNIVERSITY_KEYWORD_ROWS: i64 = 10;
/// Publications shown per person and backend
pub const PERSON_PUBLICATION_LIMIT: i64 = 10;
/// Documents read per person-search collection
pub const PERSON_DOCUMENT_LIMIT: i64 = 5;
/// Graph persons and collaborators shown per person search
pub const PERSON_GRAPH_LIMIT: i64 = 5;

/// What a person-search lookup contributes to the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Profile,
    Publications,
    Collaborators,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Profile => "profile",
            Category::Publications => "publications",
            Category::Collaborators => "collaborators",
        }
    }
}

/// A native query plus the projection its rows are normalized against
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub query: NativeQuery,
    pub schema: FieldSchema,
}

impl Lookup {
    pub fn new(query: NativeQuery, schema: FieldSchema) -> Self {
        Self { query, schema }
    }

    pub fn backend(&self) -> BackendKind {
        self.query.backend()
    }

    /// Run through the adapter's reconnecting read and normalize the rows
    pub async fn fetch(&self, adapter: &dyn BackendAdapter) -> Result<RecordSet, QueryError> {
        let raw = adapter.execute_read(&self.query).await?;
        Ok(normalize(raw, adapter.kind(), &self.schema))
    }
}

/// `%text%` for LIKE/ILIKE with the pattern metacharacters escaped
pub fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn publication_schema() -> FieldSchema {
    FieldSchema::new(vec![
        FieldDef::text("title"),
        FieldDef::integer("year"),
        FieldDef::text("venue"),
        FieldDef::integer("citations"),
    ])
}

/// Query builders over the configured schema names
#[derive(Debug, Clone, Default)]
pub struct QueryCatalogue {
    names: SchemaNames,
}

impl QueryCatalogue {
    pub fn new(names: SchemaNames) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &SchemaNames {
        &self.names
    }

    /// Publications whose title, abstract, keywords or venue contain `text`
    pub fn keyword_search(&self, text: &str) -> Lookup {
        let sql = format!(
            r#"
            SELECT p.title, p.year, p.venue, p.citations, p.abstract,
                   string_agg(DISTINCT f.name, ', ') AS authors
            FROM {publication} p
            LEFT JOIN {authorship} pa ON p.id = pa.publication_id
            LEFT JOIN {faculty} f ON pa.faculty_id = f.id
            WHERE p.title ILIKE $1
               OR p.abstract ILIKE $1
               OR p.keywords ILIKE $1
               OR p.venue ILIKE $1
            GROUP BY p.id, p.title, p.year, p.venue, p.citations, p.abstract
            ORDER BY p.citations DESC NULLS LAST, p.year DESC NULLS LAST
            LIMIT {limit}
            "#,
            publication = self.names.publication_table,
            authorship = self.names.authorship_table,
            faculty = self.names.faculty_table,
            limit = KEYWORD_SEARCH_LIMIT,
        );

        Lookup::new(
            NativeQuery::sql(sql, vec![ScalarValue::text(like_pattern(text))]),
            FieldSchema::new(vec![
                FieldDef::text("title"),
                FieldDef::integer("year"),
                FieldDef::text("venue"),
                FieldDef::integer("citations"),
                FieldDef::text("abstract"),
                FieldDef::text("authors"),
            ]),
        )
    }

    /// Most cited publications with their authors
    pub fn list_all(&self) -> Lookup {
        let sql = format!(
            r#"
            SELECT p.title, p.year, p.venue, p.citations,
                   string_agg(DISTINCT f.name, ', ') AS authors
            FROM {publication} p
            LEFT JOIN {authorship} pa ON p.id = pa.publication_id
            LEFT JOIN {faculty} f ON pa.faculty_id = f.id
            GROUP BY p.id, p.title, p.year, p.venue, p.citations
            ORDER BY p.citations DESC NULLS LAST, p.year DESC NULLS LAST
            LIMIT {limit}
            "#,
            publication = self.names.publication_table,
            authorship = self.names.authorship_table,
            faculty = self.names.faculty_table,
            limit = LISTING_LIMIT,
        );

        Lookup::new(
            NativeQuery::sql(sql, vec![]),
            FieldSchema::new(vec![
                FieldDef::text("title"),
                FieldDef::integer("year"),
                FieldDef::text("venue"),
                FieldDef::integer("citations"),
                FieldDef::text("authors"),
            ]),
        )
    }

    /// One aggregate row describing the publications that mention `term`
    pub fn keyword_stats(&self, term: &str) -> Lookup {
        let sql = format!(
            r#"
            SELECT COUNT(*) AS publication_count,
                   AVG(citations)::float8 AS avg_citations,
                   MAX(citations) AS max_citations,
                   MIN(year) AS earliest_year,
                   MAX(year) AS latest_year,
                   COUNT(DISTINCT venue) AS unique_venues
            FROM {publication}
            WHERE title ILIKE $1
               OR abstract ILIKE $1
               OR keywords ILIKE $1
               OR venue ILIKE $1
            "#,
            publication = self.names.publication_table,
        );

        Lookup::new(
            NativeQuery::sql(sql, vec![ScalarValue::text(like_pattern(term))]),
            FieldSchema::new(vec![
                FieldDef::integer("publication_count"),
                FieldDef::float("avg_citations"),
                FieldDef::integer("max_citations"),
                FieldDef::integer("earliest_year"),
                FieldDef::integer("latest_year"),
                FieldDef::integer("unique_venues"),
            ]),
        )
    }

    pub fn universities(&self) -> Lookup {
        let sql = format!(
            r#"
            SELECT DISTINCT university
            FROM {faculty}
            WHERE university IS NOT NULL AND university <> ''
            ORDER BY university
            "#,
            faculty = self.names.faculty_table,
        );

        Lookup::new(
            NativeQuery::sql(sql, vec![]),
            FieldSchema::new(vec![FieldDef::text("university")]),
        )
    }

    /// Keyword strings of a university's publications with their row counts
    pub fn university_keywords(&self, university: &str) -> Lookup {
        let sql = format!(
            r#"
            SELECT p.keywords, COUNT(*) AS keyword_count
            FROM {publication} p
            JOIN {authorship} pa ON p.id = pa.publication_id
            JOIN {faculty} f ON pa.faculty_id = f.id
            WHERE f.university = $1
              AND p.keywords IS NOT NULL
              AND p.keywords <> ''
            GROUP BY p.keywords
            ORDER BY keyword_count DESC
            LIMIT {limit}
            "#,
            publication = self.names.publication_table,
            authorship = self.names.authorship_table,
            faculty = self.names.faculty_table,
            limit = UNIVERSITY_KEYWORD_ROWS,
        );

        Lookup::new(
            NativeQuery::sql(sql, vec![ScalarValue::text(university)]),
            FieldSchema::new(vec![
                FieldDef::text("keywords"),
                FieldDef::integer("keyword_count"),
            ]),
        )
    }

    /// Every publication of the faculty members whose name contains `name`
    pub fn faculty_publications(&self, name: &str) -> Lookup {
        let sql = format!(
            r#"
            SELECT p.title, p.year, p.venue, p.citations, p.abstract, p.keywords,
                   f.name AS faculty_name, f.university, f.department
            FROM {publication} p
            JOIN {authorship} pa ON p.id = pa.publication_id
            JOIN {faculty} f ON pa.faculty_id = f.id
            WHERE f.name ILIKE $1
            ORDER BY p.year DESC NULLS LAST, p.citations DESC NULLS LAST
            "#,
            publication = self.names.publication_table,
            authorship = self.names.authorship_table,
            faculty = self.names.faculty_table,
        );

        Lookup::new(
            NativeQuery::sql(sql, vec![ScalarValue::text(like_pattern(name))]),
            FieldSchema::new(vec![
                FieldDef::text("title"),
                FieldDef::integer("year"),
                FieldDef::text("venue"),
                FieldDef::integer("citations"),
                FieldDef::text("abstract"),
                FieldDef::text("keywords"),
                FieldDef::text("faculty_name"),
                FieldDef::text("university"),
                FieldDef::text("department"),
            ]),
        )
    }

    /// Day buckets of publication dates from one backend
    pub fn daily_publications(&self, kind: BackendKind) -> Lookup {
        let query = match kind {
            BackendKind::Relational => NativeQuery::sql(
                format!(
                    r#"
                    SELECT publication_date::date AS date, COUNT(*) AS count
                    FROM {publication}
                    WHERE publication_date IS NOT NULL
                    GROUP BY publication_date::date
                    ORDER BY date
                    "#,
                    publication = self.names.publication_table,
                ),
                vec![],
            ),
            BackendKind::Document => NativeQuery::Aggregate {
                collection: self.names.publication_collection.clone(),
                pipeline: vec![
                    json!({"$match": {"publication_date": {"$exists": true, "$ne": null}}}),
                    json!({"$group": {
                        "_id": {"$dateToString": {"format": "%Y-%m-%d", "date": "$publication_date"}},
                        "count": {"$sum": 1}
                    }}),
                    json!({"$sort": {"_id": 1}}),
                    json!({"$project": {"_id": 0, "date": "$_id", "count": 1}}),
                ],
            },
            BackendKind::Graph => NativeQuery::cypher(
                r#"
                MATCH (p:Publication)
                WHERE p.publication_date IS NOT NULL
                RETURN toString(date(p.publication_date)) AS date, count(p) AS count
                ORDER BY date
                "#,
            ),
        };

        Lookup::new(query, daily_count_schema())
    }

    /// Lookups run against `kind` for one person search, in report order
    pub fn person_lookups(&self, kind: BackendKind, name: &str) -> Vec<(Category, Lookup)> {
        match kind {
            BackendKind::Relational => vec![
                (Category::Profile, self.relational_profile(name)),
                (Category::Publications, self.relational_person_publications(name)),
            ],
            BackendKind::Document => vec![
                (Category::Profile, self.document_profile(name)),
                (Category::Publications, self.document_person_publications(name)),
            ],
            BackendKind::Graph => vec![
                (Category::Profile, graph_profile(name)),
                (Category::Publications, graph_person_publications(name)),
                (Category::Collaborators, graph_collaborators(name)),
            ],
        }
    }

    fn relational_profile(&self, name: &str) -> Lookup {
        let sql = format!(
            r#"
            SELECT id, name, email, phone, position, research, interests, department, university
            FROM {faculty} WHERE name ILIKE $1
            ORDER BY name
            "#,
            faculty = self.names.faculty_table,
        );

        Lookup::new(
            NativeQuery::sql(sql, vec![ScalarValue::text(like_pattern(name))]),
            FieldSchema::new(vec![
                FieldDef::integer("id"),
                FieldDef::text("name"),
                FieldDef::text("email"),
                FieldDef::text("phone"),
                FieldDef::text("position"),
                FieldDef::text("research"),
                FieldDef::text("interests"),
                FieldDef::text("department"),
                FieldDef::text("university"),
            ]),
        )
    }

    fn relational_person_publications(&self, name: &str) -> Lookup {
        let sql = format!(
            r#"
            SELECT p.title, p.year, p.venue, p.citations
            FROM {publication} p
            JOIN {authorship} pa ON p.id = pa.publication_id
            JOIN {faculty} f ON pa.faculty_id = f.id
            WHERE f.name ILIKE $1
            ORDER BY p.year DESC NULLS LAST
            LIMIT {limit}
            "#,
            publication = self.names.publication_table,
            authorship = self.names.authorship_table,
            faculty = self.names.faculty_table,
            limit = PERSON_PUBLICATION_LIMIT,
        );

        Lookup::new(
            NativeQuery::sql(sql, vec![ScalarValue::text(like_pattern(name))]),
            publication_schema(),
        )
    }

    fn document_profile(&self, name: &str) -> Lookup {
        let find = FindQuery::new(
            self.names.faculty_collection.clone(),
            json!({ "name": regex_contains(name) }),
        )
        .with_limit(PERSON_DOCUMENT_LIMIT);

        Lookup::new(
            NativeQuery::Find(find),
            FieldSchema::new(vec![
                FieldDef::text("name"),
                FieldDef::text("email"),
                FieldDef::text("position"),
                FieldDef::text("department"),
                FieldDef::text("research_areas"),
            ]),
        )
    }

    fn document_person_publications(&self, name: &str) -> Lookup {
        let find = FindQuery::new(
            self.names.publication_collection.clone(),
            json!({ "authors": regex_contains(name) }),
        )
        .with_limit(PERSON_DOCUMENT_LIMIT);

        Lookup::new(
            NativeQuery::Find(find),
            FieldSchema::new(vec![
                FieldDef::text("title"),
                FieldDef::integer("year"),
                FieldDef::text("authors"),
                FieldDef::integer("citations"),
            ]),
        )
    }
}

fn graph_profile(name: &str) -> Lookup {
    let query = NativeQuery::cypher(format!(
        r#"
        MATCH (p:Person)
        WHERE toLower(p.name) CONTAINS toLower($name)
        RETURN p.name AS name, p.email AS email, p.position AS position,
               p.department AS department
        LIMIT {limit}
        "#,
        limit = PERSON_GRAPH_LIMIT,
    ))
    .param("name", name);

    Lookup::new(
        query,
        FieldSchema::new(vec![
            FieldDef::text("name"),
            FieldDef::text("email"),
            FieldDef::text("position"),
            FieldDef::text("department"),
        ]),
    )
}

fn graph_person_publications(name: &str) -> Lookup {
    let query = NativeQuery::cypher(format!(
        r#"
        MATCH (p:Person)-[:AUTHORED]->(pub:Publication)
        WHERE toLower(p.name) CONTAINS toLower($name)
        RETURN pub.title AS title, pub.year AS year, pub.venue AS venue,
               pub.citations AS citations
        ORDER BY pub.year DESC
        LIMIT {limit}
        "#,
        limit = PERSON_PUBLICATION_LIMIT,
    ))
    .param("name", name);

    Lookup::new(query, publication_schema())
}

fn graph_collaborators(name: &str) -> Lookup {
    let query = NativeQuery::cypher(format!(
        r#"
        MATCH (p1:Person)-[:AUTHORED]->(pub:Publication)<-[:AUTHORED]-(p2:Person)
        WHERE toLower(p1.name) CONTAINS toLower($name) AND p1 <> p2
        RETURN p2.name AS collaborator, count(pub) AS collaboration_count
        ORDER BY collaboration_count DESC
        LIMIT {limit}
        "#,
        limit = PERSON_GRAPH_LIMIT,
    ))
    .param("name", name);

    Lookup::new(
        query,
        FieldSchema::new(vec![
            FieldDef::text("collaborator"),
            FieldDef::integer("collaboration_count"),
        ]),
    )
}
