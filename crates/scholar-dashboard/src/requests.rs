use scholar_query::ValidationError;
use serde::{Deserialize, Serialize};

/// Fewest terms a keyword comparison accepts
pub const MIN_COMPARISON_TERMS: usize = 2;
/// Most terms a keyword comparison accepts
pub const MAX_COMPARISON_TERMS: usize = 5;

/// A request from the rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    KeywordSearch { text: String },
    ListAll,
    CompareKeywords { terms: Vec<String> },
    ListUniversities,
    UniversityTopKeywords { university: String },
    FacultyPublications { name: String },
    PersonSearch { name: String },
    PublicationsTimeseries,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::KeywordSearch { .. } => "keyword_search",
            Request::ListAll => "list_all",
            Request::CompareKeywords { .. } => "compare_keywords",
            Request::ListUniversities => "list_universities",
            Request::UniversityTopKeywords { .. } => "university_top_keywords",
            Request::FacultyPublications { .. } => "faculty_publications",
            Request::PersonSearch { .. } => "person_search",
            Request::PublicationsTimeseries => "publications_timeseries",
        }
    }

    /// Shape-check the request and return it with its text trimmed
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(match self {
            Request::KeywordSearch { text } => Request::KeywordSearch {
                text: required(text, "Keyword")?,
            },
            Request::CompareKeywords { terms } => Request::CompareKeywords {
                terms: comparison_terms(&terms)?,
            },
            Request::UniversityTopKeywords { university } => Request::UniversityTopKeywords {
                university: required(university, "University")?,
            },
            Request::FacultyPublications { name } => Request::FacultyPublications {
                name: required(name, "Faculty name")?,
            },
            Request::PersonSearch { name } => Request::PersonSearch {
                name: required(name, "Person name")?,
            },
            other @ (Request::ListAll
            | Request::ListUniversities
            | Request::PublicationsTimeseries) => other,
        })
    }
}

fn required(value: String, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyInput { field });
    }
    Ok(trimmed.to_string())
}

/// Clean comparison terms: trim, drop blanks, keep duplicates
///
/// Duplicates stay as separate entries, so `["AI", "AI"]` compares the same
/// term twice rather than being rejected.
pub fn comparison_terms(raw: &[String]) -> Result<Vec<String>, ValidationError> {
    let terms: Vec<String> = raw
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    if terms.len() < MIN_COMPARISON_TERMS {
        return Err(ValidationError::TooFewTerms {
            min: MIN_COMPARISON_TERMS,
            got: terms.len(),
        });
    }
    if terms.len() > MAX_COMPARISON_TERMS {
        return Err(ValidationError::TooManyTerms {
            max: MAX_COMPARISON_TERMS,
            got: terms.len(),
        });
    }

    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_blank_text_is_rejected() {
        let err = Request::KeywordSearch { text: "   ".into() }
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyInput { field: "Keyword" });
    }

    #[test]
    fn test_text_is_trimmed() {
        let request = Request::PersonSearch {
            name: "  Ada Lovelace ".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(
            request,
            Request::PersonSearch {
                name: "Ada Lovelace".into()
            }
        );
    }

    #[test]
    fn test_duplicate_terms_are_kept() {
        assert_eq!(
            comparison_terms(&terms(&["AI", " AI "])).unwrap(),
            terms(&["AI", "AI"])
        );
    }

    #[test]
    fn test_blank_terms_do_not_count() {
        let err = comparison_terms(&terms(&["deep learning", "", "  "])).unwrap_err();
        assert_eq!(err, ValidationError::TooFewTerms { min: 2, got: 1 });
    }

    #[test]
    fn test_too_many_terms() {
        let err = comparison_terms(&terms(&["a1", "b2", "c3", "d4", "e5", "f6"])).unwrap_err();
        assert_eq!(err, ValidationError::TooManyTerms { max: 5, got: 6 });
    }

    #[test]
    fn test_request_wire_format() {
        let request: Request = serde_json::from_str(
            r#"{"kind": "compare_keywords", "terms": ["AI", "databases"]}"#,
        )
        .unwrap();
        assert_eq!(request.kind(), "compare_keywords");

        let json = serde_json::to_value(Request::PublicationsTimeseries).unwrap();
        assert_eq!(json["kind"], "publications_timeseries");
    }
}
