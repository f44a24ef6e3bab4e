use clap::Subcommand;
use scholar_dashboard::{DashboardConfig, DashboardService, QueryCatalogue, Request};
use tracing::debug;

use super::connect;

#[derive(Subcommand)]
pub enum RequestCommand {
    /// Publications mentioning a keyword, counted by year
    KeywordSearch {
        /// Text matched against title, abstract, keywords and venue
        text: String,
    },
    /// The most cited publications
    ListAll,
    /// Compare 2 to 5 keywords by publication count and citations
    Compare {
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Universities with faculty on record
    Universities,
    /// Top research keywords at one university
    UniversityKeywords { university: String },
    /// Publication breakdown for a faculty member
    Faculty { name: String },
    /// Search a person across all backends
    Person { name: String },
    /// Publications per day
    Timeseries,
    /// Run a request given as JSON, e.g. '{"kind": "list_all"}'
    Raw { json: String },
}

impl RequestCommand {
    fn into_request(self) -> anyhow::Result<Request> {
        Ok(match self {
            RequestCommand::KeywordSearch { text } => Request::KeywordSearch { text },
            RequestCommand::ListAll => Request::ListAll,
            RequestCommand::Compare { terms } => Request::CompareKeywords { terms },
            RequestCommand::Universities => Request::ListUniversities,
            RequestCommand::UniversityKeywords { university } => {
                Request::UniversityTopKeywords { university }
            }
            RequestCommand::Faculty { name } => Request::FacultyPublications { name },
            RequestCommand::Person { name } => Request::PersonSearch { name },
            RequestCommand::Timeseries => Request::PublicationsTimeseries,
            RequestCommand::Raw { json } => serde_json::from_str(&json)
                .map_err(|e| anyhow::anyhow!("Invalid request JSON: {}", e))?,
        })
    }

    pub fn execute(self) -> anyhow::Result<()> {
        let request = self.into_request()?;
        debug!("Request: {:?}", request);

        let rt = tokio::runtime::Runtime::new()?;

        rt.block_on(async {
            let config = DashboardConfig::from_env();
            let registry = connect(&config).await;
            let service =
                DashboardService::new(registry.clone(), QueryCatalogue::new(config.schema.clone()));

            let response = service.handle(request).await;
            registry.reset().await;

            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_request_is_parsed() {
        let request = RequestCommand::Raw {
            json: r#"{"kind": "person_search", "name": "Ada"}"#.to_string(),
        }
        .into_request()
        .unwrap();
        assert_eq!(request, Request::PersonSearch { name: "Ada".into() });
    }

    #[test]
    fn test_invalid_raw_request() {
        let err = RequestCommand::Raw {
            json: r#"{"kind": "drop_tables"}"#.to_string(),
        }
        .into_request()
        .unwrap_err();
        assert!(err.to_string().starts_with("Invalid request JSON"));
    }
}
