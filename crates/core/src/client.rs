use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::{ORIGIN, REFERER};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Result, SarpurError},
    types::{Catalog, Program},
};

const CATEGORIES_QUERY: &str = r#"
query getCategorys($station: StationSearch!) {
    Category(station: $station) {
        categories {
            title
            slug
        }
    }
}
"#;

const CATEGORY_PROGRAMS_QUERY: &str = r#"
query getCategoryPrograms($station: StationSearch!, $category: String!) {
    Category(station: $station, category: $category) {
        categories {
            programs {
                id
                title
                foreign_title
                short_description
                episodes {
                    id
                    title
                    file
                }
            }
        }
    }
}
"#;

const ALL_PROGRAMS_QUERY: &str = r#"
query getAllPrograms($station: StationSearch!) {
    Programs(station: $station) {
        id
        title
        foreign_title
        short_description
        episodes {
            id
            title
            file
        }
    }
}
"#;

/// Where and how the catalog service is reached
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub station: String,
    pub referer: String,
    pub origin: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "https://www.ruv.is/gql/".to_string(),
            station: "tv".to_string(),
            referer: "https://www.ruv.is/sjonvarp".to_string(),
            origin: "https://www.ruv.is".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// The three queries the catalog is assembled from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Category slugs for the configured station
    async fn categories(&self) -> Result<Vec<String>>;

    /// Programs listed under one category, with supplementary metadata
    async fn programs_by_category(&self, slug: &str) -> Result<Vec<Program>>;

    /// Every program with its full episode list
    async fn all_programs(&self) -> Result<Vec<Program>>;
}

/// GraphQL client for ruv.is. Clones of the inner `reqwest::Client` share one
/// connection pool, so concurrent queries reuse the same session.
pub struct RuvClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl RuvClient {
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn query<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        debug!(operation, "sending catalog query");
        let body = self
            .http
            .post(&self.config.url)
            .header(REFERER, &self.config.referer)
            .header(ORIGIN, &self.config.origin)
            .json(&json!({
                "operationName": operation,
                "query": query,
                "variables": variables,
            }))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let response: GraphQlResponse<T> =
            serde_json::from_slice(&body).map_err(|e| SarpurError::MalformedResponse {
                reason: format!("{operation}: {e}"),
            })?;
        response.into_data(operation)
    }
}

#[async_trait]
impl CatalogSource for RuvClient {
    async fn categories(&self) -> Result<Vec<String>> {
        let data: CategoryData<CategorySlug> = self
            .query(
                "getCategorys",
                CATEGORIES_QUERY,
                json!({ "station": self.config.station }),
            )
            .await?;
        Ok(data.category.categories.into_iter().map(|c| c.slug).collect())
    }

    async fn programs_by_category(&self, slug: &str) -> Result<Vec<Program>> {
        let data: CategoryData<CategoryPrograms> = self
            .query(
                "getCategoryPrograms",
                CATEGORY_PROGRAMS_QUERY,
                json!({ "station": self.config.station, "category": slug }),
            )
            .await?;
        Ok(data.into_programs())
    }

    async fn all_programs(&self) -> Result<Vec<Program>> {
        let data: AllPrograms = self
            .query(
                "getAllPrograms",
                ALL_PROGRAMS_QUERY,
                json!({ "station": self.config.station }),
            )
            .await?;
        Ok(data.programs)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_data(self, operation: &str) -> Result<T> {
        if let Some(errors) = self.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            return Err(SarpurError::MalformedResponse {
                reason: format!("{operation}: {}", messages.join("; ")),
            });
        }
        self.data.ok_or_else(|| SarpurError::MalformedResponse {
            reason: format!("{operation}: response has no data"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CategoryData<T> {
    #[serde(rename = "Category")]
    category: CategoryGroup<T>,
}

#[derive(Debug, Deserialize)]
struct CategoryGroup<T> {
    categories: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CategorySlug {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct CategoryPrograms {
    #[serde(default)]
    programs: Option<Vec<Program>>,
}

impl CategoryData<CategoryPrograms> {
    fn into_programs(self) -> Vec<Program> {
        self.category
            .categories
            .into_iter()
            .flat_map(|c| c.programs.unwrap_or_default())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct AllPrograms {
    #[serde(rename = "Programs")]
    programs: Vec<Program>,
}

/// Build the catalog from `base` (authoritative for identity and episodes),
/// taking `short_description` and `foreign_title` from `supplementary`
/// wherever the same program id shows up there.
///
/// Programs only present in `supplementary` are not added. Programs and
/// episodes without an identifier are dropped.
pub fn merge_programs(base: Vec<Program>, supplementary: Vec<Program>) -> Catalog {
    let mut catalog: Catalog = base
        .into_iter()
        .filter(|p| {
            let keep = !p.id.trim().is_empty();
            if !keep {
                warn!(title = %p.title, "dropping program without an identifier");
            }
            keep
        })
        .map(|mut p| {
            p.episodes.retain(|e| {
                let keep = !e.id.trim().is_empty();
                if !keep {
                    warn!(program = %p.id, title = %e.title, "dropping episode without an identifier");
                }
                keep
            });
            p
        })
        .collect();

    for extra in supplementary {
        if let Some(program) = catalog.get_mut(&extra.id) {
            program.short_description = extra.short_description;
            program.foreign_title = extra.foreign_title;
        }
    }

    catalog
}

/// Query every source and merge the results into one catalog.
///
/// Per-category queries run concurrently; a failing category is logged and
/// left out. Only a failure of the "all programs" query fails the fetch.
#[instrument(skip_all)]
pub async fn fetch_catalog<S: CatalogSource + ?Sized>(source: &S) -> Result<Catalog> {
    let supplementary = async {
        match source.categories().await {
            Ok(slugs) => fetch_categories(source, &slugs).await,
            Err(e) => {
                warn!(error = %e, "could not list categories, continuing without them");
                Vec::new()
            }
        }
    };

    let (base, supplementary) = tokio::join!(source.all_programs(), supplementary);
    let catalog = merge_programs(base?, supplementary);

    info!(
        programs = catalog.len(),
        episodes = catalog.episode_count(),
        "catalog fetched"
    );
    Ok(catalog)
}

async fn fetch_categories<S: CatalogSource + ?Sized>(source: &S, slugs: &[String]) -> Vec<Program> {
    let results = join_all(
        slugs
            .iter()
            .map(|slug| async move { (slug, source.programs_by_category(slug).await) }),
    )
    .await;

    results
        .into_iter()
        .flat_map(|(slug, result)| match result {
            Ok(programs) => {
                debug!(category = %slug, programs = programs.len(), "category fetched");
                programs
            }
            Err(e) => {
                warn!(category = %slug, error = %e, "category fetch failed, excluding it");
                Vec::new()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::Episode;

    fn program(id: &str, title: &str, foreign: Option<&str>, desc: Option<&str>) -> Program {
        Program {
            id: id.into(),
            title: title.into(),
            foreign_title: foreign.map(Into::into),
            short_description: desc.map(Into::into),
            episodes: vec![Episode {
                id: format!("{id}-e1"),
                title: format!("{title} 1"),
                foreign_title: None,
                file: format!("https://example.com/{id}.m3u8"),
            }],
        }
    }

    struct FakeSource {
        all: Vec<Program>,
        categories: HashMap<String, Result<Vec<Program>>>,
        fail_all: bool,
    }

    #[async_trait]
    impl CatalogSource for FakeSource {
        async fn categories(&self) -> Result<Vec<String>> {
            let mut slugs: Vec<_> = self.categories.keys().cloned().collect();
            slugs.sort();
            Ok(slugs)
        }

        async fn programs_by_category(&self, slug: &str) -> Result<Vec<Program>> {
            match self.categories.get(slug) {
                Some(Ok(programs)) => Ok(programs.clone()),
                _ => Err(SarpurError::MalformedResponse {
                    reason: format!("{slug} unavailable"),
                }),
            }
        }

        async fn all_programs(&self) -> Result<Vec<Program>> {
            if self.fail_all {
                return Err(SarpurError::MalformedResponse {
                    reason: "service down".into(),
                });
            }
            Ok(self.all.clone())
        }
    }

    #[test]
    fn supplementary_fields_override_base() {
        let base = vec![
            program("p1", "Fréttir", None, None),
            program("p2", "Kastljós", Some("Spotlight"), Some("Umræðuþáttur")),
        ];
        let extra = vec![program("p1", "ignored title", Some("News"), Some("Kvöldfréttir"))];

        let catalog = merge_programs(base.clone(), extra);

        let p1 = catalog.get("p1").unwrap();
        assert_eq!(p1.foreign_title.as_deref(), Some("News"));
        assert_eq!(p1.short_description.as_deref(), Some("Kvöldfréttir"));
        assert_eq!(p1.title, "Fréttir");
        assert_eq!(p1.episodes, base[0].episodes);
        assert_eq!(catalog.get("p2").unwrap(), &base[1]);
    }

    #[test]
    fn supplementary_nulls_still_win() {
        let base = vec![program("p1", "Fréttir", Some("News"), Some("Kvöldfréttir"))];
        let extra = vec![program("p1", "Fréttir", None, None)];

        let catalog = merge_programs(base, extra);

        let p1 = catalog.get("p1").unwrap();
        assert_eq!(p1.foreign_title, None);
        assert_eq!(p1.short_description, None);
    }

    #[test]
    fn merge_drops_blank_ids_and_supplementary_only_programs() {
        let base = vec![program("", "Nameless", None, None), program("p1", "Fréttir", None, None)];
        let extra = vec![program("p9", "Only in category", None, Some("x"))];

        let catalog = merge_programs(base, extra);

        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("p1"));
        assert!(!catalog.contains("p9"));
    }

    #[test]
    fn null_ids_in_all_programs_are_dropped() {
        let body = r#"{
            "data": {
                "Programs": [
                    {"id": 31685, "title": "Fréttir", "episodes": [
                        {"id": "ab1x", "title": "Kvöld", "file": "https://example.com/ab1x.m3u8"},
                        {"id": null, "title": "Bilaður", "file": null}
                    ]},
                    {"id": null, "title": "Nafnlaust", "episodes": []}
                ]
            }
        }"#;

        let response: GraphQlResponse<AllPrograms> = serde_json::from_str(body).unwrap();
        let programs = response.into_data("getAllPrograms").unwrap().programs;
        let catalog = merge_programs(programs, Vec::new());

        assert_eq!(catalog.len(), 1);
        let news = catalog.get("31685").unwrap();
        assert_eq!(news.episodes.len(), 1);
        assert_eq!(news.episodes[0].id, "ab1x");
    }

    #[tokio::test]
    async fn failing_category_is_excluded() {
        let mut categories = HashMap::new();
        categories.insert(
            "born".to_string(),
            Ok(vec![program("p1", "Stundin okkar", Some("Our Hour"), Some("Barnaefni"))]),
        );
        categories.insert(
            "frettir".to_string(),
            Err(SarpurError::MalformedResponse { reason: "boom".into() }),
        );
        let source = FakeSource {
            all: vec![
                program("p1", "Stundin okkar", None, None),
                program("p2", "Fréttir", None, None),
            ],
            categories,
            fail_all: false,
        };

        let catalog = fetch_catalog(&source).await.unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("p1").unwrap().foreign_title.as_deref(), Some("Our Hour"));
        assert_eq!(catalog.get("p2").unwrap().foreign_title, None);
    }

    #[tokio::test]
    async fn failing_base_query_fails_fetch() {
        let source = FakeSource {
            all: Vec::new(),
            categories: HashMap::new(),
            fail_all: true,
        };

        let err = fetch_catalog(&source).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn category_programs_response_is_flattened() {
        let body = r#"{
            "data": {
                "Category": {
                    "categories": [
                        {"programs": [{"id": 1, "title": "A", "foreign_title": "Aa", "short_description": null, "episodes": []}]},
                        {"programs": null},
                        {"programs": [{"id": "2", "title": "B", "episodes": null}]}
                    ]
                }
            }
        }"#;

        let response: GraphQlResponse<CategoryData<CategoryPrograms>> =
            serde_json::from_str(body).unwrap();
        let programs = response.into_data("getCategoryPrograms").unwrap().into_programs();

        let ids: Vec<_> = programs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(programs[0].foreign_title.as_deref(), Some("Aa"));
    }

    #[test]
    fn graphql_errors_become_malformed_response() {
        let body = r#"{"data": null, "errors": [{"message": "Unknown station"}]}"#;
        let response: GraphQlResponse<AllPrograms> = serde_json::from_str(body).unwrap();

        let err = response.into_data("getAllPrograms").unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("Unknown station"));
    }

    #[test]
    fn missing_data_is_malformed() {
        let response: GraphQlResponse<AllPrograms> = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            response.into_data("getAllPrograms"),
            Err(SarpurError::MalformedResponse { .. })
        ));
    }
}
