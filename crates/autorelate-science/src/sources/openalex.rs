use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use autorelate_core::config::OpenAlexConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};
use crate::http::PacedClient;
use crate::identifiers::doi::Doi;
use crate::sources::{CitationGraph, Lookup};

const OPENALEX_ID_PREFIX: &str = "https://openalex.org/";
const WORK_FIELDS: &str = "id,doi,title,referenced_works,cited_by_api_url,cited_by_count";

/// The subset of an OpenAlex work that relation discovery reads.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct OpenAlexWork {
    pub id: String,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub referenced_works: Vec<String>,
    pub cited_by_api_url: Option<String>,
    pub cited_by_count: u32,
}

impl OpenAlexWork {
    /// Short OpenAlex ids (`W123…`) of the first `limit` referenced works.
    pub fn reference_ids(&self, limit: usize) -> Vec<&str> {
        self.referenced_works
            .iter()
            .take(limit)
            .map(|id| id.strip_prefix(OPENALEX_ID_PREFIX).unwrap_or(id))
            .filter(|id| !id.is_empty())
            .collect()
    }
}

/// One page of a `/works` listing restricted to `select=doi`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DoiPage {
    results: Vec<DoiOnly>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DoiOnly {
    doi: Option<String>,
}

impl DoiPage {
    fn into_dois(self) -> BTreeSet<Doi> {
        self.results
            .into_iter()
            .filter_map(|r| r.doi.as_deref().and_then(Doi::normalize))
            .collect()
    }
}

pub struct OpenAlexSource {
    client: PacedClient,
    base_url: String,
    max_references: usize,
    per_page: u32,
}

impl OpenAlexSource {
    pub fn new(config: &OpenAlexConfig) -> Result<Self> {
        let email = config.contact_email().map(str::to_string);
        let user_agent = match &email {
            Some(email) => format!("autorelate/{} (mailto:{email})", env!("CARGO_PKG_VERSION")),
            None => format!("autorelate/{}", env!("CARGO_PKG_VERSION")),
        };
        let client = PacedClient::new(
            config.api_delay(),
            config.request_timeout(),
            &user_agent,
            email,
        )?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            max_references: config.max_references,
            per_page: config.per_page,
        })
    }

    pub fn with_params(
        base_url: &str,
        api_delay: Duration,
        polite_email: Option<String>,
    ) -> Result<Self> {
        Self::new(&OpenAlexConfig {
            base_url: base_url.to_string(),
            api_delay_ms: api_delay.as_millis() as u64,
            polite_pool_email: polite_email.unwrap_or_default(),
            ..OpenAlexConfig::default()
        })
    }

    pub fn client(&self) -> &PacedClient {
        &self.client
    }

    /// `GET /works/doi:{doi}` with the fields relation discovery needs.
    pub async fn fetch_work(&self, doi: &Doi) -> Result<OpenAlexWork> {
        let mut url = self.works_url()?;
        url.path_segments_mut()
            .map_err(|_| ScienceError::Parse("invalid OpenAlex base URL".to_string()))?
            .push(&format!("doi:{}", doi.as_str()));
        url.query_pairs_mut().append_pair("select", WORK_FIELDS);

        self.client.get_json(url).await
    }

    /// Resolves up to `max_references` referenced works to DOIs with one
    /// batched `openalex_id` filter query.
    pub async fn fetch_reference_dois(&self, work: &OpenAlexWork) -> Result<BTreeSet<Doi>> {
        let ids = work.reference_ids(self.max_references);
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let mut url = self.works_url()?;
        url.query_pairs_mut()
            .append_pair("filter", &format!("openalex_id:{}", ids.join("|")))
            .append_pair("select", "doi")
            .append_pair("per_page", &self.per_page.to_string());

        let page: DoiPage = self.client.get_json(url).await?;
        Ok(page.into_dois())
    }

    /// Follows the work's `cited_by_api_url`, asking only for DOIs.
    pub async fn fetch_citing_dois(&self, handle: &str) -> Result<BTreeSet<Doi>> {
        let mut url = parse_url(handle)?;
        url.query_pairs_mut()
            .append_pair("select", "doi")
            .append_pair("per_page", &self.per_page.to_string());

        let page: DoiPage = self.client.get_json(url).await?;
        Ok(page.into_dois())
    }

    fn works_url(&self) -> Result<Url> {
        let mut url = parse_url(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| ScienceError::Parse("invalid OpenAlex base URL".to_string()))?
            .pop_if_empty()
            .push("works");
        Ok(url)
    }
}

#[async_trait]
impl CitationGraph for OpenAlexSource {
    async fn fetch_work(&self, doi: &Doi) -> Lookup<OpenAlexWork> {
        self.fetch_work(doi).await.into()
    }

    async fn resolve_references(&self, work: &OpenAlexWork) -> Lookup<BTreeSet<Doi>> {
        if work.reference_ids(self.max_references).is_empty() {
            return Lookup::Missing;
        }
        self.fetch_reference_dois(work).await.into()
    }

    async fn resolve_citing_works(&self, work: &OpenAlexWork) -> Lookup<BTreeSet<Doi>> {
        match work.cited_by_api_url.as_deref() {
            Some(handle) if !handle.is_empty() => self.fetch_citing_dois(handle).await.into(),
            _ => Lookup::Missing,
        }
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| ScienceError::Parse(format!("invalid URL {url}: {e}")))
}
