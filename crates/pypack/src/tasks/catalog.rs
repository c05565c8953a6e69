//! Registry-backed listing tasks: single-name search with fuzzy fallback, and
//! the curated "recent" and "trending" batches.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use pypack_core::{PackageRecord, PackageRegistry, normalize};

use super::{BackgroundTask, TaskContext, TaskKind};
use crate::error::AppError;

const SEARCH_CANDIDATES: &[&str] = &[
    "numpy",
    "pandas",
    "requests",
    "tensorflow",
    "pytorch",
    "django",
    "flask",
    "scikit-learn",
    "matplotlib",
    "scipy",
    "pillow",
    "sqlalchemy",
    "beautifulsoup4",
    "fastapi",
    "httpx",
    "transformers",
    "torch",
    "seaborn",
    "pytest",
    "black",
    "pylance",
    "pyright",
    "flake8",
    "mypy",
    "isort",
];

const RECENT_CANDIDATE_COUNT: usize = 15;

/// Upper bound on lookups in one batch, whatever the configured limit.
pub const MAX_BATCH_LOOKUPS: usize = 10;

const TRENDING_CANDIDATES: &[&str] = &[
    "fastapi",
    "pydantic",
    "langchain",
    "gradio",
    "streamlit",
    "transformers",
    "ray",
    "pytorch-lightning",
    "polars",
    "httpx",
    "pylance",
    "pyright",
    "black",
    "ruff",
    "mypy",
];

/// Package names the listing tasks draw from.
pub trait CandidateSource: Send + Sync {
    /// Names matched against a query when the exact lookup finds nothing.
    fn search_candidates(&self) -> Vec<String>;

    fn recent_candidates(&self) -> Vec<String>;

    fn trending_candidates(&self) -> Vec<String>;
}

/// Built-in lists of well-known packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct CuratedCandidates;

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

impl CandidateSource for CuratedCandidates {
    fn search_candidates(&self) -> Vec<String> {
        owned(SEARCH_CANDIDATES)
    }

    fn recent_candidates(&self) -> Vec<String> {
        owned(&SEARCH_CANDIDATES[..RECENT_CANDIDATE_COUNT])
    }

    fn trending_candidates(&self) -> Vec<String> {
        owned(TRENDING_CANDIDATES)
    }
}

/// Collaborators shared by the listing tasks.
#[derive(Clone)]
pub struct CatalogSources {
    pub registry: Arc<dyn PackageRegistry>,
    pub candidates: Arc<dyn CandidateSource>,
    /// Requested number of registry lookups in one batch. Never exceeds
    /// [`MAX_BATCH_LOOKUPS`] in effect.
    pub batch_limit: usize,
}

impl CatalogSources {
    pub fn new(registry: Arc<dyn PackageRegistry>, batch_limit: usize) -> Self {
        Self {
            registry,
            candidates: Arc::new(CuratedCandidates),
            batch_limit,
        }
    }

    #[must_use]
    pub fn with_candidates(mut self, candidates: Arc<dyn CandidateSource>) -> Self {
        self.candidates = candidates;
        self
    }

    fn lookup_limit(&self) -> usize {
        self.batch_limit.min(MAX_BATCH_LOOKUPS)
    }

    /// Looks up each name in turn. Failed lookups are logged and skipped so
    /// one bad package never sinks the batch.
    async fn fetch_batch(
        &self,
        ctx: &TaskContext<Vec<PackageRecord>>,
        operation: &'static str,
        names: &[String],
    ) -> Result<Vec<PackageRecord>, AppError> {
        let total = names.len();
        let mut records = Vec::with_capacity(total);

        for (index, name) in names.iter().enumerate() {
            ctx.checkpoint(operation)?;
            ctx.progress(batch_percent(index, total), format!("Fetching {name}"));

            match ctx
                .until_cancelled(operation, self.registry.fetch_package(name))
                .await?
            {
                Ok(raw) => records.push(normalize(name, &raw)),
                Err(error) => debug!("Skipping {name}: {error}"),
            }
        }

        info!(
            "{operation}: {} of {total} lookups succeeded",
            records.len()
        );
        Ok(records)
    }
}

fn batch_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(index * 100 / total).unwrap_or(100)
}

/// Newest upload first; records without a known date go last, otherwise
/// keeping their input order.
pub(crate) fn sort_by_upload_date(records: &mut [PackageRecord]) {
    records.sort_by(
        |a, b| match (a.has_known_upload_date(), b.has_known_upload_date()) {
            (true, true) => b.upload_date.cmp(&a.upload_date),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        },
    );
}

pub struct SearchTask {
    query: String,
    sources: CatalogSources,
}

impl SearchTask {
    pub fn new(query: impl Into<String>, sources: CatalogSources) -> Self {
        Self {
            query: query.into(),
            sources,
        }
    }
}

#[async_trait]
impl BackgroundTask for SearchTask {
    type Output = Vec<PackageRecord>;

    fn kind(&self) -> TaskKind {
        TaskKind::Search
    }

    async fn run(
        self,
        ctx: &TaskContext<Vec<PackageRecord>>,
    ) -> Result<Vec<PackageRecord>, AppError> {
        const OPERATION: &str = "Package search";

        let query = self.query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        ctx.progress(0, format!("Looking up {query}"));
        let exact = ctx
            .until_cancelled(OPERATION, self.sources.registry.fetch_package(query))
            .await?;

        match exact {
            Ok(raw) => {
                ctx.progress(100, format!("Found {query}"));
                Ok(vec![normalize(query, &raw)])
            }
            Err(error) if error.is_not_found() => {
                debug!("No exact match for {query}, trying known packages");
                let needle = query.to_lowercase();
                let matches: Vec<String> = self
                    .sources
                    .candidates
                    .search_candidates()
                    .into_iter()
                    .filter(|candidate| candidate.to_lowercase().contains(&needle))
                    .take(self.sources.lookup_limit())
                    .collect();

                let records = self.sources.fetch_batch(ctx, OPERATION, &matches).await?;
                ctx.progress(100, format!("{} matches for {query}", records.len()));
                Ok(records)
            }
            Err(error) => Err(AppError::operation_failed("Package lookup", error)),
        }
    }
}

pub struct RecentTask {
    sources: CatalogSources,
}

impl RecentTask {
    pub fn new(sources: CatalogSources) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl BackgroundTask for RecentTask {
    type Output = Vec<PackageRecord>;

    fn kind(&self) -> TaskKind {
        TaskKind::Recent
    }

    async fn run(
        self,
        ctx: &TaskContext<Vec<PackageRecord>>,
    ) -> Result<Vec<PackageRecord>, AppError> {
        let names: Vec<String> = self
            .sources
            .candidates
            .recent_candidates()
            .into_iter()
            .take(self.sources.lookup_limit())
            .collect();

        let mut records = self
            .sources
            .fetch_batch(ctx, TaskKind::Recent.label(), &names)
            .await?;
        sort_by_upload_date(&mut records);
        ctx.progress(100, format!("Loaded {} recent packages", records.len()));
        Ok(records)
    }
}

pub struct TrendingTask {
    sources: CatalogSources,
}

impl TrendingTask {
    pub fn new(sources: CatalogSources) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl BackgroundTask for TrendingTask {
    type Output = Vec<PackageRecord>;

    fn kind(&self) -> TaskKind {
        TaskKind::Trending
    }

    async fn run(
        self,
        ctx: &TaskContext<Vec<PackageRecord>>,
    ) -> Result<Vec<PackageRecord>, AppError> {
        let names: Vec<String> = self
            .sources
            .candidates
            .trending_candidates()
            .into_iter()
            .take(self.sources.lookup_limit())
            .collect();

        let records = self
            .sources
            .fetch_batch(ctx, TaskKind::Trending.label(), &names)
            .await?;
        ctx.progress(100, format!("Loaded {} trending packages", records.len()));
        Ok(records)
    }
}
