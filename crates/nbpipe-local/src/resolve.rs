//! Notebook resolution: an ordered list of independent strategies, first structural success wins.
//!
//! Order matters and is fixed by [`Resolver::standard`]:
//! 1. raw `.ipynb` fetched from the server behind the page
//! 2. live runtime model handed in by the host
//! 3. serialized notebook embedded in a `<pre>`
//! 4. DOM scraping (known UIs from the selector table, then two heuristics)
//!
//! A strategy that cannot produce cells returns `None`; only exhausting all of them is an error.

use crate::dom::{self, SELECTOR_TABLE};
use crate::rewrite;
use html_scraper::Html;
use nbpipe_core::{Error, FetchBackend, FetchRequest, Notebook, NotebookRuntime, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything the resolver may look at for one page.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub url: String,
    /// Explicit page title; falls back to the document `<title>`.
    pub title: Option<String>,
    pub html: String,
}

impl PageContext {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            html: html.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn effective_title(&self) -> Option<String> {
        if let Some(t) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return Some(t.to_string());
        }
        if self.html.trim().is_empty() {
            return None;
        }
        dom::page_title(&Html::parse_document(&self.html))
    }
}

#[async_trait::async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn resolve(&self, page: &PageContext) -> Option<Notebook>;
}

#[derive(Debug, Clone)]
pub struct FileFetchConfig {
    pub timeout_ms: Option<u64>,
    pub max_bytes: Option<u64>,
    pub headers: BTreeMap<String, String>,
}

impl Default for FileFetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Some(10_000),
            max_bytes: Some(50 * 1024 * 1024),
            headers: BTreeMap::new(),
        }
    }
}

/// Strategy 1: rewrite the page URL to the server's raw-file URL and parse the `.ipynb`.
pub struct FileFetchStrategy {
    fetcher: Arc<dyn FetchBackend>,
    cfg: FileFetchConfig,
}

impl FileFetchStrategy {
    pub fn new(fetcher: Arc<dyn FetchBackend>, cfg: FileFetchConfig) -> Self {
        Self { fetcher, cfg }
    }
}

#[async_trait::async_trait]
impl ResolveStrategy for FileFetchStrategy {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn resolve(&self, page: &PageContext) -> Option<Notebook> {
        let url = rewrite::raw_notebook_url(&page.url)?;
        let req = FetchRequest {
            url: url.clone(),
            timeout_ms: self.cfg.timeout_ms,
            max_bytes: self.cfg.max_bytes,
            headers: self.cfg.headers.clone(),
        };
        let resp = match self.fetcher.fetch(&req).await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(%url, error = %e, "raw notebook fetch failed");
                return None;
            }
        };
        if !resp.is_success() || resp.truncated {
            tracing::debug!(%url, status = resp.status, truncated = resp.truncated, "raw notebook unusable");
            return None;
        }
        let v: serde_json::Value = match serde_json::from_slice(&resp.bytes) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(%url, error = %e, "raw notebook is not json");
                return None;
            }
        };
        Notebook::from_value(v)
    }
}

/// Strategy 2: ask the injected runtime handle for its serialized model.
pub struct RuntimeStrategy {
    runtime: Option<Arc<dyn NotebookRuntime>>,
}

impl RuntimeStrategy {
    pub fn new(runtime: Option<Arc<dyn NotebookRuntime>>) -> Self {
        Self { runtime }
    }
}

#[async_trait::async_trait]
impl ResolveStrategy for RuntimeStrategy {
    fn name(&self) -> &'static str {
        "runtime"
    }

    async fn resolve(&self, _page: &PageContext) -> Option<Notebook> {
        let v = self.runtime.as_ref()?.to_json()?;
        Notebook::from_value(v)
    }
}

/// Strategy 3: a `<pre>` whose text is a serialized notebook.
pub struct EmbeddedJsonStrategy;

impl EmbeddedJsonStrategy {
    fn scan(html: &str) -> Option<Notebook> {
        let doc = Html::parse_document(html);
        dom::notebook_json_blocks(&doc)
            .iter()
            .filter_map(|t| Notebook::from_json_str(t.trim()))
            .find(|nb| nb.has_cells())
    }
}

#[async_trait::async_trait]
impl ResolveStrategy for EmbeddedJsonStrategy {
    fn name(&self) -> &'static str {
        "embedded_json"
    }

    async fn resolve(&self, page: &PageContext) -> Option<Notebook> {
        Self::scan(&page.html)
    }
}

/// Strategy 4: scrape rendered cells. Known UIs first, in table order, then the generic and
/// last-resort heuristics; the first step that yields any cell wins.
pub struct DomStrategy;

impl DomStrategy {
    fn scrape(html: &str) -> Option<Notebook> {
        let doc = Html::parse_document(html);
        for v in SELECTOR_TABLE {
            let cells = dom::scrape_variant(&doc, v.variant);
            if !cells.is_empty() {
                tracing::debug!(variant = v.variant.as_str(), cells = cells.len(), "dom cells");
                return Some(Notebook::from_cells(cells));
            }
        }
        let generic = dom::scrape_generic(&doc);
        if !generic.is_empty() {
            tracing::debug!(cells = generic.len(), "dom cells via generic heuristic");
            return Some(Notebook::from_cells(generic));
        }
        let last = dom::scrape_last_resort(&doc);
        if !last.is_empty() {
            tracing::debug!(cells = last.len(), "dom cells via last-resort heuristic");
            return Some(Notebook::from_cells(last));
        }
        None
    }
}

#[async_trait::async_trait]
impl ResolveStrategy for DomStrategy {
    fn name(&self) -> &'static str {
        "dom"
    }

    async fn resolve(&self, page: &PageContext) -> Option<Notebook> {
        Self::scrape(&page.html)
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub notebook: Notebook,
    pub strategy: &'static str,
}

pub struct Resolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl Resolver {
    pub fn new(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self { strategies }
    }

    /// The standard cascade. Without a fetcher the raw-file strategy is skipped.
    pub fn standard(
        fetcher: Option<Arc<dyn FetchBackend>>,
        runtime: Option<Arc<dyn NotebookRuntime>>,
        fetch_cfg: FileFetchConfig,
    ) -> Self {
        let mut strategies: Vec<Box<dyn ResolveStrategy>> = Vec::new();
        if let Some(f) = fetcher {
            strategies.push(Box::new(FileFetchStrategy::new(f, fetch_cfg)));
        }
        strategies.push(Box::new(RuntimeStrategy::new(runtime)));
        strategies.push(Box::new(EmbeddedJsonStrategy));
        strategies.push(Box::new(DomStrategy));
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies strictly in order; `Error::NoContentFound` when none yields cells.
    pub async fn resolve(&self, page: &PageContext) -> Result<Resolved> {
        for s in &self.strategies {
            match s.resolve(page).await {
                Some(notebook) if notebook.has_cells() => {
                    tracing::info!(
                        strategy = s.name(),
                        cells = notebook.cells.len(),
                        "notebook resolved"
                    );
                    return Ok(Resolved {
                        notebook,
                        strategy: s.name(),
                    });
                }
                Some(_) => tracing::debug!(strategy = s.name(), "strategy yielded no cells"),
                None => tracing::debug!(strategy = s.name(), "strategy found nothing"),
            }
        }
        Err(Error::NoContentFound)
    }
}
