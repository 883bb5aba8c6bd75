//! The operations a UI calls: `extract`, `list_cells` and `chunk_and_deliver`.
//!
//! Every call resolves the page afresh; nothing is cached between calls. Failures come back as
//! response values, never as panics or `Err`.

use crate::chunk;
use crate::filename;
use crate::render::{self, Rendered};
use crate::resolve::{PageContext, Resolver};
use chrono::Utc;
use nbpipe_core::{
    CellListResponse, CellSummary, ChunkResponse, Error, ExtractResponse, ExtractionOptions,
    FileSink, OutputAction, NO_CONTENT_FOUND,
};
use std::sync::Arc;

pub struct Extractor {
    resolver: Resolver,
    page: PageContext,
    sink: Option<Arc<dyn FileSink>>,
}

impl Extractor {
    pub fn new(resolver: Resolver, page: PageContext) -> Self {
        Self {
            resolver,
            page,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn FileSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// Resolve, filter and render. `Copy` returns the text; `Download` hands it to the sink and
    /// returns the filename used.
    pub async fn extract(
        &self,
        action: OutputAction,
        opts: &ExtractionOptions,
    ) -> ExtractResponse {
        match self.render(opts).await {
            Ok(rendered) => self.complete(action, &rendered),
            Err(e) => ExtractResponse::failure(user_message(&e)),
        }
    }

    /// Resolve the page once and render it, without acting on the text.
    pub async fn render(&self, opts: &ExtractionOptions) -> nbpipe_core::Result<Rendered> {
        let resolved = self.resolver.resolve(&self.page).await?;
        let rendered = render::render(&resolved.notebook, opts);
        tracing::info!(
            strategy = resolved.strategy,
            cells = rendered.cell_count,
            tokens = rendered.token_count,
            "extracted"
        );
        Ok(rendered)
    }

    /// Act on already-rendered text. The download name comes from the page URL and page
    /// title only.
    pub fn complete(&self, action: OutputAction, rendered: &Rendered) -> ExtractResponse {
        match action {
            OutputAction::Copy => ExtractResponse {
                success: true,
                text: Some(rendered.text.clone()),
                token_count: Some(rendered.token_count),
                ..Default::default()
            },
            OutputAction::Download => {
                let title = self.page.effective_title();
                let name = filename::derive_filename(&self.page.url, title.as_deref());
                let delivery_error = self
                    .deliver(&rendered.text, &name, "extract")
                    .err()
                    .map(|e| e.to_string());
                ExtractResponse {
                    success: true,
                    token_count: Some(rendered.token_count),
                    filename: Some(name),
                    delivery_error,
                    ..Default::default()
                }
            }
        }
    }

    /// Type, raw source and emptiness of every resolved cell, unfiltered.
    pub async fn list_cells(&self) -> CellListResponse {
        match self.resolver.resolve(&self.page).await {
            Ok(r) => CellListResponse {
                success: true,
                cells: Some(
                    r.notebook
                        .cells
                        .iter()
                        .map(|c| {
                            let source = c.text();
                            CellSummary {
                                cell_type: c.type_label().to_string(),
                                is_empty: nbpipe_core::is_empty_source(&source),
                                source,
                            }
                        })
                        .collect(),
                ),
                error: None,
            },
            Err(e) => CellListResponse {
                success: false,
                cells: None,
                error: Some(user_message(&e)),
            },
        }
    }

    /// Split `content` and deliver each part with a `PART i OF n` header. Delivery failures are
    /// counted, not fatal.
    pub fn chunk_and_deliver(
        &self,
        content: &str,
        tokens_per_chunk: usize,
        model_name: &str,
    ) -> ChunkResponse {
        let chunks = match chunk::chunk(content, tokens_per_chunk) {
            Ok(c) => c,
            Err(e) => {
                return ChunkResponse {
                    success: false,
                    chunk_count: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        let total = chunks.len();
        let now = Utc::now();
        let failed = chunk::with_part_headers(&chunks)
            .iter()
            .enumerate()
            .filter(|(i, part)| {
                let name = filename::chunk_filename(model_name, i + 1, total, now);
                match self.deliver(part, &name, "chunk") {
                    Ok(()) => false,
                    Err(e) => {
                        tracing::warn!(filename = %name, error = %e, "chunk delivery failed");
                        true
                    }
                }
            })
            .count();
        tracing::info!(chunks = total, failed, model = model_name, "chunked");
        ChunkResponse {
            success: true,
            chunk_count: total,
            error: (failed > 0).then(|| format!("{failed} of {total} chunk files were not delivered")),
        }
    }

    fn deliver(&self, text: &str, name: &str, source_tag: &str) -> nbpipe_core::Result<()> {
        match &self.sink {
            Some(sink) => sink.deliver_file(text, name, source_tag),
            None => Err(Error::Delivery("no file sink configured".to_string())),
        }
    }
}

/// Message shown to the user for a failed operation.
pub fn user_message(e: &Error) -> String {
    match e {
        Error::NoContentFound => NO_CONTENT_FOUND.to_string(),
        other => other.to_string(),
    }
}
