//! Notebook -> LLM-ready plain text.
//!
//! Layout: optional `# title` heading, then each kept cell rendered on its own, cells joined by
//! a blank-line-padded rule of 40 dashes. Code cells are fenced; their outputs (when enabled)
//! follow the closing fence after a blank line.

use crate::tokens;
use nbpipe_core::{
    normalize, Cell, CellSource, CellType, ExtractionOptions, Notebook, Output, OutputType,
};
use regex::Regex;
use std::sync::OnceLock;

const SEPARATOR_WIDTH: usize = 40;
pub const RAW_MARKER: &str = "<!-- raw -->";
pub const IMAGE_PLACEHOLDER: &str = "[Image output]";
pub const AUDIO_PLACEHOLDER: &str = "[Audio output]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub token_count: usize,
    pub cell_count: usize,
}

pub fn separator() -> String {
    format!("\n\n{}\n\n", "-".repeat(SEPARATOR_WIDTH))
}

/// Cells that survive selection and filtering.
///
/// An active selection replaces every other filter (including `skip_empty`) and is replayed in
/// the requested order; out-of-range indices are ignored. Otherwise cells keep notebook order,
/// and cells without a type are filtered as code.
pub fn select_cells<'a>(nb: &'a Notebook, opts: &ExtractionOptions) -> Vec<&'a Cell> {
    if let Some(indices) = opts.selection() {
        return indices
            .iter()
            .filter_map(|&i| usize::try_from(i).ok())
            .filter_map(|i| nb.cells.get(i))
            .collect();
    }
    nb.cells
        .iter()
        .filter(|c| match c.cell_type.unwrap_or(CellType::Code) {
            CellType::Code => opts.include_code,
            CellType::Markdown => opts.include_markdown,
            CellType::Raw => opts.include_raw,
            CellType::Unknown => true,
        })
        .filter(|c| !(opts.skip_empty && c.is_empty()))
        .collect()
}

pub fn render(nb: &Notebook, opts: &ExtractionOptions) -> Rendered {
    let cells = select_cells(nb, opts);
    let body = cells
        .iter()
        .map(|c| render_cell(c, opts))
        .collect::<Vec<_>>()
        .join(&separator());

    let text = match nb.title() {
        Some(title) => format!("# {title}\n\n{body}"),
        None => body,
    };
    Rendered {
        token_count: tokens::estimate(&text),
        cell_count: cells.len(),
        text,
    }
}

fn render_cell(cell: &Cell, opts: &ExtractionOptions) -> String {
    let text = cell.text();
    match cell.cell_type {
        Some(CellType::Code) | None => {
            let mut out = format!("```\n{text}\n```");
            if opts.include_outputs {
                if let Some(rendered) = cell.outputs.as_deref().and_then(render_outputs) {
                    out.push_str("\n\n");
                    out.push_str(&rendered);
                }
            }
            out
        }
        Some(CellType::Raw) if opts.mark_raw_cells => format!("{RAW_MARKER}\n{text}"),
        Some(CellType::Markdown) | Some(CellType::Raw) | Some(CellType::Unknown) => text,
    }
}

/// Concatenate the rendered forms of one code cell's meaningful outputs, with no separator
/// added (stream text carries its own newlines). `None` when nothing renders.
pub fn render_outputs(outputs: &[Output]) -> Option<String> {
    let joined: String = outputs
        .iter()
        .filter(|o| o.is_meaningful())
        .filter_map(render_output)
        .collect();
    (!joined.is_empty()).then_some(joined)
}

fn render_output(o: &Output) -> Option<String> {
    match o.output_type {
        OutputType::Stream => o.text.as_ref().map(normalize),
        OutputType::ExecuteResult | OutputType::DisplayData => {
            let data = o.data.as_ref()?;
            if let Some(plain) = data.get("text/plain") {
                return Some(normalize(&CellSource::Other(plain.clone())));
            }
            if data.keys().any(|k| k.starts_with("image/")) {
                Some(IMAGE_PLACEHOLDER.to_string())
            } else if data.keys().any(|k| k.starts_with("audio/")) {
                Some(AUDIO_PLACEHOLDER.to_string())
            } else {
                None
            }
        }
        OutputType::Error => o.traceback.as_ref().map(|tb| strip_ansi(&tb.join("\n"))),
        OutputType::Other => None,
    }
}

fn ansi_escape() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").ok())
        .as_ref()
}

/// Remove terminal color/control sequences (tracebacks are colorized by the kernel).
pub fn strip_ansi(s: &str) -> String {
    match ansi_escape() {
        Some(re) => re.replace_all(s, "").into_owned(),
        None => s.to_string(),
    }
}
