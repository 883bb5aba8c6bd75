//! DOM scraping for rendered notebook pages.
//!
//! Known notebook UIs are described as data: a table mapping each UI variant and cell type to
//! the selectors for the cell container and for the element holding its text. One generic walker
//! interprets the table, so supporting a new class-name variant means adding a string, not a
//! code path. Two heuristics back the table up for unknown UIs.

use html_scraper::{ElementRef, Html, Node, Selector};
use nbpipe_core::{Cell, CellType};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiVariant {
    JupyterLab,
    Classic,
    Colab,
}

impl UiVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiVariant::JupyterLab => "jupyterlab",
            UiVariant::Classic => "classic",
            UiVariant::Colab => "colab",
        }
    }
}

#[derive(Debug)]
pub struct CellRule {
    pub cell_type: CellType,
    /// An element matching any of these is a candidate cell of `cell_type`.
    pub containers: &'static [&'static str],
    /// Tried in order inside the container; the first hit supplies the cell text. A container
    /// with no hit falls through to the next rule.
    pub content: &'static [&'static str],
}

#[derive(Debug)]
pub struct VariantRules {
    pub variant: UiVariant,
    /// Rules are tried in order for each container; put the more specific types first.
    pub rules: &'static [CellRule],
}

const JUPYTERLAB_RULES: &[CellRule] = &[
    CellRule {
        cell_type: CellType::Raw,
        containers: &[".jp-RawCell", ".jp-Notebook-rawCell"],
        content: &[".jp-InputArea-editor", ".cm-content", ".CodeMirror-code"],
    },
    CellRule {
        cell_type: CellType::Markdown,
        containers: &[".jp-MarkdownCell", ".jp-Notebook-markdownCell"],
        content: &[
            ".jp-RenderedMarkdown",
            ".jp-MarkdownOutput",
            ".jp-InputArea-editor",
        ],
    },
    CellRule {
        cell_type: CellType::Code,
        containers: &[".jp-CodeCell", ".jp-Notebook-codeCell"],
        content: &[
            ".jp-InputArea-editor",
            ".jp-Editor",
            ".cm-content",
            ".CodeMirror-code",
        ],
    },
];

const CLASSIC_RULES: &[CellRule] = &[
    CellRule {
        cell_type: CellType::Raw,
        containers: &[".raw_cell"],
        content: &[".input_area", ".CodeMirror-code"],
    },
    CellRule {
        cell_type: CellType::Markdown,
        containers: &[".text_cell"],
        content: &[".text_cell_render", ".rendered_html"],
    },
    CellRule {
        cell_type: CellType::Code,
        containers: &[".code_cell"],
        content: &[".input_area", ".input .CodeMirror-code"],
    },
];

const COLAB_RULES: &[CellRule] = &[
    CellRule {
        cell_type: CellType::Markdown,
        containers: &[".cell", ".notebook-cell"],
        content: &[".text_cell_render", ".markdown"],
    },
    CellRule {
        cell_type: CellType::Code,
        containers: &[".cell", ".notebook-cell"],
        content: &[
            ".input pre",
            ".input .CodeMirror-code",
            ".inputarea .view-lines",
            ".monaco-editor .view-lines",
        ],
    },
];

/// Known UIs, in the order they are tried.
pub const SELECTOR_TABLE: &[VariantRules] = &[
    VariantRules {
        variant: UiVariant::JupyterLab,
        rules: JUPYTERLAB_RULES,
    },
    VariantRules {
        variant: UiVariant::Classic,
        rules: CLASSIC_RULES,
    },
    VariantRules {
        variant: UiVariant::Colab,
        rules: COLAB_RULES,
    },
];

pub fn rules_for(variant: UiVariant) -> &'static VariantRules {
    SELECTOR_TABLE
        .iter()
        .find(|v| v.variant == variant)
        .unwrap_or(&SELECTOR_TABLE[0])
}

/// Subtrees that never contribute to cell text (gutters, measurement nodes, prompts).
const SKIP_CLASS_MARKERS: &[&str] = &[
    "CodeMirror-gutter",
    "CodeMirror-linenumber",
    "CodeMirror-measure",
    "CodeMirror-cursors",
    "cm-gutters",
    "jp-InputPrompt",
];

const OUTPUT_AREA_SELECTOR: &str =
    ".output_area, .output_wrapper, .jp-OutputArea, .jp-Cell-outputWrapper, .outputview";

fn sel(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "blockquote"
            | "dd"
            | "div"
            | "dl"
            | "dt"
            | "figure"
            | "footer"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "li"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "tr"
            | "ul"
    )
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn push_text(el: ElementRef<'_>, in_pre: bool, out: &mut String) {
    let v = el.value();
    let tag = v.name();
    if matches!(tag, "script" | "style" | "template" | "textarea") {
        return;
    }
    if let Some(class) = v.attr("class") {
        if SKIP_CLASS_MARKERS.iter().any(|m| class.contains(m)) {
            return;
        }
    }
    if tag == "br" {
        out.push('\n');
        return;
    }
    let in_pre = in_pre || tag == "pre";
    let block = is_block(tag);
    if block {
        ensure_newline(out);
    }
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                // Whitespace-only runs spanning lines are markup indentation, not content.
                if !in_pre && t.contains('\n') && t.trim().is_empty() {
                    continue;
                }
                out.push_str(t);
            }
            Node::Element(_) => {
                if let Some(c) = ElementRef::wrap(child) {
                    push_text(c, in_pre, out);
                }
            }
            _ => {}
        }
    }
    if block {
        ensure_newline(out);
    }
}

/// Approximation of the browser's `innerText`: block elements and `<br>` break lines, hidden
/// editor chrome is skipped, leading/trailing blank lines are trimmed.
pub fn inner_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_text(el, false, &mut out);
    out.trim_matches('\n').to_string()
}

/// True for a `<pre>` body that is a serialized notebook rather than code.
pub fn looks_like_notebook_json(text: &str) -> bool {
    let t = text.trim();
    t.starts_with('{') && t.contains("\"cells\"")
}

/// Text of every `<pre>` that looks like a serialized notebook, in document order.
pub fn notebook_json_blocks(doc: &Html) -> Vec<String> {
    let Some(pre) = sel("pre") else {
        return Vec::new();
    };
    doc.select(&pre)
        .map(|el| el.text().collect::<String>())
        .filter(|t| looks_like_notebook_json(t))
        .collect()
}

pub fn page_title(doc: &Html) -> Option<String> {
    let title = sel("title")?;
    let el = doc.select(&title).next()?;
    let t = el.text().collect::<Vec<_>>().join(" ");
    let t = t.split_whitespace().collect::<Vec<_>>().join(" ");
    (!t.is_empty()).then_some(t)
}

struct CompiledRule {
    cell_type: CellType,
    container: Selector,
    content: Vec<Selector>,
}

fn compile(rules: &VariantRules) -> (Option<Selector>, Vec<CompiledRule>) {
    let mut all_containers: Vec<&str> = Vec::new();
    let mut compiled = Vec::new();
    for rule in rules.rules {
        let Some(container) = sel(&rule.containers.join(", ")) else {
            continue;
        };
        for c in rule.containers {
            if !all_containers.contains(c) {
                all_containers.push(c);
            }
        }
        compiled.push(CompiledRule {
            cell_type: rule.cell_type,
            container,
            content: rule.content.iter().filter_map(|s| sel(s)).collect(),
        });
    }
    (sel(&all_containers.join(", ")), compiled)
}

/// Cells of one known UI, in document order. Containers nested inside an already accepted
/// container are skipped so a cell is never counted twice.
pub fn scrape_variant(doc: &Html, variant: UiVariant) -> Vec<Cell> {
    let (union, rules) = compile(rules_for(variant));
    let Some(union) = union else {
        return Vec::new();
    };

    let mut accepted = HashSet::new();
    let mut cells = Vec::new();
    for el in doc.select(&union) {
        if el.ancestors().any(|a| accepted.contains(&a.id())) {
            continue;
        }
        let hit = rules
            .iter()
            .filter(|r| r.container.matches(&el))
            .find_map(|r| {
                r.content
                    .iter()
                    .find_map(|c| el.select(c).next())
                    .map(|content| (r.cell_type, content))
            });
        if let Some((cell_type, content)) = hit {
            accepted.insert(el.id());
            cells.push(Cell::new(cell_type, inner_text(content)));
        }
    }
    cells
}

/// Unknown UI: every `<pre>` (except a serialized-notebook blob) is code, and every div whose
/// class mentions markdown / text_cell / rendered_html is markdown.
pub fn scrape_generic(doc: &Html) -> Vec<Cell> {
    let Some(union) = sel(
        r#"pre, div[class*="markdown"], div[class*="text_cell"], div[class*="rendered_html"]"#,
    ) else {
        return Vec::new();
    };

    let mut accepted = HashSet::new();
    let mut cells = Vec::new();
    for el in doc.select(&union) {
        if el.ancestors().any(|a| accepted.contains(&a.id())) {
            continue;
        }
        let text = inner_text(el);
        let cell_type = if el.value().name() == "pre" {
            if looks_like_notebook_json(&text) {
                continue;
            }
            CellType::Code
        } else {
            CellType::Markdown
        };
        accepted.insert(el.id());
        cells.push(Cell::new(cell_type, text));
    }
    cells
}

/// Last resort: code-like elements become code cells and headings/paragraphs become markdown,
/// skipping anything inside an output area or inside an element already taken. Yields nothing
/// unless at least one code-like element is present, so plain prose pages are not mistaken for
/// notebooks.
pub fn scrape_last_resort(doc: &Html) -> Vec<Cell> {
    let (Some(union), Some(code_like), Some(outputs)) = (
        sel(r#"pre, code, [class*="code"], h1, h2, h3, h4, h5, h6, p"#),
        sel(r#"pre, code, [class*="code"]"#),
        sel(OUTPUT_AREA_SELECTOR),
    ) else {
        return Vec::new();
    };

    let mut consumed = HashSet::new();
    for out in doc.select(&outputs) {
        consumed.insert(out.id());
    }

    let mut accepted = HashSet::new();
    let mut cells = Vec::new();
    let mut saw_code = false;
    for el in doc.select(&union) {
        if consumed.contains(&el.id())
            || el
                .ancestors()
                .any(|a| consumed.contains(&a.id()) || accepted.contains(&a.id()))
        {
            continue;
        }
        let text = inner_text(el);
        if text.trim().is_empty() {
            continue;
        }
        let cell_type = if code_like.matches(&el) {
            if looks_like_notebook_json(&text) {
                continue;
            }
            saw_code = true;
            CellType::Code
        } else {
            CellType::Markdown
        };
        accepted.insert(el.id());
        cells.push(Cell::new(cell_type, text));
    }
    if saw_code {
        cells
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(cells: &[Cell]) -> Vec<CellType> {
        cells.iter().filter_map(|c| c.cell_type).collect()
    }

    #[test]
    fn jupyterlab_cells_keep_document_order_and_line_breaks() {
        let html = r#"
        <html><body><div class="jp-Notebook">
          <div class="jp-Cell jp-MarkdownCell">
            <div class="jp-RenderedMarkdown"><h1>Intro</h1><p>Some text</p></div>
          </div>
          <div class="jp-Cell jp-CodeCell">
            <div class="jp-InputArea-editor"><div class="cm-content">
              <div class="cm-line">x = 1</div><div class="cm-line">print(x)</div>
            </div></div>
            <div class="jp-OutputArea"><pre>1</pre></div>
          </div>
          <div class="jp-Cell jp-RawCell">
            <div class="jp-InputArea-editor"><div class="cm-content">raw text</div></div>
          </div>
        </div></body></html>"#;
        let doc = Html::parse_document(html);
        let cells = scrape_variant(&doc, UiVariant::JupyterLab);
        assert_eq!(
            types(&cells),
            vec![CellType::Markdown, CellType::Code, CellType::Raw]
        );
        assert_eq!(cells[0].text(), "Intro\nSome text");
        assert_eq!(cells[1].text(), "x = 1\nprint(x)");
        assert_eq!(cells[2].text(), "raw text");
    }

    #[test]
    fn classic_cells_skip_gutters_and_outputs() {
        let html = r#"
        <div id="notebook-container">
          <div class="cell text_cell rendered">
            <div class="text_cell_render rendered_html"><p>Notes</p></div>
          </div>
          <div class="cell code_cell">
            <div class="input"><div class="input_area"><div class="CodeMirror">
              <div class="CodeMirror-code">
                <pre class="CodeMirror-line"><div class="CodeMirror-gutter-wrapper">1</div>a = 2</pre>
              </div>
            </div></div></div>
            <div class="output_wrapper"><div class="output_area"><pre>2</pre></div></div>
          </div>
        </div>"#;
        let doc = Html::parse_document(html);
        assert!(scrape_variant(&doc, UiVariant::JupyterLab).is_empty());
        let cells = scrape_variant(&doc, UiVariant::Classic);
        assert_eq!(types(&cells), vec![CellType::Markdown, CellType::Code]);
        assert_eq!(cells[0].text(), "Notes");
        assert_eq!(cells[1].text(), "a = 2");
    }

    #[test]
    fn colab_type_comes_from_nested_marker() {
        let html = r#"
        <div class="notebook-cell"><div class="markdown"><p>Colab text</p></div></div>
        <div class="notebook-cell"><div class="inputarea"><div class="monaco-editor">
          <div class="view-lines"><div class="view-line">import os</div></div>
        </div></div></div>
        <div class="notebook-cell"><div class="toolbar">no content</div></div>"#;
        let doc = Html::parse_document(html);
        let cells = scrape_variant(&doc, UiVariant::Colab);
        assert_eq!(types(&cells), vec![CellType::Markdown, CellType::Code]);
        assert_eq!(cells[1].text(), "import os");
    }

    #[test]
    fn generic_skips_notebook_json_and_nested_blocks() {
        let html = r#"
        <pre>{"cells": not json}</pre>
        <div class="my-markdown-body"><p>Prose</p><pre>inside markdown</pre></div>
        <pre>def f(): pass</pre>"#;
        let doc = Html::parse_document(html);
        let cells = scrape_generic(&doc);
        assert_eq!(types(&cells), vec![CellType::Markdown, CellType::Code]);
        assert_eq!(cells[0].text(), "Prose\ninside markdown");
        assert_eq!(cells[1].text(), "def f(): pass");
    }

    #[test]
    fn last_resort_pairs_code_with_prose_and_skips_outputs() {
        let html = r#"
        <h2>Load data</h2>
        <p>We read the csv.</p>
        <code>df = read_csv("x")</code>
        <div class="output_area"><p>ignored output</p><code>ignored</code></div>"#;
        let doc = Html::parse_document(html);
        let cells = scrape_last_resort(&doc);
        assert_eq!(
            types(&cells),
            vec![CellType::Markdown, CellType::Markdown, CellType::Code]
        );
        assert!(cells.iter().all(|c| !c.text().contains("ignored")));
    }

    #[test]
    fn last_resort_ignores_prose_only_pages() {
        let doc = Html::parse_document("<h1>Blog</h1><p>Just words.</p>");
        assert!(scrape_last_resort(&doc).is_empty());
    }

    #[test]
    fn notebook_json_blocks_and_title() {
        let doc = Html::parse_document(
            r#"<html><head><title>  My
            Notebook </title></head><body><pre>x</pre><pre> {"cells": []}</pre></body></html>"#,
        );
        assert_eq!(notebook_json_blocks(&doc), vec![r#" {"cells": []}"#.to_string()]);
        assert_eq!(page_title(&doc).as_deref(), Some("My Notebook"));
    }

    #[test]
    fn selector_table_is_valid_css() {
        for v in SELECTOR_TABLE {
            for r in v.rules {
                for s in r.containers.iter().chain(r.content.iter()) {
                    assert!(Selector::parse(s).is_ok(), "bad selector {s}");
                }
            }
        }
        assert!(Selector::parse(OUTPUT_AREA_SELECTOR).is_ok());
    }
}
