//! Notebook data model.
//!
//! Cells arrive from several places (`.ipynb` JSON, a live runtime dump, DOM scraping), so the
//! model is lenient: unknown fields are ignored, fields with an unexpected JSON type fall back
//! to "absent", a cell that is not an object reads as an empty untyped cell, and an output that
//! is not an object is dropped. None of these fail the whole notebook.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    #[serde(default, deserialize_with = "lenient_metadata")]
    pub metadata: NotebookMetadata,
    #[serde(default, deserialize_with = "lenient_cells")]
    pub cells: Vec<Cell>,
}

impl Notebook {
    pub fn from_cells(cells: Vec<Cell>) -> Self {
        Self {
            metadata: NotebookMetadata::default(),
            cells,
        }
    }

    /// Parse a notebook-shaped JSON value. `None` unless `cells` is an array and the value
    /// deserializes.
    pub fn from_value(v: serde_json::Value) -> Option<Self> {
        if !v.get("cells").is_some_and(|c| c.is_array()) {
            return None;
        }
        serde_json::from_value(v).ok()
    }

    pub fn from_json_str(s: &str) -> Option<Self> {
        let v: serde_json::Value = serde_json::from_str(s).ok()?;
        Self::from_value(v)
    }

    pub fn has_cells(&self) -> bool {
        !self.cells.is_empty()
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
    #[serde(other)]
    Unknown,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Code => "code",
            CellType::Markdown => "markdown",
            CellType::Raw => "raw",
            CellType::Unknown => "unknown",
        }
    }

    fn parse(s: &str) -> Self {
        match s.trim() {
            "code" => CellType::Code,
            "markdown" => CellType::Markdown,
            "raw" => CellType::Raw,
            _ => CellType::Unknown,
        }
    }
}

/// A cell's content in any of the shapes notebooks use in the wild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellSource {
    Text(String),
    /// Line strings that already carry their own terminators.
    Lines(Vec<String>),
    Object {
        text: String,
    },
    Other(serde_json::Value),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl From<&str> for CellSource {
    fn from(s: &str) -> Self {
        CellSource::Text(s.to_string())
    }
}

impl From<String> for CellSource {
    fn from(s: String) -> Self {
        CellSource::Text(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// `None` when the cell carries no type at all (or a non-string one).
    #[serde(default, deserialize_with = "lenient_cell_type")]
    pub cell_type: Option<CellType>,
    #[serde(default)]
    pub source: CellSource,
    #[serde(
        default,
        deserialize_with = "lenient_outputs",
        skip_serializing_if = "Option::is_none"
    )]
    pub outputs: Option<Vec<Output>>,
}

impl Cell {
    pub fn new(cell_type: CellType, source: impl Into<CellSource>) -> Self {
        Self {
            cell_type: Some(cell_type),
            source: source.into(),
            outputs: None,
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<Output>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn text(&self) -> String {
        normalize(&self.source)
    }

    pub fn is_empty(&self) -> bool {
        is_empty_source(&self.text())
    }

    /// Label used when listing cells; absent types are reported as `unknown`.
    pub fn type_label(&self) -> &'static str {
        self.cell_type.unwrap_or(CellType::Unknown).as_str()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    ExecuteResult,
    DisplayData,
    Stream,
    Error,
    #[default]
    #[serde(other)]
    Other,
}

impl OutputType {
    fn parse(s: &str) -> Self {
        match s.trim() {
            "execute_result" => OutputType::ExecuteResult,
            "display_data" => OutputType::DisplayData,
            "stream" => OutputType::Stream,
            "error" => OutputType::Error,
            _ => OutputType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(default, deserialize_with = "lenient_output_type")]
    pub output_type: OutputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<CellSource>,
    #[serde(
        default,
        deserialize_with = "lenient_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<BTreeMap<String, serde_json::Value>>,
    /// Non-string frames are skipped.
    #[serde(
        default,
        deserialize_with = "lenient_traceback",
        skip_serializing_if = "Option::is_none"
    )]
    pub traceback: Option<Vec<String>>,
}

impl Output {
    pub fn stream(text: impl Into<CellSource>) -> Self {
        Self {
            output_type: OutputType::Stream,
            text: Some(text.into()),
            data: None,
            traceback: None,
        }
    }

    /// `execute_result` / `display_data` / `stream` / `error`; everything else is dropped when
    /// rendering.
    pub fn is_meaningful(&self) -> bool {
        !matches!(self.output_type, OutputType::Other)
    }
}

/// Canonicalize a cell source into a single string.
pub fn normalize(source: &CellSource) -> String {
    match source {
        CellSource::Text(s) => s.clone(),
        CellSource::Lines(lines) => lines.concat(),
        CellSource::Object { text } => text.clone(),
        CellSource::Other(v) => value_to_text(v),
    }
}

fn value_to_text(v: &serde_json::Value) -> String {
    use serde_json::Value;
    match v {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Number(n) if n.as_f64() == Some(0.0) => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|x| match x {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::Object(obj) => match obj.get("text") {
            Some(Value::String(s)) => s.clone(),
            _ => v.to_string(),
        },
        other => other.to_string(),
    }
}

/// True for blank text and for the `[]` placeholder some exporters leave in blank cells.
pub fn is_empty_source(text: &str) -> bool {
    let t = text.trim();
    t.is_empty() || t == "[]"
}

fn lenient_string<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_cell_type<'de, D>(de: D) -> Result<Option<CellType>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(de)?.map(|s| CellType::parse(&s)))
}

fn lenient_output_type<'de, D>(de: D) -> Result<OutputType, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(de)?
        .map(|s| OutputType::parse(&s))
        .unwrap_or_default())
}

fn lenient_cells<'de, D>(de: D) -> Result<Vec<Cell>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    let Some(serde_json::Value::Array(items)) = v else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .map(|item| {
            if item.is_object() {
                serde_json::from_value(item).unwrap_or_default()
            } else {
                Cell::default()
            }
        })
        .collect())
}

fn lenient_outputs<'de, D>(de: D) -> Result<Option<Vec<Output>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    let Some(serde_json::Value::Array(items)) = v else {
        return Ok(None);
    };
    Ok(Some(
        items
            .into_iter()
            .filter(|o| o.is_object())
            .filter_map(|o| serde_json::from_value(o).ok())
            .collect(),
    ))
}

fn lenient_data<'de, D>(de: D) -> Result<Option<BTreeMap<String, serde_json::Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match v {
        Some(serde_json::Value::Object(map)) => Some(map.into_iter().collect()),
        _ => None,
    })
}

fn lenient_traceback<'de, D>(de: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match v {
        Some(serde_json::Value::Array(frames)) => Some(
            frames
                .into_iter()
                .filter_map(|f| match f {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        Some(serde_json::Value::String(s)) => Some(vec![s]),
        _ => None,
    })
}

fn lenient_metadata<'de, D>(de: D) -> Result<NotebookMetadata, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    Ok(v.and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}
