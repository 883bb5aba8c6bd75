use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nbpipe_core::{
    ChunkResponse, ClipboardSink, ExtractResponse, ExtractionOptions, FetchBackend, FetchRequest,
    FileSink, NotebookRuntime, OutputAction,
};
use nbpipe_local::deliver::DirSink;
use nbpipe_local::extractor::user_message;
use nbpipe_local::template::PromptTemplate;
use nbpipe_local::{Extractor, FileFetchConfig, LocalFetcher, PageContext, Resolver};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "nbpipe")]
#[command(about = "Turn Jupyter notebook pages into LLM-ready text", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract a notebook as text (print/copy it, or write it to a file).
    Extract(ExtractCmd),
    /// List the cells of a notebook page (json).
    Cells(CellsCmd),
    /// Split a text file into token-bounded parts and write them as files.
    Chunk(ChunkCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct PageArgs {
    /// Notebook page URL (JupyterLab, classic Notebook, Colab, ...).
    url: String,
    /// Use this saved page HTML instead of fetching the URL ("-" reads stdin).
    #[arg(long)]
    html_file: Option<PathBuf>,
    /// Page title used for the download filename when the URL names no notebook file.
    #[arg(long)]
    title: Option<String>,
    /// JSON dump of the live notebook model (stands in for the page runtime).
    #[arg(long)]
    runtime_json: Option<PathBuf>,
    /// Never touch the network: skip the raw-file strategy and the page fetch.
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Timeout per request (ms).
    #[arg(long, env = "NBPIPE_FETCH_TIMEOUT_MS", default_value_t = 10_000)]
    timeout_ms: u64,
    /// Cap on bytes read per response.
    #[arg(long, env = "NBPIPE_MAX_BYTES", default_value_t = 50 * 1024 * 1024)]
    max_bytes: u64,
    /// Extra request header, `Name: value` (repeatable). Credentials are dropped unless
    /// NBPIPE_ALLOW_UNSAFE_HEADERS is set.
    #[arg(long = "header")]
    headers: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// Full options object in wire form, e.g. '{"includeCode":false}'. Flags below override it.
    #[arg(long)]
    options_json: Option<String>,
    #[arg(long, action = clap::ArgAction::Set)]
    include_code: Option<bool>,
    #[arg(long, action = clap::ArgAction::Set)]
    include_markdown: Option<bool>,
    #[arg(long, action = clap::ArgAction::Set)]
    include_raw: Option<bool>,
    #[arg(long, action = clap::ArgAction::Set)]
    include_outputs: Option<bool>,
    #[arg(long, action = clap::ArgAction::Set)]
    skip_empty: Option<bool>,
    /// Keep exactly these cell indices, in this order (turns selection mode on).
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    select: Vec<i64>,
    /// Prefix raw cells with `<!-- raw -->`.
    #[arg(long, default_value_t = false)]
    mark_raw_cells: bool,
}

impl FilterArgs {
    fn to_options(&self) -> Result<ExtractionOptions> {
        let mut o: ExtractionOptions = match self.options_json.as_deref() {
            Some(s) => serde_json::from_str(s).context("parse --options-json")?,
            None => ExtractionOptions::default(),
        };
        if let Some(v) = self.include_code {
            o.include_code = v;
        }
        if let Some(v) = self.include_markdown {
            o.include_markdown = v;
        }
        if let Some(v) = self.include_raw {
            o.include_raw = v;
        }
        if let Some(v) = self.include_outputs {
            o.include_outputs = v;
        }
        if let Some(v) = self.skip_empty {
            o.skip_empty = v;
        }
        if !self.select.is_empty() {
            o.selection_mode = true;
            o.selected_cells = self.select.clone();
        }
        if self.mark_raw_cells {
            o.mark_raw_cells = true;
        }
        Ok(o)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ActionArg {
    Copy,
    Download,
}

impl From<ActionArg> for OutputAction {
    fn from(a: ActionArg) -> Self {
        match a {
            ActionArg::Copy => OutputAction::Copy,
            ActionArg::Download => OutputAction::Download,
        }
    }
}

#[derive(clap::Args, Debug)]
struct ExtractCmd {
    #[command(flatten)]
    page: PageArgs,
    #[command(flatten)]
    filters: FilterArgs,
    /// copy: print the text (and optionally copy it); download: write a `-for-llm.txt` file.
    #[arg(long, value_enum, default_value = "copy")]
    action: ActionArg,
    /// Prompt template for copied text: none|explain|summary|debug|improve|custom
    #[arg(long, default_value = "none")]
    template: String,
    /// Body for `--template custom`; `{{content}}` marks where the text goes.
    #[arg(long)]
    custom_template: Option<String>,
    /// Also put the copied text on the system clipboard (`--action copy` only).
    #[arg(long, default_value_t = false)]
    clipboard: bool,
    /// Split the extracted text into parts of at most this many tokens and write them as files.
    #[arg(long)]
    chunk_tokens: Option<usize>,
    /// Model name used in part filenames.
    #[arg(long, default_value = "llm")]
    model: String,
    /// Directory for written files (default: the user's download dir).
    #[arg(long, env = "NBPIPE_OUT_DIR")]
    out_dir: Option<PathBuf>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct CellsCmd {
    #[command(flatten)]
    page: PageArgs,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct ChunkCmd {
    /// Text file to split ("-" reads stdin).
    #[arg(long)]
    input: PathBuf,
    /// Token budget per part.
    #[arg(long)]
    tokens: usize,
    /// Model name used in part filenames.
    #[arg(long, default_value = "llm")]
    model: String,
    /// Directory for written files (default: the user's download dir).
    #[arg(long, env = "NBPIPE_OUT_DIR")]
    out_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Live-model stand-in backed by a JSON dump taken from the page runtime.
struct RuntimeDump(serde_json::Value);

impl NotebookRuntime for RuntimeDump {
    fn to_json(&self) -> Option<serde_json::Value> {
        Some(self.0.clone())
    }
}

#[cfg(feature = "clipboard")]
struct SystemClipboard {
    clipboard: arboard::Clipboard,
}

#[cfg(feature = "clipboard")]
impl SystemClipboard {
    fn new() -> nbpipe_core::Result<Self> {
        let clipboard = arboard::Clipboard::new()
            .map_err(|e| nbpipe_core::Error::Delivery(format!("clipboard: {e}")))?;
        Ok(Self { clipboard })
    }
}

#[cfg(feature = "clipboard")]
impl ClipboardSink for SystemClipboard {
    fn write_text(&mut self, text: &str) -> nbpipe_core::Result<()> {
        self.clipboard
            .set_text(text)
            .map_err(|e| nbpipe_core::Error::Delivery(format!("clipboard: {e}")))
    }
}

#[cfg(feature = "clipboard")]
fn system_clipboard() -> nbpipe_core::Result<Box<dyn ClipboardSink>> {
    Ok(Box::new(SystemClipboard::new()?))
}

#[cfg(not(feature = "clipboard"))]
fn system_clipboard() -> nbpipe_core::Result<Box<dyn ClipboardSink>> {
    Err(nbpipe_core::Error::NotSupported(
        "built without the `clipboard` feature".to_string(),
    ))
}

/// `KEY=VALUE` lines from NBPIPE_ENV_FILE. Existing process env always wins; values are never
/// logged.
fn load_env_file() {
    let Ok(p) = std::env::var("NBPIPE_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut s = String::new();
        std::io::stdin()
            .read_to_string(&mut s)
            .context("read stdin")?;
        return Ok(s);
    }
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn parse_headers(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|h| {
            let (k, v) = h
                .split_once(':')
                .with_context(|| format!("header must look like `Name: value`: {h}"))?;
            Ok((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

fn out_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

async fn build_extractor(args: &PageArgs) -> Result<Extractor> {
    let fetch_cfg = FileFetchConfig {
        timeout_ms: Some(args.timeout_ms),
        max_bytes: Some(args.max_bytes),
        headers: parse_headers(&args.headers)?,
    };
    let fetcher: Option<Arc<dyn FetchBackend>> = if args.offline {
        None
    } else {
        Some(Arc::new(LocalFetcher::new()?))
    };

    let html = match &args.html_file {
        Some(p) => read_input(p)?,
        None => match &fetcher {
            Some(f) => fetch_page(f.as_ref(), &args.url, &fetch_cfg).await,
            None => String::new(),
        },
    };

    let runtime: Option<Arc<dyn NotebookRuntime>> = match &args.runtime_json {
        Some(p) => {
            let v: serde_json::Value = serde_json::from_str(&read_input(p)?)
                .with_context(|| format!("parse {}", p.display()))?;
            Some(Arc::new(RuntimeDump(v)))
        }
        None => None,
    };

    let mut page = PageContext::new(args.url.clone(), html);
    if let Some(t) = &args.title {
        page = page.with_title(t.clone());
    }
    Ok(Extractor::new(
        Resolver::standard(fetcher, runtime, fetch_cfg),
        page,
    ))
}

/// The page itself feeds the embedded-JSON and DOM strategies. A failed fetch leaves it empty;
/// the raw-file strategy may still succeed.
async fn fetch_page(fetcher: &dyn FetchBackend, url: &str, cfg: &FileFetchConfig) -> String {
    let req = FetchRequest {
        url: url.to_string(),
        timeout_ms: cfg.timeout_ms,
        max_bytes: cfg.max_bytes,
        headers: cfg.headers.clone(),
    };
    match fetcher.fetch(&req).await {
        Ok(resp) if resp.is_success() => resp.text_lossy(),
        Ok(resp) => {
            tracing::warn!(url, status = resp.status, "page fetch returned non-success status");
            String::new()
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "page fetch failed");
            String::new()
        }
    }
}

fn print_chunk_response(resp: &ChunkResponse, dir: &Path) -> Result<()> {
    let v = serde_json::json!({
        "success": resp.success,
        "chunkCount": resp.chunk_count,
        "error": resp.error,
        "outDir": dir.display().to_string(),
    });
    println!("{v}");
    Ok(())
}

async fn run_extract(args: ExtractCmd) -> Result<()> {
    let action: OutputAction = args.action.into();
    if args.clipboard && action == OutputAction::Download {
        anyhow::bail!("--clipboard only applies to --action copy");
    }
    let opts = args.filters.to_options()?;
    let template = match (args.template.as_str(), &args.custom_template) {
        ("custom", Some(body)) => PromptTemplate::Custom(body.clone()),
        (name, _) => name.parse::<PromptTemplate>()?,
    };
    let dir = out_dir(args.out_dir.clone());
    let sink: Arc<dyn FileSink> = Arc::new(DirSink::new(&dir));
    let extractor = build_extractor(&args.page).await?.with_sink(sink);

    let rendered = match extractor.render(&opts).await {
        Ok(r) => r,
        Err(e) => {
            let resp = ExtractResponse::failure(user_message(&e));
            if args.output.eq_ignore_ascii_case("json") {
                println!("{}", serde_json::to_string(&resp)?);
                std::process::exit(1);
            }
            anyhow::bail!(resp.error.unwrap_or_default());
        }
    };
    let mut resp = extractor.complete(action, &rendered);

    if let Some(limit) = args.chunk_tokens {
        // Parts are cut from the plain extraction, never the templated text.
        let chunked = extractor.chunk_and_deliver(&rendered.text, limit, &args.model);
        if !chunked.success {
            anyhow::bail!(chunked.error.unwrap_or_default());
        }
        if let Some(e) = &chunked.error {
            tracing::warn!(error = %e, "some parts were not written");
        }
        if !args.output.eq_ignore_ascii_case("json") {
            eprintln!("wrote {} part(s) to {}", chunked.chunk_count, dir.display());
        }
    }

    if let Some(text) = resp.text.take() {
        let text = template.apply(&text);
        if args.clipboard {
            system_clipboard()
                .and_then(|mut c| c.write_text(&text))
                .context("copy to clipboard")?;
        }
        resp.text = Some(text);
    }

    if args.output.eq_ignore_ascii_case("json") {
        println!("{}", serde_json::to_string(&resp)?);
        return Ok(());
    }
    match action {
        OutputAction::Copy => print!("{}", resp.text.unwrap_or_default()),
        OutputAction::Download => {
            if let Some(e) = &resp.delivery_error {
                anyhow::bail!("write failed: {e}");
            }
            println!("{}", dir.join(resp.filename.unwrap_or_default()).display());
        }
    }
    Ok(())
}

async fn run_cells(args: CellsCmd) -> Result<()> {
    let extractor = build_extractor(&args.page).await?;
    let resp = extractor.list_cells().await;
    if args.output.eq_ignore_ascii_case("text") {
        if !resp.success {
            anyhow::bail!(resp.error.unwrap_or_default());
        }
        for (i, c) in resp.cells.unwrap_or_default().iter().enumerate() {
            let first = c.source.lines().next().unwrap_or("");
            let mark = if c.is_empty { " (empty)" } else { "" };
            println!("{i}\t{}{mark}\t{first}", c.cell_type);
        }
        return Ok(());
    }
    println!("{}", serde_json::to_string(&resp)?);
    if !resp.success {
        std::process::exit(1);
    }
    Ok(())
}

fn run_chunk(args: ChunkCmd) -> Result<()> {
    let text = read_input(&args.input)?;
    let dir = out_dir(args.out_dir);
    let extractor = Extractor::new(
        Resolver::standard(None, None, FileFetchConfig::default()),
        PageContext::default(),
    )
    .with_sink(Arc::new(DirSink::new(&dir)));
    let resp = extractor.chunk_and_deliver(&text, args.tokens, &args.model);
    print_chunk_response(&resp, &dir)?;
    if !resp.success {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract(args) => run_extract(args).await?,
        Commands::Cells(args) => run_cells(args).await?,
        Commands::Chunk(args) => run_chunk(args)?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "nbpipe",
                "version": env!("CARGO_PKG_VERSION"),
                "features": {"clipboard": cfg!(feature = "clipboard")},
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("nbpipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_options_json() {
        let f = FilterArgs {
            options_json: Some(r#"{"includeCode": false, "skipEmpty": false}"#.to_string()),
            include_code: Some(true),
            include_markdown: None,
            include_raw: Some(false),
            include_outputs: None,
            skip_empty: None,
            select: vec![2, 0],
            mark_raw_cells: false,
        };
        let o = f.to_options().unwrap();
        assert!(o.include_code);
        assert!(!o.include_raw);
        assert!(!o.skip_empty);
        assert!(o.selection_mode);
        assert_eq!(o.selected_cells, vec![2, 0]);
    }

    #[test]
    fn headers_parse_name_value_pairs() {
        let h = parse_headers(&["Accept-Language: en".to_string()]).unwrap();
        assert_eq!(h.get("Accept-Language").map(String::as_str), Some("en"));
        assert!(parse_headers(&["nope".to_string()]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
