//! URL rewriting helpers (bounded, deterministic, no network IO).
//!
//! Notebook UIs serve the rendered notebook under one path and the raw `.ipynb` under
//! `/files/`. These helpers map the former onto the latter.

pub const NOTEBOOK_EXT: &str = ".ipynb";

/// `name` without a trailing `.ipynb`, matched case-insensitively.
pub fn strip_notebook_ext(name: &str) -> Option<&str> {
    let cut = name.len().checked_sub(NOTEBOOK_EXT.len())?;
    let ext = name.get(cut..)?;
    ext.eq_ignore_ascii_case(NOTEBOOK_EXT)
        .then(|| name.get(..cut))
        .flatten()
}

/// Map a notebook UI page URL onto the raw-file URL the same server exposes.
///
/// Handles:
/// - classic `.../notebooks/<path>`
/// - lab/notebook7 `.../lab/tree/<path>`, `.../doc/tree/<path>`
/// - lab workspaces `.../lab/workspaces/<ws>/tree/<path>`
/// - `.../files/<path>` (already raw)
///
/// Any prefix before the UI segment (JupyterHub `/user/<name>`) and the query string (token
/// auth) are kept; the fragment is dropped. Returns `None` unless the file path ends in
/// `.ipynb`.
pub fn raw_notebook_url(page_url: &str) -> Option<String> {
    let u = url::Url::parse(page_url.trim()).ok()?;
    if !matches!(u.scheme(), "http" | "https") {
        return None;
    }
    let raw_path = raw_files_path(u.path())?;
    strip_notebook_ext(&raw_path)?;
    let mut out = u.clone();
    out.set_path(&raw_path);
    out.set_fragment(None);
    Some(out.to_string())
}

fn raw_files_path(path: &str) -> Option<String> {
    let segs: Vec<&str> = path.split('/').collect();
    for (i, seg) in segs.iter().enumerate() {
        let tail = match *seg {
            "notebooks" | "files" => Some(&segs[i + 1..]),
            "lab" | "doc" => match segs.get(i + 1) {
                Some(&"tree") => Some(&segs[i + 2..]),
                Some(&"workspaces") if segs.get(i + 3) == Some(&"tree") => Some(&segs[i + 4..]),
                _ => None,
            },
            _ => None,
        };
        let Some(tail) = tail else {
            continue;
        };
        let file = tail.join("/");
        if file.trim_matches('/').is_empty() {
            return None;
        }
        let prefix = segs[..i].join("/");
        return Some(format!("{prefix}/files/{file}"));
    }
    None
}
