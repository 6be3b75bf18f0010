pub mod types;

pub use types::{DigestView, PullRequestView};

use chrono::Local;
use minijinja::{Environment, Value};
use pulldown_cmark::{html, Options, Parser};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::pr::PullRequest;

const TEMPLATE_NAME: &str = "digest.html";

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("failed to read template file {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("failed to inline styles: {0}")]
    InlineStyles(#[from] css_inline::InlineError),

    #[error("Failed to write digest file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Read the digest template from disk.
pub fn load_template(path: &Path) -> Result<String, DigestError> {
    fs::read_to_string(path).map_err(|source| DigestError::TemplateRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Build the template context from sorted open and closed pull requests.
pub fn build(config: &Config, open: &[PullRequest], closed: &[PullRequest]) -> DigestView {
    let repos: Vec<String> = config.repos.iter().map(|r| r.to_string()).collect();
    DigestView {
        repo: repos.join(", "),
        repos,
        since: config.since.to_rfc3339(),
        before: config.before.map(|b| b.to_rfc3339()),
        generated_at: config.now.to_rfc3339(),
        open: open.iter().map(PullRequestView::from).collect(),
        closed: closed.iter().map(PullRequestView::from).collect(),
    }
}

/// Render the digest HTML. Output is auto-escaped; use the `markdown` filter
/// for pull request bodies.
pub fn render(template: &str, view: &DigestView, inline_styles: bool) -> Result<String, DigestError> {
    let mut env = Environment::new();
    env.add_filter("markdown", markdown_filter);
    env.add_template(TEMPLATE_NAME, template)?;

    let rendered = env.get_template(TEMPLATE_NAME)?.render(view)?;
    if !inline_styles {
        return Ok(rendered);
    }

    let inliner = css_inline::CSSInliner::options()
        .load_remote_stylesheets(false)
        .build();
    Ok(inliner.inline(&rendered)?)
}

/// Render the digest and write it to `<out_dir>/digest-MM-DD-YYYY.html`.
/// Returns the written path.
#[instrument(skip_all, fields(open = open.len(), closed = closed.len()))]
pub fn write_digest(
    config: &Config,
    template: &str,
    open: &[PullRequest],
    closed: &[PullRequest],
) -> Result<PathBuf, DigestError> {
    let view = build(config, open, closed);
    let html = render(template, &view, config.inline_styles)?;

    fs::create_dir_all(&config.out_dir)?;
    let file_name = format!(
        "digest-{}.html",
        config.now.with_timezone(&Local).format("%m-%d-%Y")
    );
    let path = config.out_dir.join(file_name);
    debug!(path = %path.display(), bytes = html.len(), "writing digest");
    fs::write(&path, html)?;
    Ok(path)
}

/// Render GitHub-flavoured Markdown to HTML.
pub fn render_markdown(text: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(text, options);
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn markdown_filter(text: &str) -> Value {
    Value::from_safe_string(render_markdown(text))
}
