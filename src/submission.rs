//! Where submissions come from: a CSV backlog export or a form webhook.
//!
//! ## Backlog layout
//!
//! Form exports do not have a stable column order, so nothing is positional
//! except the fallback. The name column is found by header, the token
//! column likewise, and the document URL is whichever cell first looks like
//! an upload link. Rows without such a cell are counted as skipped.

use crate::error::CvFlowError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Display name used when a submission carries none.
pub const DEFAULT_CANDIDATE_NAME: &str = "Candidate";

/// One source document plus candidate identity and a stable token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub token: String,
    pub candidate_name: String,
    /// URL or local path of the document.
    pub source: String,
}

impl Submission {
    pub fn new(token: impl Into<String>, candidate_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            candidate_name: candidate_name.into(),
            source: source.into(),
        }
    }
}

// ── Backlog table ────────────────────────────────────────────────────────

/// Header names and URL markers used to read a backlog export.
#[derive(Debug, Clone)]
pub struct BacklogColumns {
    /// Header of the name column; column 0 when no header matches.
    pub name_header: String,
    /// Header of the token column; the URL is the token when absent.
    pub token_header: String,
    /// A URL cell must contain one of these.
    pub url_markers: Vec<String>,
}

impl Default for BacklogColumns {
    fn default() -> Self {
        Self {
            name_header: "Ad ve Soyad".to_string(),
            token_header: "Token".to_string(),
            url_markers: vec!["typeform.com".to_string(), "storage".to_string()],
        }
    }
}

impl BacklogColumns {
    fn is_document_url(&self, cell: &str) -> bool {
        cell.starts_with("http") && self.url_markers.iter().any(|m| cell.contains(m.as_str()))
    }
}

/// Submissions read from a backlog table, in row order.
#[derive(Debug, Clone, Default)]
pub struct Backlog {
    pub submissions: Vec<Submission>,
    /// Data rows with no recognisable document URL.
    pub skipped_rows: usize,
}

impl Backlog {
    pub fn from_path(path: &Path, columns: &BacklogColumns) -> Result<Self, CvFlowError> {
        let file = std::fs::File::open(path).map_err(|e| CvFlowError::BacklogUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_reader(file, columns).map_err(|e| match e {
            CvFlowError::BacklogUnreadable { detail, .. } => CvFlowError::BacklogUnreadable {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R, columns: &BacklogColumns) -> Result<Self, CvFlowError> {
        let unreadable = |e: csv::Error| CvFlowError::BacklogUnreadable {
            path: Default::default(),
            detail: e.to_string(),
        };
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers().map_err(unreadable)?.clone();
        let name_idx = headers
            .iter()
            .position(|h| h == columns.name_header)
            .unwrap_or(0);
        let token_idx = headers.iter().position(|h| h == columns.token_header);
        debug!("Backlog columns: name={} token={:?}", name_idx, token_idx);

        let mut backlog = Backlog::default();
        for (row_no, record) in csv_reader.records().enumerate() {
            let record = record.map_err(unreadable)?;
            let Some(url) = record.iter().find(|c| columns.is_document_url(c)) else {
                debug!("Backlog row {}: no document URL, skipping", row_no + 2);
                backlog.skipped_rows += 1;
                continue;
            };

            let name = record
                .get(name_idx)
                .filter(|n| !n.is_empty())
                .unwrap_or(DEFAULT_CANDIDATE_NAME);
            let token = token_idx
                .and_then(|i| record.get(i))
                .filter(|t| !t.is_empty())
                .unwrap_or(url);

            backlog.submissions.push(Submission::new(token, name, url));
        }

        if backlog.skipped_rows > 0 {
            warn!("{} backlog row(s) had no document URL", backlog.skipped_rows);
        }
        Ok(backlog)
    }
}

// ── Webhook payload ──────────────────────────────────────────────────────

/// Build a submission from a form-response webhook body.
///
/// The first `text` or `email` answer is the display name; the `file_url`
/// answer is the document. `form_response.token` is the stable token, with
/// the document URL standing in when the payload has none.
pub fn from_webhook(payload: &Value) -> Result<Submission, CvFlowError> {
    let response = payload
        .get("form_response")
        .ok_or_else(|| CvFlowError::InvalidWebhook("missing form_response".into()))?;
    let answers = response
        .get("answers")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut name: Option<String> = None;
    let mut url: Option<String> = None;
    for answer in answers {
        match answer.get("type").and_then(Value::as_str) {
            Some(kind @ ("text" | "email")) if name.is_none() => {
                name = answer
                    .get(kind)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
            }
            Some("file_url") => {
                url = answer.get("file_url").and_then(Value::as_str).map(str::to_string);
            }
            _ => {}
        }
    }

    let url = url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| CvFlowError::InvalidWebhook("no file_url answer".into()))?;
    let token = response
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| url.clone());

    Ok(Submission {
        token,
        candidate_name: name.unwrap_or_else(|| DEFAULT_CANDIDATE_NAME.to_string()),
        source: url,
    })
}
