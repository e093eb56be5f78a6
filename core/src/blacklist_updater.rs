//! Fetches a remote domain-blacklist feed and atomically merges it into
//! the on-disk blacklist. Format is sniffed from the response
//! `Content-Type` header or the URL suffix.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::UpdaterError;
use crate::resolvers::blacklist::read_entries;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetches `feed_url`, merges the normalized entries into the blacklist
/// file at `path`, and atomically replaces it. An empty fetch result is a
/// no-op — it never overwrites an existing file with nothing.
pub async fn update(client: &Client, feed_url: &str, path: &Path) -> Result<usize, UpdaterError> {
    let fetched = fetch_feed(client, feed_url).await?;
    if fetched.is_empty() {
        log::info!("blacklist updater: empty feed, leaving existing file untouched");
        return Ok(0);
    }

    let current = read_entries(path);
    let merged = merge(&current, &fetched);
    write_atomic(path, &merged)?;
    Ok(merged.len())
}

/// Fetches the feed and normalizes it into a set of lowercase, trimmed,
/// non-empty, non-comment entries.
async fn fetch_feed(client: &Client, feed_url: &str) -> Result<HashSet<String>, UpdaterError> {
    let resp = client
        .get(feed_url)
        .timeout(HTTP_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let is_json = content_type.contains("json") || feed_url.ends_with(".json");

    let body = resp.text().await?;
    if is_json {
        parse_json_feed(&body)
    } else {
        Ok(parse_line_feed(&body))
    }
}

fn parse_json_feed(body: &str) -> Result<HashSet<String>, UpdaterError> {
    let value: Value = serde_json::from_str(body).map_err(|e| UpdaterError::Parse(e.to_string()))?;
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::Object(map) => map
            .get("domains")
            .or_else(|| map.get("blacklist"))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .ok_or_else(|| {
                UpdaterError::Parse("expected a 'domains' or 'blacklist' array".to_string())
            })?,
        _ => return Err(UpdaterError::Parse("unexpected JSON shape".to_string())),
    };
    Ok(normalize(raw.into_iter()))
}

/// Line-oriented text/CSV: first comma-separated column per line.
fn parse_line_feed(body: &str) -> HashSet<String> {
    normalize(body.lines().map(|line| {
        line.split(',').next().unwrap_or("").to_string()
    }))
}

fn normalize(entries: impl Iterator<Item = String>) -> HashSet<String> {
    entries
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty() && !e.starts_with('#'))
        .collect()
}

/// Union merge. Idempotent: `merge(S, S) == S`. Union-preserving:
/// `D ⊆ merge(S, D)`.
pub fn merge(current: &HashSet<String>, feed: &HashSet<String>) -> HashSet<String> {
    current.union(feed).cloned().collect()
}

fn write_atomic(path: &Path, entries: &HashSet<String>) -> Result<(), UpdaterError> {
    let mut sorted: Vec<&String> = entries.iter().collect();
    sorted.sort();
    let contents = sorted
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let tmp_path = path.with_file_name(format!(
        "{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("blacklist")
    ));
    let result = std::fs::write(&tmp_path, contents).and_then(|_| std::fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    Ok(result?)
}
