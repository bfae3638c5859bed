use crate::matcher::IncludedBy;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Tokens charged per file for the `<file path="...">` wrapper.
pub const FILE_BLOCK_OVERHEAD_TOKENS: usize = 12;

const BLOCK_OPEN_PREFIX: &str = "<file path=\"";
const BLOCK_OPEN_SUFFIX: &str = "\">";
const BLOCK_CLOSE: &str = "</file>";

/// A non-fatal problem met while scanning or reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    pub fn for_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub relative_path: String,
    pub token_count: usize,
    pub included_by: IncludedBy,
}

/// Result of one extraction. Immutable once built.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    formatted_output: String,
    files: Vec<ResolvedFile>,
    total_tokens: usize,
    scanned_at: DateTime<Utc>,
    dropped_files: Vec<String>,
    warnings: Vec<Warning>,
}

impl ContextBundle {
    pub(crate) fn new(
        formatted_output: String,
        files: Vec<ResolvedFile>,
        scanned_at: DateTime<Utc>,
        dropped_files: Vec<String>,
        warnings: Vec<Warning>,
    ) -> Self {
        let total_tokens = bundle_tokens(files.iter().map(|f| f.token_count));
        Self {
            formatted_output,
            files,
            total_tokens,
            scanned_at,
            dropped_files,
            warnings,
        }
    }

    pub fn formatted_output(&self) -> &str {
        &self.formatted_output
    }

    pub fn files(&self) -> &[ResolvedFile] {
        &self.files
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn scanned_at(&self) -> DateTime<Utc> {
        self.scanned_at
    }

    pub fn dropped_files(&self) -> &[String] {
        &self.dropped_files
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn to_report(&self) -> ExtractionReport {
        ExtractionReport::from(self)
    }
}

/// Content tokens plus the per-file wrapper overhead.
pub fn bundle_tokens(token_counts: impl IntoIterator<Item = usize>) -> usize {
    token_counts
        .into_iter()
        .map(|t| t + FILE_BLOCK_OVERHEAD_TOKENS)
        .sum()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFile {
    pub path: String,
    pub tokens: usize,
    pub included_by: IncludedBy,
}

/// Wire shape of a bundle for JSON/YAML consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub formatted_output: String,
    pub files: Vec<ReportFile>,
    pub total_files: usize,
    pub total_tokens: usize,
    pub scanned_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped_files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl From<&ContextBundle> for ExtractionReport {
    fn from(bundle: &ContextBundle) -> Self {
        Self {
            formatted_output: bundle.formatted_output.clone(),
            files: bundle
                .files
                .iter()
                .map(|f| ReportFile {
                    path: f.relative_path.clone(),
                    tokens: f.token_count,
                    included_by: f.included_by,
                })
                .collect(),
            total_files: bundle.total_files(),
            total_tokens: bundle.total_tokens,
            scanned_at: bundle
                .scanned_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            dropped_files: if bundle.dropped_files.is_empty() {
                None
            } else {
                Some(bundle.dropped_files.clone())
            },
            warnings: bundle.warnings.clone(),
        }
    }
}

pub fn render_file_block(relative_path: &str, content: &str) -> String {
    let mut block = String::with_capacity(content.len() + relative_path.len() + 32);
    block.push_str(BLOCK_OPEN_PREFIX);
    block.push_str(&escape_attr(relative_path));
    block.push_str(BLOCK_OPEN_SUFFIX);
    block.push('\n');
    block.push_str(content);
    if !content.ends_with('\n') {
        block.push('\n');
    }
    block.push_str(BLOCK_CLOSE);
    block
}

/// Joins per-file blocks with a blank line between them.
pub fn render_bundle<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let blocks: Vec<String> = files
        .into_iter()
        .map(|(path, content)| render_file_block(path, content))
        .collect();
    blocks.join("\n\n")
}

/// Splits formatted output back into `(path, content)` pairs.
///
/// Content keeps the trailing newline that rendering guarantees.
pub fn parse_file_blocks(formatted: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut rest = formatted;
    while let Some(start) = rest.find(BLOCK_OPEN_PREFIX) {
        let after_prefix = &rest[start + BLOCK_OPEN_PREFIX.len()..];
        let Some(path_end) = after_prefix.find(BLOCK_OPEN_SUFFIX) else {
            break;
        };
        let path = unescape_attr(&after_prefix[..path_end]);
        let body = &after_prefix[path_end + BLOCK_OPEN_SUFFIX.len()..];
        let body = body.strip_prefix('\n').unwrap_or(body);
        let close_marker = format!("\n{}", BLOCK_CLOSE);
        let Some(body_end) = find_block_end(body, &close_marker) else {
            break;
        };
        blocks.push((path, body[..body_end + 1].to_string()));
        rest = &body[body_end + close_marker.len()..];
    }
    blocks
}

// A close tag only counts when followed by a separator or the end of output,
// so file content that itself contains "</file>" lines stays intact.
fn find_block_end(body: &str, close_marker: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = body[offset..].find(close_marker) {
        let idx = offset + pos;
        let tail = &body[idx + close_marker.len()..];
        if tail.is_empty() || tail.starts_with("\n\n<file path=\"") || tail == "\n" {
            return Some(idx);
        }
        offset = idx + close_marker.len();
    }
    None
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape_attr(value: &str) -> String {
    value
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_file_block_adds_trailing_newline() {
        assert_eq!(
            render_file_block("src/a.ts", "export {}"),
            "<file path=\"src/a.ts\">\nexport {}\n</file>"
        );
        assert_eq!(
            render_file_block("src/a.ts", "export {}\n"),
            "<file path=\"src/a.ts\">\nexport {}\n</file>"
        );
    }

    #[test]
    fn test_render_and_parse_keep_boundaries() {
        let files = [
            ("README.md", "# Title\n"),
            ("src/odd\"name.ts", "const s = \"</file>\";\n</file>\nmore"),
            ("empty.txt", ""),
        ];
        let rendered = render_bundle(files);
        let parsed = parse_file_blocks(&rendered);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], ("README.md".to_string(), "# Title\n".to_string()));
        assert_eq!(parsed[1].0, "src/odd\"name.ts");
        assert_eq!(parsed[1].1, "const s = \"</file>\";\n</file>\nmore\n");
        assert_eq!(parsed[2], ("empty.txt".to_string(), "\n".to_string()));
    }

    #[test]
    fn test_bundle_tokens_adds_overhead() {
        assert_eq!(bundle_tokens([]), 0);
        assert_eq!(
            bundle_tokens([10, 5]),
            15 + 2 * FILE_BLOCK_OVERHEAD_TOKENS
        );
    }

    #[test]
    fn test_report_uses_camel_case_and_omits_empty() {
        let bundle = ContextBundle::new(
            render_bundle([("README.md", "hi")]),
            vec![ResolvedFile {
                relative_path: "README.md".to_string(),
                token_count: 1,
                included_by: IncludedBy::SmartAutoInclude,
            }],
            Utc::now(),
            Vec::new(),
            Vec::new(),
        );
        let json = serde_json::to_value(bundle.to_report()).unwrap();
        assert_eq!(json["totalFiles"], 1);
        assert_eq!(json["totalTokens"], 1 + FILE_BLOCK_OVERHEAD_TOKENS);
        assert_eq!(json["files"][0]["includedBy"], "auto");
        assert!(json["scannedAt"].as_str().unwrap().ends_with('Z'));
        assert!(json.get("droppedFiles").is_none());
        assert!(json.get("warnings").is_none());
    }
}
