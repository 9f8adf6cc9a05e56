//! Fence extraction: the agent answer as a side-effect program.
//!
//! Agents emit Markdown code fences; blocks annotated with a relative
//! path become files, blocks annotated `bash|sh|shell` become command
//! scripts. Everything else in the answer is prose.

use regex::Regex;
use std::sync::LazyLock;

/// Fence opens with `<lang> <path>` on the same line.
static FILE_SAME_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(\w+)[ \t]+([\w./-]+)[ \t]*\n(.*?)```").unwrap());

/// Fence opens with `<lang>` alone; the first content line is `# <path>`.
static FILE_HEADER_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(\w+)[ \t]*\n#[ \t]*([\w./-]+)[ \t]*\n(.*?)```").unwrap());

/// Shell command fences.
static COMMAND_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```(bash|sh|shell)[ \t]*\n([\s\S]*?)^```").unwrap());

/// Substring denylist for extracted shell lines.
const DANGEROUS_COMMANDS: &[&str] = &["rm -rf /", "rm -rf ~", ":(){ :|:& };:"];

/// A code fence annotated with a target path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBlock {
    pub language: String,
    pub path: String,
    /// Block body, trimmed.
    pub content: String,
}

/// Scan an answer for file-producing fences.
///
/// The same-line pattern is tried first, then the header-comment
/// variant; when both describe the same path the manifest's
/// no-overwrite rule makes the first extraction win.
pub fn extract_file_blocks(answer: &str) -> Vec<FileBlock> {
    let mut blocks = Vec::new();

    for pattern in [&*FILE_SAME_LINE, &*FILE_HEADER_COMMENT] {
        for caps in pattern.captures_iter(answer) {
            let language = caps[1].to_string();
            if is_shell_language(&language) {
                // Shell fences belong to command extraction.
                continue;
            }
            blocks.push(FileBlock {
                language,
                path: caps[2].trim().to_string(),
                content: caps[3].trim().to_string(),
            });
        }
    }

    blocks
}

/// Scan an answer for shell scripts, one entry per fence, trimmed.
pub fn extract_command_scripts(answer: &str) -> Vec<String> {
    COMMAND_BLOCK
        .captures_iter(answer)
        .map(|caps| caps[2].trim().to_string())
        .filter(|script| !script.is_empty())
        .collect()
}

fn is_shell_language(lang: &str) -> bool {
    matches!(lang, "bash" | "sh" | "shell")
}

/// Whether a command line matches the denylist.
pub fn is_dangerous_command(cmd: &str) -> bool {
    DANGEROUS_COMMANDS.iter().any(|d| cmd.contains(d))
}

/// Lexically normalize a `/`-separated path: collapse `.` and empty
/// segments, resolve `..` against preceding segments, keep unmatched
/// leading `..`.
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_none_or(|p| *p == "..") {
                    if !absolute {
                        parts.push("..");
                    }
                } else {
                    parts.pop();
                }
            }
            other => parts.push(other),
        }
    }

    let mut normalized = parts.join("/");
    if absolute {
        normalized.insert(0, '/');
    }
    if normalized.is_empty() {
        normalized.push('.');
    }
    normalized
}

/// A normalized path is unsafe when it escapes the project root.
pub fn is_unsafe_path(normalized: &str) -> bool {
    normalized.starts_with("..") || normalized.starts_with('/')
}
