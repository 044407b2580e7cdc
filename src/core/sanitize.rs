use std::sync::LazyLock;

use regex::Regex;

/// ESC followed by either a single Fe byte or a CSI parameter block with its
/// final byte.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("ANSI escape pattern is valid")
});

/// Removes terminal escape sequences until none are left, so that stripping
/// one sequence cannot expose another.
pub fn strip_ansi(text: &str) -> String {
    let mut text = text.to_string();
    while ANSI_ESCAPE.is_match(&text) {
        text = ANSI_ESCAPE.replace_all(&text, "").into_owned();
    }
    text
}

/// Cleans captured process output before it leaves the pipeline.
///
/// Besides escape stripping, a sanitizer carries a set of literal rewrites
/// (typically absolute workspace paths mapped to stable placeholder names).
/// Rewrites are applied longest pattern first, so a directory rewrite never
/// clobbers a more specific file rewrite below it.
#[derive(Clone, Debug, Default)]
pub struct Sanitizer {
    rewrites: Vec<(String, String)>,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rewrite(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        if from.is_empty() {
            return self;
        }

        let pos = self
            .rewrites
            .iter()
            .position(|(existing, _)| existing.len() < from.len())
            .unwrap_or(self.rewrites.len());
        self.rewrites.insert(pos, (from, to.into()));
        self
    }

    pub fn sanitize(&self, text: &str) -> String {
        let mut text = strip_ansi(text);
        for (from, to) in &self.rewrites {
            if text.contains(from.as_str()) {
                text = text.replace(from.as_str(), to);
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "/tmp/playground-runner/run_42/main.cpp";
    const DIR: &str = "/tmp/playground-runner/run_42";

    fn workspace_sanitizer() -> Sanitizer {
        Sanitizer::new()
            .with_rewrite(DIR, ".")
            .with_rewrite(SOURCE, "program.cpp")
    }

    #[test]
    fn test_strip_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m plain"), "red plain");
        assert_eq!(strip_ansi("\x1b[1;32mbold green\x1b[m"), "bold green");
    }

    #[test]
    fn test_strip_single_byte_escapes() {
        assert_eq!(strip_ansi("a\x1bMb\x1b_c"), "abc");
    }

    #[test]
    fn test_strip_nested_sequences() {
        // Removing the inner sequence leaves "\x1b[0m" behind, which must go too.
        assert_eq!(strip_ansi("x\x1b\x1b[31m[0my"), "xy");
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "line 1\nline 2 [not an escape]\n";
        assert_eq!(strip_ansi(text), text);
    }

    #[test]
    fn test_source_path_rewritten_before_directory() {
        let sanitizer = workspace_sanitizer();
        let diagnostics = format!(
            "{SOURCE}:3:5: error: expected ';'\nIn file included from {DIR}/other.h\n"
        );
        assert_eq!(
            sanitizer.sanitize(&diagnostics),
            "program.cpp:3:5: error: expected ';'\nIn file included from ./other.h\n"
        );
    }

    #[test]
    fn test_path_split_by_escape_is_rewritten() {
        let sanitizer = workspace_sanitizer();
        let text = "/tmp/playground-runner/\x1b[1mrun_42/main.cpp:1: error";
        assert_eq!(sanitizer.sanitize(text), "program.cpp:1: error");
    }

    #[test]
    fn test_empty_rewrite_ignored() {
        let sanitizer = Sanitizer::new().with_rewrite("", "x");
        assert_eq!(sanitizer.sanitize("abc"), "abc");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let sanitizer = workspace_sanitizer();
        let inputs = [
            "",
            "plain",
            "\x1b[31mred\x1b[0m",
            "x\x1b\x1b[31m[0my",
            "\x1b\x1b\x1b[1m[1m[1m",
            "/tmp/playground-runner/run_42/main.cpp/tmp/playground-runner/run_42/main.cpp",
            "\x1b/tmp/playground-runner/run_42/main.cpp",
            "trailing escape \x1b",
            "\x1b[",
        ];

        for input in inputs {
            let once = sanitizer.sanitize(input);
            assert_eq!(sanitizer.sanitize(&once), once, "input: {input:?}");
        }
    }
}
