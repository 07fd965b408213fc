//! Source locations attached to failures.

use std::fmt;
use std::path::Path;

/// Lines of source shown under a failure, starting at the failing line.
const SNIPPET_LINES: usize = 5;

/// Where a failure was raised, with a few lines of surrounding source.
///
/// Best-effort: `file` and `line` are absent when no location is known, and
/// `snippet` stays empty when the source file cannot be read at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub snippet: Vec<String>,
}

impl Location {
    /// Location of the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(std::panic::Location::caller())
    }

    /// A location for failures with no known origin.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// `file:line`, or `<unknown>` when the location is absent.
    pub fn file_line(&self) -> String {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.clone(),
            _ => "<unknown>".to_string(),
        }
    }

    /// Multi-line rendering used in logs and alert mails.
    pub fn render(&self) -> String {
        let mut out = self.file_line();
        out.push('\n');
        if !self.snippet.is_empty() {
            for line in &self.snippet {
                out.push_str(">> ");
                out.push_str(line);
                out.push('\n');
            }
            out.push_str("---\n");
        }
        out
    }
}

impl From<&std::panic::Location<'_>> for Location {
    fn from(location: &std::panic::Location<'_>) -> Self {
        let file = location.file().to_string();
        let line = location.line();
        let snippet = read_snippet(Path::new(&file), line);
        Self {
            file: Some(file),
            line: Some(line),
            snippet,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_line())
    }
}

fn read_snippet(path: &Path, line: u32) -> Vec<String> {
    let Ok(source) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    source
        .lines()
        .skip(line.saturating_sub(1) as usize)
        .take(SNIPPET_LINES)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn capture() -> Location {
        Location::caller()
    }

    #[test]
    fn caller_points_at_the_call_site() {
        let expected_line = line!() + 1;
        let location = capture();
        assert_eq!(location.line, Some(expected_line));
        assert!(location.file.as_deref().unwrap().ends_with("location.rs"));
    }

    #[test]
    fn unknown_location_renders_placeholder() {
        let location = Location::unknown();
        assert_eq!(location.file_line(), "<unknown>");
        assert_eq!(location.render(), "<unknown>\n");
    }

    #[test]
    fn render_includes_snippet() {
        let location = Location {
            file: Some("checks.rs".to_string()),
            line: Some(12),
            snippet: vec!["ctx.assert(false, \"down\")?;".to_string()],
        };
        assert_eq!(
            location.render(),
            "checks.rs:12\n>> ctx.assert(false, \"down\")?;\n---\n"
        );
    }

    #[test]
    fn snippet_reads_lines_from_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.rs");
        std::fs::write(&path, "one\ntwo\nthree\nfour\nfive\nsix\nseven\n").unwrap();

        let snippet = read_snippet(&path, 2);
        assert_eq!(snippet, vec!["two", "three", "four", "five", "six"]);
    }

    #[test]
    fn snippet_of_missing_file_is_empty() {
        assert!(read_snippet(Path::new("/nonexistent/watchpost.rs"), 3).is_empty());
    }
}
