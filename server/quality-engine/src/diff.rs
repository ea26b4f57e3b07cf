//! Unified-diff parsing shared by the line-scanning stages.
//!
//! Only added lines are ever scanned; removed lines are counted. A hunk header
//! that cannot be parsed marks the file malformed but never fails the parse.

use crate::analyzer::IgnoreSet;
use crate::types::{ChangeSet, FileDiff};

/// One added line with its new-file line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedLine {
  pub line: u32,
  pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDiff {
  pub added: Vec<AddedLine>,
  pub removed: u32,
  pub malformed: bool,
  /// git reported the file as binary (`Binary files ... differ`).
  pub binary: bool,
}

/// A file of the change set with its parsed diff.
#[derive(Debug, Clone)]
pub struct ParsedFile<'a> {
  pub file: &'a FileDiff,
  pub diff: ParsedDiff,
  /// Matches an ignore glob: excluded from scoring.
  pub ignored: bool,
}

/// Parse every file of a change set once, in payload order.
pub fn parse_files<'a>(changeset: &'a ChangeSet, ignore: &IgnoreSet) -> Vec<ParsedFile<'a>> {
  changeset
    .files
    .iter()
    .map(|file| ParsedFile {
      file,
      diff: parse(&file.diff),
      ignored: ignore.is_ignored(&file.path),
    })
    .collect()
}

/// Count (added, removed) lines, skipping `+++` / `---` file headers.
pub fn count_changes(diff: &str) -> (u32, u32) {
  let parsed = parse(diff);
  (parsed.added.len() as u32, parsed.removed)
}

/// Parse unified diff text (or bare `+`/`-` lines without hunk headers).
pub fn parse(diff: &str) -> ParsedDiff {
  let mut out = ParsedDiff::default();
  let mut in_hunk = false;
  let mut hunk_ok = true;
  let mut next_new: u32 = 1;

  for (idx, raw) in diff.lines().enumerate() {
    let position = (idx + 1) as u32;

    if raw.starts_with("@@") {
      in_hunk = true;
      match parse_hunk_header(raw) {
        Some(start) => {
          hunk_ok = true;
          next_new = start;
        }
        None => {
          hunk_ok = false;
          out.malformed = true;
        }
      }
      continue;
    }

    if raw.starts_with("diff --git ") {
      in_hunk = false;
      continue;
    }
    if !in_hunk && is_binary_marker(raw) {
      out.binary = true;
      continue;
    }
    if !in_hunk && is_header_line(raw) {
      continue;
    }

    match raw.as_bytes().first() {
      Some(b'+') => {
        let line = if hunk_ok { next_new } else { position };
        out.added.push(AddedLine {
          line,
          text: raw[1..].to_string(),
        });
        next_new = next_new.saturating_add(1);
      }
      Some(b'-') => out.removed += 1,
      // "\ No newline at end of file"
      Some(b'\\') => {}
      _ => next_new = next_new.saturating_add(1),
    }
  }

  out
}

fn is_binary_marker(line: &str) -> bool {
  (line.starts_with("Binary files ") && line.ends_with(" differ")) || line == "GIT binary patch"
}

fn is_header_line(line: &str) -> bool {
  const HEADERS: [&str; 10] = [
    "+++ ",
    "--- ",
    "index ",
    "new file mode",
    "deleted file mode",
    "old mode",
    "new mode",
    "similarity index",
    "rename from",
    "rename to",
  ];
  HEADERS.iter().any(|h| line.starts_with(h)) || line == "+++" || line == "---"
}

/// `@@ -a[,b] +c[,d] @@ ...` -> `c` (new-file start line).
fn parse_hunk_header(line: &str) -> Option<u32> {
  let rest = line.strip_prefix("@@ ")?;
  let end = rest.find(" @@")?;
  let mut parts = rest[..end].split_whitespace();
  let old = parts.next()?.strip_prefix('-')?;
  let new = parts.next()?.strip_prefix('+')?;
  if parts.next().is_some() {
    return None;
  }
  parse_range(old)?;
  parse_range(new)
}

fn parse_range(range: &str) -> Option<u32> {
  let mut it = range.splitn(2, ',');
  let start = it.next()?.parse::<u32>().ok()?;
  if let Some(len) = it.next() {
    len.parse::<u32>().ok()?;
  }
  Some(start)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hunk_line_numbers_follow_new_file() {
    let diff = "\
diff --git a/src/a.rs b/src/a.rs
index 111..222 100644
--- a/src/a.rs
+++ b/src/a.rs
@@ -10,3 +10,4 @@ fn main() {
 let a = 1;
-let b = 2;
+let b = 3;
+let c = 4;
 let d = 5;
";
    let parsed = parse(diff);
    assert!(!parsed.malformed);
    assert_eq!(parsed.removed, 1);
    assert_eq!(
      parsed.added,
      vec![
        AddedLine { line: 11, text: "let b = 3;".into() },
        AddedLine { line: 12, text: "let c = 4;".into() },
      ]
    );
  }

  #[test]
  fn bare_lines_without_hunks_number_from_one() {
    let parsed = parse("+first\n context\n+third\n-gone\n");
    assert_eq!(parsed.added[0].line, 1);
    assert_eq!(parsed.added[1].line, 3);
    assert_eq!(parsed.removed, 1);
    assert!(!parsed.malformed);
  }

  #[test]
  fn file_headers_are_not_counted() {
    assert_eq!(count_changes("--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n"), (1, 1));
  }

  #[test]
  fn content_that_looks_like_header_inside_hunk_counts() {
    // A removed SQL comment line "-- note" shows up as "--- note".
    let parsed = parse("@@ -1,1 +1,1 @@\n--- note\n+++ counter\n");
    assert_eq!(parsed.removed, 1);
    assert_eq!(parsed.added.len(), 1);
    assert_eq!(parsed.added[0].text, "++ counter");
  }

  #[test]
  fn malformed_hunk_keeps_added_lines_by_position() {
    let parsed = parse("@@ garbage @@\n+secret line\n");
    assert!(parsed.malformed);
    assert_eq!(parsed.added, vec![AddedLine { line: 2, text: "secret line".into() }]);
  }

  #[test]
  fn multiple_hunks_reset_numbering() {
    let parsed = parse("@@ -1,1 +1,2 @@\n a\n+b\n@@ -40,0 +41,1 @@\n+z\n");
    assert_eq!(parsed.added[0].line, 2);
    assert_eq!(parsed.added[1].line, 41);
  }

  #[test]
  fn no_newline_marker_ignored() {
    let parsed = parse("@@ -1 +1 @@\n-a\n\\ No newline at end of file\n+b\n");
    assert_eq!(parsed.added, vec![AddedLine { line: 1, text: "b".into() }]);
  }

  #[test]
  fn binary_marker_flags_the_file() {
    let parsed = parse(
      "diff --git a/logo.png b/logo.png\nindex 1a2b..3c4d 100644\nBinary files a/logo.png and b/logo.png differ\n",
    );
    assert!(parsed.binary);
    assert!(parsed.added.is_empty());
    assert_eq!(count_changes("Binary files /dev/null and b/app.jar differ\n"), (0, 0));
    assert!(parse("GIT binary patch\nliteral 12\n").binary);
    assert!(!parse("+Binary files are not allowed here\n").binary);
  }
}
