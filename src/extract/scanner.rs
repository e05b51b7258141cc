//! Line-oriented fence scanner.
//!
//! Two states: outside a fence, or inside one opened by a run of at least three
//! backticks (or tildes). A fence closes on a line holding only a run of the
//! same character that is at least as long as the opener. A fence still open
//! at end of input is reported with `closed == false`.

/// An opening or closing fence marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker<'a> {
    ch: char,
    len: usize,
    info: &'a str,
}

fn parse_marker(line: &str) -> Option<Marker<'_>> {
    let trimmed = line.trim_start();
    // Four or more columns of indentation is an indented code line, not a fence
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    if len < 3 {
        return None;
    }
    // marker chars are single-byte
    let info = trimmed[len..].trim();
    if ch == '`' && info.contains('`') {
        return None;
    }
    Some(Marker { ch, len, info })
}

/// Whether `line` opens or closes a fence
pub fn is_fence_marker(line: &str) -> bool {
    parse_marker(line).is_some()
}

/// One fenced region of a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedRegion<'a> {
    /// First word of the opener's info string, as written
    pub tag: Option<&'a str>,
    /// Lines between the markers, joined with `\n`
    pub body: String,
    /// Zero-based line number of the opening marker
    pub open_line: usize,
    pub closed: bool,
}

enum State<'a> {
    Outside,
    Inside {
        opener: Marker<'a>,
        open_line: usize,
        lines: Vec<&'a str>,
    },
}

/// Every fenced region of `text`, in order of appearance
pub fn fenced_regions(text: &str) -> Vec<FencedRegion<'_>> {
    let mut regions = Vec::new();
    let mut state = State::Outside;

    for (number, line) in text.lines().enumerate() {
        state = match state {
            State::Outside => match parse_marker(line) {
                Some(opener) => State::Inside {
                    opener,
                    open_line: number,
                    lines: Vec::new(),
                },
                None => State::Outside,
            },
            State::Inside {
                opener,
                open_line,
                mut lines,
            } => {
                let closes = parse_marker(line).is_some_and(|m| {
                    m.ch == opener.ch && m.len >= opener.len && m.info.is_empty()
                });
                if closes {
                    regions.push(region(opener, open_line, &lines, true));
                    State::Outside
                } else {
                    lines.push(line);
                    State::Inside {
                        opener,
                        open_line,
                        lines,
                    }
                }
            }
        };
    }

    if let State::Inside {
        opener,
        open_line,
        lines,
    } = state
    {
        regions.push(region(opener, open_line, &lines, false));
    }

    regions
}

fn region<'a>(opener: Marker<'a>, open_line: usize, lines: &[&str], closed: bool) -> FencedRegion<'a> {
    FencedRegion {
        tag: opener.info.split_whitespace().next(),
        body: lines.join("\n"),
        open_line,
        closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_markers() {
        assert!(is_fence_marker("```"));
        assert!(is_fence_marker("```python"));
        assert!(is_fence_marker("  ~~~~ java"));
        assert!(!is_fence_marker("``"));
        assert!(!is_fence_marker("    ```"));
        assert!(!is_fence_marker("use ``` inline"));
    }

    #[test]
    fn finds_regions_in_order() {
        let text = "intro\n```python\nimport os\n```\nmiddle\n```java\nclass A {}\n```\n";
        let regions = fenced_regions(text);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].tag, Some("python"));
        assert_eq!(regions[0].body, "import os");
        assert_eq!(regions[0].open_line, 1);
        assert_eq!(regions[1].tag, Some("java"));
        assert!(regions.iter().all(|r| r.closed));
    }

    #[test]
    fn info_words_after_tag_are_ignored() {
        let regions = fenced_regions("```python title=test_api.py\npass\n```");
        assert_eq!(regions[0].tag, Some("python"));
    }

    #[test]
    fn longer_fence_contains_shorter_one() {
        let text = "````markdown\n```python\nx = 1\n```\n````";
        let regions = fenced_regions(text);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].body, "```python\nx = 1\n```");
    }

    #[test]
    fn tagged_line_does_not_close() {
        let text = "```\nfirst\n```python\nsecond\n```";
        let regions = fenced_regions(text);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].body, "first\n```python\nsecond");
    }

    #[test]
    fn unclosed_fence_runs_to_end() {
        let regions = fenced_regions("text\n```python\ndef test():\n    pass");
        assert_eq!(regions.len(), 1);
        assert!(!regions[0].closed);
        assert_eq!(regions[0].body, "def test():\n    pass");
    }
}
