// ABOUTME: Stanza parser for word list files
// ABOUTME: Turns blank-line separated alias/reply blocks into ordered entries

use indexmap::IndexSet;

use super::error::ParseError;

/// One alias group and the template lines it replies with.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub aliases: IndexSet<String>,
    pub lines: Vec<String>,
    pub line: usize,
}

impl Entry {
    pub fn matches(&self, trigger: &str) -> bool {
        self.aliases.contains(trigger)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub entries: Vec<Entry>,
    pub diagnostics: Vec<ParseError>,
}

struct PendingStanza {
    aliases: IndexSet<String>,
    line: usize,
    lines: Vec<String>,
}

impl PendingStanza {
    fn finish(self, outcome: &mut ParseOutcome) {
        if self.lines.is_empty() {
            outcome.diagnostics.push(ParseError::EmptyStanza {
                line: self.line,
                aliases: self.aliases.into_iter().collect(),
            });
        } else {
            outcome.entries.push(Entry {
                aliases: self.aliases,
                lines: self.lines,
                line: self.line,
            });
        }
    }
}

/// Parse word list content into entries, preserving file order.
///
/// Every line is trimmed. A blank line closes the current stanza; the first
/// line of a stanza is a `|` separated alias list and the rest are reply
/// lines, with the two-character `\n` escape turned into a newline.
pub fn parse_entries(content: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut pending: Option<PendingStanza> = None;

    for (index, raw) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();

        if line.is_empty() {
            if let Some(stanza) = pending.take() {
                stanza.finish(&mut outcome);
            }
            continue;
        }

        match pending.as_mut() {
            Some(stanza) => stanza.lines.push(line.replace("\\n", "\n")),
            None => {
                let aliases: IndexSet<String> = line
                    .split('|')
                    .map(str::trim)
                    .filter(|alias| !alias.is_empty())
                    .map(str::to_string)
                    .collect();

                // A line of bare separators is skipped; the next line becomes the alias line.
                if !aliases.is_empty() {
                    pending = Some(PendingStanza {
                        aliases,
                        line: line_number,
                        lines: Vec::new(),
                    });
                }
            }
        }
    }

    if let Some(stanza) = pending.take() {
        stanza.finish(&mut outcome);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_alias_and_line_order() {
        let outcome = parse_entries("hi|hello|hey\nfirst\nsecond\nthird\n");

        assert_eq!(outcome.entries.len(), 1);
        let entry = &outcome.entries[0];
        let aliases: Vec<&str> = entry.aliases.iter().map(String::as_str).collect();
        assert_eq!(aliases, vec!["hi", "hello", "hey"]);
        assert_eq!(entry.lines, vec!["first", "second", "third"]);
        assert_eq!(entry.line, 1);
    }

    #[test]
    fn test_multiple_stanzas_track_line_numbers() {
        let content = "a\nreply a\n\n\nb|c\nreply b\n";
        let outcome = parse_entries(content);

        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].line, 1);
        assert_eq!(outcome.entries[1].line, 5);
        assert!(outcome.entries[1].matches("c"));
        assert!(!outcome.entries[1].matches("b|c"));
    }

    #[test]
    fn test_trims_aliases_and_lines() {
        let outcome = parse_entries("  hi | there  \n   padded reply   \n");

        let entry = &outcome.entries[0];
        assert!(entry.matches("hi"));
        assert!(entry.matches("there"));
        assert_eq!(entry.lines, vec!["padded reply"]);
    }

    #[test]
    fn test_newline_escape_is_expanded() {
        let outcome = parse_entries("menu\none\\ntwo\n");
        assert_eq!(outcome.entries[0].lines, vec!["one\ntwo"]);
    }

    #[test]
    fn test_stanza_without_body_is_dropped() {
        let outcome = parse_entries("lonely\n\nhi\nhello\n");

        assert_eq!(outcome.entries.len(), 1);
        assert!(outcome.entries[0].matches("hi"));
        assert_eq!(
            outcome.diagnostics,
            vec![ParseError::EmptyStanza {
                line: 1,
                aliases: vec!["lonely".to_string()],
            }]
        );
    }

    #[test]
    fn test_separator_only_line_is_skipped() {
        let outcome = parse_entries("||\nhi\nhello\n");

        assert_eq!(outcome.entries.len(), 1);
        assert!(outcome.entries[0].matches("hi"));
        assert_eq!(outcome.entries[0].line, 2);
        assert_eq!(outcome.entries[0].lines, vec!["hello"]);
    }

    #[test]
    fn test_empty_content() {
        let outcome = parse_entries("\n\n   \n");
        assert!(outcome.entries.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_windows_line_endings() {
        let outcome = parse_entries("hi\r\nhello\r\n\r\nbye\r\nsee you\r\n");
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].lines, vec!["hello"]);
        assert_eq!(outcome.entries[1].line, 4);
    }
}
