use std::collections::HashMap;

/// Parse the flat `key: value` line-oriented text returned by
/// `NotesReader::get_agent_notes` into a map, e.g.:
///
/// ```text
/// backend: coop
/// coop_url: http://coop.internal:8080
/// ```
///
/// Blank lines and lines without a `:` are skipped. Keys and values are
/// trimmed of surrounding whitespace.
pub fn parse(notes: &str) -> HashMap<String, String> {
    notes
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_key_value_lines() {
        let notes = "backend: coop\ncoop_url: http://coop.internal:8080\n";
        let parsed = parse(notes);
        assert_eq!(parsed.get("backend").map(String::as_str), Some("coop"));
        assert_eq!(parsed.get("coop_url").map(String::as_str), Some("http://coop.internal:8080"));
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let notes = "backend: coop\n\nno-colon-here\n";
        let parsed = parse(notes);
        assert_eq!(parsed.len(), 1);
    }
}
