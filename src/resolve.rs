//! Resolution of `{{latest}}` log path patterns.
//!
//! A pattern like `logs/app-{{latest}}.log` names whichever concrete file in
//! `logs/` carries the newest embedded timestamp (`app-2024-01-02.log`,
//! `app-2024-01-02T10-30-00.log`, ...). Resolution is pure over a snapshot of
//! directory entries and safe to repeat concurrently with file rotation; when
//! nothing matches or the directory cannot be listed, the placeholder falls
//! back to the literal word `latest`.

use regex::Regex;

/// Marker token replaced by the newest matching timestamp.
pub const LATEST_PLACEHOLDER: &str = "{{latest}}";

/// Resolves a pattern to a concrete path string.
///
/// Patterns without the placeholder pass through unchanged.
pub fn resolve_latest(pattern: &str) -> String {
    let Some((before, after)) = pattern.split_once(LATEST_PLACEHOLDER) else {
        return pattern.to_string();
    };
    let fallback = format!("{}latest{}", before, after);
    let (dir, name_prefix) = split_dir_prefix(before);
    let list_dir = if dir.is_empty() { "." } else { dir };

    let entries = match std::fs::read_dir(list_dir) {
        Ok(read) => read
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>(),
        Err(_) => return fallback,
    };

    match pick_latest(name_prefix, after, &entries) {
        Some(name) => format!("{}{}", dir, name),
        None => fallback,
    }
}

/// Splits the text before the placeholder into directory part (including the
/// trailing separator) and file-name prefix.
fn split_dir_prefix(before: &str) -> (&str, &str) {
    match before.rfind(['/', '\\']) {
        Some(idx) => (&before[..=idx], &before[idx + 1..]),
        None => ("", before),
    }
}

/// Picks the entry with the greatest embedded timestamp from a directory
/// snapshot, ties broken by name order. Returns the full file name.
pub fn pick_latest(prefix: &str, suffix: &str, entries: &[String]) -> Option<String> {
    let pattern = format!(
        "^{}(\\d{{4}}-\\d{{2}}-\\d{{2}}(?:T\\d{{2}}-\\d{{2}}-\\d{{2}})?){}$",
        regex::escape(prefix),
        regex::escape(suffix)
    );
    let regex = Regex::new(&pattern).ok()?;

    entries
        .iter()
        .filter_map(|name| {
            let captures = regex.captures(name)?;
            let stamp = parse_stamp(captures.get(1)?.as_str())?;
            Some((stamp, name.clone()))
        })
        .max()
        .map(|(_, name)| name)
}

/// Parses `YYYY-MM-DD` with optional `THH-MM-SS` into a comparable tuple.
/// A date-only token sorts as midnight.
fn parse_stamp(token: &str) -> Option<(u16, u8, u8, u8, u8, u8)> {
    let (date, time) = match token.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (token, None),
    };

    let mut date_parts = date.split('-');
    let year: u16 = date_parts.next()?.parse().ok()?;
    let month: u8 = date_parts.next()?.parse().ok()?;
    let day: u8 = date_parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let (hour, minute, second) = match time {
        Some(time) => {
            let mut time_parts = time.split('-');
            let hour: u8 = time_parts.next()?.parse().ok()?;
            let minute: u8 = time_parts.next()?.parse().ok()?;
            let second: u8 = time_parts.next()?.parse().ok()?;
            if hour >= 24 || minute >= 60 || second >= 60 {
                return None;
            }
            (hour, minute, second)
        }
        None => (0, 0, 0),
    };

    Some((year, month, day, hour, minute, second))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn passthrough_without_placeholder() {
        assert_eq!(resolve_latest("logs/app.log"), "logs/app.log");
    }

    #[test]
    fn falls_back_to_literal_latest_when_nothing_matches() {
        assert_eq!(
            pick_latest("prefix-", ".log", &names(&["unrelated.txt"])),
            None
        );
        // No matching files on disk either: the resolver substitutes "latest".
        assert_eq!(
            resolve_latest("no-such-dir-for-tests/prefix-{{latest}}.log"),
            "no-such-dir-for-tests/prefix-latest.log"
        );
    }

    #[test]
    fn picks_the_newest_date() {
        let entries = names(&["app-2024-01-01.log", "app-2024-01-02.log"]);
        assert_eq!(
            pick_latest("app-", ".log", &entries),
            Some("app-2024-01-02.log".to_string())
        );
    }

    #[test]
    fn date_time_token_compares_against_plain_dates() {
        let entries = names(&["svc-2024-05-01.log", "svc-2024-05-03T10-00-00.log"]);
        assert_eq!(
            pick_latest("svc-", ".log", &entries),
            Some("svc-2024-05-03T10-00-00.log".to_string())
        );
    }

    #[test]
    fn equal_stamps_break_ties_by_name_order() {
        // Same instant once parsed; the lexically greater name wins so the
        // choice is deterministic.
        let entries = names(&["a-2024-01-01.log", "a-2024-01-01T00-00-00.log"]);
        assert_eq!(
            pick_latest("a-", ".log", &entries),
            Some("a-2024-01-01T00-00-00.log".to_string())
        );
    }

    #[test]
    fn rejects_impossible_dates_and_times() {
        assert!(parse_stamp("2024-13-01").is_none());
        assert!(parse_stamp("2024-01-32").is_none());
        assert!(parse_stamp("2024-01-01T25-00-00").is_none());
        assert_eq!(parse_stamp("2024-01-02"), Some((2024, 1, 2, 0, 0, 0)));
        assert_eq!(
            parse_stamp("2024-01-02T03-04-05"),
            Some((2024, 1, 2, 3, 4, 5))
        );
    }

    #[test]
    fn prefix_with_directory_keeps_directory_in_result() {
        let (dir, prefix) = split_dir_prefix("logs/app-");
        assert_eq!(dir, "logs/");
        assert_eq!(prefix, "app-");
        let (dir, prefix) = split_dir_prefix("app-");
        assert_eq!(dir, "");
        assert_eq!(prefix, "app-");
    }

    #[test]
    fn regex_metacharacters_in_literals_are_escaped() {
        let entries = names(&["a+b-2024-01-01.log", "axb-2024-01-02.log"]);
        assert_eq!(
            pick_latest("a+b-", ".log", &entries),
            Some("a+b-2024-01-01.log".to_string())
        );
    }
}
