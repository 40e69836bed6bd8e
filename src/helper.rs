use chrono::{DateTime, FixedOffset, NaiveDateTime};
use log::trace;

/// Naive layouts Cubox has used for timestamps without an offset
const NAIVE_LAYOUTS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Translates a `yyyy-MM-dd HH:mm` style pattern into a chrono format string.
///
/// Letters that are not date tokens are copied through, as are all
/// non-letter characters. `%` is escaped so the result is always a valid
/// chrono format.
pub fn to_chrono_format(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }

        let token = match (c, run) {
            ('y' | 'Y', 4..) => Some("%Y"),
            ('y' | 'Y', 2) => Some("%y"),
            ('M', 4..) => Some("%B"),
            ('M', 3) => Some("%b"),
            ('M', 2) => Some("%m"),
            ('M', 1) => Some("%-m"),
            ('d' | 'D', 2) => Some("%d"),
            ('d' | 'D', 1) => Some("%-d"),
            ('H', 2) => Some("%H"),
            ('H', 1) => Some("%-H"),
            ('h', 2) => Some("%I"),
            ('h', 1) => Some("%-I"),
            ('m', 2) => Some("%M"),
            ('m', 1) => Some("%-M"),
            ('s', 2) => Some("%S"),
            ('s', 1) => Some("%-S"),
            ('a', 1) => Some("%p"),
            ('E', 4..) => Some("%A"),
            ('E', 1..=3) => Some("%a"),
            _ => None,
        };

        match token {
            Some(t) => out.push_str(t),
            None => {
                for _ in 0..run {
                    if c == '%' {
                        out.push_str("%%");
                    } else {
                        out.push(c);
                    }
                }
            }
        }
        i += run;
    }

    out
}

/// Parses a Cubox timestamp, keeping its original offset when present
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    // Cubox separates milliseconds with a colon: 2024-12-16T15:59:57:846+08:00
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S:%3f%:z") {
        return Some(dt);
    }

    NAIVE_LAYOUTS.iter().find_map(|layout| {
        NaiveDateTime::parse_from_str(raw, layout)
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

/// Formats a timestamp with a user date pattern; unparseable input is returned as-is
pub fn format_timestamp(raw: &str, pattern: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    match parse_timestamp(raw) {
        Some(dt) => dt.format(&to_chrono_format(pattern)).to_string(),
        None => {
            trace!("Leaving unparseable timestamp untouched: {}", raw);
            raw.to_string()
        }
    }
}

/// Splits a note into its leading `---` front matter block and the rest.
///
/// Returns `None` when the text does not start with a front matter block.
pub fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let body = &rest[offset + line.len()..];
            return Some((&rest[..offset], body));
        }
        offset += line.len();
    }

    None
}

// Helper method for parsing comma separated lists
pub fn parse_list(values: Option<String>) -> Vec<String> {
    values
        .map(|t| {
            t.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
