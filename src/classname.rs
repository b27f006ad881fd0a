use regex::Regex;
use std::sync::OnceLock;

/// The grade level and section a well-formed class name encodes.
///
/// "2D" is grade 2, section D. "RB" is the reception year (level 0),
/// section B. Matching is anchored and case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedClassName {
    pub level: i64,
    pub section: char,
}

fn class_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(R|\d{1,2})([A-F])$").expect("class name pattern"))
}

/// Extract the intended grade level from a class display name.
///
/// Returns `None` for anything that does not match `(R|\d{1,2})[A-F]`.
/// The digits are not range-checked here: "13A" parses to level 13 even
/// though no seeded grade has that level. Range validation happens at
/// grade lookup, where a missing level is a skip condition.
pub fn parse_class_name(name: &str) -> Option<ParsedClassName> {
    let caps = class_name_pattern().captures(name)?;
    let grade_part = caps[1].to_ascii_uppercase();
    let level = if grade_part == "R" {
        0
    } else {
        // One or two decimal digits; cannot overflow i64.
        grade_part.parse::<i64>().ok()?
    };
    let section = caps[2].chars().next()?.to_ascii_uppercase();
    Some(ParsedClassName { level, section })
}

/// The display token for a grade level: "R" for the reception year,
/// the decimal level otherwise. Inverse of the grade part of
/// `parse_class_name` for seeded names.
pub fn level_token(level: i64) -> String {
    if level == 0 {
        "R".to_string()
    } else {
        level.to_string()
    }
}
