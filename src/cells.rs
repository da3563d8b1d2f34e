use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Achievement, AchievementLevel, CellValue, ScorePair};

fn page_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\s*/\s*\d+$").expect("valid regex"))
}

/// Splits "79/83.8" into the raw score and the subject average.
pub fn parse_score(text: &str) -> Option<ScorePair> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?)/(\d+(?:\.\d+)?)").expect("valid regex")
    });
    let caps = re.captures(text)?;
    let original = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let average = caps.get(2)?.as_str().parse::<f64>().ok()?;
    Some(ScorePair { original, average })
}

/// Reads "C(195)" as level plus cohort size, or a bare "A".."E"/"P".
pub fn parse_achievement(text: &str) -> Option<Achievement> {
    static WITH_COHORT: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();
    let with_cohort = WITH_COHORT
        .get_or_init(|| Regex::new(r"(?i)([A-E])\s*\((\d+)\)").expect("valid regex"));
    let bare = BARE.get_or_init(|| Regex::new(r"(?i)^([A-EP])$").expect("valid regex"));

    let text = text.trim();
    if let Some(caps) = with_cohort.captures(text) {
        let level = level_of(caps.get(1)?.as_str())?;
        let cohort_size = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        return Some(Achievement { level, cohort_size });
    }
    let caps = bare.captures(text)?;
    Some(Achievement {
        level: level_of(caps.get(1)?.as_str())?,
        cohort_size: None,
    })
}

fn level_of(letter: &str) -> Option<AchievementLevel> {
    letter.chars().next().and_then(AchievementLevel::from_letter)
}

/// Page footer rows such as "1 / 37", possibly split over several cells.
pub fn is_page_artifact_row(row: &[CellValue]) -> bool {
    let parts: Vec<String> = row
        .iter()
        .map(|cell| cell.text().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();
    if parts.is_empty() {
        return false;
    }
    let joined = parts.join(" ");
    let joined = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    page_marker_re().is_match(&joined)
}

/// Subject-name cells that are really numbers, slashes or page markers.
pub fn is_non_subject_cell(cell: &CellValue) -> bool {
    if matches!(cell, CellValue::Empty) {
        return true;
    }
    let text = cell.text();
    let text = text.trim();
    text.is_empty()
        || text == "/"
        || text.chars().all(|c| c.is_ascii_digit())
        || page_marker_re().is_match(text)
}
