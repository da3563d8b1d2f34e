use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::models::{mean, CombinedDataset, StudentEntry, StudentKey};

pub const DEFAULT_CATEGORY: &str = "기타";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub best: f64,
    pub worst: f64,
}

/// Statistics over every student average above zero.
pub fn overall_stats(students: &[StudentEntry]) -> Option<OverallStats> {
    let scores: Vec<f64> = students
        .iter()
        .map(|s| s.average_score)
        .filter(|score| *score > 0.0)
        .collect();
    if scores.is_empty() {
        return None;
    }

    let avg = mean(&scores);
    let variance = scores.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / scores.len() as f64;
    Some(OverallStats {
        count: scores.len(),
        mean: avg,
        std_dev: variance.sqrt(),
        best: scores.iter().copied().fold(f64::MIN, f64::max),
        worst: scores.iter().copied().fold(f64::MAX, f64::min),
    })
}

pub fn score_to_letter(score: f64) -> char {
    match score {
        s if s >= 90.0 => 'A',
        s if s >= 80.0 => 'B',
        s if s >= 70.0 => 'C',
        s if s >= 60.0 => 'D',
        _ => 'E',
    }
}

/// Counts of averaged students per letter, always listing A through E.
pub fn letter_distribution(students: &[StudentEntry]) -> Vec<(char, usize)> {
    let mut counts: Vec<(char, usize)> =
        ['A', 'B', 'C', 'D', 'E'].iter().map(|l| (*l, 0)).collect();
    for student in students.iter().filter(|s| s.average_score > 0.0) {
        let letter = score_to_letter(student.average_score);
        if let Some(entry) = counts.iter_mut().find(|(l, _)| *l == letter) {
            entry.1 += 1;
        }
    }
    counts
}

fn by_average_desc(a: &StudentEntry, b: &StudentEntry) -> Ordering {
    b.average_score
        .partial_cmp(&a.average_score)
        .unwrap_or(Ordering::Equal)
}

/// 1-based rank of every student inside their grade-class group. Ties keep
/// input order.
pub fn class_ranks(students: &[StudentEntry]) -> HashMap<StudentKey, usize> {
    let mut groups: HashMap<(u32, u32), Vec<&StudentEntry>> = HashMap::new();
    for student in students {
        groups
            .entry((student.grade, student.class))
            .or_default()
            .push(student);
    }

    let mut ranks = HashMap::new();
    for members in groups.values_mut() {
        members.sort_by(|a, b| by_average_desc(a, b));
        for (position, student) in members.iter().enumerate() {
            ranks.insert(student.key(), position + 1);
        }
    }
    ranks
}

pub fn top_students(students: &[StudentEntry], limit: usize) -> Vec<&StudentEntry> {
    let mut ranked: Vec<&StudentEntry> = students
        .iter()
        .filter(|s| s.average_score > 0.0)
        .collect();
    ranked.sort_by(|a, b| by_average_desc(a, b));
    ranked.truncate(limit);
    ranked
}

/// Splits "문학(2-1)" into ("문학", 2, 1).
pub fn split_display_name(display: &str) -> Option<(&str, u32, u32)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(.+)\((\d+)-(\d+)\)$").expect("valid regex"));
    let caps = re.captures(display)?;
    let name = caps.get(1)?.as_str();
    let grade = caps.get(2)?.as_str().parse().ok()?;
    let semester = caps.get(3)?.as_str().parse().ok()?;
    Some((name, grade, semester))
}

fn term_order(grade: u32, semester: u32) -> i64 {
    (i64::from(grade) - 1) * 2 + i64::from(semester)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermMark {
    pub name: String,
    pub score: f64,
    pub achievement: Option<String>,
}

/// A student's marks regrouped by (grade, semester).
pub fn group_by_semester(student: &StudentEntry) -> BTreeMap<(u32, u32), Vec<TermMark>> {
    let mut groups: BTreeMap<(u32, u32), Vec<TermMark>> = BTreeMap::new();
    for (display, score) in &student.scores {
        let Some((name, grade, semester)) = split_display_name(display) else {
            continue;
        };
        groups.entry((grade, semester)).or_default().push(TermMark {
            name: name.to_string(),
            score: *score,
            achievement: student
                .achievements
                .get(display)
                .filter(|a| !a.is_empty())
                .cloned(),
        });
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryItem {
    pub display: String,
    pub score: Option<f64>,
    pub achievement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub category: String,
    pub labels: Vec<String>,
    pub series: Vec<Option<f64>>,
    pub overall_average: f64,
    pub change_pct: Option<f64>,
    pub subject_count: usize,
    pub items: Vec<CategoryItem>,
}

#[derive(Default)]
struct CategoryAccumulator {
    terms: Vec<(u32, u32)>,
    term_scores: HashMap<(u32, u32), Vec<f64>>,
    overall: Vec<f64>,
    items: Vec<((u32, u32), CategoryItem)>,
}

impl CategoryAccumulator {
    fn register_term(&mut self, term: (u32, u32)) {
        if !self.terms.contains(&term) {
            self.terms.push(term);
        }
    }

    fn finish(mut self, category: String) -> CategoryStats {
        self.terms.sort_by_key(|(g, s)| term_order(*g, *s));
        let series: Vec<Option<f64>> = self
            .terms
            .iter()
            .map(|term| {
                self.term_scores
                    .get(term)
                    .filter(|values| !values.is_empty())
                    .map(|values| mean(values))
            })
            .collect();

        let first = series.iter().flatten().next().copied();
        let last = series.iter().rev().flatten().next().copied();
        let change_pct = match (first, last) {
            (Some(first), Some(last)) if first > 0.0 => Some((last - first) / first * 100.0),
            _ => None,
        };

        self.items.sort_by(|(ta, a), (tb, b)| {
            term_order(ta.0, ta.1)
                .cmp(&term_order(tb.0, tb.1))
                .then_with(|| a.display.cmp(&b.display))
        });

        CategoryStats {
            category,
            labels: self.terms.iter().map(|(g, s)| format!("{g}-{s}")).collect(),
            series,
            overall_average: mean(&self.overall),
            change_pct,
            subject_count: self.overall.len(),
            items: self.items.into_iter().map(|(_, item)| item).collect(),
        }
    }
}

/// Per-category view of one student, walking the combined subjects in
/// dataset order. Pass marks and missing or zero scores only register their
/// term.
pub fn category_stats(dataset: &CombinedDataset, student: &StudentEntry) -> Vec<CategoryStats> {
    let mut categories: Vec<(String, CategoryAccumulator)> = Vec::new();

    for subject in &dataset.subjects {
        let display = &subject.display_name;
        let Some((_, grade, semester)) = split_display_name(display) else {
            continue;
        };
        let term = (grade, semester);

        let category = match subject.id.category.trim() {
            "" => DEFAULT_CATEGORY.to_string(),
            other => other.to_string(),
        };
        let position = match categories.iter().position(|(name, _)| *name == category) {
            Some(position) => position,
            None => {
                categories.push((category, CategoryAccumulator::default()));
                categories.len() - 1
            }
        };
        let acc = &mut categories[position].1;

        let score = student.scores.get(display).copied();
        let achievement = student
            .achievements
            .get(display)
            .map(|a| a.to_uppercase())
            .filter(|a| !a.is_empty());

        acc.register_term(term);
        if let Some(value) = score.filter(|v| *v > 0.0) {
            if achievement.as_deref() != Some("P") {
                acc.term_scores.entry(term).or_default().push(value);
                acc.overall.push(value);
            }
        }

        if score.is_some() || achievement.is_some() {
            acc.items.push((
                term,
                CategoryItem {
                    display: format!("{}({grade}-{semester})", subject.id.name),
                    score: score.filter(|v| *v > 0.0),
                    achievement,
                },
            ));
        }
    }

    categories
        .into_iter()
        .map(|(category, acc)| acc.finish(category))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub grade: Option<u32>,
    pub class: Option<u32>,
    pub name: Option<String>,
}

impl StudentFilter {
    pub fn matches(&self, student: &StudentEntry) -> bool {
        if self.grade.is_some_and(|grade| grade != student.grade) {
            return false;
        }
        if self.class.is_some_and(|class| class != student.class) {
            return false;
        }
        match self.name.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => student
                .name
                .to_lowercase()
                .contains(&term.to_lowercase()),
            _ => true,
        }
    }
}

pub fn filter_students<'a>(
    students: &'a [StudentEntry],
    filter: &StudentFilter,
) -> Vec<&'a StudentEntry> {
    students.iter().filter(|s| filter.matches(s)).collect()
}
