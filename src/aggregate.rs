use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use crate::models::{
    mean, CombinedDataset, CombinedSubject, ParsedFile, StudentEntry, StudentKey, SubjectId,
};

/// Merges per-file models (in input order) into one dataset.
pub fn aggregate(files: &[ParsedFile]) -> CombinedDataset {
    let subjects = merge_subjects(files);
    let students = merge_students(files);

    let grades: Vec<u32> = students
        .iter()
        .map(|s| s.grade)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let classes: Vec<String> = students
        .iter()
        .map(|s| format!("{}-{}", s.grade, s.class))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    info!(
        files = files.len(),
        subjects = subjects.len(),
        students = students.len(),
        "combined dataset built"
    );

    CombinedDataset {
        subjects,
        students,
        file_names: files.iter().map(|f| f.file_name.clone()).collect(),
        grades,
        classes,
    }
}

fn merge_subjects(files: &[ParsedFile]) -> Vec<CombinedSubject> {
    let mut merged: Vec<CombinedSubject> = Vec::new();
    let mut index: HashMap<SubjectId, usize> = HashMap::new();

    for summary in files.iter().flat_map(|f| f.subjects.iter()) {
        let position = *index.entry(summary.id.clone()).or_insert_with(|| {
            merged.push(CombinedSubject {
                id: summary.id.clone(),
                display_name: summary.display_name.clone(),
                scores: Vec::new(),
                averages: Vec::new(),
                class_averages: Vec::new(),
                score_averages: Vec::new(),
                average: 0.0,
                score_average: 0.0,
            });
            merged.len() - 1
        });

        let subject = &mut merged[position];
        subject.scores.extend_from_slice(&summary.scores);
        subject.averages.extend_from_slice(&summary.averages);
        if summary.class_average != 0.0 {
            subject.class_averages.push(summary.class_average);
        }
        if summary.score_average != 0.0 {
            subject.score_averages.push(summary.score_average);
        }
    }

    for subject in merged.iter_mut() {
        subject.average = mean(&subject.averages);
        subject.score_average = mean(&subject.scores);
    }
    merged
}

fn merge_students(files: &[ParsedFile]) -> Vec<StudentEntry> {
    let mut merged: Vec<StudentEntry> = Vec::new();
    let mut index: HashMap<StudentKey, usize> = HashMap::new();

    for student in files.iter().flat_map(|f| f.students_array.iter()) {
        match index.get(&student.key()).copied() {
            None => {
                index.insert(student.key(), merged.len());
                merged.push(student.clone());
            }
            Some(position) => {
                let existing = &mut merged[position];
                if existing.name != student.name {
                    debug!(
                        key = %student.key(),
                        kept = %existing.name,
                        other = %student.name,
                        "merging students with differing names"
                    );
                }
                merge_into(existing, student);
            }
        }
    }
    merged
}

/// Later keys overwrite earlier ones; the recomputed total counts only
/// subjects with a positive score.
fn merge_into(existing: &mut StudentEntry, other: &StudentEntry) {
    existing
        .scores
        .extend(other.scores.iter().map(|(k, v)| (k.clone(), *v)));
    existing
        .achievements
        .extend(other.achievements.iter().map(|(k, v)| (k.clone(), v.clone())));

    let positive: Vec<f64> = existing
        .scores
        .values()
        .copied()
        .filter(|score| *score > 0.0)
        .collect();
    existing.average_score = mean(&positive);
    existing.total_subjects = positive.len();
}
