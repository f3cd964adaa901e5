use std::collections::{BTreeMap, HashSet};

use anyhow::Context;
use chrono::Utc;

use crate::models::{
    GradeRecord, GradeTable, HardestSubject, ImprovingRow, SemesterAverage, SemesterOverall,
    StudentAverage, Subject, SubjectAverage, SubjectScores, Summary,
};
use crate::stats::mean_present;

/// Any present grade below this marks the student as failing.
pub const PASSING_GRADE: f64 = 50.0;

// Ascending key order; table order within a group.
fn group_by<'a, K, F>(table: &'a GradeTable, key: F) -> BTreeMap<K, Vec<&'a GradeRecord>>
where
    K: Ord,
    F: Fn(&'a GradeRecord) -> K,
{
    let mut groups: BTreeMap<K, Vec<&'a GradeRecord>> = BTreeMap::new();
    for record in table.records() {
        groups.entry(key(record)).or_default().push(record);
    }
    groups
}

fn subject_means(records: &[&GradeRecord]) -> SubjectScores {
    SubjectScores::from_fn(|subject| {
        mean_present(records.iter().map(|record| record.grades.get(subject)))
    })
}

/// Mean across the subject cells of a single row.
pub fn row_average(grades: &SubjectScores) -> Option<f64> {
    mean_present(grades.values())
}

/// First run of decimal digits in a semester label, e.g. `Semester 3` is 3.
pub fn semester_ordinal(label: &str) -> anyhow::Result<u64> {
    let start = label
        .find(|c: char| c.is_ascii_digit())
        .with_context(|| format!("semester '{label}' has no numeric component"))?;
    let digits = &label[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let digits = &digits[..end];
    digits
        .parse()
        .with_context(|| format!("semester '{label}' number {digits} is out of range"))
}

pub fn failing_students(table: &GradeTable) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut students = Vec::new();

    for record in table.records() {
        let failing = record
            .grades
            .values()
            .flatten()
            .any(|grade| grade < PASSING_GRADE);
        if failing && seen.insert(record.student.as_str()) {
            students.push(record.student.clone());
        }
    }

    students
}

pub fn average_by_semester(table: &GradeTable) -> Vec<SemesterAverage> {
    group_by(table, |record| record.semester.as_str())
        .into_iter()
        .map(|(semester, records)| SemesterAverage {
            semester: semester.to_string(),
            averages: subject_means(&records),
        })
        .collect()
}

/// Students tied at the highest overall average. The overall average is the
/// mean of the student's per-subject means, not a flat mean over every grade.
pub fn top_students(table: &GradeTable) -> Vec<StudentAverage> {
    let averages: Vec<StudentAverage> = group_by(table, |record| record.student.as_str())
        .into_iter()
        .filter_map(|(student, records)| {
            let subject_means = subject_means(&records);
            let overall_average = mean_present(subject_means.values())?;
            Some(StudentAverage {
                student: student.to_string(),
                subject_means,
                overall_average,
            })
        })
        .collect();

    let best = averages
        .iter()
        .map(|average| average.overall_average)
        .reduce(f64::max);

    match best {
        Some(best) => averages
            .into_iter()
            .filter(|average| average.overall_average == best)
            .collect(),
        None => Vec::new(),
    }
}

/// Mean of every present grade per subject, in identifier order.
pub fn subject_averages(table: &GradeTable) -> Vec<SubjectAverage> {
    Subject::ALL
        .iter()
        .map(|subject| SubjectAverage {
            subject: *subject,
            average: mean_present(
                table
                    .records()
                    .iter()
                    .map(|record| record.grades.get(*subject)),
            ),
        })
        .collect()
}

/// Lowest subject mean. Ties go to the subject first in identifier order.
pub fn hardest_subject(table: &GradeTable) -> Option<HardestSubject> {
    subject_averages(table)
        .into_iter()
        .filter_map(|entry| {
            entry.average.map(|average| HardestSubject {
                subject: entry.subject,
                average,
            })
        })
        .min_by(|a, b| a.average.total_cmp(&b.average))
}

struct SemesterPoint<'a> {
    ordinal: u64,
    semester: &'a str,
    average: Option<f64>,
}

fn strictly_increasing(points: &[SemesterPoint<'_>]) -> bool {
    points.len() >= 2
        && points.iter().all(|point| point.average.is_some())
        && points
            .windows(2)
            .all(|pair| matches!((pair[0].average, pair[1].average), (Some(a), Some(b)) if b > a))
}

/// Per-semester averages of every student whose average rose strictly from
/// each semester to the next, ordered by student and then by average.
pub fn improving_students(table: &GradeTable) -> anyhow::Result<Vec<ImprovingRow>> {
    let mut trends: BTreeMap<&str, Vec<SemesterPoint<'_>>> = BTreeMap::new();

    let groups = group_by(table, |record| {
        (record.student.as_str(), record.semester.as_str())
    });
    for ((student, semester), records) in groups {
        let ordinal = semester_ordinal(semester)?;
        let average = mean_present(records.iter().flat_map(|record| record.grades.values()));
        trends.entry(student).or_default().push(SemesterPoint {
            ordinal,
            semester,
            average,
        });
    }

    let mut rows = Vec::new();
    for (student, mut points) in trends {
        points.sort_by_key(|point| point.ordinal);
        if !strictly_increasing(&points) {
            continue;
        }
        for point in points {
            if let Some(average) = point.average {
                rows.push(ImprovingRow {
                    student: student.to_string(),
                    semester: point.semester.to_string(),
                    average,
                });
            }
        }
    }

    rows.sort_by(|a, b| {
        a.student
            .cmp(&b.student)
            .then(a.average.total_cmp(&b.average))
    });
    Ok(rows)
}

/// Mean of the per-row overall average for each semester.
pub fn semester_overall_averages(table: &GradeTable) -> Vec<SemesterOverall> {
    group_by(table, |record| record.semester.as_str())
        .into_iter()
        .map(|(semester, records)| SemesterOverall {
            semester: semester.to_string(),
            average: mean_present(records.iter().map(|record| row_average(&record.grades))),
        })
        .collect()
}

/// Runs every query. A failing improving-students query is kept in the summary
/// so the other results are still reported.
pub fn summarize(table: &GradeTable) -> Summary {
    let (improving_students, improving_error) = match improving_students(table) {
        Ok(rows) => (rows, None),
        Err(err) => (Vec::new(), Some(format!("{err:#}"))),
    };

    Summary {
        generated_at: Utc::now(),
        record_count: table.len(),
        failing_students: failing_students(table),
        semester_averages: average_by_semester(table),
        top_students: top_students(table),
        hardest_subject: hardest_subject(table),
        improving_students,
        improving_error,
        subject_averages: subject_averages(table),
        semester_overall: semester_overall_averages(table),
    }
}
