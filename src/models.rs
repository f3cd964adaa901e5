use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Subjects graded in every record. Variants are declared in identifier order,
/// which is the order grouped results come out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Subject {
    Biology,
    Chemistry,
    English,
    Math,
    Physics,
}

impl Subject {
    /// Column order of the input table and of every tabular output.
    pub const COLUMNS: [Subject; 5] = [
        Subject::Math,
        Subject::Physics,
        Subject::Chemistry,
        Subject::Biology,
        Subject::English,
    ];

    /// Identifier order.
    pub const ALL: [Subject; 5] = [
        Subject::Biology,
        Subject::Chemistry,
        Subject::English,
        Subject::Math,
        Subject::Physics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Subject::Biology => "Biology",
            Subject::Chemistry => "Chemistry",
            Subject::English => "English",
            Subject::Math => "Math",
            Subject::Physics => "Physics",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One optional value per subject. `None` means the grade is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubjectScores {
    pub math: Option<f64>,
    pub physics: Option<f64>,
    pub chemistry: Option<f64>,
    pub biology: Option<f64>,
    pub english: Option<f64>,
}

impl SubjectScores {
    pub fn from_fn(mut f: impl FnMut(Subject) -> Option<f64>) -> Self {
        SubjectScores {
            math: f(Subject::Math),
            physics: f(Subject::Physics),
            chemistry: f(Subject::Chemistry),
            biology: f(Subject::Biology),
            english: f(Subject::English),
        }
    }

    pub fn get(&self, subject: Subject) -> Option<f64> {
        match subject {
            Subject::Math => self.math,
            Subject::Physics => self.physics,
            Subject::Chemistry => self.chemistry,
            Subject::Biology => self.biology,
            Subject::English => self.english,
        }
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        Subject::COLUMNS.iter().map(move |subject| self.get(*subject))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeRecord {
    pub student: String,
    pub semester: String,
    pub grades: SubjectScores,
}

/// The loaded input. Read-only once constructed.
#[derive(Debug, Clone, Default)]
pub struct GradeTable {
    records: Vec<GradeRecord>,
}

impl GradeTable {
    pub fn new(records: Vec<GradeRecord>) -> Self {
        GradeTable { records }
    }

    pub fn records(&self) -> &[GradeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterAverage {
    pub semester: String,
    pub averages: SubjectScores,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAverage {
    pub student: String,
    pub subject_means: SubjectScores,
    pub overall_average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HardestSubject {
    pub subject: Subject,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImprovingRow {
    pub student: String,
    pub semester: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub subject: Subject,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterOverall {
    pub semester: String,
    pub average: Option<f64>,
}

/// Every query result for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub record_count: usize,
    pub failing_students: Vec<String>,
    pub semester_averages: Vec<SemesterAverage>,
    pub top_students: Vec<StudentAverage>,
    pub hardest_subject: Option<HardestSubject>,
    pub improving_students: Vec<ImprovingRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improving_error: Option<String>,
    pub subject_averages: Vec<SubjectAverage>,
    pub semester_overall: Vec<SemesterOverall>,
}
