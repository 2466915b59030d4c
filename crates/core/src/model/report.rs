use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::CourseId;

/// Rounded percentage of `completed` over `total`, clamped to `0..=100`.
///
/// Returns 0 when `total` is 0.
#[must_use]
pub fn percent(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = completed as f64 / total as f64;
    let rounded = (ratio * 100.0).round().clamp(0.0, 100.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let value = rounded as u8;
    value
}

/// Completion figures for one course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CourseProgress {
    pub total: u32,
    pub completed: u32,
    pub progress: u8,
}

impl CourseProgress {
    #[must_use]
    pub fn new(total: u32, completed: u32) -> Self {
        Self {
            total,
            completed,
            progress: percent(u64::from(completed), u64::from(total)),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.progress == 100
    }
}

/// Per-course and overall completion for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    total_courses: usize,
    overall_progress: u8,
    courses: BTreeMap<CourseId, CourseProgress>,
}

impl ProgressReport {
    /// Build a report from the courses that had at least one video.
    ///
    /// `requested` is the number of course ids asked about, including any
    /// that were skipped for having no videos.
    #[must_use]
    pub fn from_courses(requested: usize, courses: BTreeMap<CourseId, CourseProgress>) -> Self {
        let (total, completed) = courses.values().fold((0_u64, 0_u64), |(t, c), course| {
            (t + u64::from(course.total), c + u64::from(course.completed))
        });
        Self {
            total_courses: requested,
            overall_progress: percent(completed, total),
            courses,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::from_courses(0, BTreeMap::new())
    }

    #[must_use]
    pub fn total_courses(&self) -> usize {
        self.total_courses
    }

    #[must_use]
    pub fn overall_progress(&self) -> u8 {
        self.overall_progress
    }

    #[must_use]
    pub fn courses(&self) -> &BTreeMap<CourseId, CourseProgress> {
        &self.courses
    }

    #[must_use]
    pub fn course(&self, id: &CourseId) -> Option<&CourseProgress> {
        self.courses.get(id)
    }

    /// Number of courses whose videos are all completed.
    #[must_use]
    pub fn completed_courses(&self) -> usize {
        self.courses.values().filter(|c| c.is_finished()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(0, 0), 0);
    }

    #[test]
    fn percent_clamps_overcounts() {
        assert_eq!(percent(7, 4), 100);
    }

    #[test]
    fn overall_weights_by_video_count() {
        let mut courses = BTreeMap::new();
        courses.insert(CourseId::new("a"), CourseProgress::new(4, 2));
        courses.insert(CourseId::new("b"), CourseProgress::new(6, 6));
        let report = ProgressReport::from_courses(3, courses);

        assert_eq!(report.total_courses(), 3);
        assert_eq!(report.overall_progress(), 80);
        assert_eq!(report.completed_courses(), 1);
        assert_eq!(report.course(&CourseId::new("a")).unwrap().progress, 50);
    }

    #[test]
    fn empty_report_has_no_division() {
        let report = ProgressReport::empty();
        assert_eq!(report.overall_progress(), 0);
        assert_eq!(report.total_courses(), 0);
        assert!(report.courses().is_empty());
    }

    #[test]
    fn serializes_dashboard_shape() {
        let mut courses = BTreeMap::new();
        courses.insert(CourseId::new("c"), CourseProgress::new(4, 2));
        let value = serde_json::to_value(ProgressReport::from_courses(1, courses)).unwrap();
        assert_eq!(value["totalCourses"], 1);
        assert_eq!(value["overallProgress"], 50);
        assert_eq!(value["courses"]["c"]["total"], 4);
        assert_eq!(value["courses"]["c"]["completed"], 2);
        assert_eq!(value["courses"]["c"]["progress"], 50);
    }
}
