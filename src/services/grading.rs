use crate::db::models::{AnswerEntry, Exam, ExamSubmission, GradeThresholds};
use crate::db::types::Grade;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GradeOutcome {
    pub(crate) grade: Grade,
    pub(crate) qualified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Totals {
    pub(crate) obtained: f64,
    pub(crate) max: f64,
    pub(crate) percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Progress {
    pub(crate) questions_answered: i32,
    pub(crate) progress_percentage: f64,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn grade(percentage: f64, thresholds: &GradeThresholds) -> GradeOutcome {
    if percentage >= thresholds.excellent_min {
        GradeOutcome { grade: Grade::Green, qualified: true }
    } else if percentage >= thresholds.qualification_percentage {
        GradeOutcome { grade: Grade::Amber, qualified: true }
    } else {
        GradeOutcome { grade: Grade::Red, qualified: false }
    }
}

/// Sums obtained marks over the exam's questions. Entries for questions the exam no longer
/// defines are ignored and unanswered questions contribute nothing.
pub(crate) fn compute_totals(exam: &Exam, answers: &[AnswerEntry]) -> Totals {
    let max = exam.max_marks();
    let obtained: f64 = exam
        .questions
        .iter()
        .filter_map(|question| {
            answers
                .iter()
                .find(|entry| entry.question_id == question.id)
                .map(|entry| entry.marks_obtained.max(0.0).min(question.marks.max(0.0)))
        })
        .sum();
    let obtained = round2(obtained);
    let percentage = if max > 0.0 { round2(obtained / max * 100.0) } else { 0.0 };

    Totals { obtained, max, percentage }
}

pub(crate) fn compute_progress(exam: &Exam, answers: &[AnswerEntry]) -> Progress {
    let answered = exam
        .questions
        .iter()
        .filter(|question| {
            answers.iter().any(|entry| entry.question_id == question.id && entry.answered)
        })
        .count();
    let total = exam.questions.len();
    let progress_percentage =
        if total == 0 { 0.0 } else { round2(answered as f64 / total as f64 * 100.0) };

    Progress { questions_answered: answered as i32, progress_percentage }
}

/// Writes totals and grade onto the submission from its current answers.
pub(crate) fn apply_totals(submission: &mut ExamSubmission, exam: &Exam) -> GradeOutcome {
    let totals = compute_totals(exam, &submission.answers.0);
    let outcome = grade(totals.percentage, &exam.thresholds);

    submission.total_marks_obtained = totals.obtained;
    submission.total_marks_max = totals.max;
    submission.percentage_score = totals.percentage;
    submission.grade = Some(outcome.grade);
    submission.qualified = outcome.qualified;

    outcome
}

pub(crate) fn apply_progress(submission: &mut ExamSubmission, exam: &Exam) {
    let progress = compute_progress(exam, &submission.answers.0);
    submission.questions_answered = progress.questions_answered;
    submission.progress_percentage = progress.progress_percentage;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Question, QuestionKind};

    fn theory(id: &str, marks: f64) -> Question {
        Question { id: id.into(), prompt: String::new(), marks, kind: QuestionKind::Theory }
    }

    fn exam(questions: Vec<Question>) -> Exam {
        Exam {
            id: "exam-1".into(),
            title: "Week 1".into(),
            course_id: None,
            week_number: None,
            questions,
            thresholds: GradeThresholds::default(),
        }
    }

    fn scored(question: &Question, marks: f64) -> AnswerEntry {
        let mut entry = AnswerEntry::unanswered(question);
        entry.answered = true;
        entry.marks_obtained = marks;
        entry
    }

    #[test]
    fn thresholds_split_green_amber_red() {
        let thresholds =
            GradeThresholds { qualification_percentage: 50.0, excellent_min: 80.0, good_min: 50.0 };

        assert_eq!(grade(79.99, &thresholds), GradeOutcome { grade: Grade::Amber, qualified: true });
        assert_eq!(grade(80.0, &thresholds), GradeOutcome { grade: Grade::Green, qualified: true });
        assert_eq!(grade(50.0, &thresholds), GradeOutcome { grade: Grade::Amber, qualified: true });
        assert_eq!(grade(49.99, &thresholds), GradeOutcome { grade: Grade::Red, qualified: false });
    }

    #[test]
    fn unanswered_questions_still_count_towards_max() {
        let earned = theory("q1", 6.0);
        let skipped = theory("q2", 4.0);
        let exam = exam(vec![earned.clone(), skipped]);

        let totals = compute_totals(&exam, &[scored(&earned, 6.0)]);

        assert_eq!(totals.max, 10.0);
        assert_eq!(totals.obtained, 6.0);
        assert_eq!(totals.percentage, 60.0);
    }

    #[test]
    fn empty_exam_scores_zero_percent() {
        let totals = compute_totals(&exam(Vec::new()), &[]);
        assert_eq!(totals.max, 0.0);
        assert_eq!(totals.percentage, 0.0);
        assert_eq!(grade(totals.percentage, &GradeThresholds::default()).grade, Grade::Red);
    }

    #[test]
    fn stray_and_inflated_entries_do_not_leak_into_totals() {
        let question = theory("q1", 2.0);
        let exam = exam(vec![question.clone()]);
        let stray = scored(&theory("removed", 5.0), 5.0);

        let totals = compute_totals(&exam, &[scored(&question, 3.0), stray]);

        assert_eq!(totals.obtained, 2.0);
        assert_eq!(totals.percentage, 100.0);
    }

    #[test]
    fn negative_question_marks_score_as_zero() {
        let broken = theory("q1", -2.0);
        let regular = theory("q2", 4.0);
        let exam = exam(vec![broken.clone(), regular.clone()]);

        let totals = compute_totals(&exam, &[scored(&broken, 1.0), scored(&regular, 2.0)]);

        assert_eq!(totals.max, 4.0);
        assert_eq!(totals.obtained, 2.0);
        assert_eq!(totals.percentage, 50.0);
    }

    #[test]
    fn progress_counts_answered_exam_questions() {
        let first = theory("q1", 1.0);
        let second = theory("q2", 1.0);
        let third = theory("q3", 1.0);
        let exam = exam(vec![first.clone(), second.clone(), third]);

        let progress =
            compute_progress(&exam, &[scored(&first, 0.0), AnswerEntry::unanswered(&second)]);

        assert_eq!(progress.questions_answered, 1);
        assert_eq!(progress.progress_percentage, 33.33);
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(1.0 / 3.0 * 3.0), 1.0);
        assert_eq!(round2(66.666), 66.67);
    }
}
