pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, status, started_at, submitted_at, graded_at, evaluated_at, \
    evaluated_by, answers, violation_count, cheating_detected, cheating_logs, \
    submission_reason, total_marks_obtained, total_marks_max, percentage_score, grade, \
    qualified, time_spent, questions_answered, progress_percentage, last_sequence, \
    final_payload_hash, version, created_at, updated_at";
