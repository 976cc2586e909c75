use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::{Exam, ExamRow};
use crate::repositories::store::{ExamCatalog, StoreError};

pub(crate) const COLUMNS: &str = "\
    id, title, course_id, week_number, questions, \
    qualification_percentage, excellent_min, good_min";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    let row = sqlx::query_as::<_, ExamRow>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Exam::from))
}

#[derive(Clone)]
pub(crate) struct PgExamCatalog {
    pool: PgPool,
}

impl PgExamCatalog {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamCatalog for PgExamCatalog {
    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(find_by_id(&self.pool, exam_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::QuestionKind;
    use crate::test_support::{insert_exam, test_database, two_question_exam, TEST_EXAM_ID};

    #[tokio::test]
    async fn catalog_reads_questions_from_jsonb() {
        let Some(db) = test_database().await else {
            return;
        };
        insert_exam(&db.pool, &two_question_exam()).await;
        let catalog = PgExamCatalog::new(db.pool.clone());

        let exam = catalog.find_exam(TEST_EXAM_ID).await.expect("find").expect("exam");
        assert_eq!(exam.questions.len(), 2);
        assert!(matches!(exam.questions[0].kind, QuestionKind::Mcq { .. }));
        assert_eq!(exam.max_marks(), 5.0);
        assert!(catalog.find_exam("missing").await.expect("find").is_none());
    }
}
