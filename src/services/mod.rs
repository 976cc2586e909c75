pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod code_runs;
pub(crate) mod errors;
pub(crate) mod evaluation;
pub(crate) mod finalize;
pub(crate) mod grading;
pub(crate) mod judge;
pub(crate) mod judge_jobs;
pub(crate) mod scoring;
pub(crate) mod source;
pub(crate) mod violations;
