pub(crate) mod exams;
pub(crate) mod progress;
pub(crate) mod store;
pub(crate) mod submissions;
