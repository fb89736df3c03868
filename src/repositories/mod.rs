pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod exams;
pub(crate) mod health;
pub(crate) mod store;
