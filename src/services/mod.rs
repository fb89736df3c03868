pub(crate) mod attempts;
pub(crate) mod grading;
pub(crate) mod notifications;
pub(crate) mod question_bank;
pub(crate) mod scoring;
pub(crate) mod shuffle;
