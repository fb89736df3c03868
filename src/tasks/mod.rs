pub(crate) mod expiry;
pub(crate) mod scheduler;
