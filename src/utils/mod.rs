/// Undo logs unwinding partially completed construction.
pub(crate) mod rollback;
