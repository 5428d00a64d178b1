//! Per-call attribution context.
//!
//! Passed explicitly as the first argument to every enricher and web-body
//! call instead of living in thread-local storage, so it composes cleanly
//! with a task-based worker pool where one OS thread serves many users.

#[derive(Debug, Clone)]
pub struct Context {
    pub user_id: String,
    pub trace: String,
}

impl Context {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            trace: uuid::Uuid::new_v4().to_string(),
        }
    }
}
