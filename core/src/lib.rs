//! Library interface for the briefing core's background pipelines.
//! This lets the binary and the integration tests share the same modules.

pub mod brief;
pub mod context;
pub mod credit;
pub mod email_ingress;
pub mod enrich;
pub mod enricher;
pub mod error;
pub mod fetch;
pub mod mailer;
pub mod model;
pub mod queue;
pub mod recovery;
pub mod searchsync;
pub mod store;
pub mod urlnorm;
pub mod webfetch;
