// src/lib.rs
//
// Mazurka: a micro web-framework dispatch core. Register routes on a
// `Router` (groups, before/after middleware, skip lists, timeouts), freeze
// it with `compile()`, then hand each incoming `Exchange` to
// `Dispatch::handle` from the protocol layer of your choice.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod logging;
mod matcher;
pub mod middleware;
mod response;
pub mod router;
pub mod static_files;

// Re-exports for users
pub use config::Config;
pub use context::{Context, ContextPool};
pub use dispatch::Dispatch;
pub use error::{MazurkaError, MazurkaResult};
pub use http::{Exchange, Method, Request, Response};
pub use logging::{init_logging, init_logging_with_level};
pub use middleware::{ErrorView, Flow, Middleware, View};
pub use router::{Group, RouteRef, Router, Timeout};
pub use static_files::StaticFiles;
