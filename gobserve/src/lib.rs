//! Production-friendly observability hooks for chat dispatch.
//!
//! ```rust
//! use gobserve::{MetricsChatHooks, SafeChatHooks, TracingChatHooks};
//!
//! let _tracing = SafeChatHooks::new(TracingChatHooks);
//! let _metrics = MetricsChatHooks;
//! ```

mod fanout;
mod metrics_hooks;
mod safe_hooks;
mod tracing_hooks;

pub use fanout::FanoutChatHooks;
pub use metrics_hooks::MetricsChatHooks;
pub use safe_hooks::SafeChatHooks;
pub use tracing_hooks::TracingChatHooks;

pub mod prelude {
    pub use crate::{FanoutChatHooks, MetricsChatHooks, SafeChatHooks, TracingChatHooks};
}

#[cfg(test)]
mod tests;
