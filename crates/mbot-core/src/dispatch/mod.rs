//! Dispatch router.
//!
//! # Roles
//!
//! | Role | Fed by | Receives |
//! |------|--------|----------|
//! | Handler | [`HttpRouter`](crate::HttpRouter) | the HTTP request, unmodified |
//! | Watcher | own subscription | every `posted` event with its decoded post |
//! | MentionHandler | own subscription | `posted` events mentioning the bot |
//! | HelpHandler | [`HelpRegistry`](crate::HelpRegistry) | help requests naming the plugin |
//!
//! Every stream role owns a dedicated subscription, so a slow entry point
//! stalls only its own role. Ordering holds within one role's stream, not
//! across roles.
//!
//! Help requests are answered by a single owner: the first MentionHandler
//! role, or a help desk with its own subscription when there is none.
//!
//! # Isolation
//!
//! Every entry-point call goes through a [`CallGuard`]. A panic is caught,
//! logged with plugin, role and symbol, and the role continues with the next
//! event. With a call timeout configured, a hung call is abandoned the same
//! way.

mod binder;
pub mod isolate;
mod stream;

pub use binder::{Activation, RoleBinder};
pub use isolate::{CallGuard, CallOutcome, CallSite};
pub use stream::{Delivery, StreamRole};
