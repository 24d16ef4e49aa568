//! Remote server objects.
//!
//! Field names follow the Mattermost API v4 wire format. Unknown fields are
//! ignored so newer servers keep working.

mod channel;
mod event;
mod post;

pub use channel::{Channel, ChannelIds, ChannelType, Team, User};
pub use event::{Broadcast, WebSocketEvent, event_type};
pub use post::{NewPost, Post};
