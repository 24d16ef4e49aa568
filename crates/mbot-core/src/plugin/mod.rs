//! Plugin capability framework.
//!
//! # Architecture
//!
//! A **plugin** is a configured use of a **module**:
//!
//! - The [`PluginDescriptor`] comes from configuration. It names the plugin,
//!   the entry point for each [`Role`] it fills, its URL path patterns, an
//!   optional config file and the extra channels it needs.
//! - The [`Module`] is the loaded code. It exports named, typed
//!   [`EntryPoint`]s. A [`ModuleSource`] turns a module reference into a
//!   [`ModuleHandle`]; the built-in [`ModuleCatalog`] resolves names against
//!   modules linked into the binary with [`register_module!`].
//! - The [`Loader`] checks the descriptor against the module once, at load
//!   time: mandatory entry points must exist with the right shape, optional
//!   roles are bound independently. The result is a [`LoadedPlugin`] whose
//!   entry points are already typed for their role.
//!
//! # Module contract
//!
//! | Symbol | Shape | When |
//! |--------|-------|------|
//! | `SetChannels` | `(main, status, debug)` | always required, called once |
//! | `LoadConfig` | `(path)` | required iff the descriptor names a config file, called once before `SetChannels` |
//! | handler | HTTP request → response | optional |
//! | watcher / mention handler | `(event, post, bot)` | optional |
//! | help handler | `(user_id, message, bot)` | optional |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use mbot_core::prelude::*;
//!
//! fn create() -> StaticModule {
//!     StaticModule::new("hello")
//!         .export("SetChannels", EntryPoint::set_channels(|_, _, _| {}))
//!         .export("OnPost", EntryPoint::event(|_event, post, bot| async move {
//!             bot.reply(&post, "hello!").await?;
//!             Ok(())
//!         }))
//! }
//!
//! register_module!(HELLO, "hello", create);
//! ```

pub mod descriptor;
pub mod entry;
pub mod loader;
pub mod macros;
pub mod module;

pub use descriptor::{PluginDescriptor, Role};
pub use entry::{
    EntryPoint, EntryShape, EventFn, HelpFn, HttpFn, LoadConfigFn, SetChannelsFn,
};
pub use loader::{BoundRole, LoadedPlugin, Loader};
pub use module::{
    MODULES, Module, ModuleCatalog, ModuleDescriptor, ModuleHandle, ModuleSource, StaticModule,
};

/// Symbol every module must export.
pub const SET_CHANNELS: &str = "SetChannels";

/// Symbol required when the descriptor names a config file.
pub const LOAD_CONFIG: &str = "LoadConfig";
