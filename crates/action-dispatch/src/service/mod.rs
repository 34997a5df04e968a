//! # Service Layer
//!
//! Wires the domain to the ports: the handler table, the reconnect
//! policy, and the dispatcher run loop.

pub mod dispatcher;
pub mod handlers;
pub mod reconnect;

pub use dispatcher::{Dispatcher, DispatcherHandle, HandleError};
pub use handlers::{action_handler, ActionContext, ActionHandler, HandlerError, HandlerSpec};
pub use reconnect::{ConnectionState, ReconnectTimer, DEFAULT_RECONNECT_DELAY};
