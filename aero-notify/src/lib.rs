//! Publishes a message to an AMQP broker for every mail injected by a
//! delivery agent, once the mailbox transaction holding it is committed.
//!
//! The mail server drives the [`plugin::MailHooks`] of a
//! [`plugin::NotifyPlugin`]; each message body is
//! `{"user":"alice","folder":"INBOX","uid":42}`.

pub mod broker;
pub mod buffer;
pub mod commit;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod payload;
pub mod plugin;
pub mod registry;
pub mod session;
pub mod uidset;

#[cfg(test)]
mod test_support;

pub use error::{ConfigError, NotifyError};
pub use plugin::{MailHooks, NotifyPlugin};
pub use registry::Registry;
