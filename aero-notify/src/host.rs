//! What the mail server tells us about its users, mails and transactions.

use crate::config::Settings;
use crate::uidset::UidSet;

/// Storage backing the mails handed over by a delivery agent
pub const RAW_STORAGE: &str = "raw";

#[derive(Debug, Clone, Default)]
pub struct MailUser {
    pub username: String,
    pub settings: Settings,
}

impl MailUser {
    pub fn new(username: impl Into<String>, settings: Settings) -> Self {
        Self {
            username: username.into(),
            settings,
        }
    }
}

/// A mail as seen by a hook: its storage and its mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRef {
    pub storage: String,
    pub mailbox: String,
}

impl MailRef {
    pub fn new(storage: impl Into<String>, mailbox: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            mailbox: mailbox.into(),
        }
    }

    pub fn raw() -> Self {
        Self::new(RAW_STORAGE, "")
    }

    pub fn is_raw(&self) -> bool {
        self.storage == RAW_STORAGE
    }
}

/// Outcome of a committed transaction
#[derive(Debug, Clone, Default)]
pub struct CommitChanges {
    /// Identifiers given to the saved mails, in save order
    pub saved_uids: UidSet,
}

impl CommitChanges {
    pub fn new(saved_uids: UidSet) -> Self {
        Self { saved_uids }
    }
}
