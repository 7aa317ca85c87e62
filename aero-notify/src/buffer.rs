use std::sync::Arc;

use crate::event::Event;
use crate::session::UserSession;

/// One pending notification. The uid stays 0 until the commit assigns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub event: Event,
    pub uid: u32,
    pub folder: String,
}

impl NotificationRecord {
    pub fn copy(folder: impl Into<String>) -> Self {
        Self {
            event: Event::Copy,
            uid: 0,
            folder: folder.into(),
        }
    }
}

/// Records collected during one mailbox transaction.
///
/// The buffer is consumed by the commit or the rollback; dropping it,
/// whatever the path, releases it.
pub struct TransactionBuffer {
    session: Arc<UserSession>,
    mailbox: String,
    records: Vec<NotificationRecord>,
}

impl TransactionBuffer {
    pub fn begin(session: Arc<UserSession>, mailbox: impl Into<String>) -> Self {
        let mailbox = mailbox.into();
        session.registry().stats().buffer_opened();
        tracing::debug!(user = session.username(), mailbox = %mailbox, "transaction begin");
        Self {
            session,
            mailbox,
            records: Vec::new(),
        }
    }

    pub fn append(&mut self, record: NotificationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [NotificationRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn session(&self) -> &Arc<UserSession> {
        &self.session
    }

    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }
}

impl Drop for TransactionBuffer {
    fn drop(&mut self) {
        self.session.registry().stats().buffer_released();
        tracing::trace!(
            user = self.session.username(),
            mailbox = %self.mailbox,
            records = self.records.len(),
            "transaction buffer released"
        );
    }
}
