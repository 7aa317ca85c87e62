use std::sync::Arc;

use async_trait::async_trait;

use crate::buffer::{NotificationRecord, TransactionBuffer};
use crate::commit;
use crate::host::{CommitChanges, MailRef, MailUser};
use crate::registry::Registry;
use crate::session::UserSession;

/// Entry points called by the mail server.
///
/// The server owns the transaction handle between `transaction_begin` and
/// either `transaction_commit` or `transaction_rollback`, which consume it.
#[async_trait]
pub trait MailHooks: Send + Sync {
    type Session: Send + Sync;
    type Txn: Send;

    fn user_created(&self, user: &MailUser) -> Arc<Self::Session>;
    fn transaction_begin(&self, session: &Arc<Self::Session>, mailbox: &str) -> Self::Txn;
    fn mail_save(&self, txn: &mut Self::Txn, mail: &MailRef);
    fn mail_copy(&self, txn: &mut Self::Txn, src: &MailRef, dst: &MailRef);
    async fn transaction_commit(&self, txn: Self::Txn, changes: &CommitChanges);
    fn transaction_rollback(&self, txn: Self::Txn);
}

pub struct NotifyPlugin {
    registry: Arc<Registry>,
}

impl NotifyPlugin {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[async_trait]
impl MailHooks for NotifyPlugin {
    type Session = UserSession;
    type Txn = TransactionBuffer;

    fn user_created(&self, user: &MailUser) -> Arc<UserSession> {
        UserSession::from_user(self.registry.clone(), user)
    }

    fn transaction_begin(&self, session: &Arc<UserSession>, mailbox: &str) -> TransactionBuffer {
        TransactionBuffer::begin(session.clone(), mailbox)
    }

    fn mail_save(&self, _txn: &mut TransactionBuffer, _mail: &MailRef) {}

    fn mail_copy(&self, txn: &mut TransactionBuffer, src: &MailRef, dst: &MailRef) {
        if !src.is_raw() {
            return;
        }
        tracing::debug!(user = txn.session().username(), folder = %dst.mailbox, "injected mail buffered");
        txn.append(NotificationRecord::copy(dst.mailbox.as_str()));
    }

    async fn transaction_commit(&self, txn: TransactionBuffer, changes: &CommitChanges) {
        commit::process(txn, changes).await
    }

    fn transaction_rollback(&self, txn: TransactionBuffer) {
        tracing::debug!(
            user = txn.session().username(),
            mailbox = txn.mailbox(),
            dropped = txn.len(),
            "transaction rolled back"
        );
    }
}
