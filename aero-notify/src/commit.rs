//! Turns the records of a committed transaction into published messages.

use crate::buffer::{NotificationRecord, TransactionBuffer};
use crate::event::Event;
use crate::host::CommitChanges;
use crate::payload;
use crate::uidset::UidSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Correlation {
    /// Leading copy records that received a uid
    pub matched: usize,
    /// Copy records left without a uid
    pub unmatched: usize,
    /// Saved uids left without a copy record
    pub surplus: usize,
}

/// Gives the n-th saved uid to the n-th copy record.
pub fn correlate(records: &mut [NotificationRecord], uids: &UidSet) -> Correlation {
    let mut result = Correlation::default();
    for record in records.iter_mut().filter(|r| r.event == Event::Copy) {
        match uids.nth(result.matched) {
            Some(uid) => {
                record.uid = uid;
                result.matched += 1;
            }
            None => result.unmatched += 1,
        }
    }
    result.surplus = uids.len().saturating_sub(result.matched);
    result
}

/// Correlates then publishes every matched record, one message each.
///
/// Failures are logged and counted, never returned: the mail transaction
/// is already committed. The buffer is released on every path.
///
/// Panics once the matched records are published if the host saved more
/// mails than it reported copies.
pub async fn process(mut buffer: TransactionBuffer, changes: &CommitChanges) {
    let correlation = correlate(buffer.records_mut(), &changes.saved_uids);
    publish_matched(&buffer, changes, correlation).await;

    if correlation.surplus > 0 {
        panic!(
            "{} uids saved but only {} copy records buffered",
            changes.saved_uids.len(),
            correlation.matched
        );
    }
}

async fn publish_matched(
    buffer: &TransactionBuffer,
    changes: &CommitChanges,
    correlation: Correlation,
) {
    let session = buffer.session().clone();
    let stats = session.registry().stats();
    tracing::debug!(
        user = session.username(),
        mailbox = buffer.mailbox(),
        records = buffer.len(),
        saved = changes.saved_uids.len(),
        "transaction committed"
    );

    if correlation.unmatched > 0 {
        stats.unmatched(correlation.unmatched);
        tracing::warn!(
            user = session.username(),
            mailbox = buffer.mailbox(),
            unmatched = correlation.unmatched,
            "copy records without saved uid, not published"
        );
    }
    if correlation.matched == 0 {
        return;
    }

    if !session.registry().is_registered() {
        stats.discarded(correlation.matched);
        tracing::warn!(
            user = session.username(),
            discarded = correlation.matched,
            "registry shut down, notifications dropped"
        );
        return;
    }

    let config = match session.broker() {
        Ok(config) => config.clone(),
        Err(e) => {
            stats.discarded(correlation.matched);
            tracing::error!(user = session.username(), err = %e, "no usable broker configuration");
            return;
        }
    };

    let mut handle = session.broker_handle();
    if let Err(e) = handle.connect().await {
        stats.connect_failed();
        stats.discarded(correlation.matched);
        tracing::error!(
            user = session.username(),
            address = %config.address(),
            err = %e,
            discarded = correlation.matched,
            "unable to reach broker"
        );
        return;
    }

    let matched = buffer
        .records()
        .iter()
        .filter(|r| r.event == Event::Copy)
        .take(correlation.matched);
    for record in matched {
        let body = match payload::serialize(session.username(), record) {
            Ok(body) => body,
            Err(e) => {
                stats.publish_failed();
                tracing::error!(user = session.username(), uid = record.uid, err = %e, "unable to encode notification");
                continue;
            }
        };

        match handle
            .publish(&config.exchange, &config.routing_key, &body)
            .await
        {
            Ok(()) => {
                stats.published();
                tracing::info!(
                    user = session.username(),
                    folder = %record.folder,
                    uid = record.uid,
                    exchange = %config.exchange,
                    "notification published"
                );
            }
            Err(e) => {
                stats.publish_failed();
                tracing::error!(
                    user = session.username(),
                    folder = %record.folder,
                    uid = record.uid,
                    err = %e,
                    "notification not published"
                );
            }
        }
    }

    handle.disconnect().await;
}
