use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::buffer::NotificationRecord;
use crate::error::NotifyError;

/// Body of a published message:
/// `{"user":"alice","folder":"INBOX","uid":42}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification<'a> {
    #[serde(borrow)]
    pub user: Cow<'a, str>,
    #[serde(borrow)]
    pub folder: Cow<'a, str>,
    pub uid: u32,
}

impl<'a> Notification<'a> {
    pub fn new(user: &'a str, record: &'a NotificationRecord) -> Self {
        Self {
            user: Cow::Borrowed(user),
            folder: Cow::Borrowed(record.folder.as_str()),
            uid: record.uid,
        }
    }
}

pub fn serialize(username: &str, record: &NotificationRecord) -> Result<Vec<u8>, NotifyError> {
    Ok(serde_json::to_vec(&Notification::new(username, record))?)
}

pub fn deserialize(body: &[u8]) -> Result<Notification<'_>, NotifyError> {
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(folder: &str, uid: u32) -> NotificationRecord {
        NotificationRecord {
            uid,
            ..NotificationRecord::copy(folder)
        }
    }

    #[test]
    fn exact_layout() {
        let body = serialize("alice", &record("INBOX", 42)).unwrap();
        assert_eq!(body, br#"{"user":"alice","folder":"INBOX","uid":42}"#.to_vec());
    }

    #[test]
    fn special_characters_survive() {
        let rec = record("Boîte \"spéciale\"/Archives\\2024", u32::MAX);
        let body = serialize("jean.dupont@exemple.fr", &rec).unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains(r#"\"spéciale\""#));
        assert!(text.contains(r#"Archives\\2024"#));

        let back = deserialize(&body).unwrap();
        assert_eq!(back.user, "jean.dupont@exemple.fr");
        assert_eq!(back.folder, rec.folder);
        assert_eq!(back.uid, u32::MAX);
    }

    #[test]
    fn garbage_is_refused() {
        assert!(matches!(
            deserialize(b"{\"user\":\"alice\"}"),
            Err(NotifyError::Encode(_))
        ));
    }
}
