use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// A value that can be stored in a `FlagSet`
pub trait Flag: Copy + Eq + fmt::Debug + 'static {
    const ALL: &'static [Self];
    fn bit(self) -> u16;
    fn name(self) -> &'static str;
}

/// Mailbox operations that may be exported.
///
/// Only `Copy` is currently recorded (a delivery agent injecting a mail),
/// the other kinds are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Delete,
    Undelete,
    Expunge,
    Save,
    Copy,
    MailboxCreate,
    MailboxDelete,
    MailboxRename,
    FlagChange,
}

impl Flag for Event {
    const ALL: &'static [Self] = &[
        Self::Delete,
        Self::Undelete,
        Self::Expunge,
        Self::Save,
        Self::Copy,
        Self::MailboxCreate,
        Self::MailboxDelete,
        Self::MailboxRename,
        Self::FlagChange,
    ];

    fn bit(self) -> u16 {
        match self {
            Self::Delete => 0x01,
            Self::Undelete => 0x02,
            Self::Expunge => 0x04,
            Self::Save => 0x08,
            Self::Copy => 0x10,
            Self::MailboxCreate => 0x20,
            Self::MailboxDelete => 0x40,
            Self::MailboxRename => 0x80,
            Self::FlagChange => 0x100,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Undelete => "undelete",
            Self::Expunge => "expunge",
            Self::Save => "save",
            Self::Copy => "copy",
            Self::MailboxCreate => "mailbox_create",
            Self::MailboxDelete => "mailbox_delete",
            Self::MailboxRename => "mailbox_rename",
            Self::FlagChange => "flag_change",
        }
    }
}

/// Message attributes a consumer may ask for. The payload currently
/// carries the uid and the mailbox only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Uid,
    #[serde(rename = "box")]
    Mailbox,
    #[serde(rename = "msgid")]
    MessageId,
    #[serde(rename = "psize")]
    PhysicalSize,
    #[serde(rename = "vsize")]
    VirtualSize,
    Flags,
    From,
    Subject,
}

impl Flag for Field {
    const ALL: &'static [Self] = &[
        Self::Uid,
        Self::Mailbox,
        Self::MessageId,
        Self::PhysicalSize,
        Self::VirtualSize,
        Self::Flags,
        Self::From,
        Self::Subject,
    ];

    fn bit(self) -> u16 {
        match self {
            Self::Uid => 0x01,
            Self::Mailbox => 0x02,
            Self::MessageId => 0x04,
            Self::PhysicalSize => 0x08,
            Self::VirtualSize => 0x10,
            Self::Flags => 0x20,
            Self::From => 0x40,
            Self::Subject => 0x80,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Uid => "uid",
            Self::Mailbox => "box",
            Self::MessageId => "msgid",
            Self::PhysicalSize => "psize",
            Self::VirtualSize => "vsize",
            Self::Flags => "flags",
            Self::From => "from",
            Self::Subject => "subject",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FlagSet<T> {
    bits: u16,
    _kind: PhantomData<T>,
}

pub type EventSet = FlagSet<Event>;
pub type FieldSet = FlagSet<Field>;

impl<T: Flag> FlagSet<T> {
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            _kind: PhantomData,
        }
    }

    pub fn only(flag: T) -> Self {
        let mut set = Self::empty();
        set.insert(flag);
        set
    }

    pub fn insert(&mut self, flag: T) {
        self.bits |= flag.bit();
    }

    pub fn remove(&mut self, flag: T) {
        self.bits &= !flag.bit();
    }

    pub fn contains(&self, flag: T) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        T::ALL.iter().copied().filter(move |f| self.contains(*f))
    }

    /// Parses a list of names separated by spaces or commas.
    pub fn parse(list: &str) -> Result<Self, String> {
        list.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|name| !name.is_empty())
            .map(|name| {
                T::ALL
                    .iter()
                    .copied()
                    .find(|f| f.name().eq_ignore_ascii_case(name))
                    .ok_or_else(|| format!("unknown name `{}`", name))
            })
            .collect()
    }
}

impl EventSet {
    /// Kept as configuration only, copies of injected mails are
    /// published whatever the set holds.
    pub fn defaults() -> Self {
        Self::only(Event::Save)
    }
}

impl FieldSet {
    pub fn defaults() -> Self {
        [
            Field::Uid,
            Field::Mailbox,
            Field::MessageId,
            Field::PhysicalSize,
        ]
        .into_iter()
        .collect()
    }
}

impl<T: Flag> FromIterator<T> for FlagSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

impl<T: Flag> fmt::Debug for FlagSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|v| v.name())).finish()
    }
}

impl<T: Flag> fmt::Display for FlagSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.iter().map(|v| v.name()).collect::<Vec<_>>();
        write!(f, "{}", names.join(" "))
    }
}
