// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the relay engine, storage, and platform adapters.

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ChorusError;

/// Identifier of a pool account (phone-like, e.g. `+15550100`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable platform identifier of a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a message within its chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform identifier of a user (the author of an inbound message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Groups every relayed copy of one reply chain across destinations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    /// Mints a fresh random thread id.
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, already-authenticated session credential of an account.
///
/// The secret is never printed by `Debug`.
#[derive(Clone)]
pub struct SessionToken(Arc<SecretString>);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(SecretString::from(token.into())))
    }

    /// Exposes the raw credential for handing to the platform client.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// Grammatical gender an account writes in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unspecified,
}

/// Network proxy scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    Socks5,
    Socks4,
    Http,
    Mtproto,
}

/// A network proxy shared by zero or more accounts.
#[derive(Clone, PartialEq, Eq)]
pub struct Proxy {
    pub id: i64,
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Proxy {
    /// Renders the proxy as a URL with credentials, e.g. `socks5://u:p@host:1080`.
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("{}://{user}:{pass}@{}:{}", self.scheme, self.host, self.port)
            }
            (Some(user), None) => format!("{}://{user}@{}:{}", self.scheme, self.host, self.port),
            _ => format!("{}://{}:{}", self.scheme, self.host, self.port),
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// One automated identity in the pool.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub session: SessionToken,
    pub proxy_id: Option<i64>,
    pub gender: Gender,
    pub enabled: bool,
    /// Raw reference of the chat this account watches in Mirror mode.
    pub source_chat: Option<String>,
    /// Ordered raw references of the chats this account posts into.
    pub destinations: Vec<String>,
    /// Index of the script line this account relayed last.
    pub script_cursor: usize,
}

impl Account {
    /// Creates an enabled account with no proxy, source, or destinations.
    pub fn new(id: impl Into<String>, session: SessionToken) -> Self {
        Self {
            id: AccountId::new(id),
            session,
            proxy_id: None,
            gender: Gender::Unspecified,
            enabled: true,
            source_chat: None,
            destinations: Vec::new(),
            script_cursor: 0,
        }
    }

    pub fn has_destinations(&self) -> bool {
        !self.destinations.is_empty()
    }
}

/// A destination group known to the operator, with a posting permission flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedGroup {
    pub chat_ref: String,
    pub title: Option<String>,
    pub open: bool,
}

/// A normalized chat reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChatRef {
    /// A direct numeric chat id.
    Id(ChatId),
    /// A public handle, lowercased, without `@`.
    Public(String),
    /// A private invite hash.
    Invite(String),
}

const LINK_HOSTS: [&str; 3] = ["t.me/", "telegram.me/", "telegram.dog/"];

impl ChatRef {
    /// Parses a raw user-supplied reference.
    ///
    /// Accepts numeric ids, `@handle`, `handle`, `t.me/handle`,
    /// `https://t.me/+HASH`, and `t.me/joinchat/HASH`.
    pub fn parse(raw: &str) -> Result<Self, ChorusError> {
        let mut s = raw.trim();
        for scheme in ["https://", "http://"] {
            if let Some(rest) = strip_prefix_ci(s, scheme) {
                s = rest;
            }
        }
        if let Some(rest) = strip_prefix_ci(s, "www.") {
            s = rest;
        }
        for host in LINK_HOSTS {
            if let Some(rest) = strip_prefix_ci(s, host) {
                s = rest;
                break;
            }
        }
        let s = s.split(['?', '#']).next().unwrap_or_default().trim_end_matches('/');

        let failed = |message: &str| ChorusError::ResolutionFailed {
            reference: raw.to_string(),
            message: message.to_string(),
        };

        if let Some(hash) = s.strip_prefix('+') {
            if hash.is_empty() {
                return Err(failed("empty invite hash"));
            }
            return Ok(Self::Invite(hash.to_string()));
        }
        if let Some(hash) = strip_prefix_ci(s, "joinchat/") {
            if hash.is_empty() {
                return Err(failed("empty invite hash"));
            }
            return Ok(Self::Invite(hash.to_string()));
        }

        let s = s.trim_start_matches('@');
        if let Ok(id) = s.parse::<i64>() {
            return Ok(Self::Id(ChatId(id)));
        }
        if s.is_empty() {
            return Err(failed("empty chat reference"));
        }
        if s.contains(char::is_whitespace) || s.contains('/') {
            return Err(failed("not a chat handle, id, or invite link"));
        }
        Ok(Self::Public(s.to_lowercase()))
    }

    /// Canonical string form, used as a comparison key between raw references.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Public(handle) => write!(f, "@{handle}"),
            Self::Invite(hash) => write!(f, "+{hash}"),
        }
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Canonical key of a raw reference; falls back to the trimmed input when it
/// does not parse.
pub fn normalize_chat_ref(raw: &str) -> String {
    ChatRef::parse(raw)
        .map(|r| r.key())
        .unwrap_or_else(|_| raw.trim().to_string())
}

/// A platform file reference plus an optional caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub file_ref: String,
    pub caption: Option<String>,
}

impl Media {
    pub fn new(file_ref: impl Into<String>) -> Self {
        Self {
            file_ref: file_ref.into(),
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// Relayable message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Photo(Media),
    Video(Media),
    Sticker(Media),
    Voice(Media),
    Animation(Media),
}

/// Tag of a [`Content`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Sticker,
    Voice,
    Animation,
}

impl Content {
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Text(_) => ContentKind::Text,
            Self::Photo(_) => ContentKind::Photo,
            Self::Video(_) => ContentKind::Video,
            Self::Sticker(_) => ContentKind::Sticker,
            Self::Voice(_) => ContentKind::Voice,
            Self::Animation(_) => ContentKind::Animation,
        }
    }

    /// The message text, or the caption of a media message.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Photo(m) | Self::Video(m) | Self::Sticker(m) | Self::Voice(m) | Self::Animation(m) => {
                m.caption.as_deref()
            }
        }
    }

    /// The attached media, for every variant but text.
    pub fn media(&self) -> Option<&Media> {
        match self {
            Self::Text(_) => None,
            Self::Photo(m) | Self::Video(m) | Self::Sticker(m) | Self::Voice(m) | Self::Animation(m) => {
                Some(m)
            }
        }
    }

    /// Returns a copy with the text (or caption) rewritten by `f`.
    pub fn map_text(&self, f: impl Fn(&str) -> String) -> Self {
        let media = |m: &Media| Media {
            file_ref: m.file_ref.clone(),
            caption: m.caption.as_deref().map(&f),
        };
        match self {
            Self::Text(text) => Self::Text(f(text)),
            Self::Photo(m) => Self::Photo(media(m)),
            Self::Video(m) => Self::Video(media(m)),
            Self::Sticker(m) => Self::Sticker(media(m)),
            Self::Voice(m) => Self::Voice(media(m)),
            Self::Animation(m) => Self::Animation(media(m)),
        }
    }
}

/// A message observed in a source chat.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: Option<UserId>,
    pub chat_title: Option<String>,
    /// `None` when the message carries content the relay does not forward.
    pub content: Option<Content>,
    /// The message this one replies to, within the same source chat.
    pub reply_to: Option<MessageId>,
    /// Text (or caption) of the replied-to message, when the platform provides it.
    pub reply_text: Option<String>,
}

/// A message to be sent by one account.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub content: Content,
    pub reply_to: Option<MessageId>,
}

/// A message the relay posted into a destination, kept so later replies
/// can be placed by text similarity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub account: AccountId,
    pub thread: ThreadId,
    /// The relayed message this one was posted as a reply to.
    pub reply_to: Option<MessageId>,
}

/// A chat the connection is a member of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub chat_id: ChatId,
    pub title: Option<String>,
    pub handle: Option<String>,
    pub invite_hash: Option<String>,
}

/// Persisted Playback position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayCursor {
    pub line_index: usize,
    pub account_index: usize,
}

impl RelayCursor {
    /// Brings a loaded cursor back into range: the line wraps modulo the
    /// script length, an out-of-range account index resets to 0.
    pub fn clamp(self, eligible: usize, script_len: usize) -> Self {
        Self {
            line_index: if script_len == 0 {
                0
            } else {
                self.line_index % script_len
            },
            account_index: if self.account_index < eligible {
                self.account_index
            } else {
                0
            },
        }
    }

    /// The cursor after one tick, and whether the script wrapped around.
    ///
    /// The account index moves first; the line moves when every eligible
    /// account has posted it. With no eligible accounts only the line moves.
    pub fn advance(self, eligible: usize, script_len: usize) -> (Self, bool) {
        let current = self.clamp(eligible, script_len);
        let next_line = |line: usize| {
            if script_len == 0 {
                (0, false)
            } else {
                let next = (line + 1) % script_len;
                (next, next == 0)
            }
        };

        if eligible == 0 {
            let (line_index, wrapped) = next_line(current.line_index);
            return (
                Self {
                    line_index,
                    account_index: 0,
                },
                wrapped,
            );
        }

        let account_index = (current.account_index + 1) % eligible;
        if account_index != 0 {
            return (
                Self {
                    line_index: current.line_index,
                    account_index,
                },
                false,
            );
        }
        let (line_index, wrapped) = next_line(current.line_index);
        (
            Self {
                line_index,
                account_index: 0,
            },
            wrapped,
        )
    }
}

/// An ordered list of lines replayed in Playback mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub id: String,
    pub lines: Vec<String>,
}

/// Mutually exclusive relay modes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    Playback,
    #[default]
    Mirror,
}

/// Operator-facing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    PoolStarted { live: usize, total: usize },
    PoolStopped,
    AccountDisabled { account: AccountId, reason: String },
    PermissionDenied { account: AccountId, chat: String },
    DestinationFailing { account: AccountId, chat: String, failures: u32 },
    ScriptRestarted { script: String },
    ModeStarted { mode: RelayMode },
    ModeStopped { mode: RelayMode },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolStarted { live, total } => {
                write!(f, "Connection pool started: {live}/{total} accounts live")
            }
            Self::PoolStopped => f.write_str("Connection pool stopped"),
            Self::AccountDisabled { account, reason } => {
                write!(f, "Account {account} disabled: {reason}")
            }
            Self::PermissionDenied { account, chat } => {
                write!(f, "Account {account} has no permission to post in {chat}")
            }
            Self::DestinationFailing {
                account,
                chat,
                failures,
            } => write!(
                f,
                "Account {account} failed {failures} times in a row posting to {chat}"
            ),
            Self::ScriptRestarted { script } => {
                write!(f, "Script {script} finished and restarted from the first line")
            }
            Self::ModeStarted { mode } => write!(f, "Relay started in {mode} mode"),
            Self::ModeStopped { mode } => write!(f, "Relay stopped ({mode} mode)"),
        }
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Client,
    Storage,
    Notifier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_ids() {
        assert_eq!(
            ChatRef::parse("-1001234567890").unwrap(),
            ChatRef::Id(ChatId(-1001234567890))
        );
        assert_eq!(ChatRef::parse(" 42 ").unwrap(), ChatRef::Id(ChatId(42)));
    }

    #[test]
    fn parses_public_handles_in_every_spelling() {
        let expected = ChatRef::Public("rustlang".into());
        for raw in [
            "rustlang",
            "@RustLang",
            "t.me/rustlang",
            "https://t.me/rustlang",
            "http://www.t.me/rustlang/",
            "https://telegram.me/rustlang?start=1",
        ] {
            assert_eq!(ChatRef::parse(raw).unwrap(), expected, "input {raw}");
        }
    }

    #[test]
    fn parses_invite_links() {
        assert_eq!(
            ChatRef::parse("https://t.me/+AbCdEf123").unwrap(),
            ChatRef::Invite("AbCdEf123".into())
        );
        assert_eq!(
            ChatRef::parse("t.me/joinchat/XyZ").unwrap(),
            ChatRef::Invite("XyZ".into())
        );
        assert_eq!(ChatRef::parse("+XyZ").unwrap(), ChatRef::Invite("XyZ".into()));
    }

    #[test]
    fn rejects_garbage() {
        assert!(ChatRef::parse("").is_err());
        assert!(ChatRef::parse("https://t.me/+").is_err());
        assert!(ChatRef::parse("two words").is_err());
    }

    #[test]
    fn normalize_makes_spellings_comparable() {
        assert_eq!(normalize_chat_ref("@Chat"), normalize_chat_ref("https://t.me/chat"));
        assert_eq!(normalize_chat_ref("two words"), "two words");
    }

    #[test]
    fn session_token_debug_is_redacted() {
        let token = SessionToken::new("123:secret");
        assert_eq!(format!("{token:?}"), "SessionToken([REDACTED])");
        assert_eq!(token.expose(), "123:secret");
    }

    #[test]
    fn proxy_url_includes_credentials() {
        let proxy = Proxy {
            id: 1,
            scheme: ProxyScheme::Socks5,
            host: "10.0.0.1".into(),
            port: 1080,
            username: Some("u".into()),
            password: Some("p".into()),
        };
        assert_eq!(proxy.url(), "socks5://u:p@10.0.0.1:1080");
        assert!(!format!("{proxy:?}").contains("\"p\""));
    }

    #[test]
    fn content_map_text_rewrites_captions() {
        let photo = Content::Photo(Media::new("file-1").with_caption("hello"));
        let mapped = photo.map_text(|t| t.to_uppercase());
        assert_eq!(mapped.text(), Some("HELLO"));
        assert_eq!(mapped.kind(), ContentKind::Photo);

        let sticker = Content::Sticker(Media::new("file-2"));
        assert_eq!(sticker.map_text(|t| t.to_uppercase()).text(), None);
    }

    #[test]
    fn gender_round_trips_through_strum() {
        use std::str::FromStr;
        assert_eq!(Gender::from_str("female").unwrap(), Gender::Female);
        assert_eq!(Gender::Male.to_string(), "male");
        assert_eq!(Gender::default(), Gender::Unspecified);
    }

    #[test]
    fn cursor_walks_accounts_then_lines() {
        let mut cursor = RelayCursor::default();
        let mut wraps = 0;
        for _ in 0..2 {
            let (next, wrapped) = cursor.advance(2, 2);
            cursor = next;
            wraps += usize::from(wrapped);
        }
        assert_eq!(cursor, RelayCursor { line_index: 1, account_index: 0 });
        for _ in 0..2 {
            let (next, wrapped) = cursor.advance(2, 2);
            cursor = next;
            wraps += usize::from(wrapped);
        }
        assert_eq!(cursor, RelayCursor::default());
        assert_eq!(wraps, 1);
    }

    #[test]
    fn cursor_without_accounts_moves_line_only() {
        let cursor = RelayCursor { line_index: 2, account_index: 5 };
        let (next, wrapped) = cursor.advance(0, 3);
        assert_eq!(next, RelayCursor { line_index: 0, account_index: 0 });
        assert!(wrapped);
    }

    #[test]
    fn loaded_cursor_is_clamped() {
        let cursor = RelayCursor { line_index: 7, account_index: 4 };
        assert_eq!(
            cursor.clamp(3, 5),
            RelayCursor { line_index: 2, account_index: 0 }
        );
    }

    proptest::proptest! {
        #[test]
        fn cursor_stays_in_bounds(
            line in 0usize..100,
            account in 0usize..100,
            eligible in 0usize..10,
            script_len in 1usize..10,
        ) {
            let start = RelayCursor { line_index: line, account_index: account };
            let (next, _) = start.advance(eligible, script_len);
            proptest::prop_assert!(next.line_index < script_len);
            proptest::prop_assert!(next.account_index < eligible.max(1));
        }

        #[test]
        fn one_pass_over_accounts_moves_one_line(
            eligible in 1usize..8,
            script_len in 2usize..8,
        ) {
            let mut cursor = RelayCursor::default();
            for _ in 0..eligible {
                cursor = cursor.advance(eligible, script_len).0;
            }
            proptest::prop_assert_eq!(cursor, RelayCursor { line_index: 1, account_index: 0 });
        }
    }
}
