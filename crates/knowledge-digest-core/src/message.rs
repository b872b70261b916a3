//! Chat export parsing.
//!
//! A chat export is line-oriented. A line of the form
//! `YYYY-MM-DD HH:MM[:SS] <sender>[:：]<content>` starts a new message;
//! every other line is a continuation of the message being accumulated.
//! Lines that appear before the first message header are ignored.
//!
//! ```text
//!                  header line
//!  ┌──────────────────────┐ ─────────▶ ┌──────────────────────┐
//!  │ AwaitingMessageStart │            │ AccumulatingContent  │◀─┐ other line
//!  └──────────────────────┘            └──────────────────────┘──┘ (append)
//!                                         │ header line: flush, start next
//!                                         ▼
//! ```
//!
//! Parsed messages then go through [`filter_noise`] and
//! [`merge_consecutive`].

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Regex, RegexSet};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::models::{MessageType, RawMessage};

/// Default window for merging consecutive messages from one sender.
pub const DEFAULT_MERGE_WINDOW_SECS: i64 = 300;

/// Messages shorter than this (in characters, trimmed) are dropped.
const MIN_CONTENT_CHARS: usize = 2;

/// Shapes of system notifications, matched against the whole message with
/// whitespace removed and lowercased. A notice is a short actor prefix plus
/// a fixed action, so discussion that merely mentions the action survives.
const SYSTEM_NOTICE_PATTERNS: &[&str] = &[
    r"^.{0,40}加入了?群聊$",
    r"^.{0,40}(退出了群聊|移出了群聊|移出群聊)$",
    r"^.{0,24}撤回了一条消息$",
    r"^.{0,24}拍了拍.{0,16}$",
    r"^.{0,24}修改群名为.{0,30}$",
    r"^\[红包\].{0,30}$",
    r"^.{0,24}发出了?红包.{0,30}$",
    r"^.{0,24}领取了.{0,24}红包$",
    r"^.{0,12}红包已被领完.{0,12}$",
    r"^.{0,24}开启了朋友验证.*你还不是他（她）朋友.*$",
    r"^.{0,24}与群里其他人都不是朋友关系.*$",
    r"^.{0,24}(joinedthegroup|leftthegroup|recalledamessage|wasremovedfromthegroup)\.?$",
];

const IMAGE_TOKENS: &[&str] = &["[图片]", "[image]", "[photo]", "[表情]", "[动画表情]", "[sticker]"];
const FILE_TOKENS: &[&str] = &["[文件]", "[file]", "[视频]", "[video]", "[语音]", "[voice]"];

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})\s+(\d{1,2}):(\d{2})(?::(\d{2}))?\s+([^:：]+?)\s*[:：]\s?(.*)$",
        )
        .expect("valid header regex")
    })
}

fn system_notice_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(SYSTEM_NOTICE_PATTERNS).expect("valid notice patterns"))
}

fn sender_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.+?)\s*[(（<]([^)）>]+)[)）>]$").expect("valid sender regex")
    })
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^\s<>]+").expect("valid url regex"))
}

/// A message header recognized on a single line.
#[derive(Debug, Clone, PartialEq)]
struct Header {
    timestamp: NaiveDateTime,
    sender_name: String,
    sender_id: Option<String>,
    first_line: String,
}

/// A message being accumulated.
#[derive(Debug)]
struct PendingMessage {
    line_no: usize,
    header: Header,
    content: String,
}

#[derive(Debug)]
enum ParserState {
    AwaitingMessageStart,
    AccumulatingContent(PendingMessage),
}

/// Parses one chat export into [`RawMessage`]s for a given group.
#[derive(Debug, Clone)]
pub struct MessageParser {
    group_name: String,
}

impl MessageParser {
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
        }
    }

    /// Run the line state machine over the whole export.
    pub fn parse(&self, export: &str) -> Vec<RawMessage> {
        let mut messages = Vec::new();
        let mut state = ParserState::AwaitingMessageStart;

        for (idx, line) in export.lines().enumerate() {
            let line_no = idx + 1;
            state = match (state, parse_header(line)) {
                (ParserState::AwaitingMessageStart, None) => ParserState::AwaitingMessageStart,
                (ParserState::AwaitingMessageStart, Some(header)) => {
                    ParserState::AccumulatingContent(PendingMessage::start(line_no, header))
                }
                (ParserState::AccumulatingContent(pending), Some(header)) => {
                    messages.push(self.finish(pending));
                    ParserState::AccumulatingContent(PendingMessage::start(line_no, header))
                }
                (ParserState::AccumulatingContent(mut pending), None) => {
                    pending.content.push('\n');
                    pending.content.push_str(line);
                    ParserState::AccumulatingContent(pending)
                }
            };
        }

        if let ParserState::AccumulatingContent(pending) = state {
            messages.push(self.finish(pending));
        }

        messages
    }

    fn finish(&self, pending: PendingMessage) -> RawMessage {
        let content = pending.content.trim().to_string();
        let header = pending.header;
        RawMessage {
            id: message_id(
                &self.group_name,
                &header.sender_name,
                &header.timestamp,
                pending.line_no,
            ),
            group_name: self.group_name.clone(),
            message_type: infer_type(&content),
            sender_name: header.sender_name,
            sender_id: header.sender_id,
            content,
            timestamp: header.timestamp,
        }
    }
}

impl PendingMessage {
    fn start(line_no: usize, header: Header) -> Self {
        let content = header.first_line.clone();
        Self {
            line_no,
            header,
            content,
        }
    }
}

fn parse_header(line: &str) -> Option<Header> {
    let caps = header_regex().captures(line.trim_end())?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let date = NaiveDate::from_ymd_opt(num(1)? as i32, num(2)?, num(3)?)?;
    let time = NaiveTime::from_hms_opt(num(4)?, num(5)?, num(6).unwrap_or(0))?;

    let raw_sender = caps.get(7)?.as_str().trim();
    let (sender_name, sender_id) = match sender_id_regex().captures(raw_sender) {
        Some(s) => (s[1].trim().to_string(), Some(s[2].trim().to_string())),
        None => (raw_sender.to_string(), None),
    };
    if sender_name.is_empty() {
        return None;
    }

    Some(Header {
        timestamp: NaiveDateTime::new(date, time),
        sender_name,
        sender_id,
        first_line: caps.get(8).map(|m| m.as_str().to_string()).unwrap_or_default(),
    })
}

fn message_id(group: &str, sender: &str, ts: &NaiveDateTime, line_no: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(group.as_bytes());
    hasher.update(sender.as_bytes());
    hasher.update(ts.and_utc().timestamp().to_le_bytes());
    hasher.update(line_no.to_le_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("msg-{}", &hash[..12])
}

/// Infer the message type from its content.
pub fn infer_type(content: &str) -> MessageType {
    if url_regex().is_match(content) {
        return MessageType::Link;
    }
    let lowered = content.to_lowercase();
    if IMAGE_TOKENS.iter().any(|t| lowered.contains(t)) {
        return MessageType::Image;
    }
    if FILE_TOKENS.iter().any(|t| lowered.contains(t)) {
        return MessageType::File;
    }
    MessageType::Text
}

/// Whether a message is structural noise rather than discussion.
pub fn is_noise(message: &RawMessage) -> bool {
    let compact: String = message
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if compact.is_empty() {
        return true;
    }
    if !compact.chars().any(char::is_alphanumeric) {
        return true;
    }
    if system_notice_set().is_match(&compact.to_lowercase()) {
        return true;
    }
    message.content.trim().chars().count() < MIN_CONTENT_CHARS
}

/// Drop noise messages, preserving order.
pub fn filter_noise(messages: Vec<RawMessage>) -> Vec<RawMessage> {
    messages.into_iter().filter(|m| !is_noise(m)).collect()
}

/// Merge runs of messages from the same sender.
///
/// Messages are stably sorted by timestamp. A message is folded into the
/// buffered one when the sender and type match and it arrived within
/// `window` of the most recent message already folded in. Content is
/// joined with a newline; the merged message keeps the first message's id
/// and timestamp. Single greedy pass, no lookahead.
pub fn merge_consecutive(mut messages: Vec<RawMessage>, window: Duration) -> Vec<RawMessage> {
    messages.sort_by_key(|m| m.timestamp);

    let mut merged: Vec<RawMessage> = Vec::with_capacity(messages.len());
    let mut last_ts: Option<NaiveDateTime> = None;

    for message in messages {
        if let (Some(buffered), Some(prev_ts)) = (merged.last_mut(), last_ts) {
            let same_sender = buffered.sender_name == message.sender_name
                && buffered.sender_id == message.sender_id;
            let same_type = buffered.message_type == message.message_type;
            if same_sender && same_type && message.timestamp - prev_ts <= window {
                buffered.content.push('\n');
                buffered.content.push_str(&message.content);
                last_ts = Some(message.timestamp);
                continue;
            }
        }
        last_ts = Some(message.timestamp);
        merged.push(message);
    }

    merged
}

/// Parse, filter, and merge in one call with the default window.
pub fn parse_export(group_name: &str, export: &str) -> Vec<RawMessage> {
    let parsed = MessageParser::new(group_name).parse(export);
    merge_consecutive(
        filter_noise(parsed),
        Duration::seconds(DEFAULT_MERGE_WINDOW_SECS),
    )
}
