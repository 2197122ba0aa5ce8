//! Events emitted by a chat session for the consumer to drain.

use crate::tags::Tags;

/// Membership change in a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Membership {
    /// Channel whose membership changed, without the leading `#`.
    pub channel: String,
    /// User who joined or left.
    pub user: String,
}

/// NAMES reply listing the members of a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameList {
    pub channel: String,
    pub names: Vec<String>,
}

/// A chat message, either in a channel or sent privately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatMessage {
    pub tags: Tags,
    /// Channel the message was sent to; empty for private messages.
    pub channel: String,
    /// User who sent the message.
    pub user: String,
    /// Message body, with any `ACTION` wrapper removed.
    pub content: String,
    /// Server-assigned id of the message.
    pub message_id: String,
    /// Bits cheered with the message, 0 if none.
    pub bits: u64,
    /// True when the message was sent as a `/me` action.
    pub is_action: bool,
}

/// A whisper received from another user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Whisper {
    pub tags: Tags,
    pub user: String,
    pub message: String,
}

/// A notice from the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notice {
    /// Value of the `msg-id` tag, when present.
    pub id: String,
    pub message: String,
    /// Channel context of the notice; empty for server-global notices.
    pub channel: String,
}

/// A hosting announcement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Host {
    /// Whether hosting was turned on (false when it stopped).
    pub on: bool,
    /// Channel doing the hosting.
    pub hosting: String,
    /// Channel being hosted, when hosting was turned on.
    pub being_hosted: String,
    /// Viewers brought along by the host.
    pub viewers: u64,
}

/// A change to one of a channel's chat modes.
///
/// The meaning of `parameter` depends on the mode: seconds for `slow`,
/// minutes (or -1 for off) for `followers-only`, and 0/1 for the boolean
/// modes `r9k`, `emote-only`, and `subs-only`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomModeChange {
    pub mode: String,
    pub parameter: i64,
    pub channel: String,
    pub channel_id: u64,
}

/// What kind of chat clearing took place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearKind {
    /// All messages removed from the channel.
    #[default]
    ClearAll,
    /// One message deleted.
    ClearMessage,
    /// A user disallowed from chatting for a fixed time.
    Timeout,
    /// A user permanently banned from the channel.
    Ban,
}

/// A chat clear, message deletion, timeout, or ban.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clear {
    pub kind: ClearKind,
    pub channel: String,
    /// User who was timed out or banned (timeouts and bans only).
    pub user: String,
    /// Human-readable explanation, when one was given.
    pub reason: String,
    /// Id of the deleted message (message deletions only).
    pub offending_message_id: String,
    /// Content of the deleted message (message deletions only).
    pub offending_message_content: String,
    /// Timeout length in seconds (timeouts only).
    pub duration: u64,
    pub tags: Tags,
}

/// Announcement that a user gained or lost moderator status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModStatus {
    pub moderator: bool,
    pub channel: String,
    pub user: String,
}

/// The user's own state, globally or within one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserState {
    /// True when the state applies globally rather than to one channel.
    pub global: bool,
    /// Channel the state applies to, when not global.
    pub channel: String,
    pub tags: Tags,
}

/// What kind of subscription announcement was received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubKind {
    /// Unrecognized announcement; check the raw `msg-id` tag.
    #[default]
    Unknown,
    /// New subscription, or one after a lapse.
    Sub,
    /// Renewed subscription.
    Resub,
    /// Subscription gifted to a user by another user.
    Gifted,
    /// Subscriptions gifted to the channel's community.
    MysteryGift,
}

/// A subscription announcement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sub {
    pub kind: SubKind,
    pub channel: String,
    /// User who subscribed (or gifted).
    pub user: String,
    /// Display name of the recipient, for gifted subs.
    pub recipient_display_name: String,
    /// User name of the recipient, for gifted subs.
    pub recipient_user_name: String,
    /// Id of the recipient, for gifted subs.
    pub recipient_id: u64,
    /// Number of community subs being gifted, for mystery gifts.
    pub mass_gift_count: u64,
    /// Gifted subs the gifter has given in this channel so far.
    pub sender_count: u64,
    /// Message the subscriber attached, if any.
    pub user_message: String,
    /// Message the system supplied, unescaped.
    pub system_message: String,
    /// Name of the chosen subscription plan, unescaped.
    pub plan_name: String,
    /// Consecutive months subscribed, for renewals.
    pub months: u64,
    /// Numeric id of the chosen subscription plan.
    pub plan_id: u64,
    pub tags: Tags,
}

/// An incoming raid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Raid {
    /// Channel being raided.
    pub channel: String,
    /// User/channel doing the raiding.
    pub raider: String,
    /// Viewers arriving with the raid.
    pub viewers: u64,
    /// Message the system supplied, unescaped.
    pub system_message: String,
    pub tags: Tags,
}

/// A channel ritual, such as greeting a first-time chatter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ritual {
    pub channel: String,
    pub user: String,
    /// Name of the ritual (`msg-param-ritual-name`).
    pub ritual: String,
    /// Message the system supplied, unescaped.
    pub system_message: String,
    pub tags: Tags,
}

/// Events a session emits to its consumer.
///
/// With no event sink installed, every event is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The server is about to go down; expect a disconnection and consider
    /// logging back in after a short wait.
    Doom,

    /// The session finished logging into the server.
    LoggedIn,

    /// The session logged out, the connection closed, or a connection could
    /// not be established in the first place.
    LoggedOut,

    /// A user joined a channel.
    Join(Membership),

    /// A user left a channel.
    Leave(Membership),

    /// Member list of a channel.
    NameList(NameList),

    /// A message in a channel.
    Message(ChatMessage),

    /// A message sent privately to the logged-in user.
    PrivateMessage(ChatMessage),

    /// A whisper from another user.
    Whisper(Whisper),

    /// A notice from the server.
    Notice(Notice),

    /// A hosting change.
    Host(Host),

    /// A room mode change.
    RoomModeChange(RoomModeChange),

    /// Chat cleared, a message deleted, or a user timed out or banned.
    Clear(Clear),

    /// Moderator status announcement.
    Mod(ModStatus),

    /// The user's own global or per-channel state.
    UserState(UserState),

    /// A subscription announcement.
    Sub(Sub),

    /// An incoming raid.
    Raid(Raid),

    /// A channel ritual.
    Ritual(Ritual),
}
