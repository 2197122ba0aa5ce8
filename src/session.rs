//! The chat session engine.
//!
//! A [`Session`] owns a background worker task. Caller API methods post
//! actions onto a channel and return immediately; the worker consumes them
//! in order, drives the login handshake, serializes every outbound line
//! onto the single connection, and dispatches inbound server commands as
//! typed [`Event`]s. Failures never reach the caller as errors: every
//! teardown path surfaces as a `LoggedOut` event.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::action::Action;
use crate::clock::Clock;
use crate::event::{
    ChatMessage, Clear, ClearKind, Event, Host, Membership, ModStatus, NameList, Notice, Raid,
    Ritual, RoomModeChange, Sub, SubKind, UserState, Whisper,
};
use crate::message::{self, Message, CRLF};
use crate::tags::{unescape_tag_value, Tags};
use crate::transport::{Transport, TransportFactory, TransportSink};

/// How long to wait for the server's reply to each login handshake stage.
const LOGIN_TIMEOUT_SECONDS: f64 = 5.0;

/// Capabilities the session needs for the full event stream.
const REQUIRED_CAPS: [&str; 3] = [
    "twitch.tv/commands",
    "twitch.tv/membership",
    "twitch.tv/tags",
];

/// Collaborators installed by the caller, read by the worker.
#[derive(Default)]
struct Collaborators {
    factory: Option<TransportFactory>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<UnboundedSender<Event>>,
    diagnostics: Vec<UnboundedSender<String>>,
}

/// A handle to a chat session.
///
/// Create one inside a Tokio runtime, install the collaborators, then log
/// in. All methods are non-blocking; they post one action and return.
///
/// ```no_run
/// use tmi_sdk::{Session, SystemClock, TlsTransport};
/// use std::sync::Arc;
///
/// # async fn run() {
/// let session = Session::new();
/// session.set_transport_factory(|| Box::new(TlsTransport::twitch()) as _);
/// session.set_clock(Arc::new(SystemClock::new()));
/// let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
/// session.set_event_sink(events_tx);
/// session.log_in_anonymously();
/// while let Some(event) = events.recv().await {
///     match event {
///         tmi_sdk::Event::LoggedIn => session.join("sodapoppin"),
///         other => println!("{other:?}"),
///     }
/// }
/// # }
/// ```
pub struct Session {
    actions: UnboundedSender<Action>,
    shared: Arc<Mutex<Collaborators>>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Creates an idle session and spawns its worker task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let (actions, inbound) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Collaborators::default()));
        let worker = Worker::new(inbound, actions.clone(), shared.clone());
        let handle = tokio::spawn(worker.run());
        Session {
            actions,
            shared,
            worker: Some(handle),
        }
    }

    /// Installs the factory used to create a connection per login attempt.
    pub fn set_transport_factory(
        &self,
        factory: impl Fn() -> Box<dyn Transport> + Send + 'static,
    ) {
        self.lock_shared().factory = Some(Box::new(factory));
    }

    /// Installs the clock used to enforce handshake timeouts. Without one,
    /// no timeouts fire.
    pub fn set_clock(&self, clock: Arc<dyn Clock>) {
        self.lock_shared().clock = Some(clock);
    }

    /// Installs the sink that receives every [`Event`]. Without one, events
    /// are dropped.
    pub fn set_event_sink(&self, sink: UnboundedSender<Event>) {
        self.lock_shared().events = Some(sink);
    }

    /// Subscribes to diagnostics: one string per line transmitted (`< `) or
    /// received (`> `), with credentials redacted. Dropping the receiver
    /// ends the subscription.
    pub fn subscribe_diagnostics(&self) -> UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock_shared().diagnostics.push(sender);
        receiver
    }

    /// Starts logging in as a registered user or bot.
    ///
    /// `nickname` should match the Twitch account, all lower-case; `token`
    /// is the OAuth token, without the `oauth:` prefix.
    pub fn log_in(&self, nickname: &str, token: &str) {
        self.post(Action::LogIn {
            nickname: nickname.to_string(),
            token: token.to_string(),
            anonymous: false,
        });
    }

    /// Starts logging in anonymously, as a receive-only viewer.
    ///
    /// The generated `justinfan` nickname is random but not guaranteed
    /// unique.
    pub fn log_in_anonymously(&self) {
        self.post(Action::LogIn {
            nickname: format!("justinfan{}", rand::random::<u32>()),
            token: String::new(),
            anonymous: true,
        });
    }

    /// Starts logging out, sending `farewell` with the QUIT command.
    pub fn log_out(&self, farewell: &str) {
        self.post(Action::LogOut {
            farewell: farewell.to_string(),
        });
    }

    /// Starts joining a chat channel.
    pub fn join(&self, channel: &str) {
        self.post(Action::Join {
            channel: channel.to_string(),
        });
    }

    /// Starts leaving a chat channel.
    pub fn leave(&self, channel: &str) {
        self.post(Action::Leave {
            channel: channel.to_string(),
        });
    }

    /// Sends a message to a channel.
    pub fn send_message(&self, channel: &str, text: &str) {
        self.post(Action::SendMessage {
            channel: channel.to_string(),
            text: text.to_string(),
            parent: String::new(),
        });
    }

    /// Sends a message to a channel as a reply to the message with id
    /// `parent`.
    pub fn send_response(&self, channel: &str, text: &str, parent: &str) {
        self.post(Action::SendMessage {
            channel: channel.to_string(),
            text: text.to_string(),
            parent: parent.to_string(),
        });
    }

    /// Sends a whisper to another user.
    pub fn send_whisper(&self, nickname: &str, text: &str) {
        self.post(Action::SendWhisper {
            nickname: nickname.to_string(),
            text: text.to_string(),
        });
    }

    /// Stops the worker and waits for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.actions.send(Action::Stop);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    fn post(&self, action: Action) {
        let _ = self.actions.send(action);
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, Collaborators> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The worker exits on its own once it sees the stop request.
        let _ = self.actions.send(Action::Stop);
    }
}

/// A handshake stage awaiting a server reply.
///
/// `expiration` is a clock deadline in seconds; 0.0 means no deadline.
enum Pending {
    /// `CAP LS` sent; waiting for the server's capability list.
    CapList {
        nickname: String,
        token: String,
        expiration: f64,
    },
    /// `CAP REQ` sent; waiting for `ACK` or `NAK`.
    CapAck {
        nickname: String,
        token: String,
        expiration: f64,
    },
    /// Credentials sent; waiting for the end of the MOTD.
    Motd { expiration: f64 },
}

impl Pending {
    fn expiration(&self) -> f64 {
        match self {
            Pending::CapList { expiration, .. }
            | Pending::CapAck { expiration, .. }
            | Pending::Motd { expiration } => *expiration,
        }
    }

    fn timeout_farewell(&self) -> &'static str {
        match self {
            Pending::CapList { .. } => "Timeout waiting for capability list",
            Pending::CapAck { .. } => "Timeout waiting for response to capability request",
            Pending::Motd { .. } => "Timeout waiting for MOTD",
        }
    }
}

/// The session worker. Owns all connection state; the only way in is the
/// action channel.
struct Worker {
    actions: UnboundedReceiver<Action>,
    /// Sender cloned into transport sinks so inbound activity loops back
    /// through the action channel.
    loopback: UnboundedSender<Action>,
    shared: Arc<Mutex<Collaborators>>,
    inbox: VecDeque<Action>,
    connection: Option<Box<dyn Transport>>,
    data_received: String,
    anonymous: bool,
    logged_in: bool,
    awaiting: Vec<Pending>,
    caps_supported: BTreeSet<String>,
    stop: bool,
}

impl Worker {
    fn new(
        actions: UnboundedReceiver<Action>,
        loopback: UnboundedSender<Action>,
        shared: Arc<Mutex<Collaborators>>,
    ) -> Self {
        Worker {
            actions,
            loopback,
            shared,
            inbox: VecDeque::new(),
            connection: None,
            data_received: String::new(),
            anonymous: false,
            logged_in: false,
            awaiting: Vec::new(),
            caps_supported: BTreeSet::new(),
            stop: false,
        }
    }

    async fn run(mut self) {
        tracing::debug!("session worker started");
        while !self.stop {
            // Deadlines are checked before the action drain on every
            // iteration; a timer beats an action posted the same tick.
            if let Some(clock) = self.clock() {
                self.process_timeouts(clock.now()).await;
            }

            // Drain everything already queued, one action at a time.
            while !self.stop {
                let next = match self.inbox.pop_front() {
                    Some(action) => Some(action),
                    None => match self.actions.try_recv() {
                        Ok(action) => Some(action),
                        Err(TryRecvError::Empty) => None,
                        Err(TryRecvError::Disconnected) => {
                            self.stop = true;
                            None
                        }
                    },
                };
                match next {
                    Some(action) => self.perform(action).await,
                    None => break,
                }
            }
            if self.stop {
                break;
            }

            if self.connection.is_none() {
                self.awaiting.clear();
            }

            // Park. While replies are outstanding, re-wake on a short tick
            // so deadlines are noticed even if nothing arrives.
            if self.awaiting.is_empty() {
                match self.actions.recv().await {
                    Some(action) => self.inbox.push_back(action),
                    None => self.stop = true,
                }
            } else {
                tokio::select! {
                    received = self.actions.recv() => match received {
                        Some(action) => self.inbox.push_back(action),
                        None => self.stop = true,
                    },
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
        }
        tracing::debug!("session worker stopped");
    }

    // ── Action performers ───────────────────────────────────────────────

    async fn perform(&mut self, action: Action) {
        match action {
            Action::LogIn {
                nickname,
                token,
                anonymous,
            } => self.perform_log_in(nickname, token, anonymous).await,
            Action::LogOut { farewell } => self.disconnect(&farewell).await,
            Action::ProcessMessagesReceived { data } => {
                self.process_messages_received(&data).await;
            }
            Action::ServerDisconnected => self.disconnect("").await,
            Action::Join { channel } => {
                if self.connection.is_some() {
                    self.send_line(&format!("JOIN #{channel}")).await;
                }
            }
            Action::Leave { channel } => {
                if self.connection.is_some() {
                    self.send_line(&format!("PART #{channel}")).await;
                }
            }
            Action::SendMessage {
                channel,
                text,
                parent,
            } => {
                if self.connection.is_none() || self.anonymous {
                    return;
                }
                if parent.is_empty() {
                    self.send_line(&format!("PRIVMSG #{channel} :{text}")).await;
                } else {
                    self.send_line(&format!(
                        "@reply-parent-msg-id={parent} PRIVMSG #{channel} :{text}"
                    ))
                    .await;
                }
            }
            Action::SendWhisper { nickname, text } => {
                if self.connection.is_none() || self.anonymous {
                    return;
                }
                self.send_line(&format!("PRIVMSG #jtv :.w {nickname} {text}"))
                    .await;
            }
            Action::Stop => self.stop = true,
        }
    }

    async fn perform_log_in(&mut self, nickname: String, token: String, anonymous: bool) {
        if self.connection.is_some() {
            return;
        }
        let transport = {
            let shared = self.lock_shared();
            shared.factory.as_ref().map(|factory| factory())
        };
        let Some(mut transport) = transport else {
            tracing::warn!("log in requested with no transport factory installed");
            self.emit(Event::LoggedOut);
            return;
        };
        let sink = TransportSink::new(self.loopback.clone());
        if transport.connect(sink).await {
            self.caps_supported.clear();
            self.anonymous = anonymous;
            self.connection = Some(transport);
            self.send_line("CAP LS 302").await;
            let expiration = self.deadline();
            self.awaiting.push(Pending::CapList {
                nickname,
                token,
                expiration,
            });
        } else {
            // Release the transport before reporting the failure.
            drop(transport);
            self.emit(Event::LoggedOut);
        }
    }

    /// Canonical teardown. With a farewell, a QUIT is sent first; either
    /// way the `LoggedOut` event fires exactly once per held connection.
    async fn disconnect(&mut self, farewell: &str) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        if !farewell.is_empty() {
            let line = format!("QUIT :{farewell}");
            self.publish_outbound(&line);
            connection.send(&format!("{line}{CRLF}")).await;
        }
        connection.disconnect().await;
        self.emit(Event::LoggedOut);
        self.logged_in = false;
        self.awaiting.clear();
        self.caps_supported.clear();
    }

    async fn process_messages_received(&mut self, data: &str) {
        self.data_received.push_str(data);
        while let Some(line) = message::take_line(&mut self.data_received) {
            self.publish_diagnostic(&format!("> {line}"));
            let parsed = Message::from_line(&line);
            self.dispatch(parsed).await;
        }
    }

    // ── Timeouts ────────────────────────────────────────────────────────

    async fn process_timeouts(&mut self, now: f64) {
        let mut expired = Vec::new();
        let mut index = 0;
        while index < self.awaiting.len() {
            let expiration = self.awaiting[index].expiration();
            if expiration > 0.0 && now >= expiration {
                expired.push(self.awaiting.remove(index));
            } else {
                index += 1;
            }
        }
        for entry in expired {
            tracing::debug!(reason = entry.timeout_farewell(), "login handshake timed out");
            self.disconnect(entry.timeout_farewell()).await;
        }
    }

    // ── Login handshake ─────────────────────────────────────────────────

    async fn handle_cap(&mut self, message: &Message) {
        let Some(subcommand) = message.parameters.get(1) else {
            return;
        };
        match subcommand.as_str() {
            "LS" => {
                if !self
                    .awaiting
                    .iter()
                    .any(|pending| matches!(pending, Pending::CapList { .. }))
                {
                    return;
                }
                let Some(first) = message.parameters.get(2) else {
                    return;
                };
                if first == "*" {
                    // Continuation chunk; the entry keeps waiting.
                    if let Some(chunk) = message.parameters.get(3) {
                        self.merge_caps(chunk);
                    }
                    return;
                }
                self.merge_caps(first);
                if let Some(Pending::CapList {
                    nickname, token, ..
                }) = self.take_pending(|pending| matches!(pending, Pending::CapList { .. }))
                {
                    if self.has_required_caps() {
                        self.finish_handshake(&nickname, &token).await;
                    } else {
                        self.request_caps(nickname, token).await;
                    }
                }
            }
            "ACK" | "NAK" => {
                // A rejection does not abort the login; proceed either way.
                if let Some(Pending::CapAck {
                    nickname, token, ..
                }) = self.take_pending(|pending| matches!(pending, Pending::CapAck { .. }))
                {
                    self.finish_handshake(&nickname, &token).await;
                }
            }
            _ => {}
        }
    }

    fn merge_caps(&mut self, chunk: &str) {
        for cap in chunk.split(' ') {
            if !cap.is_empty() {
                self.caps_supported.insert(cap.to_string());
            }
        }
    }

    fn has_required_caps(&self) -> bool {
        REQUIRED_CAPS
            .iter()
            .all(|cap| self.caps_supported.contains(*cap))
    }

    async fn request_caps(&mut self, nickname: String, token: String) {
        self.send_line(&format!("CAP REQ :{}", REQUIRED_CAPS.join(" ")))
            .await;
        let expiration = self.deadline();
        self.awaiting.push(Pending::CapAck {
            nickname,
            token,
            expiration,
        });
    }

    /// Ends capability negotiation, submits credentials, and waits for the
    /// MOTD to confirm the login.
    async fn finish_handshake(&mut self, nickname: &str, token: &str) {
        self.send_line("CAP END").await;
        if !self.anonymous {
            self.send_line(&format!("PASS oauth:{token}")).await;
        }
        self.send_line(&format!("NICK {nickname}")).await;
        let expiration = self.deadline();
        self.awaiting.push(Pending::Motd { expiration });
    }

    fn handle_motd(&mut self) {
        if self
            .take_pending(|pending| matches!(pending, Pending::Motd { .. }))
            .is_some()
            && !self.logged_in
        {
            self.logged_in = true;
            self.emit(Event::LoggedIn);
        }
    }

    fn take_pending(&mut self, matches: impl Fn(&Pending) -> bool) -> Option<Pending> {
        let index = self.awaiting.iter().position(matches)?;
        Some(self.awaiting.remove(index))
    }

    fn deadline(&self) -> f64 {
        self.clock()
            .map(|clock| clock.now() + LOGIN_TIMEOUT_SECONDS)
            .unwrap_or(0.0)
    }

    // ── Server command dispatch ─────────────────────────────────────────

    async fn dispatch(&mut self, message: Message) {
        let command = message.command.clone();
        match command.as_str() {
            "CAP" => self.handle_cap(&message).await,
            "376" => self.handle_motd(),
            "353" => self.handle_name_list(message),
            "PING" => self.handle_ping(&message).await,
            "JOIN" => self.handle_membership(message, true),
            "PART" => self.handle_membership(message, false),
            "PRIVMSG" => self.handle_privmsg(message),
            "WHISPER" => self.handle_whisper(message),
            "NOTICE" => self.handle_notice(message),
            "HOSTTARGET" => self.handle_host_target(message),
            "ROOMSTATE" => self.handle_room_state(message),
            "CLEARCHAT" => self.handle_clear_chat(message),
            "CLEARMSG" => self.handle_clear_message(message),
            "MODE" => self.handle_mode(message),
            "GLOBALUSERSTATE" => self.handle_global_user_state(message),
            "USERSTATE" => self.handle_user_state(message),
            "RECONNECT" => self.emit(Event::Doom),
            "USERNOTICE" => self.handle_user_notice(message),
            _ => {}
        }
    }

    fn handle_name_list(&mut self, message: Message) {
        if message.parameters.len() != 4 {
            return;
        }
        self.emit(Event::NameList(NameList {
            channel: channel_name(&message.parameters[2]),
            names: message.parameters[3]
                .split(' ')
                .map(str::to_string)
                .collect(),
        }));
    }

    async fn handle_ping(&mut self, message: &Message) {
        let Some(token) = message.parameters.first() else {
            return;
        };
        if self.connection.is_some() {
            let line = format!("PONG :{token}");
            self.send_line(&line).await;
        }
    }

    fn handle_membership(&mut self, message: Message, joined: bool) {
        if message.parameters.is_empty() || message.parameters[0].len() < 2 {
            return;
        }
        let Some(nickname) = nickname_from_prefix(&message.prefix) else {
            return;
        };
        if is_anonymous_nickname(nickname) {
            return;
        }
        let membership = Membership {
            channel: channel_name(&message.parameters[0]),
            user: nickname.to_string(),
        };
        self.emit(if joined {
            Event::Join(membership)
        } else {
            Event::Leave(membership)
        });
    }

    fn handle_privmsg(&mut self, message: Message) {
        if message.parameters.len() < 2 {
            return;
        }
        let user = nickname_from_prefix(&message.prefix)
            .unwrap_or_default()
            .to_string();
        let trailer = &message.parameters[1];
        let (content, is_action) = match action_content(trailer) {
            Some(inner) => (inner.to_string(), true),
            None => (trailer.clone(), false),
        };
        let target = message.parameters[0].clone();
        let chat_message = ChatMessage {
            message_id: message.tags.id.clone(),
            bits: numeric_tag(&message.tags, "bits"),
            channel: String::new(),
            user,
            content,
            is_action,
            tags: message.tags,
        };
        if target.starts_with('#') {
            self.emit(Event::Message(ChatMessage {
                channel: channel_name(&target),
                ..chat_message
            }));
        } else {
            self.emit(Event::PrivateMessage(chat_message));
        }
    }

    fn handle_whisper(&mut self, message: Message) {
        if message.parameters.len() < 2 {
            return;
        }
        self.emit(Event::Whisper(Whisper {
            user: nickname_from_prefix(&message.prefix)
                .unwrap_or_default()
                .to_string(),
            message: message.parameters[1].clone(),
            tags: message.tags,
        }));
    }

    fn handle_notice(&mut self, message: Message) {
        if message.parameters.len() < 2 {
            return;
        }
        let text = message.parameters[1].clone();
        self.emit(Event::Notice(Notice {
            id: message.tags.all.get("msg-id").cloned().unwrap_or_default(),
            message: text.clone(),
            channel: if message.parameters[0] == "*" {
                String::new()
            } else {
                channel_name(&message.parameters[0])
            },
        }));
        if !self.logged_in
            && (text == "Login unsuccessful" || text == "Login authentication failed")
        {
            self.emit(Event::LoggedOut);
            let _ = self.take_pending(|pending| matches!(pending, Pending::Motd { .. }));
        }
    }

    fn handle_host_target(&mut self, message: Message) {
        if message.parameters.len() < 2 || message.parameters[0].len() < 2 {
            return;
        }
        let mut parts = message.parameters[1].split(' ');
        let first = parts.next().unwrap_or_default();
        let (on, being_hosted) = if first == "-" {
            (false, String::new())
        } else {
            (true, first.to_string())
        };
        self.emit(Event::Host(Host {
            on,
            hosting: channel_name(&message.parameters[0]),
            being_hosted,
            viewers: parts
                .next()
                .and_then(|viewers| viewers.parse().ok())
                .unwrap_or(0),
        }));
    }

    fn handle_room_state(&mut self, message: Message) {
        if message.parameters.is_empty() || message.parameters[0].len() < 2 {
            return;
        }
        for mode in ["slow", "followers-only", "r9k", "emote-only", "subs-only"] {
            if let Some(value) = message.tags.all.get(mode) {
                self.emit(Event::RoomModeChange(RoomModeChange {
                    mode: mode.to_string(),
                    parameter: value.parse().unwrap_or(0),
                    channel: channel_name(&message.parameters[0]),
                    channel_id: message.tags.channel_id,
                }));
            }
        }
    }

    fn handle_clear_chat(&mut self, message: Message) {
        if message.parameters.is_empty() || message.parameters[0].len() < 2 {
            return;
        }
        let mut clear = Clear {
            kind: ClearKind::ClearAll,
            channel: channel_name(&message.parameters[0]),
            ..Clear::default()
        };
        if let Some(target) = message.parameters.get(1) {
            clear.user = target.clone();
            if let Some(reason) = message.tags.all.get("ban-reason") {
                clear.reason = unescape_tag_value(reason);
            }
            // No duration means a permanent ban rather than a timeout.
            match message.tags.all.get("ban-duration") {
                None => clear.kind = ClearKind::Ban,
                Some(duration) => {
                    clear.kind = ClearKind::Timeout;
                    clear.duration = duration.parse().unwrap_or(0);
                }
            }
        }
        clear.tags = message.tags;
        self.emit(Event::Clear(clear));
    }

    fn handle_clear_message(&mut self, message: Message) {
        if message.parameters.len() < 2 || message.parameters[0].len() < 2 {
            return;
        }
        self.emit(Event::Clear(Clear {
            kind: ClearKind::ClearMessage,
            channel: channel_name(&message.parameters[0]),
            offending_message_content: message.parameters[1].clone(),
            offending_message_id: message
                .tags
                .all
                .get("target-msg-id")
                .cloned()
                .unwrap_or_default(),
            user: message.tags.all.get("login").cloned().unwrap_or_default(),
            tags: message.tags,
            ..Clear::default()
        }));
    }

    fn handle_mode(&mut self, message: Message) {
        if message.parameters.len() < 3
            || message.parameters[0].len() < 2
            || message.parameters[1].len() < 2
        {
            return;
        }
        let moderator = match message.parameters[1].as_str() {
            "+o" => true,
            "-o" => false,
            _ => return,
        };
        self.emit(Event::Mod(ModStatus {
            moderator,
            channel: channel_name(&message.parameters[0]),
            user: message.parameters[2].clone(),
        }));
    }

    fn handle_global_user_state(&mut self, message: Message) {
        self.emit(Event::UserState(UserState {
            global: true,
            channel: String::new(),
            tags: message.tags,
        }));
    }

    fn handle_user_state(&mut self, message: Message) {
        if message.parameters.is_empty() || message.parameters[0].len() < 2 {
            return;
        }
        self.emit(Event::UserState(UserState {
            global: false,
            channel: channel_name(&message.parameters[0]),
            tags: message.tags,
        }));
    }

    fn handle_user_notice(&mut self, message: Message) {
        if message.parameters.is_empty() || message.parameters[0].len() < 2 {
            return;
        }
        let Some(message_id) = message.tags.all.get("msg-id").cloned() else {
            return;
        };
        let channel = channel_name(&message.parameters[0]);
        let login = message.tags.all.get("login").cloned().unwrap_or_default();
        let system_message = message
            .tags
            .all
            .get("system-msg")
            .map(|raw| unescape_tag_value(raw))
            .unwrap_or_default();
        match message_id.as_str() {
            "ritual" => self.emit(Event::Ritual(Ritual {
                channel,
                user: login,
                ritual: message
                    .tags
                    .all
                    .get("msg-param-ritual-name")
                    .cloned()
                    .unwrap_or_default(),
                system_message,
                tags: message.tags,
            })),
            "raid" => self.emit(Event::Raid(Raid {
                channel,
                raider: login,
                viewers: numeric_tag(&message.tags, "msg-param-viewerCount"),
                system_message,
                tags: message.tags,
            })),
            _ => {
                let mut sub = Sub {
                    kind: SubKind::Unknown,
                    channel,
                    user: login,
                    user_message: message.parameters.get(1).cloned().unwrap_or_default(),
                    system_message,
                    plan_name: message
                        .tags
                        .all
                        .get("msg-param-sub-plan-name")
                        .map(|raw| unescape_tag_value(raw))
                        .unwrap_or_default(),
                    plan_id: numeric_tag(&message.tags, "msg-param-sub-plan"),
                    ..Sub::default()
                };
                match message_id.as_str() {
                    "sub" => sub.kind = SubKind::Sub,
                    "resub" => {
                        sub.kind = SubKind::Resub;
                        sub.months = numeric_tag(&message.tags, "msg-param-months");
                    }
                    "subgift" => {
                        sub.kind = SubKind::Gifted;
                        sub.recipient_display_name = message
                            .tags
                            .all
                            .get("msg-param-recipient-display-name")
                            .cloned()
                            .unwrap_or_default();
                        sub.recipient_user_name = message
                            .tags
                            .all
                            .get("msg-param-recipient-user-name")
                            .cloned()
                            .unwrap_or_default();
                        sub.recipient_id = numeric_tag(&message.tags, "msg-param-recipient-id");
                        sub.sender_count = numeric_tag(&message.tags, "msg-param-sender-count");
                    }
                    "submysterygift" => {
                        sub.kind = SubKind::MysteryGift;
                        sub.mass_gift_count =
                            numeric_tag(&message.tags, "msg-param-mass-gift-count");
                        sub.sender_count = numeric_tag(&message.tags, "msg-param-sender-count");
                    }
                    _ => {}
                }
                sub.tags = message.tags;
                self.emit(Event::Sub(sub));
            }
        }
    }

    // ── Output, events, diagnostics ─────────────────────────────────────

    /// Sends one raw line (terminator added here) and mirrors it to the
    /// diagnostics sinks.
    async fn send_line(&mut self, line: &str) {
        if self.connection.is_none() {
            return;
        }
        self.publish_outbound(line);
        if let Some(connection) = self.connection.as_mut() {
            connection.send(&format!("{line}{CRLF}")).await;
        }
    }

    fn publish_outbound(&self, line: &str) {
        if line.starts_with("PASS oauth:") {
            self.publish_diagnostic("< PASS oauth:**********************");
        } else {
            self.publish_diagnostic(&format!("< {line}"));
        }
    }

    fn publish_diagnostic(&self, text: &str) {
        tracing::trace!(target: "tmi_sdk::wire", "{text}");
        let mut shared = self.lock_shared();
        shared
            .diagnostics
            .retain(|sink| sink.send(text.to_string()).is_ok());
    }

    fn emit(&self, event: Event) {
        let sink = self.lock_shared().events.clone();
        if let Some(sink) = sink {
            let _ = sink.send(event);
        }
    }

    fn clock(&self) -> Option<Arc<dyn Clock>> {
        self.lock_shared().clock.clone()
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, Collaborators> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Channel operand of a server command, without its leading `#`.
fn channel_name(parameter: &str) -> String {
    parameter
        .strip_prefix('#')
        .unwrap_or(parameter)
        .to_string()
}

/// The nickname portion of a message prefix (the part before `!`), or
/// `None` when the prefix has no user part.
fn nickname_from_prefix(prefix: &str) -> Option<&str> {
    prefix.split_once('!').map(|(nickname, _)| nickname)
}

/// True for the `justinfan<digits>` nicknames used by anonymous viewers.
fn is_anonymous_nickname(nickname: &str) -> bool {
    match nickname.strip_prefix("justinfan") {
        Some(digits) => !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit()),
        None => false,
    }
}

/// The body of a `/me` message, when the trailer carries the CTCP ACTION
/// wrapper.
fn action_content(trailer: &str) -> Option<&str> {
    trailer
        .strip_prefix("\u{1}ACTION ")?
        .strip_suffix('\u{1}')
}

fn numeric_tag(tags: &Tags, name: &str) -> u64 {
    tags.all
        .get(name)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_nickname_pattern() {
        assert!(is_anonymous_nickname("justinfan12345"));
        assert!(!is_anonymous_nickname("justinfan"));
        assert!(!is_anonymous_nickname("justinfan12x"));
        assert!(!is_anonymous_nickname("alice"));
    }

    #[test]
    fn action_wrapper_is_stripped() {
        assert_eq!(action_content("\u{1}ACTION waves\u{1}"), Some("waves"));
        assert_eq!(action_content("\u{1}ACTION \u{1}"), Some(""));
        assert_eq!(action_content("just text"), None);
        assert_eq!(action_content("\u{1}ACTION no terminator"), None);
    }

    #[test]
    fn channel_operand_loses_hash() {
        assert_eq!(channel_name("#room"), "room");
        assert_eq!(channel_name("room"), "room");
    }

    #[test]
    fn prefix_nickname_extraction() {
        assert_eq!(
            nickname_from_prefix("alice!alice@alice.tmi.twitch.tv"),
            Some("alice")
        );
        assert_eq!(nickname_from_prefix("tmi.twitch.tv"), None);
    }
}
