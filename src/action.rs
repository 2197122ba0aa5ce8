//! Actions conveyed from the caller API and transport callbacks to the
//! session worker.

/// One unit of pending intent, consumed by the worker in posting order.
#[derive(Debug)]
pub(crate) enum Action {
    /// Establish a new connection and log in over it.
    LogIn {
        nickname: String,
        token: String,
        anonymous: bool,
    },

    /// Log out and close the active connection.
    LogOut { farewell: String },

    /// Process raw bytes received from the server.
    ProcessMessagesReceived { data: String },

    /// The server closed its end of the connection.
    ServerDisconnected,

    /// Join a channel.
    Join { channel: String },

    /// Leave a channel.
    Leave { channel: String },

    /// Send a message to a channel, optionally as a reply to `parent`.
    SendMessage {
        channel: String,
        text: String,
        parent: String,
    },

    /// Send a whisper to another user.
    SendWhisper { nickname: String, text: String },

    /// Stop the worker.
    Stop,
}
