//! Request dispatcher.
//!
//! Turns connection events into [`ServerAction`]s without performing any I/O.
//! The connection task feeds it one event at a time and executes the returned
//! actions in order: bytes to write back to the same connection, log lines,
//! and whether to close.
//!
//! All shared state lives in the [`HistoryStore`], which is internally
//! synchronized, so one dispatcher is shared by every connection task.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use sixchan_proto::{
    ClientId, DownloadHeader, FramerConfig, Message, MessageId, POST_LINE_OVERHEAD, ProtocolError,
    Request, UPLOAD_ACCEPTED, UPLOAD_REJECTED, WELCOME_MESSAGE_ID, encode_message, encode_notice,
    encode_terminator,
};
use zerocopy::IntoBytes;

use crate::{
    env::Environment,
    history::{HistoryStore, SyncBatch},
};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Mirror file posts to the operator console too (text posts always are)
    pub echo_file_posts: bool,
    /// Longest response line clients can read, delimiter included
    ///
    /// [`ChatService`](crate::ChatService) sets this to its framer limit.
    pub max_line: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { echo_file_posts: false, max_line: FramerConfig::DEFAULT_MAX_SIZE }
    }
}

/// Events the dispatcher processes.
///
/// These are produced by the connection task.
#[derive(Debug)]
pub enum ServerEvent {
    /// A connection was admitted and assigned `client_id`
    ClientAccepted {
        /// Assigned client id
        client_id: ClientId,
        /// Peer address, if the transport has one
        address: Option<String>,
    },

    /// A complete request was read
    RequestReceived {
        /// Requesting client
        client_id: ClientId,
        /// The decoded request
        request: Request,
    },

    /// Reading the next request failed
    ReadFailed {
        /// Client whose stream failed
        client_id: ClientId,
        /// What went wrong
        error: ProtocolError,
    },

    /// The connection loop exited
    ClientClosed {
        /// Client that left
        client_id: ClientId,
        /// Reason for closure
        reason: String,
    },
}

/// Actions the dispatcher produces.
///
/// These are executed by the connection task, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Write bytes back to the requesting connection
    Send(Bytes),

    /// Mirror a posted message to the operator console
    Echo {
        /// Stored message id
        message_id: MessageId,
        /// Poster
        sender_id: ClientId,
        /// Human-readable text
        text: String,
    },

    /// Close the connection after the preceding actions
    Close {
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Sans-IO request dispatcher.
pub struct Dispatcher<E> {
    env: E,
    history: Arc<HistoryStore>,
    config: DispatchConfig,
}

impl<E: Environment> Dispatcher<E> {
    /// Create a dispatcher over `history`.
    pub fn new(env: E, history: Arc<HistoryStore>, config: DispatchConfig) -> Self {
        Self { env, history, config }
    }

    /// Shared history.
    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Process one event and return the actions to execute.
    pub fn process_event(&self, event: ServerEvent) -> Vec<ServerAction> {
        match event {
            ServerEvent::ClientAccepted { client_id, address } => {
                self.handle_accepted(client_id, address)
            },
            ServerEvent::RequestReceived { client_id, request } => match request {
                Request::Sync { cursor } => self.handle_sync(client_id, cursor),
                Request::Post { text } => self.handle_post(client_id, text),
                Request::Upload { name, content } => self.handle_upload(client_id, &name, content),
                Request::Download { id } => self.handle_download(client_id, id),
            },
            ServerEvent::ReadFailed { client_id, error } => {
                self.handle_read_failed(client_id, error)
            },
            ServerEvent::ClientClosed { client_id, reason } => vec![ServerAction::Log {
                level: LogLevel::Info,
                message: format!("Anonim #{client_id} disconnected: {reason}"),
            }],
        }
    }

    fn handle_accepted(&self, client_id: ClientId, address: Option<String>) -> Vec<ServerAction> {
        let announcement = Message::system(
            format!("New anon joined. Welcome, Anonim #{client_id}"),
            self.env.wall_clock(),
        );
        let stored = self.history.append(announcement);

        let peer = address.as_deref().unwrap_or("local");
        vec![ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "Anonim #{client_id} connected from {peer} (announcement #{})",
                stored.id()
            ),
        }]
    }

    fn handle_sync(&self, client_id: ClientId, cursor: Option<MessageId>) -> Vec<ServerAction> {
        let mut buf = BytesMut::new();
        let mut actions = Vec::new();

        if cursor.is_none() {
            let welcome = Message::system(
                format!("Welcome back, Anonim #{client_id}"),
                self.env.wall_clock(),
            )
            .with_id(WELCOME_MESSAGE_ID);
            encode_message(&welcome, &mut buf);
        }

        match self.history.since(cursor) {
            SyncBatch::Messages(messages) => {
                for message in &messages {
                    encode_message(message, &mut buf);
                }
                if !messages.is_empty() {
                    actions.push(ServerAction::Log {
                        level: LogLevel::Debug,
                        message: format!(
                            "sync for Anonim #{client_id}: {} message(s) after {cursor:?}",
                            messages.len()
                        ),
                    });
                }
            },
            SyncBatch::CursorAhead { newest } => {
                actions.push(ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "Anonim #{client_id} synced from {cursor:?} but newest id is {newest}"
                    ),
                });
            },
        }

        encode_terminator(&mut buf);
        actions.insert(0, ServerAction::Send(buf.freeze()));
        actions
    }

    fn handle_post(&self, client_id: ClientId, text: Bytes) -> Vec<ServerAction> {
        // Stored lines are replayed to every client that syncs past them
        if text.len() + POST_LINE_OVERHEAD > self.config.max_line {
            let reason = format!(
                "post of {} bytes would exceed the {}-byte line limit",
                text.len(),
                self.config.max_line
            );
            return self.handle_read_failed(client_id, ProtocolError::Malformed(reason));
        }

        let stored = self.history.append(Message::text(client_id, text, self.env.wall_clock()));

        vec![ServerAction::Echo {
            message_id: stored.id(),
            sender_id: client_id,
            text: String::from_utf8_lossy(stored.payload()).into_owned(),
        }]
    }

    fn handle_upload(&self, client_id: ClientId, name: &str, content: Bytes) -> Vec<ServerAction> {
        let size = content.len();
        let message = Message::file(client_id, name, content, self.env.wall_clock());
        let stored = self.history.append(message);
        let name = stored.file_name().unwrap_or(name);

        let mut actions = vec![ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "Anonim #{client_id} uploaded '{name}' ({size} bytes) as #{}",
                stored.id()
            ),
        }];
        if self.config.echo_file_posts {
            actions.push(ServerAction::Echo {
                message_id: stored.id(),
                sender_id: client_id,
                text: format!("File '{name}' ({size} bytes)"),
            });
        }

        let mut buf = BytesMut::new();
        encode_notice(UPLOAD_ACCEPTED, &mut buf);
        actions.push(ServerAction::Send(buf.freeze()));
        actions
    }

    fn handle_download(&self, client_id: ClientId, id: MessageId) -> Vec<ServerAction> {
        let found = self.history.get(id).filter(|m| !m.is_empty());

        let Some(message) = found else {
            return vec![
                ServerAction::Send(Bytes::copy_from_slice(DownloadHeader::not_found().as_bytes())),
                ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!("Anonim #{client_id} requested #{id}: nothing to download"),
                },
            ];
        };

        let mut buf = BytesMut::with_capacity(DownloadHeader::SIZE + message.len());
        buf.extend_from_slice(DownloadHeader::found(message.len() as u32).as_bytes());
        buf.extend_from_slice(message.payload());

        vec![ServerAction::Send(buf.freeze()), ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("Anonim #{client_id} downloading #{id} ({} bytes)", message.len()),
        }]
    }

    fn handle_read_failed(&self, client_id: ClientId, error: ProtocolError) -> Vec<ServerAction> {
        match error {
            ProtocolError::Malformed(reason) => vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("ignoring malformed request from Anonim #{client_id}: {reason}"),
            }],
            ProtocolError::UploadTooLarge { size, max } => {
                let mut buf = BytesMut::new();
                encode_notice(UPLOAD_REJECTED, &mut buf);
                vec![
                    ServerAction::Send(buf.freeze()),
                    ServerAction::Log {
                        level: LogLevel::Warn,
                        message: format!(
                            "rejected upload from Anonim #{client_id}: {size} bytes over limit {max}"
                        ),
                    },
                    ServerAction::Close { reason: "upload too large".to_string() },
                ]
            },
            ProtocolError::FrameTooLarge { max } => vec![
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!("Anonim #{client_id} sent a frame over {max} bytes"),
                },
                ServerAction::Close { reason: "frame too large".to_string() },
            ],
            ProtocolError::EndOfStream => {
                vec![ServerAction::Close { reason: "disconnected".to_string() }]
            },
            ProtocolError::Transport(e) => {
                vec![ServerAction::Close { reason: format!("connection reset: {e}") }]
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    #[derive(Clone)]
    struct FixedEnv;

    impl Environment for FixedEnv {
        fn wall_clock(&self) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 5, 17).and_then(|d| d.and_hms_opt(14, 7, 0)).unwrap()
        }
    }

    fn dispatcher(config: DispatchConfig) -> Dispatcher<FixedEnv> {
        Dispatcher::new(FixedEnv, Arc::new(HistoryStore::new()), config)
    }

    fn request(
        d: &Dispatcher<FixedEnv>,
        client_id: ClientId,
        request: Request,
    ) -> Vec<ServerAction> {
        d.process_event(ServerEvent::RequestReceived { client_id, request })
    }

    fn sent(actions: &[ServerAction]) -> Vec<u8> {
        actions
            .iter()
            .filter_map(|a| match a {
                ServerAction::Send(bytes) => Some(bytes.to_vec()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn closes(actions: &[ServerAction]) -> bool {
        actions.iter().any(|a| matches!(a, ServerAction::Close { .. }))
    }

    #[test]
    fn first_sync_on_empty_history_is_welcome_then_terminator() {
        let d = dispatcher(DispatchConfig::default());
        let actions = request(&d, 3, Request::Sync { cursor: None });
        assert_eq!(sent(&actions), b"#0 [14:07] Welcome back, Anonim #3\0\0");
    }

    #[test]
    fn sync_from_newest_is_terminator_only() {
        let d = dispatcher(DispatchConfig::default());
        request(&d, 1, Request::Post { text: Bytes::from_static(b"hello") });
        let actions = request(&d, 1, Request::Sync { cursor: Some(1) });
        assert_eq!(sent(&actions), b"\0");
    }

    #[test]
    fn hello_world_scenario() {
        let d = dispatcher(DispatchConfig::default());
        request(&d, 1, Request::Post { text: Bytes::from_static(b"hello") });
        request(&d, 2, Request::Post { text: Bytes::from_static(b"world") });

        let actions = request(&d, 5, Request::Sync { cursor: None });
        assert_eq!(
            sent(&actions),
            b"#0 [14:07] Welcome back, Anonim #5\0\
              #1 [14:07] Anonim #1: hello\0\
              #2 [14:07] Anonim #2: world\0\
              \0"
            .to_vec()
        );
        assert_eq!(sent(&request(&d, 5, Request::Sync { cursor: Some(2) })), b"\0");
    }

    #[test]
    fn accept_appends_join_announcement() {
        let d = dispatcher(DispatchConfig::default());
        d.process_event(ServerEvent::ClientAccepted { client_id: 4, address: None });

        let actions = request(&d, 4, Request::Sync { cursor: Some(0) });
        assert_eq!(sent(&actions), b"#1 [14:07] New anon joined. Welcome, Anonim #4\0\0");
    }

    #[test]
    fn cursor_ahead_warns_and_terminates() {
        let d = dispatcher(DispatchConfig::default());
        let actions = request(&d, 1, Request::Sync { cursor: Some(40) });
        assert_eq!(sent(&actions), b"\0");
        let warned = |a: &ServerAction| matches!(a, ServerAction::Log { level: LogLevel::Warn, .. });
        assert!(actions.iter().any(warned));
    }

    #[test]
    fn posts_are_echoed() {
        let d = dispatcher(DispatchConfig::default());
        let actions = request(&d, 2, Request::Post { text: Bytes::from_static(b"hi") });
        assert_eq!(actions, vec![ServerAction::Echo {
            message_id: 1,
            sender_id: 2,
            text: "hi".to_string()
        }]);
    }

    #[test]
    fn post_too_long_to_replay_is_refused() {
        let d = dispatcher(DispatchConfig { max_line: 64, ..DispatchConfig::default() });

        let fits = Bytes::from(vec![b'a'; 64 - POST_LINE_OVERHEAD]);
        let actions = request(&d, 1, Request::Post { text: fits });
        assert!(actions.iter().any(|a| matches!(a, ServerAction::Echo { .. })));

        let over = Bytes::from(vec![b'b'; 64 - POST_LINE_OVERHEAD + 1]);
        let actions = request(&d, 1, Request::Post { text: over });
        assert!(!closes(&actions));
        assert!(sent(&actions).is_empty());
        assert_eq!(d.history().len(), 1);

        // Every stored line fits the limit
        let sync = request(&d, 2, Request::Sync { cursor: Some(0) });
        assert!(sent(&sync).split(|&b| b == 0).all(|line| line.len() < 64));
    }

    #[test]
    fn file_echo_follows_config() {
        let upload = || Request::Upload { name: "a.txt".into(), content: Bytes::from_static(b"x") };

        let quiet = dispatcher(DispatchConfig::default());
        let actions = request(&quiet, 1, upload());
        assert!(!actions.iter().any(|a| matches!(a, ServerAction::Echo { .. })));
        assert_eq!(sent(&actions), b"File uploaded\0");

        let loud =
            dispatcher(DispatchConfig { echo_file_posts: true, ..DispatchConfig::default() });
        let actions = request(&loud, 1, upload());
        assert!(actions.iter().any(|a| matches!(a, ServerAction::Echo { .. })));
    }

    #[test]
    fn upload_then_download_round_trips() {
        let d = dispatcher(DispatchConfig::default());
        let content = Bytes::from_static(b"\x00\x01binary\xff");
        request(&d, 1, Request::Upload { name: "blob.bin".into(), content: content.clone() });

        let mut expected = DownloadHeader::found(content.len() as u32).as_bytes().to_vec();
        expected.extend_from_slice(&content);
        assert_eq!(sent(&request(&d, 2, Request::Download { id: 1 })), expected);

        let sync = sent(&request(&d, 2, Request::Sync { cursor: Some(0) }));
        assert_eq!(
            sync,
            b"#1 [14:07] Anonim #1: File 'blob.bin' (9 bytes). Type '/dl 1' to download\0\0".to_vec()
        );
    }

    #[test]
    fn unknown_download_gets_invalid_size() {
        let d = dispatcher(DispatchConfig::default());
        assert_eq!(
            sent(&request(&d, 1, Request::Download { id: 99 })),
            DownloadHeader::not_found().as_bytes()
        );
    }

    #[test]
    fn text_messages_are_downloadable() {
        let d = dispatcher(DispatchConfig::default());
        request(&d, 1, Request::Post { text: Bytes::from_static(b"note") });

        let mut expected = DownloadHeader::found(4).as_bytes().to_vec();
        expected.extend_from_slice(b"note");
        assert_eq!(sent(&request(&d, 1, Request::Download { id: 1 })), expected);
    }

    #[test]
    fn malformed_keeps_connection() {
        let d = dispatcher(DispatchConfig::default());
        let actions = d.process_event(ServerEvent::ReadFailed {
            client_id: 1,
            error: ProtocolError::Malformed("bad id".into()),
        });
        assert!(!closes(&actions));
        assert!(sent(&actions).is_empty());
    }

    #[test]
    fn oversized_upload_is_rejected_and_closed() {
        let d = dispatcher(DispatchConfig::default());
        let actions = d.process_event(ServerEvent::ReadFailed {
            client_id: 1,
            error: ProtocolError::UploadTooLarge { size: 10, max: 5 },
        });
        assert_eq!(sent(&actions), b"File rejected: too large\0");
        assert!(closes(&actions));
        assert!(d.history().is_empty());
    }

    #[test]
    fn transport_failures_close() {
        let d = dispatcher(DispatchConfig::default());
        for error in [
            ProtocolError::EndOfStream,
            ProtocolError::FrameTooLarge { max: 8 },
            ProtocolError::Transport(std::io::ErrorKind::ConnectionReset.into()),
        ] {
            assert!(closes(&d.process_event(ServerEvent::ReadFailed { client_id: 1, error })));
        }
    }
}
