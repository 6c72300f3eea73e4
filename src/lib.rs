//! robotchat: voice/text chat front-end for a robot arm.
//!
//! A user utterance is forwarded to a conversational-AI service, the reply
//! is normalized into `{chat, act}`, and a truthy `act` is dispatched to the
//! robot-control server. The caller then polls until the robot reports the
//! action done before accepting the next input.
//!
//! # Architecture
//!
//! - **Orchestrator** ([`orchestrator`]): one chat call, at most one dispatch
//! - **Action** ([`action`]): fire-and-forget dispatch, status polling, and
//!   the per-session "current action"
//! - **Stream** ([`stream`]): incremental SSE reader for streamed replies
//! - **Server** ([`server`]): the `/robotchat` and `/action_status_proxy` routes
//! - **Front-end** ([`frontend`]): terminal client with speech hooks ([`speech`])

pub mod action;
pub mod chat;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod frontend;
pub mod logging;
pub mod orchestrator;
pub mod reply;
pub mod server;
pub mod speech;
pub mod stream;

pub use action::{ActionDispatcher, ActionId, ActionSession, ActionStatus, StatusPoller};
pub use client::RobotChatClient;
pub use config::RobotChatConfig;
pub use error::{ChatError, Result};
pub use orchestrator::{ChatOrchestrator, RobotReply};
pub use reply::{ActionDirective, ChatReply};
pub use server::{AppState, RobotChatServer};
