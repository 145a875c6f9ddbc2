//! Single-writer dispatcher actor
//!
//! One Tokio task owns the [`CommandRouter`] and handles invocations one at a
//! time. Callers hold a cloneable [`RouterHandle`]; read-modify-write
//! sequences (Move, Update) from different callers therefore never
//! interleave.
//!
//! ```text
//!   caller ──┐
//!   caller ──┼── RouterHandle ── mpsc (bounded) ──► RouterActor ──► CommandRouter
//!   caller ──┘                                           │
//!                       ◄──────── oneshot Response ──────┘
//! ```

use crate::{
    router::{CommandRouter, Invocation, Response},
    Error, Result,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Message sent to the router actor
#[derive(Debug)]
pub enum RouterMessage {
    /// Seed entry point
    Init {
        /// Call to route
        invocation: Invocation,
        /// Reply channel
        response: oneshot::Sender<Response>,
    },

    /// Operation entry point
    Invoke {
        /// Call to route
        invocation: Invocation,
        /// Reply channel
        response: oneshot::Sender<Response>,
    },

    /// Stop after the messages already queued
    Shutdown,
}

/// Actor that processes router messages
#[derive(Debug)]
pub struct RouterActor {
    router: CommandRouter,
    mailbox: mpsc::Receiver<RouterMessage>,
}

impl RouterActor {
    /// Create new actor
    pub fn new(router: CommandRouter, mailbox: mpsc::Receiver<RouterMessage>) -> Self {
        Self { router, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                RouterMessage::Init {
                    invocation,
                    response,
                } => {
                    let _ = response.send(self.router.init(&invocation));
                }
                RouterMessage::Invoke {
                    invocation,
                    response,
                } => {
                    let _ = response.send(self.router.invoke(&invocation));
                }
                RouterMessage::Shutdown => break,
            }
        }

        tracing::debug!("Router actor stopped");
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct RouterHandle {
    sender: mpsc::Sender<RouterMessage>,
}

impl RouterHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<RouterMessage>) -> Self {
        Self { sender }
    }

    /// Route through the seed entry point
    pub async fn init(&self, invocation: Invocation) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RouterMessage::Init {
                invocation,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Route through the operation entry point
    pub async fn invoke(&self, invocation: Invocation) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RouterMessage::Invoke {
                invocation,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RouterMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the router actor
///
/// The returned task finishes once the actor has stopped and dropped its
/// router (and with it the store).
pub fn spawn_router_actor(
    router: CommandRouter,
    mailbox_capacity: usize,
) -> (RouterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = RouterActor::new(router, rx);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (RouterHandle::new(tx), task)
}
