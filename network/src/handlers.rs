//! Message-type → handler dispatch.
//!
//! The registry is open: the network installs handlers for the built-in
//! types, and the embedding node may add its own before or after start-up.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::{BoxFuture, FutureExt};

use crate::{Envelope, NetworkError};

pub type Handler =
    Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<(), NetworkError>> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `msg_type`, replacing any previous one.
    pub fn register<F, Fut>(&self, msg_type: impl Into<String>, handler: F)
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), NetworkError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |envelope| handler(envelope).boxed());
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(msg_type.into(), handler);
    }

    pub fn contains(&self, msg_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(msg_type)
    }

    /// Run the handler for the envelope's type.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), NetworkError> {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&envelope.msg_type)
            .cloned();
        match handler {
            Some(handler) => handler(envelope).await,
            None => Err(NetworkError::UnknownMessageType(envelope.msg_type)),
        }
    }
}
