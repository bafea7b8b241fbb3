//! Message types for actor mailboxes
//!
//! Every mailbox carries [`ActorMessage`] values. The common case is a
//! `Dispatch`: a deferred action over the actor's state paired with a
//! [`Reply`] that decides where its result goes.

use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
};

use tokio::sync::oneshot;
use tracing::debug;

use super::runtime::{Actor, ActorError, Context};

/// Deferred computation over an actor's state
pub type Action<A> = Box<dyn FnOnce(&mut A, &Context<A>) + Send>;

// ============================================================================
// Mailbox Messages
// ============================================================================

/// A unit of work in an actor's mailbox
pub enum ActorMessage<A: Actor> {
  /// Run an action on the actor's worker thread
  Dispatch { name: &'static str, action: Action<A> },

  /// Anything that is not a dispatch envelope, routed to [`Actor::handle_message`]
  Custom {
    payload: Box<dyn Any + Send>,
    reply: Option<oneshot::Sender<Result<(), ActorError>>>,
  },

  /// Poison pill: the worker exits after taking this from the mailbox
  Quit,
}

impl<A: Actor> ActorMessage<A> {
  /// Wrap `f` so that its outcome, including a panic, is handed to `reply`
  pub fn dispatch<R, F>(name: &'static str, f: F, reply: Reply<R>) -> Self
  where
    R: Send + 'static,
    F: FnOnce(&mut A, &Context<A>) -> Result<R, ActorError> + Send + 'static,
  {
    let action: Action<A> = Box::new(move |actor: &mut A, ctx: &Context<A>| {
      let result = match panic::catch_unwind(AssertUnwindSafe(|| f(actor, ctx))) {
        Ok(result) => result,
        Err(payload) => Err(ActorError::Panicked {
          action: name,
          message: panic_message(payload.as_ref()),
        }),
      };
      reply.deliver(result);
    });

    ActorMessage::Dispatch { name, action }
  }

  pub fn custom(payload: Box<dyn Any + Send>, reply: Option<oneshot::Sender<Result<(), ActorError>>>) -> Self {
    ActorMessage::Custom { payload, reply }
  }
}

impl<A: Actor> std::fmt::Debug for ActorMessage<A> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ActorMessage::Dispatch { name, .. } => f.debug_struct("Dispatch").field("name", name).finish(),
      ActorMessage::Custom { reply, .. } => f.debug_struct("Custom").field("waiting", &reply.is_some()).finish(),
      ActorMessage::Quit => f.write_str("Quit"),
    }
  }
}

// ============================================================================
// Replies
// ============================================================================

/// Where the result of a dispatched action is delivered
pub enum Reply<R> {
  /// A caller is blocked on the other end
  Wait(oneshot::Sender<Result<R, ActorError>>),
  /// Invoked once the action completes
  Callback(ResultCallback<R>),
  /// Fire-and-forget; errors are only logged
  Detached(&'static str),
}

impl<R> Reply<R> {
  pub fn deliver(self, result: Result<R, ActorError>) {
    match self {
      Reply::Wait(tx) => {
        // The waiter may have given up; nothing left to notify
        let _ = tx.send(result);
      }
      Reply::Callback(callback) => callback.invoke(result),
      Reply::Detached(name) => {
        if let Err(e) = result {
          debug!(action = name, error = %e, "Dropped error from detached action");
        }
      }
    }
  }
}

/// Receives the outcome of an asynchronous dispatch
///
/// Callbacks created with [`Addr::callback`](super::runtime::Addr::callback)
/// post the outcome into the receiving actor's mailbox, so the handler runs on
/// that actor's worker thread.
pub struct ResultCallback<R>(Box<dyn FnOnce(Result<R, ActorError>) + Send>);

impl<R> ResultCallback<R> {
  pub fn new(f: impl FnOnce(Result<R, ActorError>) + Send + 'static) -> Self {
    Self(Box::new(f))
  }

  pub fn invoke(self, result: Result<R, ActorError>) {
    (self.0)(result)
  }
}

impl<R> std::fmt::Debug for ResultCallback<R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("ResultCallback")
  }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
