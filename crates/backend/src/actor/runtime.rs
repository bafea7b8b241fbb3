//! Thread-per-actor runtime
//!
//! Each actor owns a dedicated OS thread and an unbounded FIFO mailbox. The
//! worker takes one message at a time, so the actor's state is never touched
//! concurrently and needs no locks.
//!
//! # Dispatch modes
//!
//! - [`Addr::call`]: enqueue and block for the result. Rejected with
//!   [`ActorError::SelfDeadlock`] when issued from the actor's own thread.
//! - [`Addr::cast`]: enqueue and return. Also allowed from the actor's own
//!   thread, in which case the action runs after the current message.
//! - [`Addr::cast_with`]: enqueue and hand the result to a [`ResultCallback`].
//!
//! Inside a handler the actor calls its own `&mut self` methods directly; the
//! mailbox is only involved for work that crosses threads or that must run
//! after the current message.
//!
//! The mailbox uses tokio's unbounded channel consumed with `blocking_recv`,
//! so synchronous calls must not be issued from within an async runtime.

use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc, Condvar, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
  },
  thread::{self, JoinHandle, ThreadId},
};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use super::message::{ActorMessage, Reply, ResultCallback, panic_message};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by the actor runtime or by dispatched actions
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
  #[error("Actor {0} is not running")]
  NotRunning(&'static str),

  #[error("Actor {0} cannot wait on itself")]
  SelfDeadlock(&'static str),

  #[error("Actor {0} received a message it does not handle")]
  UnhandledMessage(&'static str),

  #[error("Action {action} panicked: {message}")]
  Panicked { action: &'static str, message: String },

  #[error("Actor {0} dropped the reply channel")]
  Disconnected(&'static str),

  #[error("Failed to spawn worker thread for {actor}: {source}")]
  Spawn {
    actor: &'static str,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl ActorError {
  /// Wrap a domain error raised inside an action
  pub fn failed(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    ActorError::Failed(Box::new(e))
  }
}

// ============================================================================
// Actor Trait
// ============================================================================

/// Lifecycle of an actor's worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
  NotStarted,
  Running,
  Terminating,
  Stopped,
}

/// State owned by a single worker thread
pub trait Actor: Send + Sized + 'static {
  /// Names the worker thread and tags log lines
  const NAME: &'static str;

  /// Runs on the worker thread before the first message
  fn started(&mut self, _ctx: &Context<Self>) {}

  /// Runs on the worker thread after the quit message
  fn stopped(&mut self) {}

  /// Extension point for messages that are not dispatch envelopes
  fn handle_message(&mut self, _ctx: &Context<Self>, _msg: Box<dyn Any + Send>) -> Result<(), ActorError> {
    Err(ActorError::UnhandledMessage(Self::NAME))
  }
}

/// Handed to every action; gives the actor its own address for re-entrant casts
pub struct Context<A: Actor> {
  addr: Addr<A>,
}

impl<A: Actor> Context<A> {
  pub fn addr(&self) -> &Addr<A> {
    &self.addr
  }
}

// ============================================================================
// Address
// ============================================================================

type Mailbox<A> = mpsc::UnboundedReceiver<ActorMessage<A>>;

struct Lifecycle<A: Actor> {
  state: ActorState,
  /// Actor and mailbox parked while no worker is running
  parked: Option<(A, Mailbox<A>)>,
  worker: Option<JoinHandle<(A, Mailbox<A>)>>,
  thread_id: Option<ThreadId>,
}

struct Shared<A: Actor> {
  tx: mpsc::UnboundedSender<ActorMessage<A>>,
  lifecycle: Mutex<Lifecycle<A>>,
  /// Signalled when a quit leaves `Terminating`
  stopped: Condvar,
  received: AtomicU64,
}

/// Cheap, cloneable address of an actor
pub struct Addr<A: Actor> {
  shared: Arc<Shared<A>>,
}

impl<A: Actor> Clone for Addr<A> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<A: Actor> std::fmt::Debug for Addr<A> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Addr")
      .field("actor", &A::NAME)
      .field("state", &self.state())
      .finish()
  }
}

impl<A: Actor> Addr<A> {
  /// Wrap `actor` without starting its worker
  pub fn new(actor: A) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      shared: Arc::new(Shared {
        tx,
        lifecycle: Mutex::new(Lifecycle {
          state: ActorState::NotStarted,
          parked: Some((actor, rx)),
          worker: None,
          thread_id: None,
        }),
        stopped: Condvar::new(),
        received: AtomicU64::new(0),
      }),
    }
  }

  fn lifecycle(&self) -> MutexGuard<'_, Lifecycle<A>> {
    self.shared.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Spawn the worker thread; a no-op when it is already running
  pub fn start(&self) -> Result<(), ActorError> {
    let mut life = self.lifecycle();

    match life.state {
      ActorState::Running => return Ok(()),
      ActorState::Terminating => return Err(ActorError::NotRunning(A::NAME)),
      ActorState::NotStarted | ActorState::Stopped => {}
    }

    let Some((actor, mailbox)) = life.parked.take() else {
      return Err(ActorError::NotRunning(A::NAME));
    };

    let ctx = Context { addr: self.clone() };
    let spawned = thread::Builder::new()
      .name(A::NAME.to_string())
      .spawn(move || run_worker(actor, mailbox, ctx));

    match spawned {
      Ok(handle) => {
        life.thread_id = Some(handle.thread().id());
        life.worker = Some(handle);
        life.state = ActorState::Running;
        debug!(actor = A::NAME, "Actor started");
        Ok(())
      }
      Err(source) => {
        life.state = ActorState::Stopped;
        error!(actor = A::NAME, error = %source, "Failed to spawn actor thread");
        Err(ActorError::Spawn { actor: A::NAME, source })
      }
    }
  }

  /// Enqueue the poison pill and block until the worker has exited
  ///
  /// Messages queued before the pill are still processed. The actor's state
  /// is kept, so a later [`start`](Self::start) resumes it. A quit issued
  /// while another one is in flight waits for that one to finish.
  pub fn quit(&self) -> Result<(), ActorError> {
    let worker = {
      let mut life = self.lifecycle();
      let state = life.state;
      match state {
        ActorState::NotStarted => return Err(ActorError::NotRunning(A::NAME)),
        ActorState::Stopped => return Ok(()),
        ActorState::Terminating => {
          if life.thread_id != Some(thread::current().id()) {
            let _stopped = self
              .shared
              .stopped
              .wait_while(life, |l| l.state == ActorState::Terminating)
              .unwrap_or_else(PoisonError::into_inner);
          }
          return Ok(());
        }
        ActorState::Running => {}
      }

      if life.thread_id == Some(thread::current().id()) {
        return Err(ActorError::SelfDeadlock(A::NAME));
      }

      if self.shared.tx.send(ActorMessage::Quit).is_err() {
        return Err(ActorError::Disconnected(A::NAME));
      }
      life.state = ActorState::Terminating;
      life.worker.take()
    };

    let joined = worker.map(|handle| handle.join());

    let mut life = self.lifecycle();
    life.thread_id = None;
    life.state = ActorState::Stopped;
    self.shared.stopped.notify_all();

    match joined {
      Some(Ok(parked)) => {
        life.parked = Some(parked);
        debug!(actor = A::NAME, "Actor stopped");
        Ok(())
      }
      Some(Err(payload)) => Err(ActorError::Panicked {
        action: "lifecycle",
        message: panic_message(payload.as_ref()),
      }),
      None => Ok(()),
    }
  }

  pub fn state(&self) -> ActorState {
    self.lifecycle().state
  }

  /// True when called from this actor's worker thread
  pub fn is_current(&self) -> bool {
    self.lifecycle().thread_id == Some(thread::current().id())
  }

  /// Number of messages the worker has taken from the mailbox
  pub fn received_count(&self) -> u64 {
    self.shared.received.load(Ordering::Relaxed)
  }

  /// True when both addresses point at the same actor
  pub fn ptr_eq(&self, other: &Addr<A>) -> bool {
    Arc::ptr_eq(&self.shared, &other.shared)
  }

  /// Enqueue a raw message; never blocks
  pub fn send(&self, msg: ActorMessage<A>) -> Result<(), ActorError> {
    trace!(actor = A::NAME, message = ?msg, "Enqueue");
    self.shared.tx.send(msg).map_err(|_| ActorError::Disconnected(A::NAME))
  }

  fn ensure_started(&self) -> Result<(), ActorError> {
    match self.state() {
      ActorState::NotStarted => self.start(),
      ActorState::Running => Ok(()),
      ActorState::Terminating | ActorState::Stopped => Err(ActorError::NotRunning(A::NAME)),
    }
  }

  /// Run `f` on the actor's thread and wait for its result
  pub fn call<R, F>(&self, name: &'static str, f: F) -> Result<R, ActorError>
  where
    R: Send + 'static,
    F: FnOnce(&mut A, &Context<A>) -> Result<R, ActorError> + Send + 'static,
  {
    if self.is_current() {
      return Err(ActorError::SelfDeadlock(A::NAME));
    }
    self.ensure_started()?;

    let (tx, rx) = oneshot::channel();
    self.send(ActorMessage::dispatch(name, f, Reply::Wait(tx)))?;
    rx.blocking_recv().map_err(|_| ActorError::Disconnected(A::NAME))?
  }

  /// Run `f` on the actor's thread without waiting
  pub fn cast<R, F>(&self, name: &'static str, f: F)
  where
    R: Send + 'static,
    F: FnOnce(&mut A, &Context<A>) -> Result<R, ActorError> + Send + 'static,
  {
    let sent = self
      .ensure_started()
      .and_then(|()| self.send(ActorMessage::dispatch(name, f, Reply::Detached(name))));

    if let Err(e) = sent {
      debug!(actor = A::NAME, action = name, error = %e, "Dropped cast");
    }
  }

  /// Run `f` on the actor's thread and hand its result to `callback`
  ///
  /// If the actor is not running the error goes to `callback` instead.
  pub fn cast_with<R, F>(&self, name: &'static str, f: F, callback: ResultCallback<R>)
  where
    R: Send + 'static,
    F: FnOnce(&mut A, &Context<A>) -> Result<R, ActorError> + Send + 'static,
  {
    if let Err(e) = self.ensure_started() {
      callback.invoke(Err(e));
      return;
    }

    if let Err(e) = self.send(ActorMessage::dispatch(name, f, Reply::Callback(callback))) {
      error!(actor = A::NAME, action = name, error = %e, "Mailbox closed, callback dropped");
    }
  }

  /// Build a callback that posts its result into this actor's mailbox
  ///
  /// `f` then runs on this actor's worker thread, whichever thread produced
  /// the result.
  pub fn callback<R, F>(&self, name: &'static str, f: F) -> ResultCallback<R>
  where
    R: Send + 'static,
    F: FnOnce(&mut A, &Context<A>, Result<R, ActorError>) + Send + 'static,
  {
    let addr = self.clone();
    ResultCallback::new(move |result| {
      let deliver = ActorMessage::dispatch(
        name,
        move |actor: &mut A, ctx: &Context<A>| {
          f(actor, ctx, result);
          Ok(())
        },
        Reply::Detached(name),
      );
      if let Err(e) = addr.send(deliver) {
        debug!(actor = A::NAME, action = name, error = %e, "Dropped callback");
      }
    })
  }

  /// Deliver a custom message to [`Actor::handle_message`]
  pub fn post(&self, payload: Box<dyn Any + Send>) -> Result<(), ActorError> {
    self.ensure_started()?;
    self.send(ActorMessage::custom(payload, None))
  }

  /// Deliver a custom message and wait for the handler's outcome
  pub fn post_and_wait(&self, payload: Box<dyn Any + Send>) -> Result<(), ActorError> {
    if self.is_current() {
      return Err(ActorError::SelfDeadlock(A::NAME));
    }
    self.ensure_started()?;

    let (tx, rx) = oneshot::channel();
    self.send(ActorMessage::custom(payload, Some(tx)))?;
    rx.blocking_recv().map_err(|_| ActorError::Disconnected(A::NAME))?
  }
}

// ============================================================================
// Worker Loop
// ============================================================================

fn run_worker<A: Actor>(mut actor: A, mut mailbox: Mailbox<A>, ctx: Context<A>) -> (A, Mailbox<A>) {
  actor.started(&ctx);

  while let Some(msg) = mailbox.blocking_recv() {
    ctx.addr.shared.received.fetch_add(1, Ordering::Relaxed);

    match msg {
      ActorMessage::Dispatch { name, action } => {
        trace!(actor = A::NAME, action = name, "Dispatch");
        action(&mut actor, &ctx);
      }
      ActorMessage::Custom { payload, reply } => {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| actor.handle_message(&ctx, payload))) {
          Ok(result) => result,
          Err(payload) => Err(ActorError::Panicked {
            action: "handle_message",
            message: panic_message(payload.as_ref()),
          }),
        };

        match reply {
          Some(tx) => {
            let _ = tx.send(result);
          }
          None => {
            if let Err(e) = result {
              error!(actor = A::NAME, error = %e, "Custom message failed");
            }
          }
        }
      }
      ActorMessage::Quit => break,
    }
  }

  actor.stopped();
  (actor, mailbox)
}
