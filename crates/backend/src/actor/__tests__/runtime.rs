//! Actor runtime tests: dispatch modes, lifecycle and failure handling.

#[cfg(test)]
mod tests {
  use std::{
    sync::{Arc, Mutex, mpsc},
    thread::{self, ThreadId},
    time::Duration,
  };

  use pretty_assertions::assert_eq;

  use crate::actor::{
    __tests__::helpers::wait_for,
    message::ResultCallback,
    runtime::{Actor, ActorError, ActorState, Addr, Context},
  };

  #[derive(Debug, thiserror::Error)]
  #[error("value too large: {0}")]
  struct TooLarge(i64);

  #[derive(Default)]
  struct Counter {
    value: i64,
    log: Vec<&'static str>,
  }

  impl Actor for Counter {
    const NAME: &'static str = "counter";
  }

  impl Counter {
    fn add(&mut self, n: i64) -> Result<i64, ActorError> {
      if n > 100 {
        return Err(ActorError::failed(TooLarge(n)));
      }
      self.value += n;
      Ok(self.value)
    }
  }

  fn worker_thread<A: Actor>(addr: &Addr<A>) -> ThreadId {
    addr.call("thread_id", |_, _| Ok(thread::current().id())).unwrap()
  }

  // ==========================================================================
  // Dispatch
  // ==========================================================================

  #[test]
  fn test_call_returns_result() {
    let addr = Addr::new(Counter::default());

    assert_eq!(addr.call("add", |c: &mut Counter, _| c.add(2)).unwrap(), 2);
    assert_eq!(addr.call("add", |c: &mut Counter, _| c.add(3)).unwrap(), 5);
    assert_eq!(addr.state(), ActorState::Running);

    addr.quit().unwrap();
  }

  #[test]
  fn test_call_reraises_actor_error() {
    let addr = Addr::new(Counter::default());

    let err = addr.call("add", |c: &mut Counter, _| c.add(1000)).unwrap_err();
    assert_eq!(err.to_string(), "value too large: 1000");
    assert_eq!(addr.call("value", |c: &mut Counter, _| Ok(c.value)).unwrap(), 0);

    addr.quit().unwrap();
  }

  #[test]
  fn test_self_call_rejected_before_enqueue() {
    let addr = Addr::new(Counter::default());
    let (tx, rx) = mpsc::channel();

    addr.cast("nested", move |_c: &mut Counter, ctx: &Context<Counter>| {
      let nested = ctx.addr().call("inner", |c: &mut Counter, _| c.add(1));
      tx.send(nested.map_err(|e| e.to_string())).unwrap();
      Ok(())
    });

    let nested = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(nested, Err("Actor counter cannot wait on itself".to_string()));
    // The rejected action never ran
    assert_eq!(addr.call("value", |c: &mut Counter, _| Ok(c.value)).unwrap(), 0);

    addr.quit().unwrap();
  }

  #[test]
  fn test_self_cast_runs_after_current_message() {
    let addr = Addr::new(Counter::default());

    addr.cast("outer", |c: &mut Counter, ctx: &Context<Counter>| {
      c.log.push("outer-start");
      ctx.addr().cast("inner", |c: &mut Counter, _| {
        c.log.push("inner");
        Ok(())
      });
      c.log.push("outer-end");
      Ok(())
    });

    let mut log = Vec::new();
    let done = wait_for(Duration::from_secs(5), || {
      log = addr.call("log", |c: &mut Counter, _| Ok(c.log.clone())).unwrap();
      log.len() == 3
    });
    assert!(done);
    assert_eq!(log, vec!["outer-start", "outer-end", "inner"]);

    addr.quit().unwrap();
  }

  #[test]
  fn test_messages_processed_in_fifo_order() {
    let addr = Addr::new(Counter::default());

    for name in ["first", "second", "third"] {
      addr.cast(name, move |c: &mut Counter, _| {
        c.log.push(name);
        Ok(())
      });
    }

    let log = addr.call("log", |c: &mut Counter, _| Ok(c.log.clone())).unwrap();
    assert_eq!(log, vec!["first", "second", "third"]);
    assert_eq!(addr.received_count(), 4);

    addr.quit().unwrap();
  }

  #[test]
  fn test_callback_runs_on_receiving_actor_thread() {
    struct Requester {
      replies: Vec<(i64, ThreadId)>,
    }
    impl Actor for Requester {
      const NAME: &'static str = "requester";
    }

    let counter = Addr::new(Counter::default());
    let requester = Addr::new(Requester { replies: Vec::new() });
    let requester_thread = worker_thread(&requester);
    let counter_thread = worker_thread(&counter);
    assert_ne!(requester_thread, counter_thread);

    let target = counter.clone();
    requester.cast("ask", move |_r: &mut Requester, ctx: &Context<Requester>| {
      let on_reply = ctx
        .addr()
        .callback("reply", |r: &mut Requester, _ctx: &Context<Requester>, result: Result<i64, ActorError>| {
          r.replies.push((result.unwrap_or(-1), thread::current().id()));
        });
      target.cast_with("add", |c: &mut Counter, _| c.add(7), on_reply);
      Ok(())
    });

    let mut replies = Vec::new();
    let done = wait_for(Duration::from_secs(5), || {
      replies = requester.call("replies", |r: &mut Requester, _| Ok(r.replies.clone())).unwrap();
      !replies.is_empty()
    });
    assert!(done);
    assert_eq!(replies, vec![(7, requester_thread)]);

    requester.quit().unwrap();
    counter.quit().unwrap();
  }

  #[test]
  fn test_callback_receives_error() {
    let addr = Addr::new(Counter::default());
    let (tx, rx) = mpsc::channel();

    addr.cast_with(
      "add",
      |c: &mut Counter, _| c.add(500),
      ResultCallback::new(move |result: Result<i64, ActorError>| {
        tx.send(result.map_err(|e| e.to_string())).unwrap();
      }),
    );

    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result, Err("value too large: 500".to_string()));

    addr.quit().unwrap();
  }

  #[test]
  fn test_custom_message_without_handler_is_unhandled() {
    let addr = Addr::new(Counter::default());

    let err = addr.post_and_wait(Box::new("ping")).unwrap_err();
    assert!(matches!(err, ActorError::UnhandledMessage("counter")));

    addr.quit().unwrap();
  }

  #[test]
  fn test_custom_message_handler() {
    #[derive(Default)]
    struct Echo {
      received: Arc<Mutex<Vec<String>>>,
    }
    impl Actor for Echo {
      const NAME: &'static str = "echo";

      fn handle_message(
        &mut self,
        _ctx: &Context<Self>,
        msg: Box<dyn std::any::Any + Send>,
      ) -> Result<(), ActorError> {
        let text = msg.downcast::<String>().map_err(|_| ActorError::UnhandledMessage(Self::NAME))?;
        self.received.lock().unwrap().push(*text);
        Ok(())
      }
    }

    let echo = Echo::default();
    let received = Arc::clone(&echo.received);
    let addr = Addr::new(echo);

    addr.post_and_wait(Box::new("hello".to_string())).unwrap();
    assert!(addr.post_and_wait(Box::new(42u32)).is_err());
    assert_eq!(*received.lock().unwrap(), vec!["hello".to_string()]);

    addr.quit().unwrap();
  }

  #[test]
  fn test_panic_does_not_kill_worker() {
    let addr = Addr::new(Counter::default());

    let err = addr
      .call("explode", |_c: &mut Counter, _| -> Result<(), ActorError> { panic!("boom") })
      .unwrap_err();
    match err {
      ActorError::Panicked { action, message } => {
        assert_eq!(action, "explode");
        assert_eq!(message, "boom");
      }
      other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(addr.call("add", |c: &mut Counter, _| c.add(1)).unwrap(), 1);
    addr.quit().unwrap();
  }

  // ==========================================================================
  // Lifecycle
  // ==========================================================================

  #[test]
  fn test_start_is_idempotent() {
    let addr = Addr::new(Counter::default());

    addr.start().unwrap();
    let thread = worker_thread(&addr);
    addr.start().unwrap();
    assert_eq!(worker_thread(&addr), thread);

    addr.quit().unwrap();
  }

  #[test]
  fn test_quit_before_start_fails() {
    let addr = Addr::new(Counter::default());
    assert!(matches!(addr.quit(), Err(ActorError::NotRunning("counter"))));
  }

  #[test]
  fn test_quit_drains_queue_and_restart_keeps_state() {
    let addr = Addr::new(Counter::default());

    for _ in 0..10 {
      addr.cast("add", |c: &mut Counter, _| c.add(1));
    }
    addr.quit().unwrap();
    assert_eq!(addr.state(), ActorState::Stopped);

    // Dispatch to a stopped actor does not restart it
    let err = addr.call("value", |c: &mut Counter, _| Ok(c.value)).unwrap_err();
    assert!(matches!(err, ActorError::NotRunning("counter")));
    assert!(addr.quit().is_ok());

    addr.start().unwrap();
    assert_eq!(addr.call("value", |c: &mut Counter, _| Ok(c.value)).unwrap(), 10);
    addr.quit().unwrap();
  }

  #[test]
  fn test_concurrent_quit_waits_for_worker() {
    let addr = Addr::new(Counter::default());
    let (entered_tx, entered_rx) = mpsc::channel();

    addr.cast("slow", move |c: &mut Counter, _| {
      entered_tx.send(()).unwrap();
      thread::sleep(Duration::from_millis(300));
      c.add(1)
    });
    entered_rx.recv().unwrap();

    let first = {
      let addr = addr.clone();
      thread::spawn(move || addr.quit())
    };
    assert!(wait_for(Duration::from_secs(5), || addr.state() == ActorState::Terminating));

    addr.quit().unwrap();
    assert_eq!(addr.state(), ActorState::Stopped);
    first.join().unwrap().unwrap();

    addr.start().unwrap();
    assert_eq!(addr.call("value", |c: &mut Counter, _| Ok(c.value)).unwrap(), 1);
    addr.quit().unwrap();
  }

  #[test]
  fn test_quit_from_own_thread_is_rejected() {
    let addr = Addr::new(Counter::default());

    let err = addr
      .call("quit_self", |_c: &mut Counter, ctx: &Context<Counter>| {
        Ok(ctx.addr().quit().map_err(|e| e.to_string()))
      })
      .unwrap();
    assert_eq!(err, Err("Actor counter cannot wait on itself".to_string()));

    addr.quit().unwrap();
  }

  #[test]
  fn test_lifecycle_hooks_run_on_worker() {
    struct Hooks {
      events: Arc<Mutex<Vec<&'static str>>>,
    }
    impl Actor for Hooks {
      const NAME: &'static str = "hooks";

      fn started(&mut self, _ctx: &Context<Self>) {
        self.events.lock().unwrap().push("started");
      }

      fn stopped(&mut self) {
        self.events.lock().unwrap().push("stopped");
      }
    }

    let events = Arc::new(Mutex::new(Vec::new()));
    let addr = Addr::new(Hooks {
      events: Arc::clone(&events),
    });

    addr.start().unwrap();
    addr.quit().unwrap();
    addr.start().unwrap();
    addr.quit().unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["started", "stopped", "started", "stopped"]);
  }
}
