use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::catalog::{Affinity, Method};
use crate::bridge::handlers::{self, ProjectContext};
use crate::bridge::main_loop::{run_blocking, run_deferred, Deadlines, SerialExecutor};
use crate::bridge::protocol::{Request, Response};
use crate::error::BridgeError;

/// Routes a request to the right thread by the method's static affinity.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<ProjectContext>,
    executor: Arc<dyn SerialExecutor>,
    main_thread_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<ProjectContext>,
        executor: Arc<dyn SerialExecutor>,
        main_thread_timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            executor,
            main_thread_timeout,
        }
    }

    pub fn context(&self) -> &ProjectContext {
        &self.ctx
    }

    /// Runs on the calling thread; main-affine work blocks it until the
    /// main loop has run the handler or the deadline passes.
    pub fn dispatch(&self, request: Request) -> Response {
        let Request { id, method, params } = request;
        let method = match method.parse::<Method>() {
            Ok(method) => method,
            Err(name) => return Response::err(id, BridgeError::method_not_found(&name)),
        };

        let result = match method.affinity() {
            Affinity::Worker => handlers::handle(&self.ctx, method, params),
            Affinity::Main => {
                let ctx = Arc::clone(&self.ctx);
                run_blocking(
                    self.executor.as_ref(),
                    method.as_str(),
                    self.main_thread_timeout,
                    move || handlers::handle(&ctx, method, params),
                )
                .and_then(|inner| inner)
            }
        };
        finish(id, method, result)
    }

    /// Like [`dispatch`](Self::dispatch) but never waits on the main loop.
    ///
    /// Worker-affine methods answer before this returns. Main-affine
    /// methods are queued and `reply` runs later, on the main loop when the
    /// handler finishes or on the `deadlines` thread when it times out.
    pub fn dispatch_deferred<R>(&self, request: Request, deadlines: &Deadlines, reply: R)
    where
        R: FnOnce(Response) + Send + 'static,
    {
        let Request { id, method, params } = request;
        let method = match method.parse::<Method>() {
            Ok(method) => method,
            Err(name) => return reply(Response::err(id, BridgeError::method_not_found(&name))),
        };

        match method.affinity() {
            Affinity::Worker => reply(finish(id, method, handlers::handle(&self.ctx, method, params))),
            Affinity::Main => {
                let ctx = Arc::clone(&self.ctx);
                run_deferred(
                    self.executor.as_ref(),
                    deadlines,
                    method.as_str(),
                    self.main_thread_timeout,
                    move || handlers::handle(&ctx, method, params),
                    move |result| reply(finish(id, method, result.and_then(|inner| inner))),
                );
            }
        }
    }
}

fn finish(id: u64, method: Method, result: Result<Value, BridgeError>) -> Response {
    if let Err(e) = &result {
        tracing::debug!(target: "bridge", "request {id} ({method}) failed: {e}");
    }
    Response::from_result(id, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::main_loop::MainLoop;
    use crate::config::BridgeConfig;
    use crate::error::ErrorKind;
    use crossbeam_channel::unbounded;
    use serde_json::json;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    fn dispatcher(dir: &TempDir, main: &MainLoop, timeout_ms: u64) -> Dispatcher {
        let ctx = ProjectContext::open(dir.path(), &BridgeConfig::default()).unwrap();
        Dispatcher::new(
            Arc::new(ctx),
            Arc::new(main.handle()),
            Duration::from_millis(timeout_ms),
        )
    }

    fn request(id: u64, method: &str, params: Value) -> Request {
        Request {
            id,
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn test_unknown_method() {
        let dir = TempDir::new().unwrap();
        let main = MainLoop::new();
        let response = dispatcher(&dir, &main, 100).dispatch(request(9, "nope/nothing", Value::Null));
        assert_eq!(response.id, 9);
        assert_eq!(response.into_result().unwrap_err().kind, ErrorKind::MethodNotFound);
    }

    #[test]
    fn test_worker_methods_do_not_need_main_loop() {
        let dir = TempDir::new().unwrap();
        let main = MainLoop::new();
        let response = dispatcher(&dir, &main, 100).dispatch(request(1, "ping", Value::Null));
        assert_eq!(response.into_result().unwrap()["pong"], true);
        assert_eq!(main.queued(), 0);
    }

    #[test]
    fn test_main_methods_run_on_pumping_thread() {
        let dir = TempDir::new().unwrap();
        let main = MainLoop::new();
        let dispatcher = dispatcher(&dir, &main, 5_000);

        let worker = thread::spawn(move || {
            dispatcher.dispatch(request(
                2,
                "folder/create",
                json!({"path": "Assets/Made"}),
            ))
        });
        main.pump_for(Duration::from_millis(300));
        let response = worker.join().unwrap();
        assert!(response.error.is_none());
        assert!(dir.path().join("Assets/Made").is_dir());
    }

    #[test]
    fn test_unpumped_main_method_times_out_then_completes() {
        let dir = TempDir::new().unwrap();
        let main = MainLoop::new();
        let response = dispatcher(&dir, &main, 50).dispatch(request(
            3,
            "script/create",
            json!({"path": "Late.cs", "content": "x"}),
        ));
        let err = response.into_result().unwrap_err();
        assert_eq!(err.kind, ErrorKind::TimeoutError);
        assert!(!dir.path().join("Late.cs").exists());

        main.pump();
        assert_eq!(fs::read_to_string(dir.path().join("Late.cs")).unwrap(), "x");
    }

    #[test]
    fn test_deferred_worker_method_answers_while_main_calls_wait() {
        let dir = TempDir::new().unwrap();
        let main = MainLoop::new();
        let dispatcher = dispatcher(&dir, &main, 5_000);
        let deadlines = Deadlines::start("test-deadlines").unwrap();
        let (sender, replies) = unbounded();

        for i in 0..4 {
            let sender = sender.clone();
            let path = format!("Assets/Queued{i}");
            dispatcher.dispatch_deferred(
                request(10 + i, "folder/create", json!({ "path": path })),
                &deadlines,
                move |response| sender.send(response).unwrap(),
            );
        }
        assert_eq!(main.queued(), 4);

        let sender = sender.clone();
        dispatcher.dispatch_deferred(request(20, "ping", Value::Null), &deadlines, move |response| {
            sender.send(response).unwrap()
        });
        let pong = replies.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(pong.id, 20);
        assert_eq!(pong.into_result().unwrap()["pong"], true);

        assert_eq!(main.pump(), 4);
        let mut ids: Vec<u64> = (0..4)
            .map(|_| replies.recv_timeout(Duration::from_secs(1)).unwrap().id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![10, 11, 12, 13]);
        assert!(dir.path().join("Assets/Queued3").is_dir());
    }
}
