//! In-process execution host.
//!
//! Each session evaluates on its own blocking thread with a brand-new
//! engine and scope, so nothing survives between invocations. Teardown
//! raises a kill flag that the engine checks between operations, which
//! aborts the script regardless of what the script is doing. Dropping a
//! session raises the same flag, so a cancelled caller never strands a
//! spinning script thread.
//!
//! Lighter than [`ProcessHost`](super::ProcessHost) but shares the server's
//! address space; a native crash inside the engine takes the server with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rhai::Dynamic;
use tokio::task::JoinHandle;

use crate::ports::{
    ExecutionHost, HostEvent, HostLaunchError, HostRequest, HostResponse, HostSession,
};

use super::script_engine::{build_engine, evaluate, SandboxLimits};

/// How long teardown waits for an aborted script thread to unwind.
const REAP_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct EmbeddedHost {
    limits: SandboxLimits,
}

impl EmbeddedHost {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl ExecutionHost for EmbeddedHost {
    async fn launch(&self) -> Result<Box<dyn HostSession>, HostLaunchError> {
        Ok(Box::new(EmbeddedSession {
            limits: self.limits,
            killed: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }
}

struct EmbeddedSession {
    limits: SandboxLimits,
    killed: Arc<AtomicBool>,
    worker: Option<JoinHandle<HostResponse>>,
}

impl Drop for EmbeddedSession {
    fn drop(&mut self) {
        self.killed.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl HostSession for EmbeddedSession {
    async fn send(&mut self, request: &HostRequest) -> Result<(), String> {
        if self.worker.is_some() {
            return Err("host already received a request".to_string());
        }

        let limits = self.limits;
        let killed = Arc::clone(&self.killed);
        let code = request.code.clone();
        let input = request.input.clone();

        self.worker = Some(tokio::task::spawn_blocking(move || {
            let mut engine = build_engine(&limits);
            engine.on_progress(move |_| {
                if killed.load(Ordering::Relaxed) {
                    Some(Dynamic::UNIT)
                } else {
                    None
                }
            });
            evaluate(&engine, &code, &input)
        }));
        Ok(())
    }

    async fn next_event(&mut self) -> HostEvent {
        let Some(worker) = self.worker.as_mut() else {
            return HostEvent::Error("no request was sent to the host".to_string());
        };

        let joined = worker.await;
        self.worker = None;
        match joined {
            Ok(response) => HostEvent::Message(response),
            Err(e) => {
                tracing::warn!(error = %e, "Embedded host worker died");
                HostEvent::Exit(None)
            }
        }
    }

    async fn teardown(&mut self) {
        self.killed.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if tokio::time::timeout(REAP_GRACE, worker).await.is_err() {
                tracing::warn!("Embedded host worker did not stop within grace period");
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn evaluates_request() {
        let host = EmbeddedHost::default();
        let mut session = host.launch().await.unwrap();

        session
            .send(&HostRequest {
                code: "input.n + 1".into(),
                input: json!({"n": 1}),
            })
            .await
            .unwrap();

        assert_eq!(
            session.next_event().await,
            HostEvent::Message(HostResponse::Success { result: json!(2) })
        );
        session.teardown().await;
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn teardown_stops_a_spinning_script() {
        let host = EmbeddedHost::default();
        let mut session = host.launch().await.unwrap();
        session
            .send(&HostRequest {
                code: "loop {}".into(),
                input: json!({}),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.is_alive());

        session.teardown().await;
        assert!(!session.is_alive());
    }

    #[test]
    fn dropped_session_releases_its_thread() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(1)
            .build()
            .unwrap();

        runtime.block_on(async {
            let mut session = EmbeddedHost::default().launch().await.unwrap();
            session
                .send(&HostRequest {
                    code: "loop {}".into(),
                    input: json!({}),
                })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;

            // Dropped without teardown, as when the caller is cancelled.
            drop(session);

            let freed =
                tokio::time::timeout(Duration::from_secs(2), tokio::task::spawn_blocking(|| 1))
                    .await;
            assert!(matches!(freed, Ok(Ok(1))));
        });
    }

    #[tokio::test]
    async fn refuses_second_request() {
        let host = EmbeddedHost::default();
        let mut session = host.launch().await.unwrap();
        let request = HostRequest {
            code: "1".into(),
            input: json!(null),
        };

        session.send(&request).await.unwrap();
        assert!(session.send(&request).await.is_err());
        session.teardown().await;
    }
}
