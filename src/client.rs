//! Async driver around [`Engine`] and the programmatic API on top of it.
//!
//! One task owns the engine. It waits on commands from [`ClientHandle`]s, on
//! the engine's next deadline and on the requests currently on the wire, and
//! polls the engine after each of them.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::engine::{Engine, OutgoingRequest};
use crate::error::{ClientError, ErrorReport};
use crate::event::EventInit;
use crate::transport::{send_with_retry, Transport, TransportError};

type Completion = (String, Result<String, TransportError>);

enum Command {
    Dispatch {
        event: EventInit,
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    },
    GetValue {
        control_id: String,
        respond_to: oneshot::Sender<Result<String, ClientError>>,
    },
    SetValue {
        event: EventInit,
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    },
    NavigateTo {
        control_id: String,
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    },
    WhenIdle {
        respond_to: oneshot::Sender<()>,
    },
    Snapshot {
        respond_to: oneshot::Sender<String>,
    },
    TakeReports {
        respond_to: oneshot::Sender<Vec<ErrorReport>>,
    },
}

/// Cheap to clone; the driver stops once every handle is gone and the engine
/// has nothing left to do.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
}

/// Start the driver task on the current runtime.
pub fn spawn(engine: Engine, transport: Arc<dyn Transport>) -> ClientHandle {
    let (commands, receiver) = mpsc::channel(32);
    tokio::spawn(run(engine, transport, receiver));
    ClientHandle { commands }
}

impl ClientHandle {
    pub async fn dispatch_event(&self, event: EventInit) -> Result<(), ClientError> {
        self.request(|respond_to| Command::Dispatch { event, respond_to })
            .await?
    }

    pub async fn get_value(&self, control_id: &str) -> Result<String, ClientError> {
        let control_id = control_id.to_string();
        self.request(|respond_to| Command::GetValue {
            control_id,
            respond_to,
        })
        .await?
    }

    pub async fn set_value(&self, control_id: &str, value: &str) -> Result<(), ClientError> {
        self.change_value(EventInit::value_change(control_id, value)).await
    }

    /// Write the event's value into its target, then relay the event as given.
    pub async fn change_value(&self, event: EventInit) -> Result<(), ClientError> {
        self.request(|respond_to| Command::SetValue { event, respond_to })
            .await?
    }

    pub async fn navigate_to_control(&self, control_id: &str) -> Result<(), ClientError> {
        let control_id = control_id.to_string();
        self.request(|respond_to| Command::NavigateTo {
            control_id,
            respond_to,
        })
        .await?
    }

    /// Resolves once nothing is queued, armed or in flight.
    pub async fn when_idle(&self) -> Result<(), ClientError> {
        self.request(|respond_to| Command::WhenIdle { respond_to }).await
    }

    pub async fn snapshot(&self) -> Result<String, ClientError> {
        self.request(|respond_to| Command::Snapshot { respond_to }).await
    }

    /// Errors reported since the last call.
    pub async fn take_reports(&self) -> Result<Vec<ErrorReport>, ClientError> {
        self.request(|respond_to| Command::TakeReports { respond_to })
            .await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ClientError> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(command(respond_to))
            .await
            .map_err(|_| ClientError::Closed)?;
        response.await.map_err(|_| ClientError::Closed)
    }
}

async fn run(mut engine: Engine, transport: Arc<dyn Transport>, mut commands: mpsc::Receiver<Command>) {
    let mut in_flight: FuturesUnordered<BoxFuture<'static, Completion>> = FuturesUnordered::new();
    let mut idle_waiters: Vec<oneshot::Sender<()>> = Vec::new();
    let mut open = true;
    info!(target: "client", "driver started");
    loop {
        for request in engine.poll(Instant::now()) {
            in_flight.push(send(transport.clone(), request));
        }
        let idle = in_flight.is_empty() && engine.is_quiescent();
        if idle {
            for waiter in idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
            if !open {
                break;
            }
        }

        let deadline = engine.next_deadline();
        tokio::select! {
            command = commands.recv(), if open => match command {
                Some(command) => handle(&mut engine, command, &mut idle_waiters),
                None => {
                    debug!(target: "client", "all handles dropped");
                    open = false;
                }
            },
            Some((form, result)) = in_flight.next(), if !in_flight.is_empty() => {
                engine.complete(&form, result, Instant::now());
            }
            _ = sleep_until(deadline) => {}
        }
    }
    info!(target: "client", "driver stopped");
}

fn handle(engine: &mut Engine, command: Command, idle_waiters: &mut Vec<oneshot::Sender<()>>) {
    let now = Instant::now();
    match command {
        Command::Dispatch { event, respond_to } => {
            let _ = respond_to.send(engine.dispatch_event(event, now));
        }
        Command::GetValue {
            control_id,
            respond_to,
        } => {
            let _ = respond_to.send(engine.get_value(&control_id));
        }
        Command::SetValue { event, respond_to } => {
            let _ = respond_to.send(engine.change_value(event, now));
        }
        Command::NavigateTo {
            control_id,
            respond_to,
        } => {
            let _ = respond_to.send(engine.navigate_to_control(&control_id, now));
        }
        Command::WhenIdle { respond_to } => idle_waiters.push(respond_to),
        Command::Snapshot { respond_to } => {
            let _ = respond_to.send(engine.snapshot());
        }
        Command::TakeReports { respond_to } => {
            let _ = respond_to.send(engine.take_reports());
        }
    }
}

fn send(transport: Arc<dyn Transport>, request: OutgoingRequest) -> BoxFuture<'static, Completion> {
    async move {
        debug!(target: "client", form = %request.form, "request sent");
        let result = send_with_retry(transport, request.body, request.policy).await;
        (request.form, result)
    }
    .boxed()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
