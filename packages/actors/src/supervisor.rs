//! Supervisor actor that owns the worker pool.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pipeline_core::{JobEvent, JobStore, StageTable};
use ractor::rpc::CallResult;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;

use crate::messages::{SupervisorMessage, WorkerMessage};
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// How long a metrics request waits on a busy worker.
const METRICS_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Wait between polls when idle or when the store is unavailable.
    pub poll_interval: Duration,
    /// Upper bound on a single stage execution. `None` disables it.
    pub stage_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            poll_interval: Duration::from_secs(5),
            stage_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_stage_timeout(mut self, stage_timeout: Option<Duration>) -> Self {
        self.stage_timeout = stage_timeout;
        self
    }
}

/// Supervisor actor arguments.
pub struct SupervisorArgs<S> {
    pub store: Arc<S>,
    pub stages: Arc<StageTable>,
    pub config: PoolConfig,
}

/// State for the supervisor actor.
pub struct SupervisorState<S> {
    store: Arc<S>,
    stages: Arc<StageTable>,
    config: PoolConfig,
    /// Live workers by actor id, with their worker ids.
    workers: HashMap<ActorId, (String, ActorRef<WorkerMessage>)>,
    /// Event broadcaster.
    pub event_tx: broadcast::Sender<JobEvent>,
    /// Worker counter for unique IDs.
    worker_counter: u64,
    stopping: bool,
}

impl<S: JobStore> SupervisorState<S> {
    fn new(args: SupervisorArgs<S>) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            store: args.store,
            stages: args.stages,
            config: args.config,
            workers: HashMap::new(),
            event_tx,
            worker_counter: 0,
            stopping: false,
        }
    }

    /// Generate a unique worker ID.
    fn next_worker_id(&mut self) -> String {
        self.worker_counter += 1;
        format!("worker-{}", self.worker_counter)
    }
}

async fn spawn_worker<S: JobStore>(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState<S>,
) -> Result<(), ActorProcessingErr> {
    let worker_id = state.next_worker_id();
    let args = WorkerArgs {
        worker_id: worker_id.clone(),
        store: state.store.clone(),
        stages: state.stages.clone(),
        poll_interval: state.config.poll_interval,
        stage_timeout: state.config.stage_timeout,
        event_tx: Some(state.event_tx.clone()),
    };

    let (worker, _handle) =
        Actor::spawn_linked(None, WorkerActor::<S>::new(), args, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

    state.workers.insert(worker.get_id(), (worker_id, worker));
    Ok(())
}

/// Supervisor actor that keeps the worker pool at its configured size.
pub struct Supervisor<S>(PhantomData<fn() -> S>);

impl<S> Supervisor<S> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<S> Default for Supervisor<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: JobStore> Actor for Supervisor<S> {
    type Msg = SupervisorMessage;
    type State = SupervisorState<S>;
    type Arguments = SupervisorArgs<S>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            workers = args.config.workers,
            poll_interval = ?args.config.poll_interval,
            "Starting pipeline supervisor"
        );
        Ok(SupervisorState::new(args))
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for _ in 0..state.config.workers {
            spawn_worker(&myself, state).await?;
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Enqueue {
                job_type,
                params,
                priority,
                reply,
            } => {
                let result = state.store.enqueue(&job_type, params, priority).await;
                if let Ok(job_id) = &result {
                    let _ = state.event_tx.send(JobEvent::JobEnqueued {
                        job_id: *job_id,
                        job_type,
                        priority,
                        timestamp: Utc::now(),
                    });
                }
                let _ = reply.send(result);
            }

            SupervisorMessage::GetMetrics { reply } => {
                // Collected off the supervisor so a busy worker cannot stall it.
                let workers: Vec<_> = state
                    .workers
                    .values()
                    .map(|(_, worker)| worker.clone())
                    .collect();
                tokio::spawn(async move {
                    let mut metrics = Vec::with_capacity(workers.len());
                    for worker in workers {
                        let call = ractor::rpc::call(
                            &worker,
                            |reply| WorkerMessage::GetMetrics { reply },
                            Some(METRICS_TIMEOUT),
                        )
                        .await;
                        if let Ok(CallResult::Success(snapshot)) = call {
                            metrics.push(snapshot);
                        }
                    }
                    metrics.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
                    let _ = reply.send(metrics);
                });
            }

            SupervisorMessage::ListWorkers { reply } => {
                let mut ids: Vec<String> =
                    state.workers.values().map(|(id, _)| id.clone()).collect();
                ids.sort();
                let _ = reply.send(ids);
            }

            SupervisorMessage::Subscribe { sender } => {
                // Merge event streams - forward from our channel to subscriber's
                let mut rx = state.event_tx.subscribe();
                tokio::spawn(async move {
                    while let Ok(event) = rx.recv().await {
                        if sender.send(event).is_err() {
                            break;
                        }
                    }
                });
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                state.stopping = true;
                if state.workers.is_empty() {
                    myself.stop(None);
                    return Ok(());
                }
                for (_, worker) in state.workers.values() {
                    let _ = worker.send_message(WorkerMessage::Shutdown);
                }
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some((worker_id, _)) = state.workers.remove(&cell.get_id()) {
                    tracing::info!("Worker {} stopped: {:?}", worker_id, reason);
                }
                if state.stopping && state.workers.is_empty() {
                    myself.stop(None);
                }
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                let Some((worker_id, _)) = state.workers.remove(&cell.get_id()) else {
                    return Ok(());
                };
                tracing::error!("Worker {} failed: {}", worker_id, err);
                let _ = state.event_tx.send(JobEvent::WorkerDisconnected {
                    worker_id,
                    reason: Some(err.to_string()),
                    timestamp: Utc::now(),
                });
                if state.stopping {
                    if state.workers.is_empty() {
                        myself.stop(None);
                    }
                } else {
                    spawn_worker(&myself, state).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start a supervisor and its worker pool over `store`.
pub async fn start_pipeline<S: JobStore>(
    store: Arc<S>,
    stages: StageTable,
    config: PoolConfig,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let args = SupervisorArgs {
        store,
        stages: Arc::new(stages),
        config,
    };
    Actor::spawn(None, Supervisor::<S>::new(), args).await
}
