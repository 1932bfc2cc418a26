//! Worker actor that polls the job store.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pipeline_core::{JobEvent, JobStore, StageTable};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::dispatch::{Dispatcher, Tick};
use crate::messages::WorkerMessage;
use crate::metrics::WorkerMetrics;

/// State for the worker actor.
pub struct WorkerActorState<S> {
    dispatcher: Dispatcher<S>,
    metrics: WorkerMetrics,
    poll_interval: Duration,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

/// Worker actor arguments.
pub struct WorkerArgs<S> {
    pub worker_id: String,
    pub store: Arc<S>,
    pub stages: Arc<StageTable>,
    pub poll_interval: Duration,
    pub stage_timeout: Option<Duration>,
    pub event_tx: Option<broadcast::Sender<JobEvent>>,
}

/// Worker actor that claims and executes one job at a time.
///
/// Idle and back-off waits are delayed `Poll` messages, so a `Shutdown`
/// sent while waiting is handled right away.
pub struct WorkerActor<S>(PhantomData<fn() -> S>);

impl<S> WorkerActor<S> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<S> Default for WorkerActor<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: JobStore> Actor for WorkerActor<S> {
    type Msg = WorkerMessage;
    type State = WorkerActorState<S>;
    type Arguments = WorkerArgs<S>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        let mut dispatcher = Dispatcher::new(args.worker_id.clone(), args.store, args.stages)
            .with_stage_timeout(args.stage_timeout);
        if let Some(tx) = &args.event_tx {
            dispatcher = dispatcher.with_event_tx(tx.clone());
        }

        Ok(WorkerActorState {
            dispatcher,
            metrics: WorkerMetrics::new(args.worker_id),
            poll_interval: args.poll_interval,
            event_tx: args.event_tx,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(tx) = &state.event_tx {
            let _ = tx.send(JobEvent::WorkerConnected {
                worker_id: state.dispatcher.worker_id().to_string(),
                timestamp: Utc::now(),
            });
        }
        myself.send_message(WorkerMessage::Poll)?;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                let tick = state.dispatcher.tick().await;
                state.metrics.record(&tick);

                if tick.should_back_off() {
                    if let Tick::StoreError(err) = &tick {
                        tracing::warn!(
                            worker_id = %state.dispatcher.worker_id(),
                            "Store unavailable, retrying in {:?}: {}",
                            state.poll_interval,
                            err
                        );
                    }
                    let myself = myself.clone();
                    let delay = state.poll_interval;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        // The worker may have stopped while waiting.
                        let _ = myself.send_message(WorkerMessage::Poll);
                    });
                } else {
                    myself.send_message(WorkerMessage::Poll)?;
                }
            }

            WorkerMessage::GetMetrics { reply } => {
                let _ = reply.send(state.metrics.clone());
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.dispatcher.worker_id());
                myself.stop(Some("shutdown".into()));
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(tx) = &state.event_tx {
            let _ = tx.send(JobEvent::WorkerDisconnected {
                worker_id: state.dispatcher.worker_id().to_string(),
                reason: None,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }
}
