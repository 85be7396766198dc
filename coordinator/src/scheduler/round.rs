use std::{io, sync::Arc};

use aggregator::{
    AggStrategy, AggregationEngine, AggregationErr, Backend, GlobalSnapshot, ModelUpdate,
};
use futures::future;
use log::{debug, info, warn};
use model::Model;
use serde_json::Value;
use tokio::task;

use super::ClientLatencyProfile;
use crate::{
    error::{LinkErr, SchedulerErr},
    transport::ClientLink,
};

/// Scores every published snapshot of a run.
#[derive(Clone)]
pub struct Evaluator {
    pub model: Arc<dyn Model>,
    pub params: Value,
}

/// What a finished run looked like.
#[derive(Debug)]
pub struct RunReport {
    pub ticks: u64,
    pub rounds: usize,
    /// The clients dropped along the way, with the reason.
    pub dropped: Vec<(usize, String)>,
    pub snapshot: Arc<GlobalSnapshot>,
}

struct Client<L> {
    link: Option<L>,
    profile: ClientLatencyProfile,
    trained_from: usize,
}

#[derive(Debug, Default)]
struct RoundState {
    tick: u64,
    real_round: usize,
    failures: usize,
}

/// Drives the discrete tick loop of a simulation.
///
/// Each tick first hands the current snapshot to every client whose retrieve phase
/// matches, then collects the update of every client whose commit phase matches.
/// Whenever a tick collected commits the pending updates are aggregated.
pub struct RoundScheduler<L, S, B>
where
    S: AggStrategy,
    B: Backend,
{
    clients: Vec<Client<L>>,
    engine: Arc<AggregationEngine<S, B>>,
    max_rounds: usize,
    max_aggregation_failures: usize,
    train_params: Value,
    evaluator: Option<Evaluator>,
    dropped: Vec<(usize, String)>,
}

impl<L, S, B> RoundScheduler<L, S, B>
where
    L: ClientLink,
    S: AggStrategy + 'static,
    B: Backend + 'static,
{
    /// Creates a new `RoundScheduler`.
    ///
    /// # Arguments
    /// * `links` - One link per client, indexed like `profiles`.
    /// * `profiles` - The latency profile of each client.
    /// * `engine` - The aggregation engine owning the update store.
    /// * `max_rounds` - The amount of successful aggregations to run for.
    ///
    /// # Panics
    /// If `links` and `profiles` have different lengths.
    pub fn new(
        links: Vec<L>,
        profiles: Vec<ClientLatencyProfile>,
        engine: Arc<AggregationEngine<S, B>>,
        max_rounds: usize,
    ) -> Self {
        let joins = links.into_iter().map(Ok).collect();
        Self::from_joins(joins, profiles, engine, max_rounds)
    }

    /// Creates a new `RoundScheduler` out of the outcome of every client's join.
    ///
    /// Clients that failed to join keep their index but start out dropped.
    ///
    /// # Arguments
    /// * `joins` - One link or join failure per client, indexed like `profiles`.
    /// * `profiles` - The latency profile of each client.
    /// * `engine` - The aggregation engine owning the update store.
    /// * `max_rounds` - The amount of successful aggregations to run for.
    ///
    /// # Panics
    /// If `joins` and `profiles` have different lengths.
    pub fn from_joins(
        joins: Vec<Result<L, LinkErr>>,
        profiles: Vec<ClientLatencyProfile>,
        engine: Arc<AggregationEngine<S, B>>,
        max_rounds: usize,
    ) -> Self {
        assert_eq!(
            joins.len(),
            profiles.len(),
            "every client needs a latency profile"
        );

        let mut dropped = Vec::new();
        let clients = joins
            .into_iter()
            .zip(profiles)
            .enumerate()
            .map(|(idx, (join, profile))| {
                let link = match join {
                    Ok(link) => Some(link),
                    Err(e) => {
                        warn!(client = idx; "client could not join: {e}");
                        dropped.push((idx, e.to_string()));
                        None
                    }
                };

                Client {
                    link,
                    profile,
                    trained_from: 0,
                }
            })
            .collect();

        Self {
            clients,
            engine,
            max_rounds,
            max_aggregation_failures: 5,
            train_params: Value::Null,
            evaluator: None,
            dropped,
        }
    }

    pub fn with_train_params(mut self, params: Value) -> Self {
        self.train_params = params;
        self
    }

    pub fn with_max_aggregation_failures(mut self, max: usize) -> Self {
        self.max_aggregation_failures = max.max(1);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Runs the simulation until `max_rounds` aggregations succeeded.
    ///
    /// Every link gets closed before returning, whatever the outcome.
    ///
    /// # Arguments
    /// * `initial` - The serialized model published as round 0.
    ///
    /// # Returns
    /// A report of the run, or the run level failure that stopped it.
    pub async fn run(mut self, initial: Vec<u8>) -> Result<RunReport, SchedulerErr> {
        let mut state = RoundState::default();
        let result = self.run_ticks(initial, &mut state).await;

        self.close_links().await;

        for (client, reason) in &self.dropped {
            warn!(client = *client; "client dropped during the run: {reason}");
        }

        let snapshot = result?;
        info!(
            ticks = state.tick,
            rounds = state.real_round;
            "simulation finished"
        );

        Ok(RunReport {
            ticks: state.tick,
            rounds: state.real_round,
            dropped: self.dropped,
            snapshot,
        })
    }

    async fn run_ticks(
        &mut self,
        initial: Vec<u8>,
        state: &mut RoundState,
    ) -> Result<Arc<GlobalSnapshot>, SchedulerErr> {
        let mut snapshot = self.engine.store().publish_snapshot(initial)?;
        self.evaluate(&snapshot).await;

        while state.real_round < self.max_rounds {
            if self.clients.iter().all(|c| c.link.is_none()) {
                return Err(SchedulerErr::NoLiveClients {
                    tick: state.tick,
                    round: state.real_round,
                });
            }

            let tick = state.tick;
            self.retrieve_phase(tick, &snapshot).await;

            if self.commit_phase(tick).await? {
                match self.aggregate().await? {
                    Ok(published) => {
                        state.real_round += 1;
                        state.failures = 0;
                        snapshot = published;
                        self.evaluate(&snapshot).await;
                    }
                    Err(e) => {
                        state.failures += 1;
                        warn!(tick = tick; "aggregation attempt {} failed: {e}", state.failures);

                        if state.failures >= self.max_aggregation_failures {
                            return Err(SchedulerErr::AggregationFailed {
                                attempts: state.failures,
                                last: e,
                            });
                        }
                    }
                }
            }

            state.tick += 1;
        }

        Ok(snapshot)
    }

    async fn retrieve_phase(&mut self, tick: u64, snapshot: &Arc<GlobalSnapshot>) {
        for idx in 0..self.clients.len() {
            let client = &mut self.clients[idx];
            if !client.profile.starts_at(tick) {
                continue;
            }

            let Some(link) = client.link.as_mut() else {
                continue;
            };

            match link.retrieve(Arc::clone(snapshot), &self.train_params).await {
                Ok(()) => client.trained_from = snapshot.round(),
                Err(e) => self.on_link_err(idx, tick, e).await,
            }
        }
    }

    /// Collects the updates of the stop set.
    ///
    /// Dropped clients are left out of the stop set.
    ///
    /// # Returns
    /// Whether any live client was scheduled to commit at `tick`.
    async fn commit_phase(&mut self, tick: u64) -> Result<bool, SchedulerErr> {
        let mut stopping = false;

        for idx in 0..self.clients.len() {
            let client = &mut self.clients[idx];
            if !client.profile.stops_at(tick) {
                continue;
            }

            let Some(link) = client.link.as_mut() else {
                continue;
            };

            stopping = true;
            match link.commit().await {
                Ok(payload) => {
                    let update = ModelUpdate::new(idx, client.trained_from, payload);
                    self.engine.store().push(update)?;
                }
                Err(e) => self.on_link_err(idx, tick, e).await,
            }
        }

        Ok(stopping)
    }

    /// Runs one aggregation attempt on the blocking pool.
    ///
    /// The outer error means the attempt itself could not run, the inner one that
    /// the batch was refused.
    async fn aggregate(
        &self,
    ) -> Result<Result<Arc<GlobalSnapshot>, AggregationErr>, SchedulerErr> {
        let engine = Arc::clone(&self.engine);

        task::spawn_blocking(move || engine.aggregate())
            .await
            .map_err(|e| io::Error::other(format!("aggregation join error: {e}")).into())
    }

    async fn evaluate(&self, snapshot: &Arc<GlobalSnapshot>) {
        let Some(evaluator) = self.evaluator.clone() else {
            return;
        };

        let round = snapshot.round();
        let snapshot = Arc::clone(snapshot);
        let scored = task::spawn_blocking(move || {
            evaluator
                .model
                .evaluate(snapshot.payload(), &evaluator.params)
        })
        .await;

        match scored {
            Ok(Ok(metrics)) => {
                debug!(round = round; "snapshot scored {metrics:?}");
                if let Err(e) = self.engine.store().record_metrics(round, &metrics) {
                    warn!(round = round; "could not record metrics: {e}");
                }
            }
            Ok(Err(e)) => warn!(round = round; "evaluation failed: {e}"),
            Err(e) => warn!(round = round; "evaluation task failed: {e}"),
        }
    }

    async fn on_link_err(&mut self, idx: usize, tick: u64, err: LinkErr) {
        if !err.is_fatal() {
            warn!(client = idx, tick = tick; "skipping client this tick: {err}");
            return;
        }

        warn!(client = idx, tick = tick; "dropping client: {err}");
        if let Some(link) = self.clients[idx].link.take() {
            link.close().await;
        }
        self.dropped.push((idx, err.to_string()));
    }

    async fn close_links(&mut self) {
        let closing = self
            .clients
            .iter_mut()
            .filter_map(|client| client.link.take())
            .map(|link| link.close());

        future::join_all(closing).await;
    }
}
