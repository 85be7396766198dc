use std::{fs, sync::Arc};

use aggregator::{AggregationEngine, FedAvg, FsBackend, UpdateStore};
use log::info;
use model::{Model, decode};
use tokio::net::TcpListener;

use crate::{
    configs::{SimulationConfig, TransportConfig},
    error::{ConfigErr, LinkErr, SchedulerErr},
    scheduler::{ClientLatencyProfile, Evaluator, RoundScheduler, RunReport, profiles},
    transport::{ClientLink, InProcessLink, accept_all},
};

type Engine = AggregationEngine<FedAvg, FsBackend>;

/// Runs a whole simulation as described by `config`.
///
/// Artifacts land in the config's artifact directory. Channel clients are awaited
/// on `port`, in-process clients train with `model`, which also scores every
/// snapshot when the config asks for evaluation.
///
/// # Arguments
/// * `config` - The simulation to run.
/// * `model` - The training capability of the run.
/// * `port` - The port channel clients connect to, unused in process.
///
/// # Returns
/// The report of the run or the reason it ended early.
pub async fn run_simulation(
    config: &SimulationConfig,
    model: Arc<dyn Model>,
    port: u16,
) -> Result<RunReport, SchedulerErr> {
    config.validate()?;

    match &config.transport {
        TransportConfig::InProcess => {
            let prepared = Prepared::new(config, &model)?;
            let joins: Vec<Result<InProcessLink, LinkErr>> = (0..config.n_clients)
                .map(|_| Ok(InProcessLink::new(Arc::clone(&model))))
                .collect();

            prepared.run(joins, config).await
        }
        TransportConfig::Channel { host } => {
            let listener = TcpListener::bind((host.as_str(), port)).await?;
            run_on_listener(config, model, listener).await
        }
    }
}

/// Runs a channel simulation whose clients connect through `listener`.
pub async fn run_on_listener(
    config: &SimulationConfig,
    model: Arc<dyn Model>,
    listener: TcpListener,
) -> Result<RunReport, SchedulerErr> {
    config.validate()?;
    let prepared = Prepared::new(config, &model)?;

    info!(
        "{}: waiting for {} clients on {}",
        config.name,
        config.n_clients,
        listener.local_addr()?
    );
    let joins = accept_all(&listener, config.n_clients).await?;

    prepared.run(joins, config).await
}

struct Prepared {
    profiles: Vec<ClientLatencyProfile>,
    engine: Arc<Engine>,
    initial: Vec<u8>,
    evaluator: Option<Evaluator>,
}

impl Prepared {
    fn new(config: &SimulationConfig, model: &Arc<dyn Model>) -> Result<Self, SchedulerErr> {
        let profiles = profiles(config)?;
        let initial = initial_snapshot(config, model.as_ref())?;

        let backend = FsBackend::open(config.artifact_dir())?;
        let store = UpdateStore::new(backend, config.clear_existing)?;
        let raw_config = serde_json::to_vec_pretty(config).map_err(ConfigErr::from)?;
        store.persist_config(&raw_config)?;

        let evaluator = config.eval_params.clone().map(|params| Evaluator {
            model: Arc::clone(model),
            params,
        });

        Ok(Self {
            profiles,
            engine: Arc::new(AggregationEngine::new(FedAvg, Arc::new(store))),
            initial,
            evaluator,
        })
    }

    async fn run<L: ClientLink>(
        self,
        joins: Vec<Result<L, LinkErr>>,
        config: &SimulationConfig,
    ) -> Result<RunReport, SchedulerErr> {
        info!(
            "{}: starting {} clients for {} rounds",
            config.name, config.n_clients, config.max_rounds
        );

        let mut scheduler =
            RoundScheduler::from_joins(joins, self.profiles, self.engine, config.max_rounds)
                .with_train_params(config.train_params.clone())
                .with_max_aggregation_failures(config.max_aggregation_failures);

        if let Some(evaluator) = self.evaluator {
            scheduler = scheduler.with_evaluator(evaluator);
        }

        scheduler.run(self.initial).await
    }
}

/// The configured initial snapshot file, or the model's own initial weights.
fn initial_snapshot(config: &SimulationConfig, model: &dyn Model) -> Result<Vec<u8>, ConfigErr> {
    let Some(path) = config.initial_snapshot() else {
        return model
            .initial_weights()
            .map_err(|e| ConfigErr::Invalid(format!("no initial weights: {e}")));
    };

    let raw = fs::read(path).map_err(|e| {
        ConfigErr::Invalid(format!("can't read initial snapshot {}: {e}", path.display()))
    })?;

    decode(&raw).map_err(|e| {
        ConfigErr::Invalid(format!("initial snapshot {} is unusable: {e}", path.display()))
    })?;

    Ok(raw)
}
