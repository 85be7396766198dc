use std::{fmt, sync::Arc};

use log::{debug, info, warn};
use model::Model;
use serde_json::Value;
use tokio::{task, time};
use tokio_util::sync::CancellationToken;

use crate::{
    credentials::{CLIENT_TOKEN, CredentialStore, GROUP_TOKEN},
    error::{Result, SessionErr},
    registry::{Credentials, Registry, Subscription, TaskAssignment, TaskKind},
    retry::RetryPolicy,
};

/// Where a `Session` stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unregistered,
    Registered,
    Subscribed,
    Idle,
    Training,
    Evaluating,
    Reporting,
    Unsubscribed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A client taking part in a federated group through a `Registry`.
///
/// It registers (once, the token is kept in the credential store), subscribes and
/// then runs every task it's handed until cancelled, at which point it unsubscribes.
pub struct Session<R, C> {
    registry: R,
    credentials: C,
    model: Arc<dyn Model>,
    retry: RetryPolicy,
    subscription: Subscription,
    register_params: Option<Value>,
    task_params: Value,
    state: SessionState,
}

impl<R, C> Session<R, C>
where
    R: Registry,
    C: CredentialStore,
{
    /// Creates a new `Session`.
    ///
    /// # Arguments
    /// * `registry` - The registry handing out tasks.
    /// * `credentials` - Must hold the group token, keeps the client token.
    /// * `model` - Runs the train and evaluate tasks.
    pub fn new(registry: R, credentials: C, model: Arc<dyn Model>) -> Self {
        Self {
            registry,
            credentials,
            model,
            retry: RetryPolicy::default(),
            subscription: Subscription::default(),
            register_params: None,
            task_params: Value::Null,
            state: SessionState::Unregistered,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_register_params(mut self, params: Value) -> Self {
        self.register_params = Some(params);
        self
    }

    pub fn with_task_params(mut self, params: Value) -> Self {
        self.task_params = params;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the whole lifecycle until `cancel` fires.
    ///
    /// Once subscribed, the session always unsubscribes before returning.
    ///
    /// # Returns
    /// An error if registering, subscribing, unsubscribing or polling failed for good.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        let creds = self.register().await?;

        self.registry.subscribe(&creds, &self.subscription).await?;
        self.transition(SessionState::Subscribed);

        let served = self.serve(&creds, &cancel).await;

        self.registry.unsubscribe(&creds).await?;
        self.transition(SessionState::Unsubscribed);
        served
    }

    async fn serve(&mut self, creds: &Credentials, cancel: &CancellationToken) -> Result<()> {
        while let Some(task) = self.poll(creds, cancel).await? {
            self.transition(SessionState::Idle);
            self.dispatch(creds, task).await;
        }

        Ok(())
    }

    async fn register(&mut self) -> Result<Credentials> {
        let group = self
            .credentials
            .load(GROUP_TOKEN)
            .map_err(SessionErr::Credentials)?
            .ok_or_else(|| SessionErr::Auth("group token not found".into()))?;

        let stored = self
            .credentials
            .load(CLIENT_TOKEN)
            .map_err(SessionErr::Credentials)?;

        let client = match stored {
            Some(token) => {
                debug!("reusing stored client token");
                token
            }
            None => {
                let token = self
                    .registry
                    .register(&group, self.register_params.as_ref())
                    .await?;
                self.credentials
                    .store(CLIENT_TOKEN, &token)
                    .map_err(SessionErr::Credentials)?;
                token
            }
        };

        self.transition(SessionState::Registered);
        Ok(Credentials { group, client })
    }

    /// Asks for tasks until one comes, retrying any failed poll under the retry policy.
    ///
    /// # Returns
    /// `None` once `cancel` fired.
    async fn poll(
        &self,
        creds: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<Option<TaskAssignment>> {
        let mut attempt = 0;

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                polled = self.registry.poll_task(creds) => polled,
            };

            let err = match polled {
                Ok(task) => return Ok(Some(task)),
                Err(e) => e,
            };

            attempt += 1;
            let Some(delay) = self.retry.delay(attempt) else {
                return Err(err);
            };

            if err.is_transient() {
                debug!(attempt = attempt; "no task yet: {err}");
            } else {
                warn!(attempt = attempt; "task poll refused: {err}");
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = time::sleep(delay) => {}
            }
        }
    }

    /// Runs a task and reports its result. Failures are logged, never fatal.
    async fn dispatch(&mut self, creds: &Credentials, task: TaskAssignment) {
        if task.kind == TaskKind::Unknown {
            warn!("ignoring task of unknown type from {}", task.url());
            return;
        }

        let payload = match self.registry.fetch_payload(creds, &task).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("could not fetch task payload: {e}");
                return;
            }
        };

        let reported = match task.kind {
            TaskKind::Train => self.train(creds, &task, payload).await,
            _ => self.evaluate(creds, &task, payload).await,
        };

        if let Err(e) = reported {
            warn!("{:?} task failed: {e}", task.kind);
        }

        self.transition(SessionState::Idle);
    }

    async fn train(&mut self, creds: &Credentials, task: &TaskAssignment, payload: Vec<u8>) -> Result<()> {
        self.transition(SessionState::Training);

        let model = Arc::clone(&self.model);
        let params = self.task_params.clone();
        let update = task::spawn_blocking(move || model.train(&payload, &params))
            .await
            .map_err(|e| SessionErr::Transient(format!("training task failed: {e}")))??;

        self.transition(SessionState::Reporting);
        self.registry.report_update(creds, task, update).await
    }

    async fn evaluate(
        &mut self,
        creds: &Credentials,
        task: &TaskAssignment,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.transition(SessionState::Evaluating);

        let model = Arc::clone(&self.model);
        let params = self.task_params.clone();
        let metrics = task::spawn_blocking(move || model.evaluate(&payload, &params))
            .await
            .map_err(|e| SessionErr::Transient(format!("evaluation task failed: {e}")))??;

        self.transition(SessionState::Reporting);
        self.registry.report_metrics(creds, task, &metrics).await
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("session {} -> {next}", self.state);
            if matches!(next, SessionState::Subscribed | SessionState::Unsubscribed) {
                info!("session {next}");
            }
            self.state = next;
        }
    }
}
