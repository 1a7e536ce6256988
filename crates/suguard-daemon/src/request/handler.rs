//! Superuser request handler.
//!
//! [`RequestHandler::handle`] performs intake. Once the caller is resolved a
//! prompt task owns the request: it merges user input, countdown events and
//! the authentication result into one event stream, so every transition is
//! applied on a single task and a decision can only be finalized once.

use std::sync::Arc;

use suguard_core::db::unix_timestamp;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::auth::{AuthGate, AuthOutcome};
use crate::clock::{ClockEvent, DecisionClock, TICK};
use crate::context::{AppResolver, ContextSources, RequestContext};
use crate::policy::{Decision, Policy};
use crate::settings::PromptSettings;
use crate::storage::{PolicyStore, TimeoutChoiceStore};

use super::types::{
    PromptEvent, PromptOutcome, PromptState, PromptView, RequestError, ResponseChannel, SuRequest,
    SuResponse,
};

/// Collaborators of the decision engine.
pub struct EngineDeps {
    pub apps: Arc<dyn AppResolver>,
    pub policies: Arc<dyn PolicyStore>,
    pub choices: Arc<dyn TimeoutChoiceStore>,
    pub gate: Arc<dyn AuthGate>,
    pub channel: Arc<dyn ResponseChannel>,
    pub settings: Arc<PromptSettings>,
}

/// Accepts superuser requests and starts a prompt for each valid one.
///
/// Cheap to clone; prompts for different callers run independently.
#[derive(Clone)]
pub struct RequestHandler {
    deps: Arc<EngineDeps>,
    sources: ContextSources,
}

impl RequestHandler {
    pub fn new(deps: EngineDeps) -> Self {
        let sources = ContextSources {
            apps: Arc::clone(&deps.apps),
            policies: Arc::clone(&deps.policies),
            choices: Arc::clone(&deps.choices),
        };
        Self {
            deps: Arc::new(deps),
            sources,
        }
    }

    /// Validate a request and start prompting.
    ///
    /// An unresolvable caller is rejected: the channel receives
    /// [`SuResponse::Terminate`] and nothing is persisted.
    pub async fn handle(&self, request: SuRequest) -> Result<PromptHandle, RequestError> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("su_request", request_id = %request_id, uid = request.uid);

        let context = match self
            .sources
            .resolve(&request, self.deps.settings.choices().len())
            .instrument(span.clone())
            .await
        {
            Ok(context) => context,
            Err(e) => {
                span.in_scope(|| warn!(error = %e, "Rejecting superuser request"));
                if let Err(e) = self.deps.channel.emit(SuResponse::Terminate).await {
                    span.in_scope(|| error!(error = %e, "Failed to send terminate signal"));
                }
                return Err(e);
            }
        };

        let total = self.deps.settings.default_timeout();
        let started = Instant::now();
        let (clock, clock_rx) = DecisionClock::start(total);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let view = PromptView {
            request_id: request_id.clone(),
            app: context.app.clone(),
            state: PromptState::Prompting,
            remaining: Some(total),
            grant_enabled: false,
            selected_choice: context.timeout_choice,
            choices: self.deps.settings.choices().to_vec(),
        };
        let (view_tx, view_rx) = watch::channel(view);

        span.in_scope(|| {
            info!(
                app = %context.app.app_name,
                timeout_secs = total.as_secs(),
                "Prompting for superuser access"
            );
        });

        let prompt = Prompt {
            deps: Arc::clone(&self.deps),
            request_id: request_id.clone(),
            selected: context.timeout_choice,
            context,
            state: PromptState::Prompting,
            clock: Some(clock),
            clock_rx: Some(clock_rx),
            auth: None,
            grace_started: started,
            grace_deadline: Some(started + TICK),
            grant_enabled: false,
            view: view_tx,
        };
        let task = tokio::spawn(prompt.run(events_rx).instrument(span));

        Ok(PromptHandle {
            controller: PromptController { events: events_tx },
            view: view_rx,
            task,
        })
    }
}

/// Sends user input to a running prompt. Cloneable.
///
/// Input after the prompt has finished is dropped.
#[derive(Debug, Clone)]
pub struct PromptController {
    events: mpsc::UnboundedSender<PromptEvent>,
}

impl PromptController {
    pub fn request_grant(&self) {
        self.send(PromptEvent::Grant);
    }

    pub fn request_deny(&self) {
        self.send(PromptEvent::Deny);
    }

    pub fn touch_selector(&self) {
        self.send(PromptEvent::TouchSelector);
    }

    pub fn select_timeout(&self, index: usize) {
        self.send(PromptEvent::SelectTimeout(index));
    }

    fn send(&self, event: PromptEvent) {
        if self.events.send(event).is_err() {
            debug!(?event, "Prompt already finished");
        }
    }
}

/// Handle to a running prompt.
///
/// Dropping the handle and every [`PromptController`] abandons the prompt,
/// which then resolves as a deny.
#[derive(Debug)]
pub struct PromptHandle {
    controller: PromptController,
    view: watch::Receiver<PromptView>,
    task: JoinHandle<PromptOutcome>,
}

impl PromptHandle {
    pub fn controller(&self) -> PromptController {
        self.controller.clone()
    }

    pub fn request_grant(&self) {
        self.controller.request_grant();
    }

    pub fn request_deny(&self) {
        self.controller.request_deny();
    }

    pub fn touch_selector(&self) {
        self.controller.touch_selector();
    }

    pub fn select_timeout(&self, index: usize) {
        self.controller.select_timeout(index);
    }

    /// Subscribe to view updates.
    pub fn subscribe(&self) -> watch::Receiver<PromptView> {
        self.view.clone()
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> PromptView {
        self.view.borrow().clone()
    }

    /// Wait for the prompt to reach its terminal state.
    pub async fn finished(self) -> Result<PromptOutcome, RequestError> {
        let Self {
            controller, task, ..
        } = self;
        let outcome = task
            .await
            .map_err(|e| RequestError::Aborted(e.to_string()));
        drop(controller);
        outcome
    }
}

/// State owned by one prompt task.
struct Prompt {
    deps: Arc<EngineDeps>,
    request_id: String,
    context: RequestContext,
    state: PromptState,
    selected: usize,
    clock: Option<DecisionClock>,
    clock_rx: Option<mpsc::UnboundedReceiver<ClockEvent>>,
    auth: Option<JoinHandle<AuthOutcome>>,
    /// Start of the anti-mis-tap delay. Restarted by selector interaction.
    grace_started: Instant,
    /// When the view should show GRANT as enabled; `None` once it does.
    grace_deadline: Option<Instant>,
    grant_enabled: bool,
    view: watch::Sender<PromptView>,
}

impl Prompt {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<PromptEvent>) -> PromptOutcome {
        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return self.abandon().await,
                },
                event = next_clock_event(&mut self.clock_rx) => match event {
                    ClockEvent::Tick { remaining } => PromptEvent::Tick { remaining },
                    ClockEvent::Expired => PromptEvent::Expired,
                },
                outcome = auth_finished(&mut self.auth) => PromptEvent::AuthResult(outcome),
                () = grace_over(self.grace_deadline) => PromptEvent::GraceElapsed,
            };

            if let Some(outcome) = self.on_event(event).await {
                return outcome;
            }
        }
    }

    /// Apply one event. Returns the outcome once the prompt is done.
    async fn on_event(&mut self, event: PromptEvent) -> Option<PromptOutcome> {
        match (self.state, event) {
            (state, PromptEvent::GraceElapsed) => {
                self.grace_deadline = None;
                if state == PromptState::Prompting {
                    self.grant_enabled = true;
                    self.publish();
                }
                None
            }
            (PromptState::Prompting, PromptEvent::Tick { remaining }) if self.clock.is_some() => {
                self.on_tick(remaining);
                None
            }
            (PromptState::Prompting, PromptEvent::Expired) if self.clock.is_some() => {
                info!("Prompt timed out");
                Some(self.finalize(Decision::Deny).await)
            }
            (PromptState::Prompting, PromptEvent::Deny) => Some(self.finalize(Decision::Deny).await),
            (PromptState::Prompting, PromptEvent::Grant) => self.on_grant().await,
            (PromptState::Prompting, PromptEvent::TouchSelector) => {
                self.touch_selector();
                None
            }
            (PromptState::Prompting, PromptEvent::SelectTimeout(index)) => {
                self.touch_selector();
                self.select(index);
                None
            }
            (PromptState::AuthPending, PromptEvent::AuthResult(AuthOutcome::Passed)) => {
                Some(self.finalize(Decision::Allow).await)
            }
            (PromptState::AuthPending, PromptEvent::AuthResult(AuthOutcome::Failed)) => {
                info!("Secondary authentication failed, prompt stays open");
                self.state = PromptState::Prompting;
                self.publish();
                None
            }
            (state, event) => {
                debug!(?state, ?event, "Ignoring event");
                None
            }
        }
    }

    fn on_tick(&self, remaining: std::time::Duration) {
        self.view.send_modify(|view| view.remaining = Some(remaining));
    }

    async fn on_grant(&mut self) -> Option<PromptOutcome> {
        // Accepted once a full TICK has passed since the grace delay started.
        if self.grace_started.elapsed() < TICK {
            debug!("Grant pressed during the grace delay");
            return None;
        }

        self.grant_enabled = true;
        self.grace_deadline = None;
        self.stop_clock();

        if !self.deps.settings.auth_enabled() {
            return Some(self.finalize(Decision::Allow).await);
        }

        self.state = PromptState::AuthPending;
        self.publish();
        debug!("Waiting for secondary authentication");

        let gate = Arc::clone(&self.deps.gate);
        self.auth = Some(tokio::spawn(
            async move { gate.authenticate().await }.in_current_span(),
        ));
        None
    }

    /// Selector interaction stops the countdown for good and restarts the
    /// grace delay before GRANT is accepted.
    fn touch_selector(&mut self) {
        if self.clock.is_some() {
            debug!("Timeout selector touched, countdown stopped");
        }
        self.stop_clock();
        self.grace_started = Instant::now();
        self.grace_deadline = Some(self.grace_started + TICK);
        self.grant_enabled = false;
        self.publish();
    }

    fn select(&mut self, index: usize) {
        if index >= self.deps.settings.choices().len() {
            debug!(index, "Ignoring out-of-range timeout choice");
            return;
        }
        self.selected = index;
        self.publish();
    }

    fn stop_clock(&mut self) {
        if let Some(clock) = self.clock.take() {
            clock.cancel();
        }
        self.clock_rx = None;
    }

    fn publish(&self) {
        self.view.send_modify(|view| {
            view.state = self.state;
            view.grant_enabled = self.grant_enabled;
            view.selected_choice = self.selected;
            if self.clock.is_none() {
                view.remaining = None;
            }
        });
    }

    /// Every handle is gone; nobody can answer any more.
    async fn abandon(mut self) -> PromptOutcome {
        info!(state = ?self.state, "Prompt abandoned");
        if let Some(auth) = self.auth.take() {
            auth.abort();
        }
        self.finalize(Decision::Deny).await
    }

    /// Persist and send the decision. Runs at most once per prompt.
    async fn finalize(&mut self, decision: Decision) -> PromptOutcome {
        self.stop_clock();
        self.state = PromptState::Finalizing;
        self.publish();

        let app = &self.context.app;
        let uid = app.uid;
        let index = self.selected;

        if let Err(e) = self.deps.choices.set_timeout_choice(uid, index).await {
            warn!(error = %e, "Failed to remember timeout choice");
        }

        let (logging, notification) = self.context.existing.as_ref().map_or_else(
            || self.deps.settings.default_flags(),
            |p| (p.logging, p.notification),
        );
        let policy = Policy {
            uid,
            package_name: app.package_name.clone(),
            app_name: app.app_name.clone(),
            decision,
            logging,
            notification,
            expires_at: self.deps.settings.choice(index).expires_at(unix_timestamp()),
        };

        let persist_error = self.deps.policies.update(&policy).await.err();
        if let Some(e) = &persist_error {
            error!(error = %e, "Failed to persist policy, sending decision anyway");
        }

        let response = SuResponse::Decided {
            uid,
            decision,
            timeout_choice: index,
        };
        if let Err(e) = self.deps.channel.emit(response).await {
            error!(error = %e, "Failed to send decision");
        }

        self.state = PromptState::Done;
        self.publish();

        info!(%decision, timeout_choice = index, "Superuser request decided");

        PromptOutcome {
            request_id: self.request_id.clone(),
            decision,
            timeout_choice: index,
            policy,
            persist_error,
        }
    }
}

/// Next countdown event; pending forever once the countdown is stopped.
async fn next_clock_event(rx: &mut Option<mpsc::UnboundedReceiver<ClockEvent>>) -> ClockEvent {
    if let Some(rx) = rx.as_mut() {
        if let Some(event) = rx.recv().await {
            return event;
        }
    }
    std::future::pending().await
}

/// Resolves at `deadline`; pending forever without one.
async fn grace_over(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Outcome of the running authentication; pending forever when none runs.
async fn auth_finished(auth: &mut Option<JoinHandle<AuthOutcome>>) -> AuthOutcome {
    let Some(task) = auth.as_mut() else {
        return std::future::pending().await;
    };
    let outcome = task.await.unwrap_or_else(|e| {
        warn!(error = %e, "Secondary authentication task failed");
        AuthOutcome::Failed
    });
    *auth = None;
    outcome
}
