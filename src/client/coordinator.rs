//! Request coordinator.
//!
//! # Responsibilities
//! - Run login and generic calls through one pipeline: register handle,
//!   arm deadline, send, guard the body, interpret the payload
//! - Collapse identical concurrent calls into one transport call
//! - Track the login state machine and the in-memory session
//! - Expose explicit cancellation and teardown
//!
//! # Design Decisions
//! - Callers only ever see `ApiResult`; nothing in the pipeline panics or
//!   returns a raw error
//! - The handle and the timer live inside the single-flight work, so they
//!   exist once per underlying call, not once per caller
//! - A pipeline that has been superseded never touches login state

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

use crate::client::auth::{self, Credentials, LoginData, LoginState, Session, LOGIN_OPERATION};
use crate::config::validation::join_errors;
use crate::config::{validate_config, CoordinatorConfig, ValidationError};
use crate::dedup::{Deduplicator, Fingerprint};
use crate::http::request::{resolve_url, ApiRequest};
use crate::http::{payload, GuardedResponse};
use crate::observability::metrics;
use crate::resilience::abort::{AbortCoordinator, CancelReason, OperationLease};
use crate::resilience::clock::{tokio_clock, SharedClock};
use crate::resilience::timeouts::TimeoutManager;
use crate::transport::{ReqwestTransport, Transport, TransportRequest};
use crate::types::{ApiResult, ErrorInfo, OperationId};

/// Errors raised while building a coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ValidationError>),

    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Client-side coordination layer over a [`Transport`].
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: CoordinatorConfig,
    base_url: Url,
    login_url: Url,
    transport: Arc<dyn Transport>,
    aborts: AbortCoordinator,
    timeouts: TimeoutManager,
    requests: Deduplicator<Value>,
    logins: Deduplicator<LoginData>,
    clock: SharedClock,
    login_state: AtomicU8,
    session: RwLock<Option<Session>>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, transport: Arc<dyn Transport>) -> Result<Self, CoordinatorError> {
        Self::with_clock(config, transport, tokio_clock())
    }

    /// Build with an explicit clock for deadlines and grace windows.
    pub fn with_clock(
        config: CoordinatorConfig,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
    ) -> Result<Self, CoordinatorError> {
        let base_url = Url::parse(&config.api.base_url).map_err(|source| CoordinatorError::InvalidUrl {
            url: config.api.base_url.clone(),
            source,
        })?;
        let login_url =
            resolve_url(&base_url, &config.api.login_path).map_err(|source| CoordinatorError::InvalidUrl {
                url: config.api.login_path.clone(),
                source,
            })?;
        let grace = config.dedup.grace();

        tracing::info!(
            base_url = %base_url,
            transport = %transport.binding(),
            login_timeout_ms = config.timeouts.login_ms,
            request_timeout_ms = config.timeouts.request_ms,
            grace_ms = config.dedup.grace_ms,
            "Coordinator initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                base_url,
                login_url,
                transport,
                aborts: AbortCoordinator::new(clock.clone()),
                timeouts: TimeoutManager::new(clock.clone()),
                requests: Deduplicator::new(grace, clock.clone()),
                logins: Deduplicator::new(grace, clock.clone()),
                clock,
                login_state: AtomicU8::new(LoginState::Idle as u8),
                session: RwLock::new(None),
                config,
            }),
        })
    }

    /// Validate `config` and build over the reqwest transport.
    pub fn from_config(config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        validate_config(&config).map_err(CoordinatorError::InvalidConfig)?;
        let transport = ReqwestTransport::from_config(&config)?;
        Self::new(config, Arc::new(transport))
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn aborts(&self) -> &AbortCoordinator {
        &self.inner.aborts
    }

    /// Live single-flight entries across logins and generic calls.
    pub fn pending_count(&self) -> usize {
        self.inner.requests.pending_count() + self.inner.logins.pending_count()
    }

    /// Authenticate. Identical concurrent attempts share one backend call;
    /// a different attempt supersedes the one in flight.
    pub async fn login(&self, credentials: Credentials) -> ApiResult<LoginData> {
        let body = match serde_json::to_value(&credentials) {
            Ok(body) => body,
            Err(e) => {
                return ApiResult::failure(ErrorInfo::unknown(format!("failed to encode credentials: {e}")), 0)
            }
        };
        let fingerprint = Fingerprint::new(&Method::POST, &self.inner.login_url, Some(&body));
        let mut request = TransportRequest::new(Method::POST, self.inner.login_url.clone());
        request.body = Some(body.to_string());

        let inner = self.inner.clone();
        self.inner
            .logins
            .deduped_call(fingerprint, move || {
                let lease = inner
                    .aborts
                    .create_with_deadline(LOGIN_OPERATION, Some(inner.config.timeouts.login()));
                inner.set_login_state(LoginState::InFlight);
                async move { inner.run_login(lease, request).await }
            })
            .await
    }

    /// Cancel any login in flight, drop the session and forget every
    /// shareable result obtained under it.
    pub fn logout(&self) {
        self.inner.aborts.cancel(&OperationId::new(LOGIN_OPERATION));
        self.inner.logins.clear();
        self.inner.requests.clear();
        let had_session = self.inner.session_mut().take().is_some();
        self.inner.set_login_state(LoginState::Idle);
        tracing::info!(had_session, "Logged out");
    }

    /// Issue an arbitrary call through the same pipeline as login.
    pub async fn generic_request(&self, request: ApiRequest) -> ApiResult<Value> {
        let url = match resolve_url(&self.inner.base_url, &request.path) {
            Ok(url) => url,
            Err(e) => {
                return ApiResult::failure(
                    ErrorInfo::unknown(format!("invalid request URL '{}': {e}", request.path)),
                    0,
                )
            }
        };
        let fingerprint = Fingerprint::new(&request.method, &url, request.body.as_ref());
        let operation_id = request
            .operation_id
            .unwrap_or_else(|| OperationId::new(fingerprint.operation_key()));
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.inner.config.timeouts.request());

        let mut outgoing = TransportRequest::new(request.method, url);
        outgoing.headers = request.headers;
        outgoing.body = request.body.as_ref().map(Value::to_string);
        if outgoing.header("authorization").is_none() {
            if let Some(token) = self.session_token() {
                outgoing
                    .headers
                    .push(("Authorization".to_string(), format!("Bearer {token}")));
            }
        }

        let inner = self.inner.clone();
        self.inner
            .requests
            .deduped_call(fingerprint, move || {
                let lease = inner.aborts.create_with_deadline(operation_id, Some(timeout));
                async move { inner.run_request(lease, outgoing).await }
            })
            .await
    }

    /// Cancel the live operation registered under `operation_id`.
    pub fn cancel(&self, operation_id: &OperationId) -> bool {
        self.inner.aborts.cancel(operation_id)
    }

    pub fn cancel_all(&self) -> usize {
        self.inner.aborts.cancel_all()
    }

    /// Cancel everything and forget all pending entries.
    pub fn shutdown(&self) {
        let cancelled = self.inner.aborts.cancel_all_with(CancelReason::Teardown);
        self.inner.requests.clear();
        self.inner.logins.clear();
        self.inner.set_login_state(LoginState::Idle);
        tracing::info!(cancelled, "Coordinator shut down");
    }

    pub fn login_state(&self) -> LoginState {
        LoginState::from(self.inner.login_state.load(Ordering::Acquire))
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.session_ref().clone()
    }

    pub fn session_token(&self) -> Option<String> {
        self.inner.session_ref().as_ref().map(|s| s.token.clone())
    }
}

impl Inner {
    async fn run_login(self: Arc<Self>, lease: OperationLease, request: TransportRequest) -> ApiResult<LoginData> {
        let started = self.clock.now();
        let result = self
            .execute(&lease, request, || self.mark_login_state(&lease, LoginState::Settling))
            .await;
        let status = result.status;
        let result = result.and_then(|body| auth::decode_login(body, status));

        if let Some(LoginData {
            token: Some(token),
            user,
            ..
        }) = result.data.as_ref()
        {
            if !self.aborts.is_superseded(&lease) {
                *self.session_mut() = Some(Session {
                    token: token.clone(),
                    user: user.clone(),
                    established_at: self.clock.now(),
                });
                tracing::info!(operation_id = %lease.operation_id, "Session established");
            }
        }
        self.mark_login_state(&lease, LoginState::Idle);
        self.log_outcome("login", &lease, &result, started);
        result
    }

    async fn run_request(self: Arc<Self>, lease: OperationLease, request: TransportRequest) -> ApiResult<Value> {
        let started = self.clock.now();
        let result = self.execute(&lease, request, || {}).await;
        self.log_outcome("request", &lease, &result, started);
        result
    }

    /// Send, guard and interpret. Cancellation at any point wins.
    async fn execute(
        &self,
        lease: &OperationLease,
        request: TransportRequest,
        on_response: impl FnOnce() + Send,
    ) -> ApiResult<Value> {
        let _deadline = self.timeouts.arm(lease);
        let token = lease.token().clone();

        metrics::record_transport_call(request.method.as_str());
        tracing::debug!(
            operation_id = %lease.operation_id,
            request_id = %request.request_id,
            method = %request.method,
            url = %request.url,
            "Dispatching request"
        );

        let sent = tokio::select! {
            biased;
            reason = token.cancelled() => {
                return ApiResult::failure(reason.to_error(&lease.operation_id), 0);
            }
            sent = self.transport.send(request, token.clone()) => sent,
        };

        let raw = match sent {
            Ok(raw) => raw,
            Err(error) if AbortCoordinator::is_cancellation(&error) => {
                let reason = token.reason().unwrap_or(CancelReason::Explicit);
                return ApiResult::failure(reason.to_error(&lease.operation_id), error.status.unwrap_or(0));
            }
            Err(error) => return ApiResult::failure(ErrorInfo::network(error.to_string()), 0),
        };

        on_response();
        let response = GuardedResponse::wrap(raw);
        tokio::select! {
            biased;
            reason = token.cancelled() => {
                ApiResult::failure(reason.to_error(&lease.operation_id), response.status())
            }
            result = payload::interpret(&response) => result,
        }
    }

    fn log_outcome<T>(&self, operation: &'static str, lease: &OperationLease, result: &ApiResult<T>, started: Instant) {
        let elapsed = self.clock.now().saturating_duration_since(started);
        let elapsed_ms = elapsed.as_millis() as u64;
        match &result.error {
            None => {
                metrics::record_outcome(operation, "success", elapsed);
                tracing::debug!(
                    operation_id = %lease.operation_id,
                    status = result.status,
                    elapsed_ms,
                    "Request succeeded"
                );
            }
            Some(error) => {
                metrics::record_outcome(operation, error.kind.as_str(), elapsed);
                if error.is_expected() {
                    tracing::debug!(
                        operation_id = %lease.operation_id,
                        kind = %error.kind,
                        elapsed_ms,
                        "{}",
                        error.message
                    );
                } else {
                    tracing::warn!(
                        operation_id = %lease.operation_id,
                        kind = %error.kind,
                        status = result.status,
                        elapsed_ms,
                        error = %error.message,
                        "Request failed"
                    );
                }
            }
        }
    }

    fn set_login_state(&self, state: LoginState) {
        self.login_state.store(state as u8, Ordering::Release);
    }

    fn mark_login_state(&self, lease: &OperationLease, state: LoginState) {
        if !self.aborts.is_superseded(lease) {
            self.set_login_state(state);
        }
    }

    fn session_ref(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session_mut(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("base_url", &self.inner.base_url.as_str())
            .field("login_state", &self.login_state())
            .field("live_operations", &self.inner.aborts.live_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}
