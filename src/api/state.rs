//! Shared request state, injected into handlers as `Extension<Arc<AuthState>>`.

use std::sync::Arc;

use crate::{
    auth::{
        audit::{AuditSink, TracingAuditSink},
        guard::{AccessGuard, DenialReporter, TracingDenialReporter},
        rate_limit::Limiters,
        session::SessionService,
        token::{AccessSigner, TokenIssuer},
    },
    store::{CredentialStore, RefreshRegistry},
};

pub struct AuthState {
    session: SessionService,
    guard: AccessGuard,
    trust_forwarded_headers: bool,
}

impl AuthState {
    #[must_use]
    pub fn new(session: SessionService, guard: AccessGuard) -> Self {
        Self {
            session,
            guard,
            trust_forwarded_headers: false,
        }
    }

    /// Key callers by `x-forwarded-for`/`x-real-ip` instead of the socket.
    /// Only safe behind a proxy that overwrites those headers.
    #[must_use]
    pub fn with_trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    #[must_use]
    pub fn trust_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }

    #[must_use]
    pub fn session(&self) -> &SessionService {
        &self.session
    }

    #[must_use]
    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }
}

/// Assembles an [`AuthState`] from its collaborators.
pub struct AuthStateBuilder {
    credentials: Arc<dyn CredentialStore>,
    registry: Arc<dyn RefreshRegistry>,
    signer: AccessSigner,
    refresh_ttl_seconds: Option<i64>,
    limiters: Limiters,
    audit: Arc<dyn AuditSink>,
    reporter: Arc<dyn DenialReporter>,
    trust_forwarded_headers: bool,
}

impl AuthStateBuilder {
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        registry: Arc<dyn RefreshRegistry>,
        signer: AccessSigner,
    ) -> Self {
        Self {
            credentials,
            registry,
            signer,
            refresh_ttl_seconds: None,
            limiters: Limiters::standard(),
            audit: Arc::new(TracingAuditSink),
            reporter: Arc::new(TracingDenialReporter),
            trust_forwarded_headers: false,
        }
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_limiters(mut self, limiters: Limiters) -> Self {
        self.limiters = limiters;
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_denial_reporter(mut self, reporter: Arc<dyn DenialReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    #[must_use]
    pub fn build(self) -> AuthState {
        let mut issuer = TokenIssuer::new(self.signer.clone(), self.registry);
        if let Some(seconds) = self.refresh_ttl_seconds {
            issuer = issuer.with_refresh_ttl_seconds(seconds);
        }
        let session = SessionService::new(self.credentials, issuer, self.limiters, self.audit);
        let guard = AccessGuard::new(self.signer, self.reporter);
        AuthState::new(session, guard).with_trust_forwarded_headers(self.trust_forwarded_headers)
    }
}
