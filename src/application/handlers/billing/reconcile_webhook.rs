//! ReconcileWebhookHandler - applies one provider delivery exactly once in effect.
//!
//! Verify (pure) → admit → dispatch → read / transition / commit, with the
//! storage half bounded by a deadline. After admission, any failure flips the
//! marker to `Rejected` so the provider's redelivery is re-attempted.
//!
//! A delivery that finds its id still `Pending` under another delivery waits
//! for that marker to settle. It acknowledges a duplicate only once the other
//! delivery has applied or ignored the event; otherwise it fails with a
//! retryable error so the provider keeps redelivering.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::domain::billing::transitions;
use crate::domain::billing::{
    AccountRef, BillingAction, BillingEvent, MarkerClaim, MarkerOutcome, TransitionContext,
    TransitionSummary, VerifiedEvent, WebhookError, WebhookVerifier,
};
use crate::domain::foundation::{AccountId, EventId, Timestamp};
use crate::ports::{Admission, CommitResult, EventMarkerStore, SubscriptionStore};

/// Command carrying one raw delivery.
#[derive(Debug, Clone)]
pub struct ReconcileWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// Signature header value, if the request carried one.
    pub signature: Option<String>,
}

/// Acknowledged outcome of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Transition committed.
    Applied {
        event_id: EventId,
        summary: TransitionSummary,
    },
    /// Event id already admitted; nothing was invoked.
    Duplicate { event_id: EventId },
    /// Event kind not understood; acknowledged without a state change.
    Ignored { event_id: EventId, kind: String },
}

impl ReconcileOutcome {
    pub fn event_id(&self) -> &EventId {
        match self {
            ReconcileOutcome::Applied { event_id, .. }
            | ReconcileOutcome::Duplicate { event_id }
            | ReconcileOutcome::Ignored { event_id, .. } => event_id,
        }
    }

    /// Label used in the acknowledgment body.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::Duplicate { .. } => "duplicate",
            ReconcileOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Pause between re-checks of a marker held by another delivery.
const IN_FLIGHT_POLL_INTERVAL: StdDuration = StdDuration::from_millis(25);

/// How far a delivery got with its event marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimStage {
    /// Nothing written on behalf of this delivery.
    Unclaimed,
    /// Admission in flight; the insert may have landed.
    Claiming,
    /// This delivery owns the pending marker.
    Claimed,
    /// Another delivery holds the marker; waiting for it to settle.
    Waiting,
}

/// Tunables for the unit of work.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Upper bound on all storage I/O for one delivery.
    pub storage_deadline: StdDuration,
    /// Read / transition / commit attempts before giving up on conflicts.
    pub max_commit_attempts: u32,
    /// How long a `Pending` marker blocks redeliveries.
    pub admission_lease: Duration,
    /// Window granted when the provider sends none.
    pub billing_interval: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            storage_deadline: StdDuration::from_secs(5),
            max_commit_attempts: 3,
            admission_lease: Duration::minutes(5),
            billing_interval: Duration::days(30),
        }
    }
}

/// Handler for provider webhook deliveries.
pub struct ReconcileWebhookHandler {
    verifier: Arc<WebhookVerifier>,
    markers: Arc<dyn EventMarkerStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    settings: ReconcileSettings,
}

impl ReconcileWebhookHandler {
    pub fn new(
        verifier: Arc<WebhookVerifier>,
        markers: Arc<dyn EventMarkerStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            verifier,
            markers,
            subscriptions,
            settings,
        }
    }

    pub async fn handle(&self, cmd: ReconcileWebhookCommand) -> Result<ReconcileOutcome, WebhookError> {
        self.handle_at(cmd, Timestamp::now()).await
    }

    /// Processes a delivery as of `now`.
    #[tracing::instrument(skip_all, fields(event_id = tracing::field::Empty, event_kind = tracing::field::Empty))]
    pub async fn handle_at(
        &self,
        cmd: ReconcileWebhookCommand,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, WebhookError> {
        // 1. Verify; failures here never touch storage
        let signature = cmd.signature.as_deref().ok_or(WebhookError::MissingSignature)?;
        let verified = self
            .verifier
            .verify(&cmd.payload, signature, now)
            .map_err(|e| {
                warn!(error = %e, "webhook verification failed");
                e
            })?;

        let span = tracing::Span::current();
        span.record("event_id", verified.event_id.as_str());
        span.record("event_kind", verified.kind.as_str());

        // 2. Storage work under one deadline
        let claim = MarkerClaim::new(verified.event_id.clone(), now);
        let mut stage = ClaimStage::Unclaimed;
        let result = match tokio::time::timeout(
            self.settings.storage_deadline,
            self.admit_and_apply(&verified, &claim, &mut stage),
        )
        .await
        {
            Ok(result) => result,
            Err(_) if stage == ClaimStage::Waiting => Err(WebhookError::EventInFlight),
            Err(_) => Err(WebhookError::StorageTimeout),
        };

        // 3. Release our marker for redelivery on any failure. The claim only
        // matches a marker this delivery wrote, so this is safe even when the
        // deadline cut admission short.
        if let Err(err) = &result {
            warn!(error = %err, retryable = err.is_retryable(), "webhook processing failed");
            if matches!(stage, ClaimStage::Claiming | ClaimStage::Claimed) {
                self.reject(&claim, now).await;
            }
        }

        result
    }

    async fn admit_and_apply(
        &self,
        verified: &VerifiedEvent,
        claim: &MarkerClaim,
        stage: &mut ClaimStage,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let event_id = &verified.event_id;
        let now = claim.admitted_at;
        let lease_expired_before = now.plus(-self.settings.admission_lease);

        loop {
            *stage = ClaimStage::Claiming;
            let admission = self
                .markers
                .admit(event_id, &verified.kind, now, lease_expired_before)
                .await?;
            if admission == Admission::Admitted {
                *stage = ClaimStage::Claimed;
                break;
            }

            *stage = ClaimStage::Waiting;
            match self.markers.find(event_id).await? {
                Some(marker) if marker.outcome.is_settled() => {
                    info!(outcome = "duplicate", prior = %marker.outcome, "event already processed, acknowledging");
                    return Ok(ReconcileOutcome::Duplicate {
                        event_id: event_id.clone(),
                    });
                }
                // Rejected or vanished markers are re-admitted on the next pass
                Some(marker) if marker.outcome == MarkerOutcome::Pending => {
                    debug!("event in flight elsewhere, waiting for it to settle");
                    tokio::time::sleep(IN_FLIGHT_POLL_INTERVAL).await;
                }
                _ => {}
            }
        }

        let (target, action) = match &verified.event {
            BillingEvent::Unknown { kind } => {
                if !self
                    .markers
                    .mark_outcome(claim, MarkerOutcome::Ignored, now)
                    .await?
                {
                    return Err(WebhookError::EventInFlight);
                }
                info!(outcome = "ignored", kind = %kind, "unrecognised event kind acknowledged");
                return Ok(ReconcileOutcome::Ignored {
                    event_id: event_id.clone(),
                    kind: kind.clone(),
                });
            }
            BillingEvent::Recognized { target, action } => (target, action),
        };

        let account_id = self.resolve_account(target, action).await?;
        let ctx = TransitionContext {
            now,
            occurred_at: verified.created.unwrap_or(now),
            billing_interval: self.settings.billing_interval,
            event_id: event_id.clone(),
        };

        let summary = self.commit_with_retry(&account_id, action, &ctx, claim).await?;
        info!(
            outcome = "applied",
            account_id = %summary.account_id,
            kind = summary.kind,
            from = %summary.from,
            to = %summary.to,
            ledger_appended = summary.ledger_appended,
            "transition committed"
        );

        Ok(ReconcileOutcome::Applied {
            event_id: event_id.clone(),
            summary,
        })
    }

    /// Read / compute / CAS-commit, re-reading on every version conflict.
    async fn commit_with_retry(
        &self,
        account_id: &AccountId,
        action: &BillingAction,
        ctx: &TransitionContext,
        claim: &MarkerClaim,
    ) -> Result<TransitionSummary, WebhookError> {
        let attempts = self.settings.max_commit_attempts.max(1);

        for attempt in 1..=attempts {
            let record = self
                .subscriptions
                .get_subscription(account_id)
                .await?
                .ok_or_else(|| WebhookError::AccountNotFound(account_id.to_string()))?;

            let transition = transitions::apply(&record, action, ctx)?;

            match self
                .subscriptions
                .commit_transition(record.version, &transition.next, &transition.ledger, claim)
                .await?
            {
                CommitResult::Committed { version } => {
                    debug!(attempt, version, "commit succeeded");
                    return Ok(transition.summary);
                }
                CommitResult::VersionConflict => {
                    debug!(attempt, "version conflict, re-reading record");
                }
                CommitResult::ClaimLost => {
                    warn!(attempt, "event marker taken over by another delivery");
                    return Err(WebhookError::EventInFlight);
                }
            }
        }

        Err(WebhookError::StorageConflict { attempts })
    }

    async fn resolve_account(
        &self,
        target: &AccountRef,
        action: &BillingAction,
    ) -> Result<AccountId, WebhookError> {
        let resolved = match target {
            AccountRef::Account(id) => Some(id.clone()),
            AccountRef::ProviderSubscription(subscription_id) => {
                match self
                    .subscriptions
                    .find_account_by_provider_subscription(subscription_id)
                    .await?
                {
                    Some(id) => Some(id),
                    None => match action.customer_id() {
                        Some(customer_id) => {
                            self.subscriptions
                                .find_account_by_provider_customer(customer_id)
                                .await?
                        }
                        None => None,
                    },
                }
            }
            AccountRef::ProviderCustomer(customer_id) => {
                self.subscriptions
                    .find_account_by_provider_customer(customer_id)
                    .await?
            }
        };

        resolved.ok_or_else(|| WebhookError::AccountNotFound(target.to_string()))
    }

    /// Best effort; a marker left pending is recovered once its lease runs out.
    async fn reject(&self, claim: &MarkerClaim, now: Timestamp) {
        let marked = tokio::time::timeout(
            self.settings.storage_deadline,
            self.markers.mark_outcome(claim, MarkerOutcome::Rejected, now),
        )
        .await;

        match marked {
            Ok(Ok(true)) => debug!("event marker rejected for redelivery"),
            Ok(Ok(false)) => debug!("no owned pending marker to reject"),
            Ok(Err(e)) => warn!(error = %e, "failed to reject event marker"),
            Err(_) => warn!("timed out rejecting event marker"),
        }
    }
}
