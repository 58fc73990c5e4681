//! Farmer Identity Verification Gate
//!
//! PENDING is the only non-terminal state. Approval seeds the farmer's trust
//! score; rejection records the reason. Either way the farmer is notified
//! without the decision waiting on delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::database::Store;
use crate::error::{WorkflowError, WorkflowResult};
use crate::identity::{Actor, Role};
use crate::notify::Notifier;
use crate::reputation::TrustScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Approved => "APPROVED",
            VerificationStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(VerificationStatus::Pending),
            "APPROVED" => Some(VerificationStatus::Approved),
            "REJECTED" => Some(VerificationStatus::Rejected),
            _ => None,
        }
    }
}

/// Identity verification request attached to a farmer record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub farmer_id: String,
    pub status: VerificationStatus,

    /// Kinds of documents submitted (national id, land title, ...)
    pub documents: Vec<String>,

    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
}

impl VerificationRequest {
    pub fn pending(farmer_id: String, documents: Vec<String>, at: DateTime<Utc>) -> Self {
        Self {
            farmer_id,
            status: VerificationStatus::Pending,
            documents,
            submitted_at: at,
            reviewed_at: None,
            reviewed_by: None,
            rejection_reason: None,
        }
    }

    pub fn apply(&mut self, decision: &VerificationDecision) {
        self.status = decision.status;
        self.reviewed_at = Some(decision.reviewed_at);
        self.reviewed_by = Some(decision.reviewed_by.clone());
        self.rejection_reason = decision.rejection_reason.clone();
    }
}

/// Outcome written by a conditional verification transition
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationDecision {
    pub status: VerificationStatus,
    pub reviewed_by: String,
    pub reviewed_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
}

pub struct VerificationGate {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl VerificationGate {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// PENDING -> APPROVED, creating the farmer's trust score
    pub async fn approve(&self, actor: &Actor, farmer_id: &str) -> WorkflowResult<TrustScore> {
        let contact = self.load_pending(actor, farmer_id).await?;
        let now = self.clock.now();

        let decision = VerificationDecision {
            status: VerificationStatus::Approved,
            reviewed_by: actor.user_id.clone(),
            reviewed_at: now,
            rejection_reason: None,
        };
        if !self
            .store
            .transition_verification(farmer_id, VerificationStatus::Pending, &decision)
            .await?
        {
            return Err(WorkflowError::conflict("verification request", farmer_id));
        }

        let score = TrustScore::new_verified(farmer_id.to_string(), now);
        let score = if self.store.insert_trust_score(&score).await? {
            score
        } else {
            warn!(farmer_id = %farmer_id, "Trust score already existed at approval, keeping it");
            self.store
                .get_trust_score(farmer_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("trust score", farmer_id))?
        };

        info!(
            farmer_id = %farmer_id,
            reviewed_by = %actor.user_id,
            composite = score.composite_score,
            tier = score.tier().as_str(),
            "Farmer verification approved"
        );

        if let Some(contact) = contact {
            self.notifier.send(
                &contact,
                "Your farmer verification was approved. Your listings now show an ESTABLISHED trust badge.",
            );
        }

        Ok(score)
    }

    /// PENDING -> REJECTED with a mandatory reason
    pub async fn reject(
        &self,
        actor: &Actor,
        farmer_id: &str,
        reason: &str,
    ) -> WorkflowResult<VerificationRequest> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::ValidationFailed(
                "rejection reason must not be empty".to_string(),
            ));
        }

        let contact = self.load_pending(actor, farmer_id).await?;

        let decision = VerificationDecision {
            status: VerificationStatus::Rejected,
            reviewed_by: actor.user_id.clone(),
            reviewed_at: self.clock.now(),
            rejection_reason: Some(reason.to_string()),
        };
        if !self
            .store
            .transition_verification(farmer_id, VerificationStatus::Pending, &decision)
            .await?
        {
            return Err(WorkflowError::conflict("verification request", farmer_id));
        }

        info!(
            farmer_id = %farmer_id,
            reviewed_by = %actor.user_id,
            reason = %reason,
            "Farmer verification rejected"
        );

        if let Some(contact) = contact {
            self.notifier.send(
                &contact,
                &format!("Your farmer verification was not approved: {}", reason),
            );
        }

        self.store
            .get_verification(farmer_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("verification request", farmer_id))
    }

    /// Authorize the actor and check the request is PENDING. Returns the
    /// farmer's contact for the notification.
    async fn load_pending(&self, actor: &Actor, farmer_id: &str) -> WorkflowResult<Option<String>> {
        if actor.role != Role::Admin {
            return Err(WorkflowError::Forbidden(format!(
                "user {} may not decide farmer verifications",
                actor.user_id
            )));
        }

        let farmer = self
            .store
            .get_user(farmer_id)
            .await?
            .filter(|user| user.role == Role::Farmer)
            .ok_or_else(|| WorkflowError::not_found("farmer", farmer_id))?;

        let request = self
            .store
            .get_verification(farmer_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("verification request", farmer_id))?;

        if request.status != VerificationStatus::Pending {
            return Err(WorkflowError::invalid_transition(
                "verification request",
                farmer_id,
                VerificationStatus::Pending,
                request.status,
            ));
        }

        Ok(farmer.contact)
    }
}
