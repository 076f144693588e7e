//! Partner commission payouts, unlocked by disbursement
use std::sync::Arc;

use chrono::Utc;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::store::Store;
use crate::timestamp::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Done,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Payout {
    #[n(0)]
    pub application_id: String,
    #[n(1)]
    pub partner_id: String,
    #[n(2)]
    pub amount: f64,
    #[n(3)]
    pub status: PayoutStatus,
    #[n(4)]
    pub updated_at: TimeStamp<Utc>,
}

impl Payout {
    pub fn storage_key(application_id: &str, partner_id: &str) -> String {
        format!("{application_id}/{partner_id}")
    }
}

pub struct PayoutLedger {
    store: Arc<Store>,
}

impl PayoutLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Records or re-prices the commission owed to the originating partner.
    pub fn record(&self, application_id: &str, partner_id: &str, amount: f64) -> CoreResult<Payout> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ValidationError::InvalidPayoutAmount(amount).into());
        }
        let app = self.store.require_application(application_id)?;
        if app.partner_id != partner_id {
            return Err(CoreError::not_found("application", application_id));
        }
        if !app.is_payout_eligible() {
            return Err(ValidationError::NotDisbursed(app.id).into());
        }
        if let Some(existing) = self.store.payout(application_id, partner_id)? {
            if existing.status == PayoutStatus::Done {
                return Err(ValidationError::PayoutSettled(application_id.to_string()).into());
            }
        }

        let payout = Payout {
            application_id: application_id.to_string(),
            partner_id: partner_id.to_string(),
            amount,
            status: PayoutStatus::Pending,
            updated_at: TimeStamp::new(),
        };
        self.store.put_payout(&payout)?;
        tracing::info!(application = %application_id, partner = %partner_id, amount, "payout recorded");
        Ok(payout)
    }

    pub fn mark_done(&self, application_id: &str, partner_id: &str) -> CoreResult<Payout> {
        let mut payout = self
            .store
            .payout(application_id, partner_id)?
            .ok_or_else(|| CoreError::not_found("payout", Payout::storage_key(application_id, partner_id)))?;
        payout.status = PayoutStatus::Done;
        payout.updated_at = TimeStamp::new();
        self.store.put_payout(&payout)?;
        Ok(payout)
    }

    pub fn get(&self, application_id: &str, partner_id: &str) -> CoreResult<Option<Payout>> {
        self.store.payout(application_id, partner_id)
    }
}
