//! Loan applications and their status state machine
use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use crate::error::{CoreResult, StoreError, ValidationError};
use crate::timestamp::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    DocIncomplete,
    #[n(3)]
    DocComplete,
    #[n(4)]
    UnderReview,
    #[n(5)]
    Approved,
    #[n(6)]
    Agreement,
    #[n(7)]
    Disbursed,
    #[n(8)]
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 9] = [
        ApplicationStatus::Draft,
        ApplicationStatus::Submitted,
        ApplicationStatus::DocIncomplete,
        ApplicationStatus::DocComplete,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Approved,
        ApplicationStatus::Agreement,
        ApplicationStatus::Disbursed,
        ApplicationStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "DRAFT",
            ApplicationStatus::Submitted => "SUBMITTED",
            ApplicationStatus::DocIncomplete => "DOC_INCOMPLETE",
            ApplicationStatus::DocComplete => "DOC_COMPLETE",
            ApplicationStatus::UnderReview => "UNDER_REVIEW",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Agreement => "AGREEMENT",
            ApplicationStatus::Disbursed => "DISBURSED",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Disbursed | ApplicationStatus::Rejected)
    }

    /// Forward edges of the lifecycle. Rejection is open from every non-terminal state.
    pub fn can_transition_to(&self, to: ApplicationStatus) -> bool {
        use ApplicationStatus::*;

        if self.is_terminal() {
            return false;
        }
        if to == Rejected {
            return true;
        }
        matches!(
            (self, to),
            (Draft, Submitted)
                | (Submitted, DocIncomplete)
                | (Submitted, DocComplete)
                | (DocIncomplete, DocComplete)
                | (DocComplete, DocIncomplete)
                | (DocComplete, UnderReview)
                | (UnderReview, Approved)
                | (Approved, Agreement)
                | (Agreement, Disbursed)
        )
    }
}

impl FromStr for ApplicationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ValidationError::UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanType {
    #[n(0)]
    Personal,
    #[n(1)]
    Business,
    #[n(2)]
    HomeLoanSalaried,
    #[n(3)]
    HomeLoanSelfEmployed,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Updated,
    #[n(2)]
    Verified,
    #[n(3)]
    Rejected,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Document {
    #[n(0)]
    pub doc_type: String,
    #[n(1)]
    pub url: String,
    #[n(2)]
    pub status: DocStatus,
    #[n(3)]
    pub remarks: Option<String>,
    #[n(4)]
    pub updated_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct StageEntry {
    #[n(0)]
    pub from: Option<ApplicationStatus>, // None only for the creation entry
    #[n(1)]
    pub to: ApplicationStatus,
    #[n(2)]
    pub at: TimeStamp<Utc>,
    #[n(3)]
    pub by: String,
    #[n(4)]
    pub note: String,
    #[n(5)]
    pub prev_digest: Option<String>, // sha256 of the previous entry
}

impl StageEntry {
    pub fn digest(&self) -> CoreResult<String> {
        let cbor = minicbor::to_vec(self).map_err(StoreError::from)?;
        Ok(sha256::digest(&cbor))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Application {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub app_no: String,
    #[n(2)]
    pub loan_type: LoanType,
    #[n(3)]
    pub status: ApplicationStatus,
    #[n(4)]
    pub approved_loan_amount: Option<f64>,
    // hierarchy snapshot taken at creation, never re-derived
    #[n(5)]
    pub partner_id: String,
    #[n(6)]
    pub rm_id: String,
    #[n(7)]
    pub customer_id: String,
    #[n(8)]
    pub docs: Vec<Document>,
    #[n(9)]
    stage_history: Vec<StageEntry>,
    #[n(10)]
    pub deleted_at: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub version: u64,
    #[n(12)]
    pub created_at: TimeStamp<Utc>,
}

/// Snapshot of the hierarchy an application is opened under.
#[derive(Debug, Clone)]
pub struct Origination {
    pub partner_id: String,
    pub rm_id: String,
    pub customer_id: String,
}

impl Application {
    pub fn new(
        id: String,
        app_no: String,
        loan_type: LoanType,
        origination: Origination,
        created_by: String,
    ) -> Self {
        let created_at = TimeStamp::new();
        let opening = StageEntry {
            from: None,
            to: ApplicationStatus::Draft,
            at: created_at.clone(),
            by: created_by,
            note: "application created".into(),
            prev_digest: None,
        };
        Self {
            id,
            app_no,
            loan_type,
            status: ApplicationStatus::Draft,
            approved_loan_amount: None,
            partner_id: origination.partner_id,
            rm_id: origination.rm_id,
            customer_id: origination.customer_id,
            docs: vec![],
            stage_history: vec![opening],
            deleted_at: None,
            version: 0,
            created_at,
        }
    }

    pub fn stage_history(&self) -> &[StageEntry] {
        &self.stage_history
    }

    pub fn last_stage(&self) -> Option<&StageEntry> {
        self.stage_history.last()
    }

    pub fn is_open(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_payout_eligible(&self) -> bool {
        self.status == ApplicationStatus::Disbursed
    }

    /// When the application reached DISBURSED, if it has.
    pub fn disbursed_at(&self) -> Option<&TimeStamp<Utc>> {
        self.stage_history
            .iter()
            .rev()
            .find(|entry| entry.to == ApplicationStatus::Disbursed)
            .map(|entry| &entry.at)
    }

    /// Appends a stage entry and moves the status. The only way status changes.
    pub fn apply_transition(
        &mut self,
        to: ApplicationStatus,
        by: &str,
        note: &str,
        at: TimeStamp<Utc>,
        approved_loan_amount: Option<f64>,
    ) -> CoreResult<&StageEntry> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(ValidationError::IllegalTransition { from, to }.into());
        }

        let prev_digest = match self.stage_history.last() {
            Some(entry) => Some(entry.digest()?),
            None => None,
        };
        self.stage_history.push(StageEntry {
            from: Some(from),
            to,
            at,
            by: by.to_string(),
            note: note.to_string(),
            prev_digest,
        });
        self.status = to;
        if to == ApplicationStatus::Disbursed {
            self.approved_loan_amount = approved_loan_amount;
        }

        let last = self.stage_history.len() - 1;
        Ok(&self.stage_history[last])
    }

    /// Checks the digest chain and that `status` is the last entry's `to`.
    pub fn verify_history(&self) -> CoreResult<bool> {
        let Some(last) = self.stage_history.last() else {
            return Ok(false);
        };
        if last.to != self.status {
            return Ok(false);
        }
        for pair in self.stage_history.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.from != Some(prev.to) || next.prev_digest != Some(prev.digest()?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// First upload is PENDING. Any re-upload goes back to UPDATED and drops review remarks.
    pub fn upsert_document(&mut self, doc_type: &str, url: &str, at: TimeStamp<Utc>) -> &Document {
        let idx = match self.docs.iter().position(|doc| doc.doc_type == doc_type) {
            Some(idx) => {
                let doc = &mut self.docs[idx];
                doc.url = url.to_string();
                doc.status = DocStatus::Updated;
                doc.remarks = None;
                doc.updated_at = at;
                idx
            }
            None => {
                self.docs.push(Document {
                    doc_type: doc_type.to_string(),
                    url: url.to_string(),
                    status: DocStatus::Pending,
                    remarks: None,
                    updated_at: at,
                });
                self.docs.len() - 1
            }
        };
        &self.docs[idx]
    }

    /// Records a review verdict. `None` when no document of that type was uploaded.
    pub fn review_document(
        &mut self,
        doc_type: &str,
        verdict: DocStatus,
        remarks: Option<String>,
        at: TimeStamp<Utc>,
    ) -> Option<&Document> {
        let doc = self.docs.iter_mut().find(|doc| doc.doc_type == doc_type)?;
        doc.status = verdict;
        doc.remarks = remarks;
        doc.updated_at = at;
        Some(doc)
    }

    pub fn view_history(&self) {
        for entry in &self.stage_history {
            tracing::info!(
                app_no = %self.app_no,
                from = ?entry.from,
                to = %entry.to,
                by = %entry.by,
                note = %entry.note,
                "stage"
            );
        }
    }
}
