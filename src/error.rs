use crate::application::ApplicationStatus;
use crate::user::Role;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("`{0}` is not a calendar month")]
    InvalidMonth(String),
    #[error("`{0}` is not a four digit year")]
    InvalidYear(String),
    #[error("target value must be a finite, non-negative number, got {0}")]
    InvalidTargetValue(f64),
    #[error("`{0}` is not a known application status")]
    UnknownStatus(String),
    #[error("approved loan amount is required to disburse")]
    MissingApprovedAmount,
    #[error("approved loan amount `{0}` is not a valid number")]
    InvalidApprovedAmount(String),
    #[error("application cannot move from {from} to {to}")]
    IllegalTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("application {0} is closed")]
    ApplicationClosed(String),
    #[error("customer {0} already has an open application")]
    OpenApplicationExists(String),
    #[error("user {0} is not active")]
    InactiveUser(String),
    #[error("a {child} cannot report to a {parent}")]
    InvalidParent { child: Role, parent: Role },
    #[error("expected a {expected}, user {id} is a {actual}")]
    RoleMismatch {
        id: String,
        expected: Role,
        actual: Role,
    },
    #[error("{0} does not carry targets")]
    NotATargetTier(Role),
    #[error("{0} is already registered")]
    DuplicateKey(String),
    #[error("documents can only be reviewed as verified or rejected")]
    InvalidVerdict,
    #[error("payout amount must be a finite, positive number, got {0}")]
    InvalidPayoutAmount(f64),
    #[error("application {0} has not been disbursed")]
    NotDisbursed(String),
    #[error("payout for application {0} is already settled")]
    PayoutSettled(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("no active {tier} under {parent} to distribute to")]
    NoAssignees { tier: Role, parent: String },
    #[error("cascade stopped after writing tiers {completed:?}: {source}")]
    PartialCascade {
        completed: Vec<Role>,
        #[source]
        source: StoreError,
    },
    #[error("application {0} was modified concurrently")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<sled::Error> for CoreError {
    fn from(value: sled::Error) -> Self {
        Self::Store(StoreError::Sled(value))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
