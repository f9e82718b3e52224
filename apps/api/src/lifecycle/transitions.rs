use crate::errors::AppError;
use crate::models::application::ApplicationStatus;

use ApplicationStatus::*;

/// Statuses whose first entry credits the application's keywords with a success.
pub const SUCCESS_STATUSES: [ApplicationStatus; 2] = [Callback, Offer];

/// Explicit adjacency table. Re-entering `researching` (re-run) and
/// `generating` (regenerate a document) are the only self-edges.
pub fn allowed_next(from: ApplicationStatus) -> &'static [ApplicationStatus] {
    match from {
        Created => &[Keywords],
        Keywords => &[Researching],
        Researching => &[Researching, Reviewed],
        Reviewed => &[Generating],
        Generating => &[Generating, Exported],
        Exported => &[Sent],
        Sent => &[Callback, Offer, Closed],
        Callback => &[Offer, Closed],
        Offer => &[Closed],
        Closed => &[],
    }
}

pub fn can_transition(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    allowed_next(from).contains(&to)
}

pub fn validate_transition(from: ApplicationStatus, to: ApplicationStatus) -> Result<(), AppError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition { from, to })
    }
}

pub fn is_success(status: ApplicationStatus) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

/// True only when a transition enters the success region from outside it,
/// so `sent → callback → offer` credits one success, not two.
pub fn enters_success_region(from: ApplicationStatus, to: ApplicationStatus) -> bool {
    !is_success(from) && is_success(to)
}
