//! Request status transitions.
//!
//! Grounded on `original_source/flux/models/request.py`'s
//! `_update_status`/`_validate_message`, generalized into the full
//! transition table (the original conflates the `prepared` bootstrap and
//! the `pending`/`claimed` fan-out into one method; this keeps the same
//! branching but returns a `Result` instead of raising).

use chrono::Utc;

use flux_persistence::{Request, RequestStatus};
use flux_spec::ValidationError;

/// A message proposed alongside a status transition, before it is
/// persisted as a `flux_persistence::Message`.
pub struct ProposedMessage {
    pub author: uuid::Uuid,
    pub text: Option<String>,
}

fn validate_message_author(
    message: Option<&ProposedMessage>,
    designated_author: Option<uuid::Uuid>,
) -> Result<(), ValidationError> {
    if let Some(message) = message {
        if Some(message.author) != designated_author {
            return Err(ValidationError::new("message", "invalid-message-author"));
        }
    }
    Ok(())
}

/// `Request._update_status`, following the transition table. Mutates
/// `request` in place on success; on rejection `request` is left
/// untouched.
pub fn update_status(
    request: &mut Request,
    new: RequestStatus,
    message: Option<&ProposedMessage>,
) -> Result<(), ValidationError> {
    if request.status == new {
        return Ok(());
    }

    if request.status.is_terminal() {
        return Err(ValidationError::new("status", "cannot-update-with-status"));
    }

    match request.status {
        RequestStatus::Prepared => {
            if new != RequestStatus::Pending {
                return Err(ValidationError::new("status", "invalid-transition"));
            }
        }
        RequestStatus::Pending | RequestStatus::Claimed => match new {
            RequestStatus::Claimed => {
                validate_message_author(message, request.assignee)?;
                request.claimed = Some(Utc::now());
            }
            RequestStatus::Completed => {
                validate_message_author(message, request.assignee)?;
                request.completed = Some(Utc::now());
            }
            RequestStatus::Declined => {
                if message.is_none() {
                    return Err(ValidationError::new("message", "message-required-for-status"));
                }
                validate_message_author(message, request.assignee)?;
                request.completed = Some(Utc::now());
            }
            RequestStatus::Canceled => {
                request.completed = Some(Utc::now());
            }
            _ => return Err(ValidationError::new("status", "invalid-transition")),
        },
        _ => return Err(ValidationError::new("status", "invalid-transition")),
    }

    request.status = new;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn pending_request(assignee: Uuid) -> Request {
        Request {
            id: Uuid::now_v7(),
            name: "r".to_string(),
            status: RequestStatus::Pending,
            originator: Uuid::now_v7(),
            assignee: Some(assignee),
            creator: Uuid::now_v7(),
            template_id: None,
            slot_order: None,
            claimed: None,
            completed: None,
            attachments: vec![],
            slots: BTreeMap::new(),
            products: BTreeMap::new(),
            messages: vec![],
        }
    }

    #[test]
    fn decline_without_message_is_rejected() {
        let assignee = Uuid::now_v7();
        let mut request = pending_request(assignee);
        let err = update_status(&mut request, RequestStatus::Declined, None).unwrap_err();
        assert_eq!(err.token, "message-required-for-status");
    }

    #[test]
    fn decline_with_wrong_author_is_rejected() {
        let assignee = Uuid::now_v7();
        let mut request = pending_request(assignee);
        let message = ProposedMessage {
            author: request.originator,
            text: Some("nope".to_string()),
        };
        let err = update_status(&mut request, RequestStatus::Declined, Some(&message)).unwrap_err();
        assert_eq!(err.token, "invalid-message-author");
    }

    #[test]
    fn decline_with_assignee_message_succeeds() {
        let assignee = Uuid::now_v7();
        let mut request = pending_request(assignee);
        let message = ProposedMessage {
            author: assignee,
            text: Some("done".to_string()),
        };
        update_status(&mut request, RequestStatus::Declined, Some(&message)).unwrap();
        assert_eq!(request.status, RequestStatus::Declined);
        assert!(request.completed.is_some());
    }

    #[test]
    fn terminal_status_rejects_further_updates() {
        let assignee = Uuid::now_v7();
        let mut request = pending_request(assignee);
        request.status = RequestStatus::Completed;
        let err = update_status(&mut request, RequestStatus::Pending, None).unwrap_err();
        assert_eq!(err.token, "cannot-update-with-status");
    }

    #[test]
    fn prepared_only_advances_to_pending() {
        let assignee = Uuid::now_v7();
        let mut request = pending_request(assignee);
        request.status = RequestStatus::Prepared;
        let err = update_status(&mut request, RequestStatus::Claimed, None).unwrap_err();
        assert_eq!(err.token, "invalid-transition");

        update_status(&mut request, RequestStatus::Pending, None).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[test]
    fn cancel_requires_no_message() {
        let assignee = Uuid::now_v7();
        let mut request = pending_request(assignee);
        update_status(&mut request, RequestStatus::Canceled, None).unwrap();
        assert_eq!(request.status, RequestStatus::Canceled);
        assert!(request.completed.is_some());
    }
}
