//! Review dialogs shown on top of the movie details page.

use crate::model::{Rating, Review};
use serde::Serialize;

/// What the user is writing; `review_id` is set when editing.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    pub review_id: Option<u64>,
    pub text: String,
    pub rating: Rating,
}

impl Draft {
    pub fn new_review() -> Self {
        Draft::default()
    }

    pub fn editing(review: &Review) -> Self {
        Draft {
            review_id: Some(review.id),
            text: review.review.clone().unwrap_or_default(),
            rating: review.rating,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReviewDialog {
    Closed,
    Open { draft: Draft, error: Option<String> },
    Submitting { draft: Draft },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewEvent {
    Open(Draft),
    Confirm,
    Succeeded,
    Failed(String),
    Cancel,
}

impl Default for ReviewDialog {
    fn default() -> Self {
        ReviewDialog::Closed
    }
}

impl ReviewDialog {
    pub fn next(self, event: ReviewEvent) -> Self {
        use ReviewDialog::*;
        match (self, event) {
            (Closed, ReviewEvent::Open(draft)) => Open { draft, error: None },
            (Open { draft, .. }, ReviewEvent::Confirm) => Submitting { draft },
            (Open { .. }, ReviewEvent::Cancel) => Closed,
            (Submitting { .. }, ReviewEvent::Succeeded) => Closed,
            (Submitting { draft }, ReviewEvent::Failed(error)) => Open {
                draft,
                error: Some(error),
            },
            (state, _) => state,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeleteDialog {
    Closed,
    ConfirmPending {
        review_id: u64,
        error: Option<String>,
    },
    Deleting {
        review_id: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteEvent {
    Request(u64),
    Confirm,
    Cancel,
    Succeeded,
    Failed(String),
}

impl Default for DeleteDialog {
    fn default() -> Self {
        DeleteDialog::Closed
    }
}

impl DeleteDialog {
    pub fn next(self, event: DeleteEvent) -> Self {
        use DeleteDialog::*;
        match (self, event) {
            (Closed, DeleteEvent::Request(review_id)) => ConfirmPending {
                review_id,
                error: None,
            },
            (ConfirmPending { review_id, .. }, DeleteEvent::Confirm) => Deleting { review_id },
            (ConfirmPending { .. }, DeleteEvent::Cancel) => Closed,
            (Deleting { .. }, DeleteEvent::Succeeded) => Closed,
            (Deleting { review_id }, DeleteEvent::Failed(error)) => ConfirmPending {
                review_id,
                error: Some(error),
            },
            (state, _) => state,
        }
    }
}
