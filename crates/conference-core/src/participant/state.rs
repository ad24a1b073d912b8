//! Participant state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::name_cache::NameCache;
use crate::types::{AnswerState, CallDirection, CallId, CallType, ParticipantStatus};

/// Partial update parsed from one status fragment.
///
/// `None`, empty strings and the enums' unset variants (`Undefined`,
/// `Unknown`) all mean "not reported" and never overwrite stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantUpdate {
    pub status: Option<ParticipantStatus>,
    pub direction: Option<CallDirection>,
    pub answer_state: Option<AnswerState>,
    pub name: Option<String>,
    pub number: Option<String>,
    pub remote_number: Option<String>,
    pub call_type: Option<CallType>,
}

impl ParticipantUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ParticipantStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_direction(mut self, direction: CallDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_answer_state(mut self, answer_state: AnswerState) -> Self {
        self.answer_state = Some(answer_state);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn with_remote_number(mut self, remote_number: impl Into<String>) -> Self {
        self.remote_number = Some(remote_number.into());
        self
    }

    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = Some(call_type);
        self
    }

    /// True when no field carries a value
    pub fn is_empty(&self) -> bool {
        self.reported_status().is_none()
            && self.direction.is_none_or(|d| d == CallDirection::Undefined)
            && self.answer_state.is_none_or(|a| a == AnswerState::Unknown)
            && self.call_type.is_none_or(|t| t == CallType::Unknown)
            && non_empty(&self.name).is_none()
            && non_empty(&self.number).is_none()
            && non_empty(&self.remote_number).is_none()
    }

    /// The status this update reports, if any
    pub fn reported_status(&self) -> Option<ParticipantStatus> {
        self.status.filter(|s| *s != ParticipantStatus::Undefined)
    }
}

/// A single field change raised by [`ParticipantState::apply_update`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantChange {
    StatusChanged {
        old: ParticipantStatus,
        new: ParticipantStatus,
    },
    DirectionChanged(CallDirection),
    AnswerStateChanged(AnswerState),
    NameChanged(String),
    NumberChanged(String),
    RemoteNumberChanged(String),
    CallTypeChanged(CallType),
    StartChanged(DateTime<Utc>),
    EndChanged(DateTime<Utc>),
}

/// State of one remote call leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantState {
    call_id: CallId,
    status: ParticipantStatus,
    direction: CallDirection,
    answer_state: AnswerState,
    name: Option<String>,
    number: Option<String>,
    remote_number: Option<String>,
    call_type: CallType,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl ParticipantState {
    pub fn new(call_id: CallId) -> Self {
        Self {
            call_id,
            status: ParticipantStatus::Undefined,
            direction: CallDirection::Undefined,
            answer_state: AnswerState::Unknown,
            name: None,
            number: None,
            remote_number: None,
            call_type: CallType::Unknown,
            start: None,
            end: None,
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn status(&self) -> ParticipantStatus {
        self.status
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn answer_state(&self) -> AnswerState {
        self.answer_state
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    pub fn remote_number(&self) -> Option<&str> {
        self.remote_number.as_deref()
    }

    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    /// When the call first went online
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// When the call first left the online set after starting
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn is_online(&self) -> bool {
        self.status.is_online()
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == CallDirection::Incoming
    }

    /// Time spent online, up to now for calls still running
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.start?;
        Some(self.end.unwrap_or_else(Utc::now) - start)
    }

    /// Key used for the name cache
    fn cache_key(&self) -> Option<&str> {
        self.number.as_deref().or(self.remote_number.as_deref())
    }

    /// Apply a parsed fragment and return the fields that changed
    pub fn apply_update(&mut self, update: &ParticipantUpdate, names: &NameCache) -> Vec<ParticipantChange> {
        self.apply_update_at(update, names, Utc::now())
    }

    /// [`apply_update`](Self::apply_update) with an explicit clock
    pub fn apply_update_at(
        &mut self,
        update: &ParticipantUpdate,
        names: &NameCache,
        now: DateTime<Utc>,
    ) -> Vec<ParticipantChange> {
        let mut changes = Vec::new();

        if let Some(status) = update.reported_status() {
            changes.extend(self.set_status(status, now));
        }

        if let Some(direction) = update.direction {
            if direction != CallDirection::Undefined && direction != self.direction {
                self.direction = direction;
                changes.push(ParticipantChange::DirectionChanged(direction));
            }
        }

        if let Some(answer_state) = update.answer_state {
            if answer_state != AnswerState::Unknown && answer_state != self.answer_state {
                self.answer_state = answer_state;
                changes.push(ParticipantChange::AnswerStateChanged(answer_state));
            }
        }

        if let Some(call_type) = update.call_type {
            if call_type != CallType::Unknown && call_type != self.call_type {
                self.call_type = call_type;
                changes.push(ParticipantChange::CallTypeChanged(call_type));
            }
        }

        if let Some(number) = non_empty(&update.number) {
            if self.number.as_deref() != Some(number) {
                self.number = Some(number.to_string());
                changes.push(ParticipantChange::NumberChanged(number.to_string()));
            }
        }

        if let Some(remote_number) = non_empty(&update.remote_number) {
            if self.remote_number.as_deref() != Some(remote_number) {
                self.remote_number = Some(remote_number.to_string());
                changes.push(ParticipantChange::RemoteNumberChanged(remote_number.to_string()));
            }
        }

        let reported_name = non_empty(&update.name);
        if let Some(name) = reported_name {
            if self.name.as_deref() != Some(name) {
                self.name = Some(name.to_string());
                changes.push(ParticipantChange::NameChanged(name.to_string()));
            }
        }

        if let Some(key) = self.cache_key().map(str::to_string) {
            match reported_name {
                Some(name) => names.insert(&key, name),
                None if self.name.is_none() => {
                    if let Some(cached) = names.get(&key) {
                        debug!("Call {} name '{}' restored from cache", self.call_id, cached);
                        self.name = Some(cached.clone());
                        changes.push(ParticipantChange::NameChanged(cached));
                    }
                }
                None => {}
            }
        }

        changes
    }

    /// Mark the call as dropped by the device without a disconnect
    pub fn mark_orphaned(&mut self) -> Vec<ParticipantChange> {
        self.mark_orphaned_at(Utc::now())
    }

    pub fn mark_orphaned_at(&mut self, now: DateTime<Utc>) -> Vec<ParticipantChange> {
        self.set_status(ParticipantStatus::Orphaned, now)
    }

    fn set_status(&mut self, status: ParticipantStatus, now: DateTime<Utc>) -> Vec<ParticipantChange> {
        if status == self.status {
            return Vec::new();
        }
        if self.status.is_terminal() {
            debug!(
                "Call {} is {}, ignoring status {}",
                self.call_id, self.status, status
            );
            return Vec::new();
        }

        let old = self.status;
        self.status = status;
        debug!("Call {} status: {} -> {}", self.call_id, old, status);

        let mut changes = vec![ParticipantChange::StatusChanged { old, new: status }];

        if status.is_online() && self.start.is_none() {
            self.start = Some(now);
            changes.push(ParticipantChange::StartChanged(now));
        }

        if old.is_online() && !status.is_online() && self.start.is_some() && self.end.is_none() {
            self.end = Some(now);
            changes.push(ParticipantChange::EndChanged(now));
        }

        changes
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
