//! In-memory mirror of the flow registry structure and device states.
//!
//! Seeded once from the HTTP snapshot, then kept current by envelopes from
//! the event socket. Conflicts resolve last-write-wins by arrival order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use flowlink_shared::{
    derive_key, strip_topic_prefix, Envelope, EnvelopeError, FullStructAndStates, StateKey,
    Thing,
};
use serde_json::Value;

/// A value to store under a state key.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub value_type: String,
    pub value: Value,
}

impl StateUpdate {
    pub fn new(value_type: impl Into<String>, value: Value) -> Self {
        Self {
            value_type: value_type.into(),
            value,
        }
    }
}

impl From<&Envelope> for StateUpdate {
    fn from(envelope: &Envelope) -> Self {
        Self {
            value_type: envelope.value_type.clone().unwrap_or_default(),
            value: envelope.value.clone(),
        }
    }
}

/// Latest known state for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct StateEntry {
    pub value_type: String,
    pub value: Value,
    /// Thing that owns the topic, when the registry knows it.
    pub thing_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every change, starting at 1.
    pub revision: u64,
}

/// What [`StructureStateStore::apply_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Inserted,
    Changed,
    Unchanged,
}

#[derive(Debug, Default)]
pub struct StructureStateStore {
    things: Vec<Thing>,
    /// Prefix-stripped service topic -> index into `things`.
    topic_index: HashMap<String, usize>,
    states: HashMap<String, StateEntry>,
}

impl StructureStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: FullStructAndStates) -> Self {
        let mut store = Self::new();
        store.load_snapshot(snapshot);
        store
    }

    /// Replace the structure and seed states from a full snapshot.
    pub fn load_snapshot(&mut self, snapshot: FullStructAndStates) {
        self.topic_index.clear();
        for (idx, thing) in snapshot.things.iter().enumerate() {
            for service in &thing.services {
                self.topic_index
                    .insert(strip_topic_prefix(&service.topic).to_string(), idx);
            }
        }
        self.things = snapshot.things;

        let now = Utc::now();
        self.states = snapshot
            .states
            .into_iter()
            .map(|record| {
                let entry = StateEntry {
                    value_type: record.value_type,
                    value: record.value,
                    thing_id: record.thing_id,
                    updated_at: record.updated_at.unwrap_or(now),
                    revision: 1,
                };
                (record.name, entry)
            })
            .collect();
    }

    /// Store `update` under `key`, replacing whatever was there.
    ///
    /// Repeating an identical update is a no-op.
    pub fn apply_update(&mut self, key: &StateKey, update: StateUpdate) -> UpdateOutcome {
        let thing_id = self.lookup_by_topic(key.topic()).map(|thing| thing.id);

        match self.states.get_mut(&key.to_string()) {
            Some(entry) if entry.value_type == update.value_type && entry.value == update.value => {
                UpdateOutcome::Unchanged
            }
            Some(entry) => {
                entry.value_type = update.value_type;
                entry.value = update.value;
                entry.thing_id = thing_id.or(entry.thing_id);
                entry.updated_at = Utc::now();
                entry.revision += 1;
                UpdateOutcome::Changed
            }
            None => {
                self.states.insert(
                    key.to_string(),
                    StateEntry {
                        value_type: update.value_type,
                        value: update.value,
                        thing_id,
                        updated_at: Utc::now(),
                        revision: 1,
                    },
                );
                UpdateOutcome::Inserted
            }
        }
    }

    /// Derive the key for `envelope` and store its value.
    pub fn apply_envelope(
        &mut self,
        envelope: &Envelope,
    ) -> Result<(StateKey, UpdateOutcome), EnvelopeError> {
        let key = derive_key(envelope)?;
        let outcome = self.apply_update(&key, StateUpdate::from(envelope));
        Ok((key, outcome))
    }

    /// The thing exposing a service on `topic`, with or without the event prefix.
    pub fn lookup_by_topic(&self, topic: &str) -> Option<&Thing> {
        self.topic_index
            .get(strip_topic_prefix(topic))
            .and_then(|&idx| self.things.get(idx))
    }

    pub fn state(&self, key: &str) -> Option<&StateEntry> {
        self.states.get(key)
    }

    /// All states reported on `topic`, sorted by key.
    pub fn states_for_topic(&self, topic: &str) -> Vec<(&str, &StateEntry)> {
        let topic = strip_topic_prefix(topic);
        let mut found: Vec<_> = self
            .states
            .iter()
            .filter(|(key, _)| key.split_once('@').is_some_and(|(_, t)| t == topic))
            .map(|(key, entry)| (key.as_str(), entry))
            .collect();
        found.sort_by(|a, b| a.0.cmp(b.0));
        found
    }

    pub fn things(&self) -> &[Thing] {
        &self.things
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
