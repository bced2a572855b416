// Message reconciliation: one ordered, de-duplicated sequence per group.
//
// Messages arrive via the push channel, via HTTP fallback responses, and as
// optimistic local inserts. The server-assigned id is the sole dedup key;
// optimistic entries are matched by the client temp id the server echoes,
// never by content. Deleted ids are tombstoned so a confirmation that loses
// the race against a delete resolves to "not present".

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use banter_common::types::{GroupId, Message, MessageEvent, MessageId, MessageType};

use crate::delivery::PendingSend;

/// Bounded memory of recently deleted ids per group.
const TOMBSTONE_CAP: usize = 256;

/// Delivery status of an entry, for UI retry/discard affordances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Optimistic local insert, not yet confirmed.
    Pending,
    /// Server-confirmed.
    Delivered,
    /// Both write paths failed; kept visible for retry/discard.
    Failed,
}

/// One visible message plus its delivery status.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEntry {
    pub message: Message,
    pub delivery: DeliveryState,
}

#[derive(Default)]
struct GroupLog {
    entries: Vec<MessageEntry>,
    /// Server ids currently present.
    ids: HashSet<MessageId>,
    /// Temp ids of outstanding optimistic entries.
    optimistic: HashSet<i64>,
    tombstones: HashSet<MessageId>,
    tombstone_order: VecDeque<MessageId>,
}

impl GroupLog {
    fn tombstone(&mut self, id: MessageId) {
        if self.tombstones.insert(id) {
            self.tombstone_order.push_back(id);
            while self.tombstone_order.len() > TOMBSTONE_CAP {
                if let Some(evicted) = self.tombstone_order.pop_front() {
                    self.tombstones.remove(&evicted);
                }
            }
        }
    }

    fn position_of_temp(&self, temp_id: i64) -> Option<usize> {
        // Unconfirmed entries carry their temp id as the entry id; once
        // confirmed the id is the server's and the entry no longer matches.
        self.entries.iter().position(|entry| entry.message.id == temp_id)
    }

    fn remove_temp(&mut self, temp_id: i64) {
        if let Some(index) = self.position_of_temp(temp_id) {
            self.entries.remove(index);
        }
        self.optimistic.remove(&temp_id);
    }

    fn trim(&mut self, window: usize) {
        while self.entries.len() > window {
            let dropped = self.entries.remove(0);
            self.ids.remove(&dropped.message.id);
            if dropped.message.id < 0 {
                self.optimistic.remove(&dropped.message.id);
            }
        }
    }
}

/// Merges inbound message events from any transport into one ordered,
/// de-duplicated sequence per group.
pub struct MessageReconciler {
    local_username: String,
    recent_window: usize,
    groups: HashMap<GroupId, GroupLog>,
}

impl MessageReconciler {
    pub fn new(local_username: impl Into<String>, recent_window: usize) -> Self {
        Self { local_username: local_username.into(), recent_window, groups: HashMap::new() }
    }

    /// The visible sequence for a group, oldest first.
    pub fn messages(&self, group_id: GroupId) -> &[MessageEntry] {
        self.groups.get(&group_id).map(|log| log.entries.as_slice()).unwrap_or(&[])
    }

    /// Apply a message event from either transport.
    pub fn ingest(&mut self, event: MessageEvent) {
        match event {
            MessageEvent::New { message } => self.ingest_new(message),
            MessageEvent::Edited { message } => self.ingest_edit(message),
            MessageEvent::Deleted { group_id, id } => self.ingest_delete(group_id, id),
        }
    }

    fn ingest_new(&mut self, message: Message) {
        let window = self.recent_window;
        let log = self.groups.entry(message.group_id).or_default();
        if log.tombstones.contains(&message.id) {
            return;
        }
        if log.ids.contains(&message.id) {
            // Duplicate delivery via the other transport.
            return;
        }
        if let Some(temp_id) = message.client_temp_id {
            if log.optimistic.contains(&temp_id) {
                // The echo of one of our own sends: replace the optimistic
                // entry in place instead of appending a second copy.
                if let Some(index) = log.position_of_temp(temp_id) {
                    log.ids.insert(message.id);
                    log.optimistic.remove(&temp_id);
                    log.entries[index] =
                        MessageEntry { message, delivery: DeliveryState::Delivered };
                    return;
                }
                log.optimistic.remove(&temp_id);
            }
        }
        log.ids.insert(message.id);
        log.entries.push(MessageEntry { message, delivery: DeliveryState::Delivered });
        log.trim(window);
    }

    fn ingest_edit(&mut self, message: Message) {
        let Some(log) = self.groups.get_mut(&message.group_id) else {
            return;
        };
        let Some(entry) =
            log.entries.iter_mut().find(|entry| entry.message.id == message.id)
        else {
            return;
        };
        entry.message.content = message.content;
        entry.message.is_edited = true;
    }

    fn ingest_delete(&mut self, group_id: GroupId, id: MessageId) {
        let log = self.groups.entry(group_id).or_default();
        if let Some(index) = log.entries.iter().position(|entry| entry.message.id == id) {
            log.entries.remove(index);
            log.ids.remove(&id);
        }
        // Tombstone regardless: a confirmation for this id may still be in
        // flight and must resolve to "not present".
        log.tombstone(id);
    }

    /// Insert the optimistic entry for a send in flight.
    pub fn insert_optimistic(&mut self, pending: &PendingSend, now: DateTime<Utc>) {
        let window = self.recent_window;
        let log = self.groups.entry(pending.group_id).or_default();
        log.optimistic.insert(pending.client_temp_id);
        log.entries.push(MessageEntry {
            message: Message {
                id: pending.client_temp_id,
                group_id: pending.group_id,
                sender_id: None,
                sender_display_name: self.local_username.clone(),
                content: pending.content.clone(),
                message_type: MessageType::Text,
                parent_message_id: pending.parent_message_id,
                attachment_ref: None,
                is_edited: false,
                created_at: now,
                reply_count: 0,
                client_temp_id: Some(pending.client_temp_id),
            },
            delivery: DeliveryState::Pending,
        });
        log.trim(window);
    }

    /// Replace the optimistic entry with the authoritative message. If the
    /// id was deleted while the confirmation was in flight, or the push echo
    /// already landed, the temp entry is simply removed.
    pub fn confirm_optimistic(&mut self, temp_id: i64, message: Message) {
        let log = self.groups.entry(message.group_id).or_default();
        if log.tombstones.contains(&message.id) || log.ids.contains(&message.id) {
            log.remove_temp(temp_id);
            return;
        }
        if let Some(index) = log.position_of_temp(temp_id) {
            log.ids.insert(message.id);
            log.optimistic.remove(&temp_id);
            log.entries[index] = MessageEntry { message, delivery: DeliveryState::Delivered };
            return;
        }
        // Temp entry already gone (e.g. trimmed); keep the confirmed copy.
        log.ids.insert(message.id);
        log.entries.push(MessageEntry { message, delivery: DeliveryState::Delivered });
    }

    /// Mark an optimistic entry as failed. It stays visible so the UI can
    /// offer retry/discard.
    pub fn fail_optimistic(&mut self, group_id: GroupId, temp_id: i64) {
        let Some(log) = self.groups.get_mut(&group_id) else {
            return;
        };
        log.optimistic.remove(&temp_id);
        if let Some(index) = log.position_of_temp(temp_id) {
            log.entries[index].delivery = DeliveryState::Failed;
        }
    }

    /// Merge a page of history (oldest first) fetched over HTTP. Entries
    /// already known or tombstoned are skipped; history precedes live ones.
    pub fn backfill(&mut self, group_id: GroupId, history: Vec<Message>) {
        let window = self.recent_window;
        let log = self.groups.entry(group_id).or_default();
        let mut merged: Vec<MessageEntry> = Vec::with_capacity(history.len() + log.entries.len());
        for message in history {
            if log.ids.contains(&message.id) || log.tombstones.contains(&message.id) {
                continue;
            }
            log.ids.insert(message.id);
            merged.push(MessageEntry { message, delivery: DeliveryState::Delivered });
        }
        merged.append(&mut log.entries);
        log.entries = merged;
        log.trim(window);
    }

    /// Drop a group's log entirely (on leave).
    pub fn clear_group(&mut self, group_id: GroupId) {
        self.groups.remove(&group_id);
    }
}
