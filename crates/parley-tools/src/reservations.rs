// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Row reservations for tools that append to a shared tabular target.
//!
//! When several agents write into the same sheet concurrently, each must
//! claim a disjoint row range up front.  The manager keeps one next-free-row
//! counter per sheet and a reservation table behind a single lock, so two
//! concurrent `reserve_rows` calls can never hand out overlapping ranges.

use std::collections::HashMap;

use tokio::sync::Mutex;

use parley_config::MnemonicSlug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Held,
    Committed,
    Expired,
}

/// One claimed row range.  Rows are inclusive on both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub reservation_id: String,
    pub sheet: String,
    pub start_row: u64,
    pub end_row: u64,
    pub agent_id: String,
    pub state: ReservationState,
}

#[derive(Default)]
struct ManagerState {
    next_free_row: HashMap<String, u64>,
    reservations: HashMap<String, Reservation>,
}

#[derive(Default)]
pub struct ConcurrencyManager {
    state: Mutex<ManagerState>,
}

impl ConcurrencyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `count` rows on `sheet`.
    ///
    /// The counter starts just past `current_max_row` the first time a sheet
    /// is seen; later calls ignore `current_max_row` so the counter only
    /// moves forward.
    pub async fn reserve_rows(
        &self,
        count: u64,
        sheet: &str,
        current_max_row: u64,
        agent_id: &str,
    ) -> Reservation {
        let mut state = self.state.lock().await;
        let next = state
            .next_free_row
            .entry(sheet.to_string())
            .or_insert(current_max_row + 1);
        let start_row = *next;
        let end_row = start_row + count.saturating_sub(1);
        *next = end_row + 1;

        let reservation = Reservation {
            reservation_id: MnemonicSlug::generate(3),
            sheet: sheet.to_string(),
            start_row,
            end_row,
            agent_id: agent_id.to_string(),
            state: ReservationState::Held,
        };
        state
            .reservations
            .insert(reservation.reservation_id.clone(), reservation.clone());
        reservation
    }

    /// Mark a held reservation as committed.  Returns `false` for unknown
    /// ids or reservations that already left the `Held` state.
    pub async fn commit(&self, reservation_id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.reservations.get_mut(reservation_id) {
            Some(r) if r.state == ReservationState::Held => {
                r.state = ReservationState::Committed;
                true
            }
            _ => false,
        }
    }

    /// Expire a held reservation.  The rows stay consumed: re-issuing them
    /// would break the disjointness guarantee for writers already past the
    /// reservation step.
    pub async fn expire(&self, reservation_id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.reservations.get_mut(reservation_id) {
            Some(r) if r.state == ReservationState::Held => {
                r.state = ReservationState::Expired;
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, reservation_id: &str) -> Option<Reservation> {
        self.state.lock().await.reservations.get(reservation_id).cloned()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
