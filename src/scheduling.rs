//! Alert scheduling hand-off.
//!
//! The core only works out when each alert should fire. Delivery belongs to
//! whatever `AlertDispatcher` the server is built with.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Alert, CalendarEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertSchedule {
    pub alert_id: Uuid,
    pub event_id: Uuid,
    pub owner: Uuid,
    pub fire_at: DateTime<FixedOffset>,
    pub offset_seconds: i64,
    pub label: String,
}

impl AlertSchedule {
    /// `fire_at` is the event start minus the alert offset. It may already be
    /// in the past; delivery decides what to do with late alerts. `None` when
    /// the offset reaches outside the representable calendar.
    pub fn for_alert(event: &CalendarEvent, alert: &Alert) -> Option<Self> {
        let offset_seconds = alert.offset_seconds();
        Some(Self {
            alert_id: alert.id,
            event_id: event.id,
            owner: event.owner,
            fire_at: fire_at(event.time_start, offset_seconds)?,
            offset_seconds,
            label: alert.label(),
        })
    }
}

pub fn fire_at(start: DateTime<FixedOffset>, offset_seconds: i64) -> Option<DateTime<FixedOffset>> {
    start.checked_sub_signed(Duration::seconds(offset_seconds))
}

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, schedules: Vec<AlertSchedule>) -> Result<()>;
}

/// Logs each schedule and delivers nothing.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn dispatch(&self, schedules: Vec<AlertSchedule>) -> Result<()> {
        for schedule in schedules {
            info!(
                "Alert {} ({}) for event {} due at {}",
                schedule.alert_id, schedule.label, schedule.event_id, schedule.fire_at
            );
        }
        Ok(())
    }
}
