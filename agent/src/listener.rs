//! Statistics listener
//!
//! Measured threads never touch the aggregate store. They push
//! `MeasurementEvent`s onto a channel; one listener thread folds them into a
//! `TimerProfile`. Flush requests act as barriers: a reply is sent only after
//! every event queued ahead of the request has been folded in.

use cadence_shared::types::events::MeasurementEvent;
use cadence_shared::types::profile::TimerProfile;
use cadence_shared::utils::time::system_time_nanos;
use std::sync::mpsc::{Receiver, Sender};
use tracing::{debug, info, trace};

/// Messages accepted by the listener thread
#[derive(Debug)]
pub enum Message {
    Event(MeasurementEvent),
    /// Reply with a copy of the profile built so far
    Flush(Sender<TimerProfile>),
    /// Stop after draining everything queued before this message
    Shutdown,
}

/// Aggregates measurement events into a profile
#[derive(Debug)]
pub struct Listener {
    profile: TimerProfile,
    events: u64,
}

impl Listener {
    /// Create a new listener
    pub fn new() -> Self {
        Self {
            profile: TimerProfile::new(system_time_nanos()),
            events: 0,
        }
    }

    /// Fold one event into the profile
    pub fn handle(&mut self, event: MeasurementEvent) {
        trace!("listener event: {}", event.kind());
        self.events += 1;
        match event {
            MeasurementEvent::Sample(sample) => self.profile.add_sample(&sample),
            MeasurementEvent::TaskCreated(edge) => self.profile.add_edge(edge),
            MeasurementEvent::ThreadRegistered { name } => {
                debug!("thread registered: {}", name);
                self.profile.threads_registered += 1;
            }
            MeasurementEvent::ThreadExited => self.profile.threads_exited += 1,
        }
    }

    /// Number of events handled
    pub fn event_count(&self) -> u64 {
        self.events
    }

    /// Copy of the profile with its end time set to now
    pub fn build_profile(&self) -> TimerProfile {
        let mut profile = self.profile.clone();
        profile.end_time = profile.end_time.max(system_time_nanos());
        profile
    }

    /// Serve `rx` until shutdown or until every sender is gone
    pub fn run(mut self, rx: Receiver<Message>) -> TimerProfile {
        for message in rx.iter() {
            match message {
                Message::Event(event) => self.handle(event),
                Message::Flush(reply) => {
                    let _ = reply.send(self.build_profile());
                }
                Message::Shutdown => break,
            }
        }

        info!(
            "statistics listener stopping after {} events ({} timers)",
            self.events,
            self.profile.timers.len()
        );
        self.build_profile()
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}
