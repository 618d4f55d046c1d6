// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The action dispatcher.
//!
//! Consumes action bus messages and turns logical actions into group-level
//! device behavior. Each logical action carries an in-progress guard: while
//! its handler runs, further dispatches of the same action are dropped.
//! Handler failures are caught here and logged; they never propagate out of
//! the dispatch loop.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use parking_lot::Mutex;

use crate::action::{ActionPayload, MaisonAction};
use crate::broker::{BrokerLink, MsgEvent};
use crate::config::{MaisonConfig, ProtocolTiming};
use crate::ctrl::BinaryStateCtrl;
use crate::device::DeviceDef;
use crate::error::Result;
use crate::types::BinaryState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekDir {
    Forward,
    Backward,
}

/// Steps a cursor over `len` entries with wraparound at both ends.
fn step(cursor: usize, len: usize, dir: SeekDir) -> usize {
    match dir {
        SeekDir::Forward => {
            if cursor + 1 >= len {
                0
            } else {
                cursor + 1
            }
        }
        SeekDir::Backward => {
            if cursor == 0 {
                len - 1
            } else {
                cursor - 1
            }
        }
    }
}

/// Clears the in-progress flag when a handler finishes, however it exits.
struct InProgressGuard<'a> {
    set: &'a Mutex<HashSet<MaisonAction>>,
    action: MaisonAction,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.action);
    }
}

/// Maps logical actions onto group behaviors over the binary controller.
pub struct MaisonCtrl<L: BrokerLink> {
    ctrl: Arc<BinaryStateCtrl<L>>,
    /// Devices driven by `main`/`up`/`down`, in configured order.
    main_group: Vec<String>,
    /// Devices the selection cursor walks, in configured order.
    etc_group: Vec<String>,
    canonical_device: Option<String>,
    timing: ProtocolTiming,
    cursor: Mutex<usize>,
    in_progress: Mutex<HashSet<MaisonAction>>,
}

impl<L: BrokerLink> MaisonCtrl<L> {
    /// Builds the dispatcher, partitioning `devices` into groups by tag.
    #[must_use]
    pub fn new(
        ctrl: Arc<BinaryStateCtrl<L>>,
        config: &MaisonConfig,
        devices: &[DeviceDef],
    ) -> Self {
        let pick = |tag: &str| -> Vec<String> {
            devices
                .iter()
                .filter(|d| d.in_group(tag))
                .map(|d| d.name.clone())
                .collect()
        };
        Self {
            ctrl,
            main_group: pick(&config.main_group_tag),
            etc_group: pick(&config.etc_group_tag),
            canonical_device: config.canonical_device.clone(),
            timing: config.timing,
            cursor: Mutex::new(0),
            in_progress: Mutex::new(HashSet::new()),
        }
    }

    /// Consumes one action bus message.
    ///
    /// Invalid payloads are logged and dropped; valid ones are dispatched.
    pub async fn handle_msg(&self, evt: &MsgEvent) {
        let payload = match ActionPayload::parse(&evt.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    topic = %evt.topic,
                    payload = %evt.payload_str(),
                    error = %e,
                    "Dropping invalid action message"
                );
                return;
            }
        };
        tracing::info!(
            topic = %evt.topic,
            action = %payload.action,
            age_ms = payload.age_ms(),
            "Action received"
        );
        self.dispatch(payload.action).await;
    }

    /// Runs a logical action's handler unless the same action is already
    /// in progress. Handler failures are logged and swallowed.
    pub async fn dispatch(&self, action: MaisonAction) {
        {
            let mut in_progress = self.in_progress.lock();
            if !in_progress.insert(action) {
                tracing::debug!(action = %action, "Action already in progress, dropped");
                return;
            }
        }
        let _guard = InProgressGuard {
            set: &self.in_progress,
            action,
        };

        if let Err(e) = self.run_action(action).await {
            tracing::error!(action = %action, error = %e, "Action handler failed");
        }
    }

    async fn run_action(&self, action: MaisonAction) -> Result<()> {
        match action {
            MaisonAction::Main => self.group_toggle(&self.main_group).await,
            MaisonAction::Up => self.drive_group(&self.main_group, BinaryState::On).await,
            MaisonAction::Down => self.drive_group(&self.main_group, BinaryState::Off).await,
            MaisonAction::Next => self.seek(SeekDir::Forward).await,
            MaisonAction::Prev => self.seek(SeekDir::Backward).await,
            MaisonAction::Dot => {
                tracing::debug!("dot is a deliberate no-op");
                Ok(())
            }
            MaisonAction::DotDouble => self.group_toggle(&self.etc_group).await,
            MaisonAction::Dots => match self.selected_device() {
                Some(device) => self.blink(&device).await,
                None => Ok(()),
            },
            MaisonAction::DotsDouble => match self.selected_device() {
                Some(device) => self.toggle_one(&device).await,
                None => Ok(()),
            },
            MaisonAction::UpHold
            | MaisonAction::DownHold
            | MaisonAction::DotLong
            | MaisonAction::DotsLong => {
                tracing::info!(action = %action, "Action recognized but unhandled");
                Ok(())
            }
        }
    }

    /// Reads every device in the group, then drives all of them to the
    /// opposite of the canonical device's state. A disagreeing group is
    /// logged as a desync and still converges on the canonical reading.
    async fn group_toggle(&self, group: &[String]) -> Result<()> {
        if group.is_empty() {
            tracing::warn!("Group toggle on an empty group");
            return Ok(());
        }

        let reads = try_join_all(group.iter().map(|d| self.ctrl.get_binary_state(d))).await?;
        let mut states = Vec::with_capacity(reads.len());
        for read in &reads {
            states.push(read.parse::<BinaryState>()?);
        }

        let canonical_idx = self
            .canonical_device
            .as_ref()
            .and_then(|name| group.iter().position(|d| d == name))
            .unwrap_or(0);
        let canonical = states[canonical_idx];

        if states.iter().any(|s| *s != canonical) {
            tracing::warn!(
                group = ?group,
                states = ?reads,
                canonical = %canonical,
                "Group state desync before toggle"
            );
        }

        self.drive_group(group, canonical.toggled()).await
    }

    /// Drives every device in the group to `target`, concurrently, each
    /// independently confirmed.
    async fn drive_group(&self, group: &[String], target: BinaryState) -> Result<()> {
        try_join_all(
            group
                .iter()
                .map(|d| self.ctrl.set_binary_state(d, target)),
        )
        .await?;
        Ok(())
    }

    /// Moves the selection cursor and blinks the newly selected device.
    async fn seek(&self, dir: SeekDir) -> Result<()> {
        if self.etc_group.is_empty() {
            tracing::warn!("Seek over an empty selection group");
            return Ok(());
        }
        let device = {
            let mut cursor = self.cursor.lock();
            *cursor = step(*cursor, self.etc_group.len(), dir);
            self.etc_group[*cursor].clone()
        };
        tracing::info!(device = %device, "Selection moved");
        self.blink(&device).await
    }

    /// Blinks the device: a fixed number of on/off cycles, each toggle
    /// waiting out the configured delay minus the time its confirmation
    /// already took.
    async fn blink(&self, device: &str) -> Result<()> {
        let mut state = self.ctrl.get_binary_state(device).await?.parse::<BinaryState>()?;
        let toggles = usize::from(self.timing.blink_count) * 2;
        for i in 0..toggles {
            let started = tokio::time::Instant::now();
            state = state.toggled();
            self.ctrl.set_binary_state(device, state).await?;
            let elapsed = started.elapsed();
            if i + 1 < toggles && elapsed < self.timing.toggle_delay {
                tokio::time::sleep(self.timing.toggle_delay - elapsed).await;
            }
        }
        Ok(())
    }

    async fn toggle_one(&self, device: &str) -> Result<()> {
        let current = self.ctrl.get_binary_state(device).await?.parse::<BinaryState>()?;
        self.ctrl.set_binary_state(device, current.toggled()).await
    }

    fn selected_device(&self) -> Option<String> {
        if self.etc_group.is_empty() {
            tracing::warn!("No selection group configured");
            return None;
        }
        Some(self.etc_group[*self.cursor.lock()].clone())
    }

    /// Current cursor position into the selection group.
    #[must_use]
    pub fn cursor(&self) -> usize {
        *self.cursor.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::{MockLink, spawn_device_sim};
    use crate::config::TopicScheme;
    use crate::router::MsgRouter;
    use crate::state::DeviceStateCache;
    use std::time::Duration;

    #[test]
    fn cursor_wraps_both_ends() {
        assert_eq!(step(2, 3, SeekDir::Forward), 0);
        assert_eq!(step(0, 3, SeekDir::Backward), 2);
        assert_eq!(step(0, 3, SeekDir::Forward), 1);
        assert_eq!(step(2, 3, SeekDir::Backward), 1);
        assert_eq!(step(0, 1, SeekDir::Forward), 0);
        assert_eq!(step(0, 1, SeekDir::Backward), 0);
    }

    struct Rig {
        link: Arc<MockLink>,
        ctrl: Arc<BinaryStateCtrl<MockLink>>,
        dispatcher: Arc<MaisonCtrl<MockLink>>,
    }

    /// Collects formatted log output so tests can assert on emitted events.
    #[derive(Clone, Default)]
    struct LogSink(Arc<Mutex<Vec<u8>>>);

    impl LogSink {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl std::io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_warnings(sink: &LogSink) -> tracing::subscriber::DefaultGuard {
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Builds a dispatcher over simulated devices. Each entry is
    /// `(name, groups, initial_state)`.
    async fn rig(devices: &[(&str, &[&str], &str)], canonical: Option<&str>) -> Rig {
        let link = MockLink::new();
        let router = Arc::new(MsgRouter::new(Arc::clone(&link)));
        router.listen();

        let defs: Vec<DeviceDef> = devices
            .iter()
            .map(|(name, groups, _)| DeviceDef::new(*name, groups))
            .collect();
        let names: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();
        for (name, _, initial) in devices {
            let _sim =
                spawn_device_sim(&link, "zigbee2mqtt", name, initial, Duration::from_millis(50));
        }

        let cache = Arc::new(
            DeviceStateCache::init(Arc::clone(&router), TopicScheme::default(), &names)
                .await
                .unwrap(),
        );
        let config = MaisonConfig {
            canonical_device: canonical.map(ToString::to_string),
            ..MaisonConfig::default()
        };
        let ctrl = Arc::new(BinaryStateCtrl::new(
            Arc::clone(&router),
            cache,
            config.topics.clone(),
            config.timing,
        ));
        let dispatcher = Arc::new(MaisonCtrl::new(Arc::clone(&ctrl), &config, &defs));
        Rig {
            link,
            ctrl,
            dispatcher,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn main_toggle_converges_desynced_group() {
        let rig = rig(
            &[
                ("dev_a", &["action_main"], "ON"),
                ("dev_b", &["action_main"], "OFF"),
            ],
            Some("dev_a"),
        )
        .await;

        let logs = LogSink::default();
        let _guard = capture_warnings(&logs);
        rig.dispatcher.dispatch(MaisonAction::Main).await;

        // The disagreement is reported before the group converges.
        assert!(logs.contents().contains("Group state desync before toggle"));
        // Canonical was ON, so both devices end OFF.
        assert_eq!(rig.ctrl.get_binary_state("dev_a").await.unwrap(), "OFF");
        assert_eq!(rig.ctrl.get_binary_state("dev_b").await.unwrap(), "OFF");
    }

    #[tokio::test(start_paused = true)]
    async fn up_drives_group_on() {
        let rig = rig(
            &[
                ("dev_a", &["action_main"], "OFF"),
                ("dev_b", &["action_main"], "OFF"),
            ],
            None,
        )
        .await;

        rig.dispatcher.dispatch(MaisonAction::Up).await;
        assert_eq!(rig.ctrl.get_binary_state("dev_a").await.unwrap(), "ON");
        assert_eq!(rig.ctrl.get_binary_state("dev_b").await.unwrap(), "ON");
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_dispatch_is_dropped() {
        let rig = rig(&[("dev_a", &["action_main"], "OFF")], None).await;

        let first = {
            let dispatcher = Arc::clone(&rig.dispatcher);
            tokio::spawn(async move { dispatcher.dispatch(MaisonAction::Main).await })
        };
        let second = {
            let dispatcher = Arc::clone(&rig.dispatcher);
            tokio::spawn(async move { dispatcher.dispatch(MaisonAction::Main).await })
        };
        first.await.unwrap();
        second.await.unwrap();

        // Exactly one handler execution: one set publish.
        assert_eq!(rig.link.published_to("zigbee2mqtt/dev_a/set").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn next_moves_cursor_and_blinks() {
        let rig = rig(
            &[
                ("etc_a", &["etc_lights"], "OFF"),
                ("etc_b", &["etc_lights"], "OFF"),
                ("etc_c", &["etc_lights"], "OFF"),
            ],
            None,
        )
        .await;

        rig.dispatcher.dispatch(MaisonAction::Next).await;
        assert_eq!(rig.dispatcher.cursor(), 1);
        // Two blink cycles = four toggles on the selected device.
        assert_eq!(rig.link.published_to("zigbee2mqtt/etc_b/set").len(), 4);
        // Blink ends where it started.
        assert_eq!(rig.ctrl.get_binary_state("etc_b").await.unwrap(), "OFF");
    }

    #[tokio::test(start_paused = true)]
    async fn dots_double_toggles_selection_once() {
        let rig = rig(&[("etc_a", &["etc_lights"], "OFF")], None).await;

        rig.dispatcher.dispatch(MaisonAction::DotsDouble).await;
        assert_eq!(rig.ctrl.get_binary_state("etc_a").await.unwrap(), "ON");
        assert_eq!(rig.link.published_to("zigbee2mqtt/etc_a/set").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unhandled_actions_touch_nothing() {
        let rig = rig(&[("dev_a", &["action_main"], "OFF")], None).await;

        for action in [
            MaisonAction::UpHold,
            MaisonAction::DownHold,
            MaisonAction::DotLong,
            MaisonAction::DotsLong,
            MaisonAction::Dot,
        ] {
            rig.dispatcher.dispatch(action).await;
        }
        assert!(rig.link.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_action_message_is_dropped() {
        let rig = rig(&[("dev_a", &["action_main"], "OFF")], None).await;

        let evt = MsgEvent::new("ezd/etc", b"not json".to_vec());
        rig.dispatcher.handle_msg(&evt).await;
        assert!(rig.link.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_failure_clears_guard() {
        // No sims behind this rig: every set times out.
        let link = MockLink::new();
        let router = Arc::new(MsgRouter::new(Arc::clone(&link)));
        router.listen();
        let defs = vec![DeviceDef::new("dev_a", &["action_main"])];
        let cache = Arc::new(
            DeviceStateCache::init(
                Arc::clone(&router),
                TopicScheme::default(),
                &["dev_a".to_string()],
            )
            .await
            .unwrap(),
        );
        let config = MaisonConfig::default();
        let ctrl = Arc::new(BinaryStateCtrl::new(
            Arc::clone(&router),
            cache,
            config.topics.clone(),
            config.timing,
        ));
        let dispatcher = MaisonCtrl::new(ctrl, &config, &defs);

        dispatcher.dispatch(MaisonAction::Up).await;
        // The failed run released its guard, so the action can fire again.
        assert!(dispatcher.in_progress.lock().is_empty());
    }
}
