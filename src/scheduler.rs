//! Update scheduling: interaction debounce plus fixed-interval polling.
//!
//! `signal_changes` (re)starts an interaction countdown. While it runs, updates
//! are interactive (cheap, partial). When it expires a single full update is
//! queued. Independently, a poll timer decides when it is time to recompute at
//! all, so continuous dragging never produces an update per frame.

use std::collections::HashSet;

use crate::config::TerrainConfig;
use crate::layer::LayerId;

#[derive(Debug)]
pub struct UpdateScheduler {
    interaction_threshold: f32,
    update_interval: f32,
    interaction_remaining: f32,
    interacting: bool,
    full_update_queued: bool,
    poll_elapsed: f32,
    /// Layers skipped during interactive passes, reprocessed by the next full update
    redirty: HashSet<LayerId>,
}

impl UpdateScheduler {
    /// Timings come from the config, clamped to their minimums.
    pub fn from_config(config: &TerrainConfig) -> Self {
        Self {
            interaction_threshold: config.effective_interaction_threshold(),
            update_interval: config.effective_update_interval(),
            interaction_remaining: 0.0,
            interacting: false,
            full_update_queued: false,
            poll_elapsed: 0.0,
            redirty: HashSet::new(),
        }
    }

    pub fn interaction_threshold(&self) -> f32 {
        self.interaction_threshold
    }

    pub fn update_interval(&self) -> f32 {
        self.update_interval
    }

    /// An edit happened; extend the interaction window.
    pub fn signal_changes(&mut self) {
        self.interacting = true;
        self.interaction_remaining = self.interaction_threshold;
    }

    /// Advance timers. Returns true when this call queued a full update.
    pub fn process(&mut self, delta: f32) -> bool {
        self.poll_elapsed += delta.max(0.0);

        if !self.interacting {
            return false;
        }
        self.interaction_remaining -= delta.max(0.0);
        if self.interaction_remaining <= 0.0 {
            self.interacting = false;
            self.interaction_remaining = 0.0;
            self.full_update_queued = true;
            log::debug!("Interaction settled; full update queued");
            return true;
        }
        false
    }

    /// Poll interval elapsed or a full update is waiting.
    pub fn should_process_update(&self) -> bool {
        self.poll_elapsed >= self.update_interval || self.full_update_queued
    }

    /// Edits still in progress and no full update waiting.
    pub fn is_current_update_interactive(&self) -> bool {
        self.interacting && !self.full_update_queued
    }

    pub fn is_interacting(&self) -> bool {
        self.interacting
    }

    pub fn full_update_queued(&self) -> bool {
        self.full_update_queued
    }

    /// Start an update cycle. Consumes a queued full update and returns whether
    /// the cycle is interactive.
    pub fn begin_update_cycle(&mut self) -> bool {
        let interactive = self.is_current_update_interactive();
        self.full_update_queued = false;
        self.poll_elapsed = 0.0;
        interactive
    }

    /// Finish the cycle and restart the poll timer.
    pub fn complete_update_cycle(&mut self) {
        self.poll_elapsed = 0.0;
    }

    /// Reprocess `id` on the next full update.
    pub fn mark_layer_for_redirty(&mut self, id: LayerId) {
        self.redirty.insert(id);
    }

    pub fn has_redirty_layers(&self) -> bool {
        !self.redirty.is_empty()
    }

    pub fn take_redirty_layers(&mut self) -> HashSet<LayerId> {
        std::mem::take(&mut self.redirty)
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::from_config(&TerrainConfig::default())
    }
}
