//! Framebuffer to display-slot mapping
//!
//! ```text
//!   framebuffers (arena, MAX_FB)          displays (index, MAX_DISPLAY)
//!   ┌────┬───────────┬─────────┐          ┌────┬────────────┐
//!   │ fb │ connected │ display │          │ id │ framebuffer│
//!   ├────┼───────────┼─────────┤          ├────┼────────────┤
//!   │ 0  │ yes       │ 0       │ ◄──────► │ 0  │ 0          │
//!   │ 1  │ no        │ -       │          │ 1  │ 3          │
//!   │ 3  │ yes       │ 1       │ ◄──────► │ 2  │ -          │
//!   └────┴───────────┴─────────┘          └────┴────────────┘
//! ```
//!
//! Both directions are updated together so a framebuffer maps to at most
//! one display slot and vice versa. Framebuffer 0 is the primary display;
//! it counts towards `connect_count` but not towards [`SlotMap::pluggable_count`].

use serde::Serialize;

use super::errors::DomainError;

/// Outcome of a connect or disconnect callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    /// Nothing changed (duplicate connect, or disconnect of an idle fb)
    Unchanged,
    /// The framebuffer became connected, mapped to the given slot if one was free
    Attached(Option<usize>),
    /// The framebuffer was disconnected and its slot, if any, released
    Detached(Option<usize>),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
struct FramebufferEntry {
    connected: bool,
    display: Option<usize>,
}

/// Bidirectional framebuffer ↔ display slot map
#[derive(Debug, Clone, Serialize)]
pub struct SlotMap {
    framebuffers: Vec<FramebufferEntry>,
    displays: Vec<Option<usize>>,
    connect_count: usize,
}

impl SlotMap {
    /// Creates an empty map with fixed capacities
    pub fn new(max_framebuffers: usize, max_displays: usize) -> Self {
        Self {
            framebuffers: vec![FramebufferEntry::default(); max_framebuffers],
            displays: vec![None; max_displays],
            connect_count: 0,
        }
    }

    fn check_fb(&self, fb: usize) -> Result<(), DomainError> {
        if fb >= self.framebuffers.len() {
            return Err(DomainError::FramebufferOutOfRange {
                fb,
                max: self.framebuffers.len(),
            });
        }
        Ok(())
    }

    fn check_slot(&self, slot: usize) -> Result<(), DomainError> {
        if slot >= self.displays.len() {
            return Err(DomainError::DisplayOutOfRange {
                slot,
                max: self.displays.len(),
            });
        }
        Ok(())
    }

    /// Marks `fb` connected and maps it to the first free display slot
    pub fn connect(&mut self, fb: usize) -> Result<SlotChange, DomainError> {
        self.check_fb(fb)?;
        if self.framebuffers[fb].connected {
            return Ok(SlotChange::Unchanged);
        }

        let slot = self.displays.iter().position(Option::is_none);
        if let Some(slot) = slot {
            self.displays[slot] = Some(fb);
        }
        self.framebuffers[fb] = FramebufferEntry {
            connected: true,
            display: slot,
        };
        self.connect_count += 1;
        Ok(SlotChange::Attached(slot))
    }

    /// Releases `fb` and its display slot; no-op unless it is connected
    pub fn disconnect(&mut self, fb: usize) -> Result<SlotChange, DomainError> {
        self.check_fb(fb)?;
        let entry = self.framebuffers[fb];
        if !entry.connected {
            return Ok(SlotChange::Unchanged);
        }

        if let Some(slot) = entry.display {
            self.displays[slot] = None;
        }
        self.framebuffers[fb] = FramebufferEntry::default();
        self.connect_count -= 1;
        Ok(SlotChange::Detached(entry.display))
    }

    pub fn is_connected(&self, fb: usize) -> Result<bool, DomainError> {
        self.check_fb(fb)?;
        Ok(self.framebuffers[fb].connected)
    }

    /// Display slot mapped to `fb`
    pub fn display_for(&self, fb: usize) -> Result<Option<usize>, DomainError> {
        self.check_fb(fb)?;
        Ok(self.framebuffers[fb].display)
    }

    /// Framebuffer mapped to display `slot`
    pub fn framebuffer_for(&self, slot: usize) -> Result<Option<usize>, DomainError> {
        self.check_slot(slot)?;
        Ok(self.displays[slot])
    }

    /// Number of connected framebuffers, primary included
    pub fn connect_count(&self) -> usize {
        self.connect_count
    }

    /// Connected framebuffers excluding the primary one
    ///
    /// Signed because the primary may not have reported yet.
    pub fn pluggable_count(&self) -> i64 {
        self.connect_count as i64 - 1
    }

    /// Number of display slots
    pub fn max_displays(&self) -> usize {
        self.displays.len()
    }
}
