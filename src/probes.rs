//! Line-indexed instrumentation probe map.
//!
//! A flat multimap from source positions to the probes active there,
//! maintained on behalf of the instrumentation layer. The optimizer only
//! notifies it of probe-relevant positions; nothing in the pipeline reads
//! it back.

use std::collections::HashMap;

/// Handle for a source unit (file or compilation unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Handle for an instrumentation probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeId(pub u32);

/// Multimap from `(source, line)` to active probes.
#[derive(Debug, Default)]
pub struct LineProbeMap {
    probes: HashMap<(SourceId, u32), Vec<ProbeId>>,
}

impl LineProbeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a probe at a source line. Recording the same probe at the
    /// same position twice is a no-op.
    pub fn record_probe(&mut self, source: SourceId, line: u32, probe: ProbeId) {
        let entry = self.probes.entry((source, line)).or_default();
        if !entry.contains(&probe) {
            entry.push(probe);
        }
    }

    /// The probes active at a source line, in recording order.
    #[must_use]
    pub fn probes_at(&self, source: SourceId, line: u32) -> &[ProbeId] {
        self.probes
            .get(&(source, line))
            .map_or(&[], Vec::as_slice)
    }

    /// Drops every probe recorded for a source unit.
    pub fn forget(&mut self, source: SourceId) {
        self.probes.retain(|(unit, _), _| *unit != source);
    }

    /// The number of positions with at least one probe.
    #[must_use]
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Whether no probes are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
