//! Back-end ownership and fallback resolution

use super::{
    EngineDescriptor, EngineKind, EngineSelection, ReferenceEngine, StretchSettings,
    TimeStretchEngine,
};
#[cfg(feature = "signalsmith")]
use super::SignalsmithEngine;
use crate::config::ChainConfig;
use crate::error::ChainResult;

/// Resolve a request against a descriptor table
///
/// Walks the priority list from `requested` downwards and activates the first
/// available kind. Reference is the last entry and is always available, so
/// a request never resolves to nothing.
pub fn resolve_selection(descriptors: &[EngineDescriptor], requested: EngineKind) -> EngineSelection {
    let is_available = |kind: EngineKind| {
        kind == EngineKind::Reference
            || descriptors.iter().any(|d| d.kind == kind && d.available)
    };

    let active = EngineKind::PRIORITY[requested.priority()..]
        .iter()
        .copied()
        .find(|&kind| is_available(kind))
        .unwrap_or(EngineKind::Reference);

    EngineSelection { requested, active }
}

/// One registry entry; `engine` is `None` for back-ends that were not built
/// or are disabled, so they never allocate
struct EngineSlot {
    descriptor: EngineDescriptor,
    engine: Option<Box<dyn TimeStretchEngine>>,
}

/// Owns every back-end of one chain, in priority order
pub struct EngineRegistry {
    slots: Vec<EngineSlot>,
    descriptors: Vec<EngineDescriptor>,
    selection: EngineSelection,
}

impl EngineRegistry {
    /// Instantiate the available back-ends and resolve the preferred engine
    pub fn new(config: &ChainConfig) -> Self {
        let enabled = |kind: EngineKind| {
            kind == EngineKind::Reference || !config.disabled_engines.contains(&kind)
        };

        let mut slots = Vec::with_capacity(EngineKind::PRIORITY.len());
        for kind in EngineKind::PRIORITY {
            slots.push(Self::build_slot(kind, enabled(kind)));
        }

        let descriptors: Vec<EngineDescriptor> =
            slots.iter().map(|slot| slot.descriptor.clone()).collect();
        let selection = resolve_selection(&descriptors, config.preferred_engine);
        if selection.is_fallback() {
            log::warn!(
                "Preferred engine {} unavailable, using {}",
                selection.requested,
                selection.active
            );
        }

        Self {
            slots,
            descriptors,
            selection,
        }
    }

    #[cfg(feature = "signalsmith")]
    fn build_slot(kind: EngineKind, enabled: bool) -> EngineSlot {
        let engine: Option<Box<dyn TimeStretchEngine>> = match kind {
            EngineKind::Premium if enabled => Some(Box::new(SignalsmithEngine::premium(true))),
            EngineKind::Balanced if enabled => Some(Box::new(SignalsmithEngine::balanced(true))),
            EngineKind::Reference => Some(Box::new(ReferenceEngine::new())),
            _ => None,
        };
        let descriptor = match &engine {
            Some(engine) => engine.descriptor().clone(),
            None => Self::unavailable_descriptor(kind),
        };
        EngineSlot { descriptor, engine }
    }

    #[cfg(not(feature = "signalsmith"))]
    fn build_slot(kind: EngineKind, _enabled: bool) -> EngineSlot {
        match kind {
            EngineKind::Reference => {
                let engine = ReferenceEngine::new();
                EngineSlot {
                    descriptor: engine.descriptor().clone(),
                    engine: Some(Box::new(engine)),
                }
            }
            _ => EngineSlot {
                descriptor: Self::unavailable_descriptor(kind),
                engine: None,
            },
        }
    }

    fn unavailable_descriptor(kind: EngineKind) -> EngineDescriptor {
        let tier = match kind {
            EngineKind::Premium => super::QualityTier::Studio,
            EngineKind::Balanced => super::QualityTier::Standard,
            EngineKind::Reference => super::QualityTier::Basic,
        };
        EngineDescriptor::new(kind, tier, false)
    }

    /// Descriptors of every known back-end, in priority order
    pub fn descriptors(&self) -> &[EngineDescriptor] {
        &self.descriptors
    }

    pub fn selection(&self) -> EngineSelection {
        self.selection
    }

    pub fn active_kind(&self) -> EngineKind {
        self.selection.active
    }

    /// Configure every instantiated back-end
    ///
    /// Fails on the first back-end that rejects the format; an available
    /// engine that cannot run is a configuration error, not a fallback.
    pub fn configure(
        &mut self,
        sample_rate: u32,
        channels: usize,
        max_block_frames: usize,
    ) -> ChainResult<()> {
        for engine in self.slots.iter_mut().filter_map(|slot| slot.engine.as_mut()) {
            engine.configure(sample_rate, channels, max_block_frames)?;
        }
        Ok(())
    }

    /// Apply an already resolved selection and clear every back-end
    pub fn select(&mut self, selection: EngineSelection) {
        self.selection = selection;
        self.clear_all();
    }

    /// Resolve `requested` against this registry
    pub fn resolve(&self, requested: EngineKind) -> EngineSelection {
        resolve_selection(&self.descriptors, requested)
    }

    /// Back-end currently producing audio
    pub fn active_mut(&mut self) -> Option<&mut (dyn TimeStretchEngine + 'static)> {
        let index = self.selection.active.priority();
        self.slots
            .get_mut(index)
            .and_then(|slot| slot.engine.as_deref_mut())
    }

    pub fn active(&self) -> Option<&(dyn TimeStretchEngine + 'static)> {
        let index = self.selection.active.priority();
        self.slots.get(index).and_then(|slot| slot.engine.as_deref())
    }

    /// Hand the same settings to every back-end so a switch needs no resync
    pub fn set_settings(&mut self, settings: StretchSettings) {
        for engine in self.slots.iter_mut().filter_map(|slot| slot.engine.as_mut()) {
            engine.set_settings(settings);
        }
    }

    /// Drop buffered audio in every back-end
    pub fn clear_all(&mut self) {
        for engine in self.slots.iter_mut().filter_map(|slot| slot.engine.as_mut()) {
            engine.clear();
        }
    }

    /// Output frames dropped by all back-ends since they were configured
    pub fn dropped_frames(&self) -> u64 {
        self.slots
            .iter()
            .filter_map(|slot| slot.engine.as_ref())
            .map(|engine| engine.dropped_frames())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestretch::QualityTier;

    fn table(premium: bool, balanced: bool) -> Vec<EngineDescriptor> {
        vec![
            EngineDescriptor::new(EngineKind::Premium, QualityTier::Studio, premium),
            EngineDescriptor::new(EngineKind::Balanced, QualityTier::Standard, balanced),
            EngineDescriptor::new(EngineKind::Reference, QualityTier::Basic, true),
        ]
    }

    #[test]
    fn test_available_request_is_honored() {
        let selection = resolve_selection(&table(true, true), EngineKind::Premium);
        assert_eq!(selection.active, EngineKind::Premium);
        assert!(!selection.is_fallback());
    }

    #[test]
    fn test_fallback_walks_priority_list() {
        let selection = resolve_selection(&table(false, true), EngineKind::Premium);
        assert_eq!(selection.requested, EngineKind::Premium);
        assert_eq!(selection.active, EngineKind::Balanced);
        assert!(selection.is_fallback());

        let selection = resolve_selection(&table(false, false), EngineKind::Premium);
        assert_eq!(selection.active, EngineKind::Reference);
    }

    #[test]
    fn test_fallback_never_moves_up() {
        let selection = resolve_selection(&table(true, false), EngineKind::Balanced);
        assert_eq!(selection.active, EngineKind::Reference);
    }

    #[test]
    fn test_reference_always_resolves() {
        let selection = resolve_selection(&[], EngineKind::Reference);
        assert_eq!(selection.active, EngineKind::Reference);
    }

    #[test]
    fn test_disabled_engines_are_not_instantiated() {
        let config = ChainConfig {
            disabled_engines: vec![EngineKind::Premium, EngineKind::Balanced],
            ..Default::default()
        };
        let mut registry = EngineRegistry::new(&config);

        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 3);
        assert!(!descriptors[0].available);
        assert!(!descriptors[1].available);
        assert!(descriptors[2].available);

        let selection = registry.selection();
        assert_eq!(selection.active, EngineKind::Reference);
        assert!(selection.is_fallback());

        registry.configure(44100, 2, 512).unwrap();
        assert_eq!(
            registry.active().map(|e| e.descriptor().kind),
            Some(EngineKind::Reference)
        );
    }

    #[test]
    fn test_select_clears_every_engine() {
        let config = ChainConfig {
            preferred_engine: EngineKind::Reference,
            ..Default::default()
        };
        let mut registry = EngineRegistry::new(&config);
        registry.configure(44100, 2, 512).unwrap();

        if let Some(engine) = registry.active_mut() {
            engine.push(&[0.5; 256]);
        }
        assert!(registry.active().map_or(0, |e| e.available_frames()) > 0);

        let selection = registry.resolve(EngineKind::Reference);
        registry.select(selection);
        assert_eq!(registry.active().map_or(0, |e| e.available_frames()), 0);
    }

    #[cfg(feature = "signalsmith")]
    #[test]
    fn test_premium_available_with_signalsmith() {
        let registry = EngineRegistry::new(&ChainConfig::default());
        assert!(registry.descriptors()[0].available);
        assert_eq!(registry.active_kind(), EngineKind::Premium);
    }

    #[cfg(not(feature = "signalsmith"))]
    #[test]
    fn test_premium_falls_back_without_signalsmith() {
        let registry = EngineRegistry::new(&ChainConfig::default());
        assert_eq!(registry.active_kind(), EngineKind::Reference);
        assert!(registry.selection().is_fallback());
    }
}
