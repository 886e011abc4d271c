//! Slot-indexed tables of live resources and samplers
//!
//! At most one resource lives per (type, slot) and at most one sampler per
//! slot. Replacing an entry hands the old one back so the caller can release
//! its backend object.

use crate::error::{ParseError, parse_bail};
use crate::resource::{ResourceDesc, ResourceType, SamplerDesc};
use std::collections::BTreeSet;

/// Maximum number of live resources
pub const MAX_RESOURCES: usize = 32;
/// Maximum number of samplers
pub const MAX_SAMPLERS: usize = 32;

/// A live resource: its description plus the backend object
#[derive(Debug)]
pub struct Resource<H> {
    pub desc: ResourceDesc,
    pub handle: H,
}

/// Live resources, samplers and the slots whose creation failed
#[derive(Debug)]
pub struct Registry<H> {
    resources: Vec<Resource<H>>,
    samplers: Vec<SamplerDesc>,
    failed: BTreeSet<(ResourceType, u32)>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            samplers: Vec::new(),
            failed: BTreeSet::new(),
        }
    }
}

impl<H> Registry<H> {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource, replacing any resource with the same type and slot
    ///
    /// # Returns
    /// The replaced resource, which the caller must destroy
    pub fn insert(&mut self, resource: Resource<H>) -> Result<Option<Resource<H>>, ParseError> {
        let key = (resource.desc.ty, resource.desc.slot);

        if let Some(index) = self.resources.iter().position(|r| (r.desc.ty, r.desc.slot) == key) {
            return Ok(Some(std::mem::replace(&mut self.resources[index], resource)));
        }

        if self.resources.len() >= MAX_RESOURCES {
            parse_bail!("Too many resources; at most {MAX_RESOURCES} may be live.");
        }
        self.resources.push(resource);
        Ok(None)
    }

    /// Looks up a live resource
    pub fn get(&self, ty: ResourceType, slot: u32) -> Option<&Resource<H>> {
        self.resources.iter().find(|r| r.desc.ty == ty && r.desc.slot == slot)
    }

    /// Every live resource in creation order
    pub fn resources(&self) -> &[Resource<H>] {
        &self.resources
    }

    /// Live resources of one type
    pub fn of_type(&self, ty: ResourceType) -> impl Iterator<Item = &Resource<H>> {
        self.resources.iter().filter(move |r| r.desc.ty == ty)
    }

    /// Removes a live resource
    pub fn remove(&mut self, ty: ResourceType, slot: u32) -> Option<Resource<H>> {
        let index = self.resources.iter().position(|r| r.desc.ty == ty && r.desc.slot == slot)?;
        Some(self.resources.remove(index))
    }

    /// Removes every live resource
    pub fn drain(&mut self) -> Vec<Resource<H>> {
        std::mem::take(&mut self.resources)
    }

    /// Records that creating a resource failed
    pub fn mark_failed(&mut self, ty: ResourceType, slot: u32) {
        self.failed.insert((ty, slot));
    }

    /// Forgets an earlier creation failure
    pub fn clear_failed(&mut self, ty: ResourceType, slot: u32) {
        self.failed.remove(&(ty, slot));
    }

    /// Whether creating the resource at this slot last failed
    pub fn is_failed(&self, ty: ResourceType, slot: u32) -> bool {
        self.failed.contains(&(ty, slot))
    }

    /// Whether any resource creation is currently marked failed
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Registers a sampler, replacing any sampler with the same slot
    pub fn set_sampler(&mut self, sampler: SamplerDesc) -> Result<(), ParseError> {
        if let Some(existing) = self.samplers.iter_mut().find(|s| s.slot == sampler.slot) {
            *existing = sampler;
            return Ok(());
        }

        if self.samplers.len() >= MAX_SAMPLERS {
            parse_bail!("Too many samplers; at most {MAX_SAMPLERS} may be defined.");
        }
        self.samplers.push(sampler);
        Ok(())
    }

    /// Every sampler in definition order
    pub fn samplers(&self) -> &[SamplerDesc] {
        &self.samplers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(ty: ResourceType, slot: u32, handle: u32) -> Resource<u32> {
        Resource {
            desc: ResourceDesc::new(ty, slot),
            handle,
        }
    }

    #[test]
    fn test_same_slot_replaces() {
        let mut registry = Registry::new();
        assert!(registry.insert(resource(ResourceType::Texture, 0, 1)).unwrap().is_none());

        let replaced = registry.insert(resource(ResourceType::Texture, 0, 2)).unwrap().unwrap();
        assert_eq!(replaced.handle, 1);
        assert_eq!(registry.resources().len(), 1);
        assert_eq!(registry.get(ResourceType::Texture, 0).unwrap().handle, 2);
    }

    #[test]
    fn test_type_is_part_of_the_key() {
        let mut registry = Registry::new();
        registry.insert(resource(ResourceType::Texture, 0, 1)).unwrap();
        registry.insert(resource(ResourceType::Uav, 0, 2)).unwrap();
        assert_eq!(registry.resources().len(), 2);
        assert_eq!(registry.of_type(ResourceType::Uav).count(), 1);
        assert_eq!(registry.remove(ResourceType::Texture, 0).unwrap().handle, 1);
        assert!(registry.get(ResourceType::Texture, 0).is_none());
    }

    #[test]
    fn test_resource_limit() {
        let mut registry = Registry::new();
        for slot in 0..MAX_RESOURCES as u32 {
            registry.insert(resource(ResourceType::Texture, slot, slot)).unwrap();
        }
        assert!(registry.insert(resource(ResourceType::Texture, 99, 99)).is_err());
        assert!(registry.insert(resource(ResourceType::Texture, 3, 100)).is_ok());
        assert_eq!(registry.drain().len(), MAX_RESOURCES);
    }

    #[test]
    fn test_failure_tracking() {
        let mut registry: Registry<u32> = Registry::new();
        registry.mark_failed(ResourceType::Uav, 2);
        assert!(registry.is_failed(ResourceType::Uav, 2));
        assert!(!registry.is_failed(ResourceType::Texture, 2));
        assert!(registry.has_failures());

        registry.clear_failed(ResourceType::Uav, 2);
        assert!(!registry.has_failures());
    }

    #[test]
    fn test_sampler_replace_by_slot() {
        let mut registry: Registry<u32> = Registry::new();
        registry.set_sampler(SamplerDesc::new(0)).unwrap();

        let mut sampler = SamplerDesc::new(0);
        sampler.filter.min = crate::resource::FilterMode::Linear;
        registry.set_sampler(sampler).unwrap();

        assert_eq!(registry.samplers(), &[sampler]);
    }
}
