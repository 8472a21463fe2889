//! Pre-computed shader reflection data and the mapping of reflected names to graph resources.
//!
//! Deimos never parses shader bytecode. A reflection step elsewhere produces a [`ShaderReflection`] listing
//! the named bindings of a shader, and a [`BindingTable`] says which resource provides each name. Compiling
//! an operation resolves every reflected name, so a missing binding is reported before anything is recorded.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::graph::connection::GraphView;
use crate::graph::node::ResourceId;
use crate::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Sampler,
    UniformBlock,
    StorageBlock,
    /// Fragment shader output, bound as a color attachment.
    Output,
    InputAttachment,
}

/// One named binding of a shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    pub name: String,
    pub kind: BindingKind,
    pub set: u32,
    pub binding: u32,
    pub array_size: u32,
}

impl ReflectedBinding {
    /// Descriptor type of this binding. Outputs are attachments and have none.
    pub fn descriptor_type(&self) -> Option<vk::DescriptorType> {
        match self.kind {
            BindingKind::Sampler => Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
            BindingKind::UniformBlock => Some(vk::DescriptorType::UNIFORM_BUFFER),
            BindingKind::StorageBlock => Some(vk::DescriptorType::STORAGE_BUFFER),
            BindingKind::InputAttachment => Some(vk::DescriptorType::INPUT_ATTACHMENT),
            BindingKind::Output => None,
        }
    }
}

/// Stores reflection information about a shader or a whole pipeline, in binding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    stages: vk::ShaderStageFlags,
    bindings: Vec<ReflectedBinding>,
}

impl ShaderReflection {
    pub fn new(stage: vk::ShaderStageFlags) -> Self {
        Self {
            stages: stage,
            bindings: Vec::new(),
        }
    }

    pub fn with_binding(mut self, name: impl Into<String>, kind: BindingKind, set: u32, binding: u32, array_size: u32) -> Self {
        self.add(ReflectedBinding {
            name: name.into(),
            kind,
            set,
            binding,
            array_size,
        });
        self
    }

    /// Add a binding. A binding with the same name and kind replaces the existing one.
    pub fn add(&mut self, binding: ReflectedBinding) {
        let existing = self
            .bindings
            .iter()
            .position(|existing| existing.name == binding.name && existing.kind == binding.kind);
        match existing {
            Some(index) => self.bindings[index] = binding,
            None => self.bindings.push(binding),
        }
    }

    /// Combine the reflection of several stages into one.
    pub fn merge(mut self, other: &ShaderReflection) -> Self {
        self.stages |= other.stages;
        for binding in &other.bindings {
            self.add(binding.clone());
        }
        self
    }

    pub fn stages(&self) -> vk::ShaderStageFlags {
        self.stages
    }

    pub fn bindings(&self) -> &[ReflectedBinding] {
        &self.bindings
    }

    pub fn find(&self, name: &str) -> Option<&ReflectedBinding> {
        self.bindings.iter().find(|binding| binding.name == name)
    }

    /// Descriptor set layout bindings of one set, ordered by binding index.
    pub fn set_layout_bindings(&self, set: u32) -> Vec<vk::DescriptorSetLayoutBinding> {
        let mut result = self
            .bindings
            .iter()
            .filter(|binding| binding.set == set)
            .filter_map(|binding| {
                let ty = binding.descriptor_type()?;
                Some(vk::DescriptorSetLayoutBinding {
                    binding: binding.binding,
                    descriptor_type: ty,
                    descriptor_count: binding.array_size,
                    stage_flags: self.stages,
                    p_immutable_samplers: std::ptr::null(),
                })
            })
            .collect::<Vec<_>>();
        result.sort_by_key(|binding| binding.binding);
        result
    }
}

/// A reflected binding and the resource providing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub binding: ReflectedBinding,
    pub resource: ResourceId,
}

/// Maps reflected binding names to the resources that provide them.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: HashMap<String, ResourceId>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, resource: ResourceId) {
        self.bindings.insert(name.into(), resource);
    }

    pub fn with(mut self, name: impl Into<String>, resource: ResourceId) -> Self {
        self.bind(name, resource);
        self
    }

    pub fn get(&self, name: &str) -> Option<ResourceId> {
        self.bindings.get(name).copied()
    }

    /// Resolve every binding of `reflection`, in reflection order.
    /// # Errors
    /// - [`Error::NoResourceBound`] if a reflected name has no resource.
    /// - [`Error::NodeNotFound`] if a bound resource is not part of the graph.
    pub fn resolve(&self, reflection: &ShaderReflection, graph: &GraphView) -> Result<Vec<ResolvedBinding>> {
        reflection
            .bindings()
            .iter()
            .map(|binding| {
                let resource = self
                    .get(&binding.name)
                    .ok_or_else(|| Error::NoResourceBound(binding.name.clone()))?;
                graph.resource(resource)?;
                Ok(ResolvedBinding {
                    binding: binding.clone(),
                    resource,
                })
            })
            .collect()
    }
}
