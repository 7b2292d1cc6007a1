// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Schema registry: the set of tools this server advertises.

use std::collections::HashMap;

use thiserror::Error;

use super::schema::InputSchema;
use super::types::Tool;

/// Immutable description of one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: InputSchema,
}

impl ToolDescriptor {
    /// Creates a descriptor.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// The unique tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The argument contract.
    #[must_use]
    pub const fn input_schema(&self) -> &InputSchema {
        &self.input_schema
    }

    /// Wire form for `tools/list`.
    #[must_use]
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            input_schema: self.input_schema.to_json(),
        }
    }
}

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("tool '{0}' is already registered")]
    DuplicateName(String),
}

/// Tool descriptors in registration order, indexed by name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken; the
    /// registry is left unchanged.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if self.index.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicateName(descriptor.name().to_string()));
        }
        self.index
            .insert(descriptor.name().to_string(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    /// All descriptors in registration order.
    #[must_use]
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Finds a descriptor by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).and_then(|&i| self.tools.get(i))
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
