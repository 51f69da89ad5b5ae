//! Streaming tool-call accumulation.
//!
//! Providers stream tool calls as index-keyed fragments: the id usually
//! arrives once, while name and argument pieces arrive in order and must be
//! concatenated. The accumulator collects them until the stream ends and
//! [`finalize`](ToolCallAccumulator::finalize) turns them into requests.

use std::collections::BTreeMap;

use steward_core::message::ToolCallRequest;
use steward_core::provider::ToolCallDelta;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Default, Clone)]
pub struct ToolCallAccumulator {
    parts: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, delta: &ToolCallDelta) {
        let part = self.parts.entry(delta.index).or_default();
        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            part.id = id.to_string();
        }
        if let Some(name) = &delta.name {
            part.name.push_str(name);
        }
        if let Some(arguments) = &delta.arguments {
            part.arguments.push_str(arguments);
        }
    }

    pub fn extend<'a, I>(&mut self, deltas: I)
    where
        I: IntoIterator<Item = &'a ToolCallDelta>,
    {
        for delta in deltas {
            self.update(delta);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Calls in index order. Fragments without a name are dropped; a
    /// missing id is generated.
    pub fn finalize(self) -> Vec<ToolCallRequest> {
        self.parts
            .into_values()
            .filter(|part| !part.name.trim().is_empty())
            .map(|part| {
                let id = if part.id.is_empty() {
                    format!("call_{}", Uuid::new_v4().simple())
                } else {
                    part.id
                };
                ToolCallRequest::new(id, part.name, part.arguments)
            })
            .collect()
    }
}
