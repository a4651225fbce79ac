//! JSON scene descriptions for the in-memory host

use super::memory::{Behavior, MemoryHost};
use crate::error::{Error, ErrorCode, Result};
use crate::node::{Capability, NodeId};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Scene-local ids (`"id"` fields) mapped to live node handles.
pub type SceneIds = HashMap<String, NodeId>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub roots: Vec<SceneNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneNode {
    /// Handle for `on_activate` targets; independent of the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub tag: String,
    #[serde(default)]
    pub capability: Capability,
    #[serde(default = "visible_default")]
    pub visible: bool,
    #[serde(default = "visible_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_activate: Option<SceneBehavior>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SceneNode>,
}

fn visible_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneBehavior {
    OpenModal { target: String },
    OpenPopup { target: String },
    CloseModal,
}

impl Scene {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::new(ErrorCode::Unknown, format!("Invalid scene: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }
}

impl MemoryHost {
    /// Build a host from a scene. Behavior targets are resolved after the
    /// whole tree exists, so they may point anywhere in the scene.
    pub fn from_scene(scene: &Scene) -> Result<(Self, SceneIds)> {
        let host = MemoryHost::new();
        let mut ids = SceneIds::new();
        let mut pending = Vec::new();
        for root in &scene.roots {
            host.build(None, root, &mut ids, &mut pending);
        }

        for (node, behavior) in pending {
            let resolve = |target: &str| {
                ids.get(target).copied().ok_or_else(|| {
                    Error::new(
                        ErrorCode::Unknown,
                        format!("Scene behavior targets unknown id `{}`", target),
                    )
                })
            };
            let behavior = match behavior {
                SceneBehavior::OpenModal { target } => Behavior::OpenModal(resolve(&target)?),
                SceneBehavior::OpenPopup { target } => Behavior::OpenPopup(resolve(&target)?),
                SceneBehavior::CloseModal => Behavior::CloseModal,
            };
            host.set_behavior(node, behavior);
        }
        Ok((host, ids))
    }

    fn build(
        &self,
        parent: Option<NodeId>,
        desc: &SceneNode,
        ids: &mut SceneIds,
        pending: &mut Vec<(NodeId, SceneBehavior)>,
    ) {
        let node = self.add_node(parent, &desc.tag, &desc.name, desc.capability);
        self.set_visible(node, desc.visible);
        self.set_enabled(node, desc.enabled);
        for (k, v) in &desc.properties {
            self.init_property(node, k, v.clone());
        }
        if let Some(id) = &desc.id {
            ids.insert(id.clone(), node);
        }
        if let Some(b) = &desc.on_activate {
            pending.push((node, b.clone()));
        }
        for child in &desc.children {
            self.build(Some(node), child, ids, pending);
        }
    }
}
