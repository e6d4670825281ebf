//! The `Merger` capability: a black-box seam for combining a diverged
//! overlay file and workspace file into one.
//!
//! Grounded on `dk-engine::workspace::conflict::analyze_file_conflict`'s
//! `byte_level_analysis` fallback (diverge-both-sides and differ ⇒
//! conflict, else prefer whichever side changed). The teacher's
//! tree-sitter semantic path has no counterpart here — schmux merges
//! configuration files, not source symbols — so only the production-shaped
//! policy described in SPEC_FULL.md §4.6 (union keys, prefer workspace on
//! conflict, never remove) survives, implemented as `UnionMerger`. The
//! trait leaves room for a future LLM-backed merger, which is explicitly
//! out of scope here.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge succeeded; this is the new content to write to both sides.
    Merged(Vec<u8>),
    /// Could not be reconciled automatically.
    Conflict(String),
}

#[async_trait]
pub trait Merger: Send + Sync {
    async fn merge(&self, overlay_content: &[u8], workspace_content: &[u8]) -> MergeOutcome;
}

/// Structured-JSON union merge: keys present in either side are kept;
/// conflicting scalar values prefer the workspace side; nested objects are
/// merged recursively. Falls back to a byte-level comparison for anything
/// that isn't a JSON object on both sides.
pub struct UnionMerger;

#[async_trait]
impl Merger for UnionMerger {
    async fn merge(&self, overlay_content: &[u8], workspace_content: &[u8]) -> MergeOutcome {
        let overlay_json = serde_json::from_slice::<serde_json::Value>(overlay_content);
        let workspace_json = serde_json::from_slice::<serde_json::Value>(workspace_content);

        match (overlay_json, workspace_json) {
            (Ok(serde_json::Value::Object(overlay_obj)), Ok(serde_json::Value::Object(workspace_obj))) => {
                let merged = union_merge_objects(overlay_obj, workspace_obj);
                match serde_json::to_vec_pretty(&serde_json::Value::Object(merged)) {
                    Ok(bytes) => MergeOutcome::Merged(bytes),
                    Err(e) => MergeOutcome::Conflict(format!("failed to serialize merged JSON: {e}")),
                }
            }
            _ => byte_level_analysis(overlay_content, workspace_content),
        }
    }
}

fn union_merge_objects(
    mut overlay: serde_json::Map<String, serde_json::Value>,
    workspace: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    for (key, workspace_value) in workspace {
        match overlay.get(&key).cloned() {
            Some(serde_json::Value::Object(overlay_nested)) => {
                if let serde_json::Value::Object(workspace_nested) = workspace_value {
                    overlay.insert(
                        key,
                        serde_json::Value::Object(union_merge_objects(overlay_nested, workspace_nested)),
                    );
                } else {
                    // Type mismatch on this key: prefer workspace.
                    overlay.insert(key, workspace_value);
                }
            }
            Some(_) => {
                // Conflicting scalar/array value: prefer workspace.
                overlay.insert(key, workspace_value);
            }
            None => {
                overlay.insert(key, workspace_value);
            }
        }
    }
    overlay
}

/// Two-way byte comparison used when structured merging doesn't apply.
/// Since the compounder only invokes the merger once both sides are known
/// to have diverged from the manifest's recorded hash, identical content
/// here means one side changed to match the other already — not a
/// conflict.
fn byte_level_analysis(overlay_content: &[u8], workspace_content: &[u8]) -> MergeOutcome {
    if overlay_content == workspace_content {
        MergeOutcome::Merged(workspace_content.to_vec())
    } else {
        MergeOutcome::Conflict("non-JSON content diverged on both sides".to_string())
    }
}
