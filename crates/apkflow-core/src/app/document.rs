//! ResultDocument - 画面ごとの部分結果ドキュメント
//!
//! Serialized body of `POST /results/{job}`:
//!
//! ```json
//! {"ui-states": [
//!   {"activity-name": "LoginActivity", "structure-id": "…", "base-image": "http://…",
//!    "xbot": {"image": "http://…", "description": "…"},
//!    "owleye": {"image": "http://…"}}
//! ]}
//! ```
//!
//! # 不変条件
//! - エントリは挿入順で、削除されない
//! - サブ結果の書き込みは同じタスクのキーだけを置き換える

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::domain::{ScreenIdentity, TaskKind};
use crate::ports::BlobRef;

/// One task's contribution to a screen, with every artifact uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SubResult {
    Accessibility {
        image: BlobRef,
        description: String,
    },
    Display {
        image: BlobRef,
    },
    Tappability {
        image: BlobRef,
        description: String,
        heatmaps: Vec<BlobRef>,
    },
    Utg {
        utg: BlobRef,
        trace: BlobRef,
    },
}

impl SubResult {
    pub fn task(&self) -> TaskKind {
        match self {
            SubResult::Accessibility { .. } => TaskKind::Accessibility,
            SubResult::Display { .. } => TaskKind::DisplayIssue,
            SubResult::Tappability { .. } => TaskKind::Tappability,
            SubResult::Utg { .. } => TaskKind::UsageTrace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiState {
    #[serde(rename = "activity-name")]
    pub activity_name: String,
    #[serde(rename = "structure-id")]
    pub structure_id: String,
    #[serde(rename = "base-image")]
    pub base_image: BlobRef,
    /// Keyed by the producing task's wire name.
    #[serde(flatten)]
    pub results: BTreeMap<String, SubResult>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultDocument {
    #[serde(rename = "ui-states")]
    entries: Vec<UiState>,
    #[serde(skip)]
    index: HashMap<ScreenIdentity, usize>,
}

impl ResultDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &ScreenIdentity) -> bool {
        self.index.contains_key(id)
    }

    /// Add an entry for `id` unless one exists. Returns whether it was added.
    pub fn insert_entry(&mut self, id: &ScreenIdentity, base_image: BlobRef) -> bool {
        if self.contains(id) {
            return false;
        }
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push(UiState {
            activity_name: id.screen.clone(),
            structure_id: id.structure_id.clone(),
            base_image,
            results: BTreeMap::new(),
        });
        true
    }

    /// Set the sub-result of `result.task()` on the entry for `id`,
    /// replacing an earlier one from the same task. `false` when there is no
    /// such entry.
    pub fn merge(&mut self, id: &ScreenIdentity, result: SubResult) -> bool {
        let Some(&at) = self.index.get(id) else {
            return false;
        };
        let key = result.task().wire_name().to_string();
        self.entries[at].results.insert(key, result);
        true
    }

    pub fn entry(&self, id: &ScreenIdentity) -> Option<&UiState> {
        self.index.get(id).map(|&at| &self.entries[at])
    }

    pub fn entries(&self) -> &[UiState] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn login() -> ScreenIdentity {
        ScreenIdentity::new("LoginActivity", "struct-1")
    }

    #[test]
    fn serializes_with_hyphenated_keys_and_task_names() {
        let mut doc = ResultDocument::new();
        doc.insert_entry(&login(), BlobRef::new("http://s3/base.png"));
        doc.merge(
            &login(),
            SubResult::Accessibility {
                image: BlobRef::new("http://s3/issue.png"),
                description: "missing label".to_string(),
            },
        );
        doc.merge(
            &login(),
            SubResult::Display {
                image: BlobRef::new("http://s3/display.png"),
            },
        );

        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({"ui-states": [{
                "activity-name": "LoginActivity",
                "structure-id": "struct-1",
                "base-image": "http://s3/base.png",
                "xbot": {"image": "http://s3/issue.png", "description": "missing label"},
                "owleye": {"image": "http://s3/display.png"}
            }]})
        );
    }

    #[test]
    fn entries_keep_insertion_order_and_are_never_replaced() {
        let mut doc = ResultDocument::new();
        let other = ScreenIdentity::new("Main", "x");
        assert!(doc.insert_entry(&other, BlobRef::new("a")));
        assert!(doc.insert_entry(&login(), BlobRef::new("b")));
        assert!(!doc.insert_entry(&other, BlobRef::new("c")));

        let names: Vec<&str> = doc.entries().iter().map(|e| e.activity_name.as_str()).collect();
        assert_eq!(names, vec!["Main", "LoginActivity"]);
        assert_eq!(doc.entry(&other).unwrap().base_image, BlobRef::new("a"));
    }

    #[test]
    fn same_task_overwrites_only_its_own_key() {
        let mut doc = ResultDocument::new();
        doc.insert_entry(&login(), BlobRef::new("base"));
        doc.merge(&login(), SubResult::Display { image: BlobRef::new("old") });
        doc.merge(
            &login(),
            SubResult::Utg {
                utg: BlobRef::new("utg"),
                trace: BlobRef::new("trace"),
            },
        );
        doc.merge(&login(), SubResult::Display { image: BlobRef::new("new") });

        let entry = doc.entry(&login()).unwrap();
        assert_eq!(entry.results.len(), 2);
        assert_eq!(entry.results["owleye"], SubResult::Display { image: BlobRef::new("new") });
    }

    #[test]
    fn merge_without_entry_is_refused() {
        let mut doc = ResultDocument::new();
        assert!(!doc.merge(&login(), SubResult::Display { image: BlobRef::new("x") }));
        assert!(doc.is_empty());
    }
}
