//! Trigger Matcher
//!
//! Selects the enabled Skills a host event should dispatch, in dispatch
//! order: priority (high first), then registration order, then name.

use crate::descriptor::{ComponentDescriptor, SkillSpec};
use crate::registry::Snapshot;
use crate::types::Priority;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Event produced by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TriggerEvent {
    FileSaved {
        path: PathBuf,
    },
    Commit {
        #[serde(default)]
        paths: Vec<PathBuf>,
        #[serde(default)]
        message: String,
    },
    ConversationText {
        text: String,
    },
}

impl TriggerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerEvent::FileSaved { .. } => "fileSaved",
            TriggerEvent::Commit { .. } => "commit",
            TriggerEvent::ConversationText { .. } => "conversationText",
        }
    }

    /// Prompt handed to a Skill dispatched for this event
    pub fn describe(&self) -> String {
        match self {
            TriggerEvent::FileSaved { path } => format!("File saved: {}", path.display()),
            TriggerEvent::Commit { paths, message } => {
                let files: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                format!("Commit: {}\nFiles: {}", message, files.join(", "))
            }
            TriggerEvent::ConversationText { text } => text.clone(),
        }
    }
}

/// Matches events against Skill trigger rules.
#[derive(Debug, Clone, Default)]
pub struct TriggerMatcher {
    /// Absolute event paths under this root are matched relative to it
    workspace_root: Option<PathBuf>,
}

impl TriggerMatcher {
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self { workspace_root }
    }

    /// Enabled Skills matching `event`, in dispatch order.
    pub fn match_event(
        &self,
        snapshot: &Snapshot,
        event: &TriggerEvent,
    ) -> Vec<Arc<ComponentDescriptor>> {
        let lowered = match event {
            TriggerEvent::ConversationText { text } => Some(text.to_lowercase()),
            TriggerEvent::Commit { message, .. } => Some(message.to_lowercase()),
            TriggerEvent::FileSaved { .. } => None,
        };

        let mut matched: Vec<Arc<ComponentDescriptor>> = snapshot
            .skills()
            .filter(|d| d.enabled)
            .filter(|d| {
                d.as_skill()
                    .is_some_and(|spec| self.matches(spec, event, lowered.as_deref()))
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| dispatch_key(a).cmp(&dispatch_key(b)));
        matched
    }

    fn matches(&self, spec: &SkillSpec, event: &TriggerEvent, lowered: Option<&str>) -> bool {
        match event {
            TriggerEvent::FileSaved { path } => spec.matches_path(&self.relative(path)),
            TriggerEvent::Commit { paths, .. } => {
                paths.iter().any(|p| spec.matches_path(&self.relative(p)))
                    || lowered.is_some_and(|text| spec.matches_text(text))
            }
            TriggerEvent::ConversationText { .. } => {
                lowered.is_some_and(|text| spec.matches_text(text))
            }
        }
    }

    fn relative(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) => path.strip_prefix(root).unwrap_or(path).to_path_buf(),
            None => path.to_path_buf(),
        }
    }
}

/// Sort key: priority descending, declared order (else load position), name.
fn dispatch_key(descriptor: &ComponentDescriptor) -> (Reverse<Priority>, usize, &str) {
    let (priority, order) = match descriptor.as_skill() {
        Some(spec) => (
            spec.priority,
            spec.order.map(|o| o as usize).unwrap_or(descriptor.registration),
        ),
        None => (Priority::default(), descriptor.registration),
    };
    (Reverse(priority), order, descriptor.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{descriptor_from_str, DescriptorFormat};
    use crate::types::Tier;
    use proptest::prelude::*;

    fn skill(yaml: &str) -> ComponentDescriptor {
        descriptor_from_str(yaml, DescriptorFormat::Yaml, Some(Tier::Skill)).unwrap()
    }

    fn names(matched: &[Arc<ComponentDescriptor>]) -> Vec<&str> {
        matched.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let snapshot = Snapshot::new(
            1,
            vec![skill(
                "name: ts\ndescription: d\nfile_patterns: ['*.ts']\nexclude_patterns: ['*.test.ts']\n",
            )],
        );
        let matcher = TriggerMatcher::default();
        let hit = |p: &str| {
            !matcher
                .match_event(&snapshot, &TriggerEvent::FileSaved { path: p.into() })
                .is_empty()
        };
        assert!(hit("src/app.ts"));
        assert!(!hit("src/foo.test.ts"));
        assert!(!hit("foo.test.ts"));
        assert!(!hit("src/app.rs"));
    }

    #[test]
    fn test_priority_then_registration_then_name() {
        let snapshot = Snapshot::new(
            1,
            vec![
                skill("name: medium-a\ndescription: d\ntrigger_keywords: [review]\n"),
                skill("name: high\ndescription: d\npriority: high\ntrigger_keywords: [review]\n"),
                skill("name: low\ndescription: d\npriority: low\ntrigger_keywords: [review]\n"),
                skill("name: zeta\ndescription: d\norder: 7\ntrigger_keywords: [review]\n"),
                skill("name: alpha\ndescription: d\norder: 7\ntrigger_keywords: [review]\n"),
            ],
        );
        let matched = TriggerMatcher::default().match_event(
            &snapshot,
            &TriggerEvent::ConversationText {
                text: "Please REVIEW this".to_string(),
            },
        );
        assert_eq!(names(&matched), vec!["high", "medium-a", "alpha", "zeta", "low"]);
    }

    #[test]
    fn test_disabled_skills_never_match() {
        let snapshot = Snapshot::new(
            1,
            vec![skill("name: off\ndescription: d\nenabled: false\ntrigger_keywords: [x]\n")],
        );
        let matched = TriggerMatcher::default().match_event(
            &snapshot,
            &TriggerEvent::ConversationText { text: "x".to_string() },
        );
        assert!(matched.is_empty());
    }

    #[test]
    fn test_commit_matches_paths_or_message() {
        let snapshot = Snapshot::new(
            1,
            vec![
                skill("name: rust\ndescription: d\nfile_patterns: ['src/**/*.rs']\n"),
                skill("name: changelog\ndescription: d\ntrigger_keywords: [release]\n"),
            ],
        );
        let matcher = TriggerMatcher::new(Some(PathBuf::from("/ws")));
        let matched = matcher.match_event(
            &snapshot,
            &TriggerEvent::Commit {
                paths: vec![PathBuf::from("/ws/src/lib/mod.rs")],
                message: "Prepare Release".to_string(),
            },
        );
        assert_eq!(names(&matched), vec!["rust", "changelog"]);
    }

    #[test]
    fn test_event_serde_shape() {
        let event: TriggerEvent =
            serde_json::from_str(r#"{"kind":"fileSaved","path":"a.rs"}"#).unwrap();
        assert_eq!(event.kind(), "fileSaved");
        assert_eq!(event.describe(), "File saved: a.rs");
    }

    proptest! {
        #[test]
        fn prop_excluded_test_files_never_dispatch(stem in "[a-z]{1,8}", dir in "[a-z]{1,6}") {
            let snapshot = Snapshot::new(
                1,
                vec![skill("name: ts\ndescription: d\nfile_patterns: ['*.ts']\nexclude_patterns: ['*.test.ts']\n")],
            );
            let path = PathBuf::from(format!("{}/{}.test.ts", dir, stem));
            let matched = TriggerMatcher::default()
                .match_event(&snapshot, &TriggerEvent::FileSaved { path });
            prop_assert!(matched.is_empty());
        }

        #[test]
        fn prop_high_priority_always_first(count in 1usize..6) {
            let mut descriptors: Vec<ComponentDescriptor> = (0..count)
                .map(|i| skill(&format!("name: m{}\ndescription: d\ntrigger_keywords: [go]\n", i)))
                .collect();
            descriptors.push(skill("name: urgent\ndescription: d\npriority: high\ntrigger_keywords: [go]\n"));
            let snapshot = Snapshot::new(1, descriptors);
            let matched = TriggerMatcher::default().match_event(
                &snapshot,
                &TriggerEvent::ConversationText { text: "go".to_string() },
            );
            prop_assert_eq!(matched.len(), count + 1);
            prop_assert_eq!(matched[0].name.as_str(), "urgent");
        }
    }
}
