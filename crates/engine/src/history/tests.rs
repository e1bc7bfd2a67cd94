use chrono::Utc;

use super::*;
use crate::actions::RenameLayer;
use crate::document::LayerId;

fn entry(seq: u64) -> HistoryEntry {
	HistoryEntry {
		seq,
		action: Box::new(RenameLayer::new(LayerId(1), format!("n{seq}"))),
		result: None,
		status: ActionStatus::Success,
		source: ActionSource::Programmatic,
		completed_at: Utc::now(),
	}
}

#[test]
fn never_exceeds_capacity_and_is_most_recent_first() {
	let mut history = ActionHistory::new(3);
	for seq in 1..=5 {
		history.record(entry(seq));
		assert!(history.len() <= 3);
	}
	let seqs: Vec<_> = history.iter().map(|e| e.seq).collect();
	assert_eq!(seqs, vec![5, 4, 3]);
	assert_eq!(history.get(0).map(|e| e.seq), Some(5));
	assert!(history.get(3).is_none());
}

#[test]
fn shrinking_drops_oldest() {
	let mut history = ActionHistory::new(4);
	for seq in 1..=4 {
		history.record(entry(seq));
	}
	history.set_capacity(2);
	assert_eq!(history.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4, 3]);
	history.record(entry(5));
	assert_eq!(history.len(), 2);
}

#[test]
fn entries_keep_the_action_text() {
	let mut history = ActionHistory::new(2);
	history.record(entry(7));
	assert_eq!(history.get(0).map(|e| e.action.export_to_string()), Some("rename_layer #1 n7".to_string()));
}
