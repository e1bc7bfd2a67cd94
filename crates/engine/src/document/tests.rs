use pretty_assertions::assert_eq;

use super::*;

fn data(fill: f32) -> LayerData {
	LayerData::filled(2, 2, fill)
}

#[test]
fn ids_are_monotonic_and_not_reused_after_remove() {
	let mut doc = Document::new();
	let a = doc.create("a", data(0.0));
	let b = doc.create("b", data(0.0));
	doc.remove(b).unwrap();
	let c = doc.create("c", data(0.0));
	assert_eq!((a, b, c), (LayerId(1), LayerId(2), LayerId(3)));
}

#[test]
fn insert_restores_position_and_advances_counter() {
	let mut doc = Document::new();
	let a = doc.create("a", data(0.0));
	let b = doc.create("b", data(0.0));
	let c = doc.create("c", data(0.0));
	let (pos, layer) = doc.remove(b).unwrap();
	assert_eq!(pos, 1);

	doc.insert(layer, Some(pos)).unwrap();
	assert_eq!(doc.ids(), vec![a, b, c]);

	let far = Layer::new(LayerId(10), "far", data(1.0));
	doc.insert(far, None).unwrap();
	assert_eq!(doc.reserve_id(), LayerId(11));
}

#[test]
fn insert_rejects_duplicate_id() {
	let mut doc = Document::new();
	let a = doc.create("a", data(0.0));
	let dup = Layer::new(a, "dup", data(0.0));
	assert_eq!(doc.insert(dup, None), Err(DocumentError::DuplicateId(a)));
}

#[test]
fn mutations_bump_version_and_generation() {
	let mut doc = Document::new();
	let a = doc.create("a", data(0.0));
	let v0 = doc.version();
	assert_eq!(doc.rename(a, "b").unwrap(), "a");
	let old = doc.replace_data(a, data(2.0)).unwrap();
	assert_eq!(old, data(0.0));
	assert_eq!(doc.version(), v0 + 2);
	assert_eq!(doc.get(a).unwrap().generation, 2);
	assert_eq!(doc.find_by_name("b"), Some(a));
}

#[test]
fn missing_layers_are_errors() {
	let mut doc = Document::new();
	let ghost = LayerId(4);
	assert_eq!(doc.rename(ghost, "x"), Err(DocumentError::Missing(ghost)));
	assert!(doc.remove(ghost).is_err());
	assert!(doc.checkpoint(ghost).is_err());
}

#[test]
fn checkpoint_size_matches_data() {
	let mut doc = Document::new();
	let a = doc.create("a", LayerData::filled(4, 3, 1.0));
	let cp = doc.checkpoint(a).unwrap();
	assert_eq!(cp.byte_size(), 4 * 3 * 4);
	assert_eq!(cp.layer(), a);
}

#[test]
fn layer_export_import() {
	let layer = Layer::new(LayerId(3), "mask", LayerData::from_values(2, 1, vec![0.25, 0.5]).unwrap());
	let text = layer.export_to_string().unwrap();
	assert_eq!(Layer::import_from_string(&text).unwrap(), layer);
}

#[test]
fn from_values_checks_shape() {
	assert_eq!(
		LayerData::from_values(2, 2, vec![0.0; 3]),
		Err(DocumentError::DataShape { expected: 4, found: 3 })
	);
}
