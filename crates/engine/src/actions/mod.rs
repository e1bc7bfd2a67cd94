//! Built-in actions.
//!
//! Registered actions can be rebuilt from their exported text and therefore
//! appear in provenance and scripts. [`RestoreLayer`] and [`RestoreLayerData`]
//! only exist as undo steps: they carry layer data that has no textual form.

mod blur;
mod data;
mod layer;

pub use blur::BlurFilter;
pub use data::{RestoreLayerData, ScaleLayer};
pub use layer::{CreateLayer, DeleteLayer, LayerInfo, RenameLayer, RestoreLayer};

use crate::action::ActionRegistry;

/// Registers every textual built-in action.
pub fn register_builtins(registry: &mut ActionRegistry) {
	registry.register(&layer::CREATE_LAYER, CreateLayer::from_invocation);
	registry.register(&layer::RENAME_LAYER, RenameLayer::from_invocation);
	registry.register(&layer::DELETE_LAYER, DeleteLayer::from_invocation);
	registry.register(&layer::LAYER_INFO, LayerInfo::from_invocation);
	registry.register(&data::SCALE_LAYER, ScaleLayer::from_invocation);
	registry.register(&blur::BLUR, BlurFilter::from_invocation);
}
