/// Validation and repair machinery over a loaded world document.
pub mod canon;
pub mod content;
pub mod normalize;
pub mod pipeline;
pub mod repair;
pub mod report;
pub mod rules;
pub mod store;
pub mod template;
pub mod validate;
