//! Marker classes, id prefixes and hidden field names shared with the server
//! renderer.

pub const FORM: &str = "xforms-form";
pub const CONTROL: &str = "xforms-control";
pub const INCREMENTAL: &str = "xforms-incremental";
pub const DEFERRED_BOUNDARY: &str = "xforms-events-deferred";

pub const DISABLED: &str = "xforms-disabled";
pub const READONLY: &str = "xforms-readonly";
pub const REQUIRED: &str = "xforms-required";
pub const REQUIRED_EMPTY: &str = "xforms-required-empty";
pub const REQUIRED_FILLED: &str = "xforms-required-filled";
pub const INVALID: &str = "xforms-invalid";
pub const STATIC: &str = "xforms-static";
pub const STATIC_FIELD: &str = "xforms-field";
pub const STATIC_HIDDEN: &str = "xforms-static-hidden";

pub const LABEL: &str = "xforms-label";
pub const HINT: &str = "xforms-hint";
pub const HELP: &str = "xforms-help";
pub const ALERT: &str = "xforms-alert";
pub const ALERT_ACTIVE: &str = "xforms-alert-active";
pub const ALERT_INACTIVE: &str = "xforms-alert-inactive";

pub const REPEAT_TEMPLATE: &str = "xforms-repeat-template";
pub const REPEAT_DELIMITER: &str = "xforms-repeat-delimiter";
pub const REPEAT_BEGIN_END: &str = "xforms-repeat-begin-end";
pub const REPEAT_BEGIN_PREFIX: &str = "repeat-begin-";
pub const REPEAT_END_PREFIX: &str = "repeat-end-";
pub const REPEAT_SELECTED_PREFIX: &str = "xforms-repeat-selected-item-";

pub const GROUP_BEGIN_PREFIX: &str = "group-begin-";
pub const GROUP_END_PREFIX: &str = "group-end-";
pub const GROUP_BEGIN_END: &str = "xforms-group-begin-end";

pub const CASE_BEGIN_PREFIX: &str = "xforms-case-begin-";
pub const CASE_END_PREFIX: &str = "xforms-case-end-";
pub const CASE_SELECTED: &str = "xforms-case-selected";
pub const CASE_DESELECTED: &str = "xforms-case-deselected";

pub const DIALOG: &str = "xforms-dialog";

pub const TREE_ITEM: &str = "xforms-tree-item";
pub const TREE_SELECTED: &str = "xforms-tree-selected";
pub const TREE_EXPANDED: &str = "xforms-tree-expanded";
pub const ITEM: &str = "xforms-item";
pub const OUTPUT_VALUE: &str = "xforms-output-output";
pub const HTML_AREA: &str = "xforms-mediatype-text-html";

pub const STATIC_STATE_FIELD: &str = "$static-state";
pub const DYNAMIC_STATE_FIELD: &str = "$dynamic-state";
pub const REPEAT_TREE_FIELD: &str = "$repeat-tree";
pub const REPEAT_INDEXES_FIELD: &str = "$repeat-indexes";

/// Classes of the elements that accompany a control and are not part of its
/// interactive representation.
pub const DECORATIONS: &[&str] = &[LABEL, HINT, HELP, ALERT];
