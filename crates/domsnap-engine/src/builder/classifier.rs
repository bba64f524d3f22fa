//! Interactivity classifier: decides whether a visible, unobscured element is interactive.

use std::collections::BTreeMap;

/// Cursors that signal the element reacts to the pointer.
pub const INTERACTIVE_CURSORS: &[&str] = &[
    "pointer",
    "move",
    "text",
    "grab",
    "grabbing",
    "cell",
    "copy",
    "alias",
    "all-scroll",
    "col-resize",
    "context-menu",
    "crosshair",
    "e-resize",
    "ew-resize",
    "help",
    "n-resize",
    "ne-resize",
    "nesw-resize",
    "ns-resize",
    "nw-resize",
    "nwse-resize",
    "row-resize",
    "s-resize",
    "se-resize",
    "sw-resize",
    "vertical-text",
    "w-resize",
    "zoom-in",
    "zoom-out",
];

/// Cursors that veto an otherwise interactive tag.
pub const NON_INTERACTIVE_CURSORS: &[&str] = &["not-allowed", "no-drop", "wait", "progress"];

/// Canonical interactive tags.
pub const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "details", "summary", "label", "option",
    "optgroup", "fieldset", "legend",
];

/// Roles that make an element interactive.
pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "menuitemradio",
    "menuitemcheckbox",
    "radio",
    "checkbox",
    "tab",
    "switch",
    "slider",
    "spinbutton",
    "combobox",
    "searchbox",
    "textbox",
    "option",
    "scrollbar",
];

/// Tags that stay indexed even when nested in another indexed element.
pub const DISTINCT_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "summary", "details", "label", "option",
];

/// Roles that stay indexed even when nested in another indexed element.
pub const DISTINCT_ROLES: &[&str] = &[
    "button",
    "link",
    "menuitem",
    "menuitemradio",
    "menuitemcheckbox",
    "radio",
    "checkbox",
    "tab",
    "switch",
    "slider",
    "spinbutton",
    "combobox",
    "searchbox",
    "textbox",
    "listbox",
    "option",
    "scrollbar",
];

/// Listener types that count as user interaction.
pub const INTERACTION_EVENTS: &[&str] = &[
    "click", "mousedown", "mouseup", "dblclick", "keydown", "keyup", "submit", "change", "input",
    "focus", "blur",
];

const MOUSE_HANDLER_ATTRS: &[&str] = &["onclick", "onmousedown", "onmouseup", "ondblclick"];

const EVENT_HANDLER_ATTRS: &[&str] = &[
    "onclick",
    "onmousedown",
    "onmouseup",
    "onkeydown",
    "onkeyup",
    "onsubmit",
    "onchange",
    "oninput",
    "onfocus",
    "onblur",
];

const TEST_ATTRS: &[&str] = &["data-testid", "data-cy", "data-test"];

const DISABLING_ATTRS: &[&str] = &["disabled", "readonly", "inert"];

const ITEM_CLASS_WORDS: &[&str] = &["btn", "clickable", "menu", "item", "entry", "link"];

const CONTAINER_CLASSES: &[&str] = &["menu", "dropdown", "list", "toolbar"];

/// Why an element was or was not classified as interactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interactivity {
    Disabled,
    Cursor,
    NativeTag,
    BlockedCursor,
    ContentEditable,
    WidgetHint,
    Role,
    EventListener,
    InlineHandler,
    NotInteractive,
}

impl Interactivity {
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            Interactivity::Cursor
                | Interactivity::NativeTag
                | Interactivity::ContentEditable
                | Interactivity::WidgetHint
                | Interactivity::Role
                | Interactivity::EventListener
                | Interactivity::InlineHandler
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Interactivity::Disabled => "disabled",
            Interactivity::Cursor => "interactive_cursor",
            Interactivity::NativeTag => "native_tag",
            Interactivity::BlockedCursor => "blocked_cursor",
            Interactivity::ContentEditable => "contenteditable",
            Interactivity::WidgetHint => "widget_hint",
            Interactivity::Role => "aria_role",
            Interactivity::EventListener => "event_listener",
            Interactivity::InlineHandler => "inline_handler",
            Interactivity::NotInteractive => "none",
        }
    }
}

/// What the classifier needs to know about one element.
#[derive(Debug, Clone, Copy)]
pub struct ElementFacts<'a> {
    pub tag: &'a str,
    pub attributes: &'a BTreeMap<String, String>,
    pub cursor: &'a str,
    /// Own `contenteditable` or inherited from an editable ancestor.
    pub is_content_editable: bool,
    /// `None` when the host cannot introspect listeners.
    pub has_listeners: Option<bool>,
}

impl<'a> ElementFacts<'a> {
    fn attr(&self, name: &str) -> Option<&'a str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// Run the interactivity heuristic in priority order.
pub fn classify(facts: &ElementFacts<'_>) -> Interactivity {
    if DISABLING_ATTRS.iter().any(|attr| facts.has_attr(attr)) {
        return Interactivity::Disabled;
    }

    if facts.tag != "html" && INTERACTIVE_CURSORS.contains(&facts.cursor) {
        return Interactivity::Cursor;
    }

    if INTERACTIVE_TAGS.contains(&facts.tag) {
        if NON_INTERACTIVE_CURSORS.contains(&facts.cursor) {
            return Interactivity::BlockedCursor;
        }
        return Interactivity::NativeTag;
    }

    if facts.is_content_editable || is_content_editable_attr(facts.attributes) {
        return Interactivity::ContentEditable;
    }

    if has_widget_hint(facts.attributes) {
        return Interactivity::WidgetHint;
    }

    let has_role = |name: &str| {
        facts
            .attr(name)
            .is_some_and(|role| INTERACTIVE_ROLES.contains(&role))
    };
    if has_role("role") || has_role("aria-role") {
        return Interactivity::Role;
    }

    if facts.has_listeners == Some(true) {
        return Interactivity::EventListener;
    }

    if MOUSE_HANDLER_ATTRS.iter().any(|attr| facts.has_attr(attr)) {
        return Interactivity::InlineHandler;
    }

    Interactivity::NotInteractive
}

/// `contenteditable` set to a value that turns editing on.
pub fn is_content_editable_attr(attributes: &BTreeMap<String, String>) -> bool {
    attributes
        .get("contenteditable")
        .is_some_and(|v| matches!(v.as_str(), "" | "true" | "plaintext-only"))
}

/// Editor roots whose whole subtree keeps its own highlight state.
pub fn is_editor_root(tag: &str, attributes: &BTreeMap<String, String>) -> bool {
    is_content_editable_attr(attributes)
        || attributes.get("id").is_some_and(|id| id == "tinymce")
        || has_class(attributes, "mce-content-body")
        || (tag == "body"
            && attributes
                .get("data-id")
                .is_some_and(|id| id.starts_with("mce_")))
}

fn has_widget_hint(attributes: &BTreeMap<String, String>) -> bool {
    has_class(attributes, "button")
        || has_class(attributes, "dropdown-toggle")
        || attributes.get("data-index").is_some_and(|v| !v.is_empty())
        || attributes.get("data-toggle").is_some_and(|v| v == "dropdown")
        || attributes.get("aria-haspopup").is_some_and(|v| v == "true")
}

/// Whether the whitespace-separated class list contains `class`.
pub fn has_class(attributes: &BTreeMap<String, String>, class: &str) -> bool {
    attributes
        .get("class")
        .is_some_and(|list| list.split_whitespace().any(|c| c == class))
}

/// Distinct interaction decided from recorded attributes only.
///
/// This is what survives into a snapshot, so the constructor uses it to
/// decide whether a nested indexed element keeps its index.
pub fn is_distinct_by_attributes(tag: &str, attributes: &BTreeMap<String, String>) -> bool {
    if tag == "iframe" || DISTINCT_TAGS.contains(&tag) {
        return true;
    }
    if attributes
        .get("role")
        .is_some_and(|role| DISTINCT_ROLES.contains(&role.as_str()))
    {
        return true;
    }
    if is_content_editable_attr(attributes) {
        return true;
    }
    if TEST_ATTRS.iter().any(|attr| attributes.contains_key(*attr)) {
        return true;
    }
    EVENT_HANDLER_ATTRS
        .iter()
        .any(|attr| attributes.contains_key(*attr))
}

/// Distinct interaction during the walk, where live facts are available.
///
/// `composite` is the result of [`is_composite_candidate`] combined with the
/// builder's structural checks.
pub fn is_distinct_interaction(facts: &ElementFacts<'_>, composite: bool) -> bool {
    is_distinct_by_attributes(facts.tag, facts.attributes)
        || facts.is_content_editable
        || facts.has_listeners == Some(true)
        || composite
}

/// First half of the composite-item heuristic: the element looks like an item.
pub fn is_composite_candidate(facts: &ElementFacts<'_>, is_interactive: bool) -> bool {
    is_interactive
        || facts.has_attr("role")
        || facts.has_attr("tabindex")
        || facts.has_attr("onclick")
        || has_item_class(facts.attributes)
}

fn has_item_class(attributes: &BTreeMap<String, String>) -> bool {
    let Some(list) = attributes.get("class") else {
        return false;
    };
    list.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| {
            ITEM_CLASS_WORDS
                .iter()
                .any(|candidate| word.eq_ignore_ascii_case(candidate))
        })
}

/// Element that makes its subtree a known item container.
pub fn is_known_container(tag: &str, attributes: &BTreeMap<String, String>) -> bool {
    tag == "button"
        || tag == "a"
        || attributes.get("role").is_some_and(|role| role == "button")
        || CONTAINER_CLASSES
            .iter()
            .any(|class| has_class(attributes, class))
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
