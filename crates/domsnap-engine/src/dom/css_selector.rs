//! Enhanced CSS selectors derived from a node's xpath and attributes.

use super::dom_node::ElementNode;

/// Attributes stable enough to appear in a selector.
const SAFE_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "type",
    "placeholder",
    "aria-label",
    "aria-labelledby",
    "aria-describedby",
    "role",
    "for",
    "autocomplete",
    "required",
    "readonly",
    "alt",
    "title",
    "src",
    "href",
    "target",
];

/// Test hooks, only used when dynamic attributes are enabled.
const DYNAMIC_ATTRIBUTES: &[&str] = &["data-id", "data-qa", "data-cy", "data-testid"];

/// Convert a simple xpath (`html/body/div[2]/a`) into `html > body > div:nth-of-type(2) > a`.
pub fn xpath_to_css(xpath: &str) -> String {
    let trimmed = xpath.trim_start_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }

    trimmed
        .split('/')
        .filter(|part| !part.is_empty())
        .map(|part| match part.find('[') {
            Some(bracket) => {
                let mut segment = part[..bracket].to_string();
                for predicate in part[bracket..].split(']') {
                    let predicate = predicate.trim_start_matches('[');
                    if predicate.is_empty() {
                        continue;
                    }
                    if let Ok(position) = predicate.parse::<usize>() {
                        segment.push_str(&format!(":nth-of-type({})", position));
                    } else if predicate == "last()" {
                        segment.push_str(":last-of-type");
                    }
                }
                segment
            }
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Selector for an element: structural path, valid classes and safe attributes.
pub fn enhanced_css_selector(element: &ElementNode, include_dynamic_attributes: bool) -> String {
    let mut selector = xpath_to_css(&element.xpath);
    if selector.is_empty() {
        selector = element.tag_name.clone();
    }

    if let Some(classes) = element.attribute("class") {
        for class in classes.split_whitespace() {
            if is_valid_class_name(class) {
                selector.push('.');
                selector.push_str(class);
            }
        }
    }

    for (name, value) in &element.attributes {
        if name == "class" || name.trim().is_empty() {
            continue;
        }
        let allowed = SAFE_ATTRIBUTES.contains(&name.as_str())
            || (include_dynamic_attributes && DYNAMIC_ATTRIBUTES.contains(&name.as_str()));
        if !allowed {
            continue;
        }

        let safe_name = name.replace(':', "\\:");
        if value.is_empty() {
            selector.push_str(&format!("[{}]", safe_name));
        } else if value.chars().any(|c| matches!(c, '"' | '\'' | '<' | '>' | '`' | '\n' | '\r' | '\t')) {
            let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
            let escaped = collapsed.replace('"', "\\\"");
            selector.push_str(&format!("[{}*=\"{}\"]", safe_name, escaped));
        } else {
            selector.push_str(&format!("[{}=\"{}\"]", safe_name, value));
        }
    }

    selector
}

/// `[A-Za-z_][A-Za-z0-9_-]*`
fn is_valid_class_name(class: &str) -> bool {
    let mut chars = class.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
