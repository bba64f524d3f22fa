use std::collections::{BTreeMap, HashMap};

use super::*;

fn text(text: &str) -> RawNode {
    RawNode::Text(RawTextNode {
        text: text.to_string(),
        is_visible: true,
    })
}

fn element(
    tag: &str,
    xpath: &str,
    attributes: &[(&str, &str)],
    children: Vec<RawId>,
    highlight_index: Option<u32>,
) -> RawNode {
    RawNode::Element(RawElementNode {
        tag_name: tag.to_string(),
        xpath: xpath.to_string(),
        attributes: attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        children,
        is_visible: true,
        is_top_element: true,
        is_interactive: highlight_index.is_some(),
        is_in_viewport: true,
        shadow_root: false,
        is_distinct: false,
        highlight_index,
    })
}

/// body > [text, button#go, div[role=button] > [span > text, a[href] > text]]
fn sample_tree() -> RawDomTree {
    let mut nodes = HashMap::new();
    nodes.insert(0, text("Welcome"));
    nodes.insert(1, element("button", "html/body/button", &[("id", "go")], vec![2], Some(0)));
    nodes.insert(2, text("Go"));
    nodes.insert(
        3,
        element("div", "html/body/div", &[("role", "button")], vec![4, 5], Some(1)),
    );
    nodes.insert(4, element("span", "html/body/div/span", &[], vec![6], Some(2)));
    nodes.insert(
        5,
        element("a", "html/body/div/a", &[("href", "/x")], vec![7], Some(3)),
    );
    nodes.insert(6, text("Inner"));
    nodes.insert(7, text("Link"));
    nodes.insert(9, element("body", "/body", &[], vec![0, 1, 3, 99], None));
    RawDomTree { root_id: 9, nodes }
}

fn meta(url: &str) -> SnapshotMeta {
    SnapshotMeta::new(url, "Sample", ViewportInfo::default())
}

fn include() -> Vec<String> {
    ["id", "role", "href"].iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_construct_wires_parents_and_children() {
    let snapshot = construct(&sample_tree(), meta("https://a.test")).unwrap();
    let root = snapshot.root();
    assert_eq!(snapshot.root_element().unwrap().tag_name, "body");
    // The dangling child id is skipped.
    assert_eq!(snapshot.children(root).len(), 3);
    for child in snapshot.children(root) {
        assert_eq!(snapshot.parent(*child), Some(root));
    }
    assert_eq!(snapshot.len(), 9);
}

#[test]
fn test_construct_prunes_nested_non_distinct_index() {
    let snapshot = construct(&sample_tree(), meta("https://a.test")).unwrap();
    let keys: Vec<u32> = snapshot.selector_map().keys().copied().collect();
    assert_eq!(keys, vec![0, 1, 3]);

    // Tree and map agree: the span lost its index too.
    let spans: Vec<_> = snapshot
        .descendants(snapshot.root())
        .into_iter()
        .filter_map(|i| snapshot.element(i))
        .filter(|el| el.tag_name == "span")
        .collect();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].highlight_index, None);
}

#[test]
fn test_construct_missing_root_fails() {
    let raw = RawDomTree {
        root_id: 5,
        nodes: HashMap::new(),
    };
    assert!(matches!(
        construct(&raw, meta("https://a.test")),
        Err(crate::error::EngineError::BuildFailed(_))
    ));
}

#[test]
fn test_construct_is_deterministic() {
    let raw = sample_tree();
    let a = construct(&raw, meta("https://a.test")).unwrap();
    let b = construct(&raw, meta("https://a.test")).unwrap();
    assert_eq!(a.selector_map(), b.selector_map());
    assert_eq!(serialize(&a, &include()), serialize(&b, &include()));
}

#[test]
fn test_clickable_elements_in_preorder() {
    let snapshot = construct(&sample_tree(), meta("https://a.test")).unwrap();
    let indices: Vec<u32> = snapshot
        .clickable_elements()
        .into_iter()
        .filter_map(|i| snapshot.element(i)?.highlight_index)
        .collect();
    assert_eq!(indices, vec![0, 1, 3]);
}

#[test]
fn test_ancestor_tag_path_excludes_root() {
    let snapshot = construct(&sample_tree(), meta("https://a.test")).unwrap();
    let (link, _) = snapshot.element_by_highlight(3).unwrap();
    assert_eq!(snapshot.ancestor_tag_path(link), vec!["div", "a"]);
}

#[test]
fn test_text_until_next_clickable() {
    let snapshot = construct(&sample_tree(), meta("https://a.test")).unwrap();
    let (div, _) = snapshot.element_by_highlight(1).unwrap();
    assert_eq!(snapshot.text_until_next_clickable(div), "Inner");
}

#[test]
fn test_serialize_format() {
    let snapshot = construct(&sample_tree(), meta("https://a.test")).unwrap();
    let text = serialize(&snapshot, &include());
    let expected = [
        "Welcome",
        "[0]<button id=\"go\">Go />",
        "[1]<div role=\"button\">Inner />",
        "\t[3]<a href=\"/x\">Link />",
    ]
    .join("\n");
    assert_eq!(text, expected);
}

#[test]
fn test_serialize_skips_attribute_equal_to_text() {
    let mut nodes = HashMap::new();
    nodes.insert(0, element("button", "html/body/button", &[("title", "Save")], vec![1], Some(0)));
    nodes.insert(1, text("Save"));
    nodes.insert(2, element("body", "/body", &[], vec![0], None));
    let snapshot = construct(&RawDomTree { root_id: 2, nodes }, meta("https://a.test")).unwrap();

    let text = serialize(&snapshot, &["title".to_string()]);
    assert_eq!(text, "[0]<button>Save />");
}

#[test]
fn test_iframe_ancestors_outermost_first() {
    let mut nodes = HashMap::new();
    nodes.insert(0, element("iframe", "html/body/iframe", &[("id", "outer")], vec![1], Some(0)));
    nodes.insert(1, element("html", "html", &[], vec![2], None));
    nodes.insert(2, element("iframe", "html/body/iframe", &[("id", "inner")], vec![3], Some(1)));
    nodes.insert(3, element("button", "html/body/button", &[], vec![], Some(2)));
    nodes.insert(4, element("body", "/body", &[], vec![0], None));
    let snapshot = construct(&RawDomTree { root_id: 4, nodes }, meta("https://a.test")).unwrap();

    let (button, _) = snapshot.element_by_highlight(2).unwrap();
    let frames: Vec<_> = snapshot
        .iframe_ancestors(button)
        .into_iter()
        .filter_map(|i| snapshot.element(i)?.attribute("id"))
        .collect();
    assert_eq!(frames, vec!["outer", "inner"]);
}

#[test]
fn test_hash_ignores_excluded_attributes() {
    let base = construct(&sample_tree(), meta("https://a.test")).unwrap();

    let mut churned = sample_tree();
    if let Some(RawNode::Element(button)) = churned.nodes.get_mut(&1) {
        button.attributes.insert("class".into(), "active".into());
        button.attributes.insert("aria-pressed".into(), "true".into());
        button.attributes.insert("style".into(), "color: red".into());
    }
    let churned = construct(&churned, meta("https://a.test")).unwrap();

    let a = hash_element(&base, base.element_by_highlight(0).unwrap().0).unwrap();
    let b = hash_element(&churned, churned.element_by_highlight(0).unwrap().0).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 64);
}

#[test]
fn test_hash_sensitive_to_included_attributes() {
    let base = construct(&sample_tree(), meta("https://a.test")).unwrap();

    let mut renamed = sample_tree();
    if let Some(RawNode::Element(button)) = renamed.nodes.get_mut(&1) {
        button.attributes.insert("id".into(), "stop".into());
    }
    let renamed = construct(&renamed, meta("https://a.test")).unwrap();

    let a = hash_element(&base, base.element_by_highlight(0).unwrap().0).unwrap();
    let b = hash_element(&renamed, renamed.element_by_highlight(0).unwrap().0).unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_hash_keeps_attribute_boundaries() {
    let single = |attributes: &[(&str, &str)]| {
        let mut nodes = HashMap::new();
        nodes.insert(0, element("button", "html/body/button", attributes, vec![], Some(0)));
        nodes.insert(1, element("body", "/body", &[], vec![0], None));
        let snapshot = construct(&RawDomTree { root_id: 1, nodes }, meta("https://a.test")).unwrap();
        hash_element(&snapshot, snapshot.element_by_highlight(0).unwrap().0).unwrap()
    };

    assert_ne!(single(&[("a", "bc=d")]), single(&[("a", "b"), ("c", "d")]));
    assert_ne!(single(&[("a", "b\nc=d")]), single(&[("a", "b"), ("c", "d")]));
    assert_eq!(single(&[("a", "b"), ("c", "d")]), single(&[("c", "d"), ("a", "b")]));
}

#[test]
fn test_file_uploader_within_depth() {
    let mut nodes = HashMap::new();
    nodes.insert(0, element("label", "html/body/label", &[], vec![1], Some(0)));
    nodes.insert(1, element("div", "html/body/label/div", &[], vec![2], None));
    nodes.insert(
        2,
        element("input", "html/body/label/div/input", &[("type", "FILE")], vec![], None),
    );
    nodes.insert(3, element("input", "html/body/input", &[("accept", "image/*")], vec![], Some(1)));
    nodes.insert(4, element("input", "html/body/input[2]", &[("type", "text")], vec![], Some(2)));
    nodes.insert(9, element("body", "/body", &[], vec![0, 3, 4], None));
    let snapshot = construct(&RawDomTree { root_id: 9, nodes }, meta("https://a.test")).unwrap();

    let (label, _) = snapshot.element_by_highlight(0).unwrap();
    assert!(snapshot.is_file_uploader(label, 3));
    assert!(snapshot.is_file_uploader(label, 2));
    assert!(!snapshot.is_file_uploader(label, 1));

    let (accepting, _) = snapshot.element_by_highlight(1).unwrap();
    assert!(snapshot.is_file_uploader(accepting, 0));
    let (text, _) = snapshot.element_by_highlight(2).unwrap();
    assert!(!snapshot.is_file_uploader(text, 3));

    assert!(snapshot.is_file_uploader(snapshot.root(), 1));
    assert!(!snapshot.is_file_uploader(snapshot.root(), 0));
}

#[test]
fn test_change_detector_tracks_new_elements() {
    let mut detector = ChangeDetector::new(include());

    let first = construct(&sample_tree(), meta("https://a.test")).unwrap();
    let diff = detector.diff(&first);
    assert!(diff.changed);
    assert!(diff.new_elements.is_empty());

    let again = construct(&sample_tree(), meta("https://a.test")).unwrap();
    let diff = detector.diff(&again);
    assert!(!diff.changed);
    assert!(diff.new_elements.is_empty());

    let mut grown = sample_tree();
    grown.nodes.insert(
        10,
        element("input", "html/body/input", &[("id", "q")], vec![], Some(4)),
    );
    if let Some(RawNode::Element(body)) = grown.nodes.get_mut(&9) {
        body.children.push(10);
    }
    let grown = construct(&grown, meta("https://a.test")).unwrap();
    let diff = detector.diff(&grown);
    assert!(diff.changed);
    assert_eq!(diff.new_elements, vec![4]);
}

#[test]
fn test_change_detector_is_per_url() {
    let mut detector = ChangeDetector::new(include());
    detector.diff(&construct(&sample_tree(), meta("https://a.test")).unwrap());

    let other = construct(&sample_tree(), meta("https://b.test")).unwrap();
    let diff = detector.diff(&other);
    assert!(diff.changed);
    assert!(diff.new_elements.is_empty());
    assert!(detector.cached_text("https://b.test").is_some());
}

#[test]
fn test_xpath_to_css() {
    assert_eq!(xpath_to_css("html/body/div[2]/a"), "html > body > div:nth-of-type(2) > a");
    assert_eq!(xpath_to_css("/body"), "body");
    assert_eq!(xpath_to_css(""), "");
}

#[test]
fn test_enhanced_css_selector() {
    let snapshot = construct(&sample_tree(), meta("https://a.test")).unwrap();
    let (_, button) = snapshot.element_by_highlight(0).unwrap();
    assert_eq!(
        enhanced_css_selector(button, true),
        "html > body > button[id=\"go\"]"
    );
}

#[test]
fn test_enhanced_css_selector_classes_and_quotes() {
    let mut nodes = HashMap::new();
    nodes.insert(
        0,
        element(
            "input",
            "html/body/form/input[2]",
            &[
                ("class", "field 2col wide"),
                ("placeholder", "Say \"hi\""),
                ("required", ""),
                ("data-testid", "msg"),
                ("data-foo", "bar"),
            ],
            vec![],
            Some(0),
        ),
    );
    nodes.insert(1, element("body", "/body", &[], vec![0], None));
    let snapshot = construct(&RawDomTree { root_id: 1, nodes }, meta("https://a.test")).unwrap();
    let (_, input) = snapshot.element_by_highlight(0).unwrap();

    let with_dynamic = enhanced_css_selector(input, true);
    assert_eq!(
        with_dynamic,
        "html > body > form > input:nth-of-type(2).field.wide[data-testid=\"msg\"][placeholder*=\"Say \\\"hi\\\"\"][required]"
    );

    let without_dynamic = enhanced_css_selector(input, false);
    assert!(!without_dynamic.contains("data-testid"));
    assert!(!without_dynamic.contains("data-foo"));
}

#[test]
fn test_capture_window_overlap() {
    let window = CaptureWindow::new(&ViewportInfo::default(), 0);
    assert!(window.overlaps(&BoundingBox::new(10.0, 10.0, 50.0, 20.0)));
    assert!(!window.overlaps(&BoundingBox::new(10.0, 900.0, 50.0, 20.0)));

    let expanded = CaptureWindow::new(&ViewportInfo::default(), 300);
    assert!(expanded.overlaps(&BoundingBox::new(10.0, 900.0, 50.0, 20.0)));

    let unlimited = CaptureWindow::new(&ViewportInfo::default(), -1);
    assert!(unlimited.overlaps(&BoundingBox::new(10.0, 90_000.0, 50.0, 20.0)));
}
