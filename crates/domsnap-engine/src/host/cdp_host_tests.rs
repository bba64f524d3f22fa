use super::*;

/// A pierced `DOM.getDocument` result: a button, an open shadow host with a
/// user-agent root on an input, a same-origin frame and an out-of-process one.
fn document_json() -> Value {
    json!({
        "nodeId": 1, "backendNodeId": 1, "nodeType": 9, "nodeName": "#document",
        "children": [{
            "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "HTML", "localName": "html",
            "attributes": [],
            "children": [
                {"nodeId": 3, "backendNodeId": 3, "nodeType": 1, "nodeName": "HEAD", "localName": "head"},
                {
                    "nodeId": 4, "backendNodeId": 4, "nodeType": 1, "nodeName": "BODY", "localName": "body",
                    "children": [
                        {
                            "nodeId": 5, "backendNodeId": 5, "nodeType": 1, "nodeName": "BUTTON",
                            "localName": "button", "attributes": ["id", "go"],
                            "children": [
                                {"nodeId": 6, "backendNodeId": 6, "nodeType": 3, "nodeName": "#text", "nodeValue": "Go"}
                            ]
                        },
                        {
                            "nodeId": 7, "backendNodeId": 7, "nodeType": 1, "nodeName": "X-PANEL",
                            "localName": "x-panel",
                            "shadowRoots": [{
                                "nodeId": 8, "backendNodeId": 8, "nodeType": 11,
                                "nodeName": "#document-fragment", "shadowRootType": "open",
                                "children": [
                                    {"nodeId": 9, "backendNodeId": 9, "nodeType": 1, "nodeName": "BUTTON", "localName": "button"}
                                ]
                            }]
                        },
                        {
                            "nodeId": 10, "backendNodeId": 10, "nodeType": 1, "nodeName": "INPUT",
                            "localName": "input",
                            "shadowRoots": [{
                                "nodeId": 11, "backendNodeId": 11, "nodeType": 11,
                                "nodeName": "#document-fragment", "shadowRootType": "user-agent"
                            }]
                        },
                        {
                            "nodeId": 12, "backendNodeId": 12, "nodeType": 1, "nodeName": "IFRAME",
                            "localName": "iframe", "attributes": ["src", "/inner.html"],
                            "contentDocument": {
                                "nodeId": 13, "backendNodeId": 13, "nodeType": 9, "nodeName": "#document",
                                "children": [{
                                    "nodeId": 14, "backendNodeId": 14, "nodeType": 1, "nodeName": "HTML",
                                    "localName": "html",
                                    "children": [{
                                        "nodeId": 15, "backendNodeId": 15, "nodeType": 1, "nodeName": "BODY",
                                        "localName": "body",
                                        "children": [
                                            {"nodeId": 16, "backendNodeId": 16, "nodeType": 1, "nodeName": "A", "localName": "a"}
                                        ]
                                    }]
                                }]
                            }
                        },
                        {
                            "nodeId": 17, "backendNodeId": 17, "nodeType": 1, "nodeName": "IFRAME",
                            "localName": "iframe", "attributes": ["src", "https://ads.test/"],
                            "frameId": "F2"
                        }
                    ]
                }
            ]
        }]
    })
}

fn index() -> DomIndex {
    let root: DomNode = serde_json::from_value(document_json()).unwrap();
    DomIndex::from_document(&root)
}

#[test]
fn test_index_flattens_tree() {
    let index = index();
    assert_eq!(index.root, Some(1));
    assert_eq!(index.body(1), Some(4));
    assert_eq!(index.get(4).unwrap().children, vec![5, 7, 10, 12, 17]);

    let button = index.get(5).unwrap();
    assert_eq!(button.kind, NodeKind::Element);
    assert_eq!(button.tag, "button");
    assert_eq!(button.attributes.get("id").map(String::as_str), Some("go"));

    let text = index.get(6).unwrap();
    assert_eq!(text.kind, NodeKind::Text);
    assert_eq!(text.text.as_deref(), Some("Go"));
    assert!(text.tag.is_empty());
}

#[test]
fn test_only_open_shadow_roots_are_exposed() {
    let index = index();
    assert_eq!(index.get(7).unwrap().shadow_root, Some(8));
    assert_eq!(index.get(8).unwrap().kind, NodeKind::ShadowRoot);
    assert_eq!(index.get(10).unwrap().shadow_root, None);
    assert!(index.get(11).is_err());
}

#[test]
fn test_parent_element_crosses_shadow_boundary() {
    let index = index();
    assert_eq!(index.parent_element(9).unwrap(), Some(7));
    assert_eq!(index.parent_element(6).unwrap(), Some(5));
    assert_eq!(index.parent_element(2).unwrap(), None);
    // A frame's html has no parent element in its own document.
    assert_eq!(index.parent_element(14).unwrap(), None);
    assert!(matches!(index.parent_element(99), Err(HostError::NodeGone(99))));
}

#[test]
fn test_content_documents() {
    let index = index();
    assert_eq!(index.content_document(12).unwrap(), Some(13));
    assert_eq!(index.body(13), Some(15));
    assert!(matches!(
        index.content_document(17),
        Err(HostError::CrossOrigin(src)) if src == "https://ads.test/"
    ));
    assert_eq!(index.content_document(5).unwrap(), None);
}

#[test]
fn test_hits_are_hoisted_into_the_scope_document() {
    let index = index();
    // Text resolves to its element.
    assert_eq!(index.hoist_hit(6, 1), 5);
    // Frame content seen from the top document is the frame element.
    assert_eq!(index.hoist_hit(16, 1), 12);
    // Inside the frame's own scope it stays put.
    assert_eq!(index.hoist_hit(16, 13), 16);
    // Shadow content shares the top document.
    assert_eq!(index.hoist_hit(9, 8), 9);
    // Unknown nodes pass through.
    assert_eq!(index.hoist_hit(42, 1), 42);
}

#[test]
fn test_style_from_properties() {
    let properties: Vec<CssProperty> = serde_json::from_value(json!([
        {"name": "display", "value": "inline-block"},
        {"name": "cursor", "value": "pointer"},
        {"name": "color", "value": "red"},
        {"name": "opacity", "value": "0.5"}
    ]))
    .unwrap();
    let style = style_from_properties(&properties);
    assert_eq!(style.display, "inline-block");
    assert_eq!(style.cursor, "pointer");
    assert_eq!(style.opacity, "0.5");
    assert_eq!(style.visibility, "visible");
    assert_eq!(style.position, "static");
}

#[test]
fn test_layout_from_quads() {
    let quads = vec![
        vec![10.0, 10.0, 110.0, 10.0, 110.0, 30.0, 10.0, 30.0],
        vec![10.0, 30.0, 60.0, 30.0, 60.0, 50.0, 10.0, 50.0],
    ];
    let layout = layout_from_quads(&quads, Some((100.0, 40.0)));
    assert_eq!(layout.client_rects.len(), 2);
    assert_eq!(
        layout.bounding_rect,
        Some(BoundingBox::new(10.0, 10.0, 100.0, 40.0))
    );
    assert!(layout.has_offset_size());
}

#[test]
fn test_unrendered_node_layout() {
    let layout = layout_from_quads(&[], None);
    assert_eq!(layout.bounding_rect, Some(BoundingBox::default()));
    assert!(layout.client_rects.is_empty());
    assert!(!layout.has_offset_size());
    assert!(layout.visible_rects().is_empty());
}

fn binding_event(name: &str, payload: &str) -> CdpEvent {
    CdpEvent {
        method: "Runtime.bindingCalled".to_string(),
        params: json!({"name": name, "payload": payload, "executionContextId": 1}),
    }
}

#[test]
fn test_mutation_records_from_binding_calls() {
    let payload = json!({
        "observer": 3,
        "kind": "attributes",
        "target_tag": "div",
        "attribute_name": "class",
        "ancestor_tags": ["body", "html"],
        "inside_overlay": false
    })
    .to_string();

    let record = mutation_from_event(&binding_event(MUTATION_BINDING, &payload), 3).unwrap();
    assert_eq!(
        record,
        MutationRecord::attribute("div", "class")
            .with_ancestors(vec!["body".to_string(), "html".to_string()])
    );

    // Records of another observer, another binding or malformed payloads are ignored.
    assert!(mutation_from_event(&binding_event(MUTATION_BINDING, &payload), 4).is_none());
    assert!(mutation_from_event(&binding_event(PAGE_BINDING, &payload), 3).is_none());
    assert!(mutation_from_event(&binding_event(MUTATION_BINDING, "{"), 3).is_none());
}

#[test]
fn test_child_list_payload_with_null_attribute() {
    let payload = r#"{"observer":1,"kind":"child_list","target_tag":"ul","attribute_name":null,"ancestor_tags":[],"inside_overlay":true}"#;
    let record = mutation_from_event(&binding_event(MUTATION_BINDING, payload), 1).unwrap();
    assert_eq!(record.target_tag, "ul");
    assert!(record.attribute_name.is_none());
    assert!(record.inside_overlay);
}

#[test]
fn test_page_events_map_to_capture_events() {
    let top = CdpEvent {
        method: "Page.frameNavigated".to_string(),
        params: json!({"frame": {"id": "F1", "url": "https://app.test/"}}),
    };
    assert!(matches!(capture_event_from(&top), Some(CaptureEvent::Navigation)));

    let child = CdpEvent {
        method: "Page.frameNavigated".to_string(),
        params: json!({"frame": {"id": "F2", "parentId": "F1"}}),
    };
    assert!(capture_event_from(&child).is_none());

    assert!(matches!(
        capture_event_from(&binding_event(PAGE_BINDING, "scroll")),
        Some(CaptureEvent::Scroll)
    ));
    assert!(matches!(
        capture_event_from(&binding_event(PAGE_BINDING, "resize")),
        Some(CaptureEvent::Resize)
    ));
    assert!(capture_event_from(&binding_event(PAGE_BINDING, "zoom")).is_none());
}

#[test]
fn test_invoke_encodes_arguments() {
    let script = invoke("(function(a, b) {})", &[json!("x\"y"), json!(3)]);
    assert_eq!(script, r#"((function(a, b) {}))("x\"y", 3)"#);
}

#[test]
fn test_script_errors_are_classified() {
    assert!(matches!(
        script_error(CdpError::JavaScript("boom".to_string())),
        HostError::Script(message) if message == "boom"
    ));
    assert!(matches!(
        node_error(NodeHandle(5))(CdpError::Protocol {
            code: -32000,
            message: "No node with given id found".to_string(),
        }),
        HostError::NodeGone(5)
    ));
    assert!(matches!(
        node_error(NodeHandle(5))(CdpError::SessionClosed),
        HostError::Cdp(CdpError::SessionClosed)
    ));
}
