use super::*;

#[test]
fn test_cdp_request_serialize() {
    let req = CdpRequest {
        id: 1,
        method: "DOM.getDocument".to_string(),
        params: Some(serde_json::json!({"depth": -1, "pierce": true})),
        session_id: Some("S1".to_string()),
    };
    let json = serde_json::to_string(&req).unwrap();
    assert!(json.contains("DOM.getDocument"));
    assert!(json.contains("\"sessionId\":\"S1\""));
}

#[test]
fn test_cdp_response_deserialize() {
    let json = r#"{"id": 1, "result": {"nodeId": 4}}"#;
    let resp: CdpResponse = serde_json::from_str(json).unwrap();
    assert_eq!(resp.id, Some(1));
    assert!(resp.result.is_some());
    assert!(CdpEvent::from_response(resp).is_none());
}

#[test]
fn test_event_from_response() {
    let json = r#"{
        "method": "Runtime.bindingCalled",
        "params": {"name": "__domsnapMutation", "payload": "{}"},
        "sessionId": "S1"
    }"#;
    let resp: CdpResponse = serde_json::from_str(json).unwrap();
    let event = CdpEvent::from_response(resp).unwrap();
    assert_eq!(event.method, "Runtime.bindingCalled");
    assert_eq!(event.params["name"], "__domsnapMutation");
}

#[test]
fn test_page_info_deserialize() {
    let json = r#"{
        "id": "page123",
        "type": "page",
        "title": "Test",
        "url": "https://example.com",
        "webSocketDebuggerUrl": "ws://localhost:9222/devtools/page/page123"
    }"#;
    let info: PageInfo = serde_json::from_str(json).unwrap();
    assert_eq!(info.id, "page123");
    assert!(info.is_page());
}

#[test]
fn test_dom_node_attribute_pairs() {
    let json = r#"{
        "nodeId": 7,
        "backendNodeId": 12,
        "nodeType": 1,
        "nodeName": "BUTTON",
        "localName": "button",
        "attributes": ["id", "go", "class", "btn"]
    }"#;
    let node: DomNode = serde_json::from_str(json).unwrap();
    let pairs: Vec<(&str, &str)> = node.attribute_pairs().collect();
    assert_eq!(pairs, vec![("id", "go"), ("class", "btn")]);
}

#[test]
fn test_remote_object_is_node() {
    let json = r#"{"type": "object", "subtype": "node", "objectId": "1.2.3"}"#;
    let object: RemoteObject = serde_json::from_str(json).unwrap();
    assert!(object.is_node());

    let json = r#"{"type": "object", "subtype": "null", "value": null}"#;
    let object: RemoteObject = serde_json::from_str(json).unwrap();
    assert!(!object.is_node());
}

#[test]
fn test_screenshot_format_serialize() {
    let fmt = ScreenshotFormat::Png;
    let json = serde_json::to_string(&fmt).unwrap();
    assert_eq!(json, "\"png\"");
}
