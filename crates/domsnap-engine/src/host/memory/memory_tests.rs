use super::*;

fn page() -> MemoryDocument {
    MemoryDocument::new("https://shop.test/", "Shop")
}

#[tokio::test]
async fn test_new_document_has_html_and_body() {
    let doc = page();
    let document = doc.document().await.unwrap();
    let body = doc.body(document).await.unwrap().unwrap();
    assert_eq!(body, doc.body_handle());
    assert_eq!(doc.node_info(body).await.unwrap().tag_name, "body");

    let html = doc.parent_element(body).await.unwrap().unwrap();
    assert_eq!(doc.node_info(html).await.unwrap().tag_name, "html");
    assert_eq!(doc.parent_element(html).await.unwrap(), None);
}

#[tokio::test]
async fn test_layout_unions_children_without_rect() {
    let doc = page();
    let wrapper = doc.append(doc.body_handle(), ElementSpec::new("div"));
    doc.append(wrapper, ElementSpec::new("a").rect(10.0, 10.0, 20.0, 10.0));
    doc.append(wrapper, ElementSpec::new("a").rect(40.0, 30.0, 20.0, 10.0));

    let layout = doc.layout(wrapper).await.unwrap();
    assert_eq!(
        layout.bounding_rect,
        Some(BoundingBox::new(10.0, 10.0, 50.0, 30.0))
    );
    assert!(layout.has_offset_size());
}

#[tokio::test]
async fn test_display_none_hides_subtree_geometry() {
    let doc = page();
    let hidden = doc.append(
        doc.body_handle(),
        ElementSpec::new("div").rect(0.0, 0.0, 100.0, 100.0).display("none"),
    );
    let child = doc.append(hidden, ElementSpec::new("button").rect(0.0, 0.0, 50.0, 20.0));

    let layout = doc.layout(child).await.unwrap();
    assert!(layout.client_rects.is_empty());
    assert!(!layout.has_offset_size());
}

#[tokio::test]
async fn test_cursor_and_visibility_inherit() {
    let doc = page();
    let parent = doc.append(
        doc.body_handle(),
        ElementSpec::new("div").cursor("pointer").visibility("hidden"),
    );
    let child = doc.append(parent, ElementSpec::new("span").visibility("visible"));

    let style = doc.computed_style(child).await.unwrap();
    assert_eq!(style.cursor, "pointer");
    assert_eq!(style.visibility, "visible");
    assert_eq!(style.display, "block");
}

#[tokio::test]
async fn test_hit_test_prefers_higher_z_then_later_paint() {
    let doc = page();
    let body = doc.body_handle();
    let under = doc.append(body, ElementSpec::new("button").rect(0.0, 0.0, 100.0, 40.0));
    let cover = doc.append(body, ElementSpec::new("div").rect(0.0, 0.0, 100.0, 40.0));
    let document = doc.document().await.unwrap();

    let hit = doc.element_from_point(document, 50.0, 20.0).await.unwrap();
    assert_eq!(hit, Some(cover));

    let raised = doc.append(
        body,
        ElementSpec::new("button").rect(0.0, 50.0, 100.0, 40.0).z_index(10),
    );
    doc.append(body, ElementSpec::new("div").rect(0.0, 50.0, 100.0, 40.0));
    let hit = doc.element_from_point(document, 50.0, 70.0).await.unwrap();
    assert_eq!(hit, Some(raised));
    assert_ne!(hit, Some(under));
}

#[tokio::test]
async fn test_hit_test_reaches_into_shadow_tree() {
    let doc = page();
    let host = doc.append(doc.body_handle(), ElementSpec::new("my-widget"));
    let root = doc.attach_shadow(host);
    let inner = doc.append(root, ElementSpec::new("button").rect(0.0, 0.0, 80.0, 30.0));

    let document = doc.document().await.unwrap();
    let hit = doc.element_from_point(document, 10.0, 10.0).await.unwrap();
    assert_eq!(hit, Some(inner));
    assert_eq!(doc.parent_element(inner).await.unwrap(), Some(host));
}

#[tokio::test]
async fn test_cross_origin_frame_refuses_document() {
    let doc = page();
    let (frame, _) = doc.append_frame(
        doc.body_handle(),
        ElementSpec::new("iframe")
            .attr("src", "https://ads.test/")
            .rect(0.0, 0.0, 300.0, 200.0),
        true,
    );
    let err = doc.content_document(frame).await.unwrap_err();
    assert!(matches!(err, HostError::CrossOrigin(src) if src == "https://ads.test/"));

    let (same, frame_body) = doc.append_frame(
        doc.body_handle(),
        ElementSpec::new("iframe").rect(0.0, 300.0, 300.0, 200.0),
        false,
    );
    let frame_doc = doc.content_document(same).await.unwrap().unwrap();
    assert_eq!(doc.body(frame_doc).await.unwrap(), Some(frame_body));
}

#[tokio::test]
async fn test_query_selector_and_xpath() {
    let doc = page();
    let body = doc.body_handle();
    let list = doc.append(body, ElementSpec::new("div").attr("class", "menu open"));
    doc.append(list, ElementSpec::new("a").attr("href", "/one"));
    let second = doc.append(list, ElementSpec::new("a").attr("href", "/two"));
    doc.append(body, ElementSpec::new("div"));
    let document = doc.document().await.unwrap();

    let found = doc
        .query_selector(document, "html > body > div:nth-of-type(1).menu > a:nth-of-type(2)[href=\"/two\"]")
        .await
        .unwrap();
    assert_eq!(found, Some(second));

    let found = doc.query_selector(document, "div a:last-of-type").await.unwrap();
    assert_eq!(found, Some(second));

    let found = doc.query_xpath(document, "/html/body/div[1]/a[2]").await.unwrap();
    assert_eq!(found, Some(second));

    let found = doc.query_xpath(document, "//body").await.unwrap();
    assert_eq!(found, Some(body));

    let missing = doc.query_xpath(document, "/html/body/div[3]").await.unwrap();
    assert_eq!(missing, None);

    assert!(doc.query_selector(document, "a:hover").await.is_err());
}

#[tokio::test]
async fn test_query_does_not_cross_shadow_boundary() {
    let doc = page();
    let host = doc.append(doc.body_handle(), ElementSpec::new("x-card"));
    let root = doc.attach_shadow(host);
    let inner = doc.append(root, ElementSpec::new("button").attr("id", "deep"));
    let document = doc.document().await.unwrap();

    assert_eq!(doc.query_selector(document, "button").await.unwrap(), None);
    assert_eq!(doc.query_selector(root, "button").await.unwrap(), Some(inner));
}

#[tokio::test]
async fn test_mutations_reach_observers() {
    let doc = page();
    let mut subscription = doc.observe_mutations();
    let input = doc.append(doc.body_handle(), ElementSpec::new("input"));
    doc.set_attribute(input, "style", "color: red");

    let first = subscription.recv().await.unwrap();
    assert_eq!(first.kind, MutationKind::ChildList);
    assert_eq!(first.target_tag, "body");
    assert_eq!(first.ancestor_tags, vec!["html".to_string()]);

    let second = subscription.recv().await.unwrap();
    assert_eq!(second.kind, MutationKind::Attributes);
    assert_eq!(second.attribute_name.as_deref(), Some("style"));
}

#[tokio::test]
async fn test_removed_node_is_gone() {
    let doc = page();
    let button = doc.append(doc.body_handle(), ElementSpec::new("button").text("Go"));
    doc.remove(button);

    assert!(matches!(
        doc.node_info(button).await,
        Err(HostError::NodeGone(_))
    ));
    assert!(doc.children(doc.body_handle()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_select_options_and_choose() {
    let doc = page();
    let select = doc.append(doc.body_handle(), ElementSpec::new("select"));
    doc.append(select, ElementSpec::new("option").attr("value", "s").text("Small"));
    doc.append(select, ElementSpec::new("option").attr("value", "l").text(" Large "));

    let options = doc.select_options(select).await.unwrap();
    assert_eq!(options.len(), 2);
    assert_eq!(options[1].text, "Large");
    assert!(options[0].selected);

    assert!(!doc.choose_option(select, 0).await.unwrap());
    assert!(doc.choose_option(select, 1).await.unwrap());
    assert_eq!(doc.value_of(select).as_deref(), Some("l"));
    assert_eq!(
        doc.effects(),
        vec![ActionEffect::Change(select), ActionEffect::Input(select)]
    );
}

#[tokio::test]
async fn test_set_value_on_contenteditable_replaces_text() {
    let doc = page();
    let editor = doc.append(
        doc.body_handle(),
        ElementSpec::new("div").attr("contenteditable", "true").text("old"),
    );
    doc.set_value(editor, "new").await.unwrap();
    assert_eq!(doc.text_of(editor), "new");

    let div = doc.append(doc.body_handle(), ElementSpec::new("div"));
    assert!(doc.set_value(div, "x").await.is_err());
}

#[tokio::test]
async fn test_listener_introspection_capability() {
    let doc = page();
    let div = doc.append(doc.body_handle(), ElementSpec::new("div").listener("click"));
    assert!(doc.has_event_listeners(div).await.unwrap());

    doc.set_listener_introspection(false);
    assert!(!doc.capabilities().listener_introspection);
    assert!(matches!(
        doc.has_event_listeners(div).await,
        Err(HostError::Unsupported(_))
    ));
}
