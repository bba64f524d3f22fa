//! Structural xpaths: `tag` or `tag[n]` segments joined by `/`.

use crate::error::HostError;
use crate::host::{DocumentHost, NodeHandle};

/// Segment for each element among its siblings, given their tags in order.
///
/// The position suffix is the 1-based index among same-tag siblings and is
/// omitted when the tag is unique.
pub(crate) fn sibling_segments(tags: &[&str]) -> Vec<String> {
    tags.iter()
        .enumerate()
        .map(|(i, tag)| {
            let count = tags.iter().filter(|t| *t == tag).count();
            if count <= 1 {
                return tag.to_string();
            }
            let position = tags[..=i].iter().filter(|t| *t == tag).count();
            format!("{}[{}]", tag, position)
        })
        .collect()
}

pub(crate) fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", prefix, segment)
    }
}

/// Path of an element from its document's root element, e.g. `html/body`.
pub(crate) async fn element_path<H: DocumentHost + ?Sized>(
    host: &H,
    element: NodeHandle,
) -> Result<String, HostError> {
    let mut segments = Vec::new();
    let mut current = element;
    loop {
        let tag = host.node_info(current).await?.tag_name;
        let Some(parent) = host.parent_element(current).await? else {
            segments.push(tag);
            break;
        };

        let mut sibling_tags = Vec::new();
        let mut own_position = None;
        for sibling in host.children(parent).await? {
            let info = host.node_info(sibling).await?;
            if !info.is_element() {
                continue;
            }
            if sibling == current {
                own_position = Some(sibling_tags.len());
            }
            sibling_tags.push(info.tag_name);
        }
        let tags: Vec<&str> = sibling_tags.iter().map(String::as_str).collect();
        let segment = own_position
            .and_then(|i| sibling_segments(&tags).into_iter().nth(i))
            .unwrap_or(tag);
        segments.push(segment);
        current = parent;
    }
    segments.reverse();
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ElementSpec, MemoryDocument};

    #[test]
    fn test_sibling_segments() {
        assert_eq!(
            sibling_segments(&["div", "span", "div", "a"]),
            vec!["div[1]", "span", "div[2]", "a"]
        );
        assert!(sibling_segments(&[]).is_empty());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "html"), "html");
        assert_eq!(join("html/body", "div[2]"), "html/body/div[2]");
    }

    #[tokio::test]
    async fn test_element_path_of_body() {
        let doc = MemoryDocument::new("https://a.test", "A");
        let path = element_path(&doc, doc.body_handle()).await.unwrap();
        assert_eq!(path, "html/body");

        let first = doc.append(doc.body_handle(), ElementSpec::new("div"));
        let second = doc.append(doc.body_handle(), ElementSpec::new("div"));
        let leaf = doc.append(second, ElementSpec::new("b"));
        assert_eq!(element_path(&doc, first).await.unwrap(), "html/body/div[1]");
        assert_eq!(element_path(&doc, leaf).await.unwrap(), "html/body/div[2]/b");
    }
}
