//! Named destinations and the bookmark (outline) tree.

use std::collections::BTreeMap;

use crate::canvas::Page;
use crate::error::Result;
use crate::object::{Dict, Object};
use crate::pdf::ObjectWriter;
use crate::template::Bookmark;
use crate::types::Pt;

/// Destination name to (zero-based page index, top-left y), collected after layout.
#[derive(Debug, Default, Clone)]
pub struct Destinations {
    entries: BTreeMap<String, (usize, Pt)>,
}

impl Destinations {
    pub fn from_pages(pages: &[Page]) -> Self {
        let mut entries = BTreeMap::new();
        for (index, page) in pages.iter().enumerate() {
            for (name, y) in &page.destinations {
                // first declaration wins
                entries.entry(name.clone()).or_insert((index, *y));
            }
        }
        Self { entries }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<(usize, Pt)> {
        self.entries.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn xyz_destination(page_id: u32, pdf_y: Pt) -> Object {
    Object::Array(vec![
        Object::Ref(page_id),
        Object::name("XYZ"),
        Object::Null,
        Object::real(pdf_y.to_f32()),
        Object::Null,
    ])
}

/// Writes the `/Dests` name tree; names are kept sorted as the tree requires.
pub fn write_named_destinations(
    writer: &mut ObjectWriter,
    destinations: &Destinations,
    page_ids: &[u32],
    page_height: Pt,
) -> Result<Option<u32>> {
    if destinations.is_empty() {
        return Ok(None);
    }
    let mut names = Vec::with_capacity(destinations.entries.len() * 2);
    for (name, (page, y)) in &destinations.entries {
        let Some(page_id) = page_ids.get(*page) else {
            continue;
        };
        names.push(Object::text(name));
        names.push(xyz_destination(*page_id, page_height - *y));
    }
    let id = writer.add(&Dict::new().with("Names", Object::Array(names)).into())?;
    Ok(Some(id))
}

struct OutlineNode<'a> {
    bookmark: &'a Bookmark,
    id: u32,
    children: Vec<OutlineNode<'a>>,
}

fn reserve_nodes<'a>(writer: &mut ObjectWriter, bookmarks: &'a [Bookmark]) -> Vec<OutlineNode<'a>> {
    bookmarks
        .iter()
        .map(|bookmark| {
            let id = writer.reserve();
            OutlineNode {
                bookmark,
                id,
                children: reserve_nodes(writer, &bookmark.children),
            }
        })
        .collect()
}

/// Number of descendants visible when the node is expanded.
fn visible_count(nodes: &[OutlineNode<'_>]) -> i64 {
    nodes
        .iter()
        .map(|node| {
            1 + if node.bookmark.open {
                visible_count(&node.children)
            } else {
                0
            }
        })
        .sum()
}

struct OutlineTarget<'a> {
    destinations: &'a Destinations,
    page_ids: &'a [u32],
    page_height: Pt,
    margin: Pt,
}

impl OutlineTarget<'_> {
    fn resolve(&self, bookmark: &Bookmark) -> Object {
        if let Some(name) = bookmark.dest.as_deref() {
            match self.destinations.get(name) {
                Some((page, y)) => {
                    let page_id = self.page_ids[page.min(self.page_ids.len() - 1)];
                    return xyz_destination(page_id, self.page_height - y);
                }
                None => log::warn!("bookmark '{}' names unknown destination '{name}'", bookmark.title),
            }
        }
        let page = bookmark
            .page
            .unwrap_or(1)
            .clamp(1, self.page_ids.len())
            - 1;
        let top = bookmark
            .y
            .map(Pt::from_f64)
            .unwrap_or(self.margin);
        xyz_destination(self.page_ids[page], self.page_height - top)
    }
}

fn write_level(
    writer: &mut ObjectWriter,
    nodes: &[OutlineNode<'_>],
    parent: u32,
    target: &OutlineTarget<'_>,
) -> Result<()> {
    for (index, node) in nodes.iter().enumerate() {
        let mut dict = Dict::new()
            .with("Title", Object::text(&node.bookmark.title))
            .with("Parent", Object::Ref(parent))
            .with("Dest", target.resolve(node.bookmark));
        if index > 0 {
            dict.set("Prev", Object::Ref(nodes[index - 1].id));
        }
        if let Some(next) = nodes.get(index + 1) {
            dict.set("Next", Object::Ref(next.id));
        }
        if let (Some(first), Some(last)) = (node.children.first(), node.children.last()) {
            dict.set("First", Object::Ref(first.id));
            dict.set("Last", Object::Ref(last.id));
            let count = visible_count(&node.children);
            dict.set("Count", if node.bookmark.open { count } else { -count });
        }
        writer.write(node.id, &dict.into())?;
        write_level(writer, &node.children, node.id, target)?;
    }
    Ok(())
}

/// Writes the outline root and every bookmark node.
pub fn write_outlines(
    writer: &mut ObjectWriter,
    bookmarks: &[Bookmark],
    destinations: &Destinations,
    page_ids: &[u32],
    page_height: Pt,
    margin: Pt,
) -> Result<Option<u32>> {
    if bookmarks.is_empty() || page_ids.is_empty() {
        return Ok(None);
    }
    let root = writer.reserve();
    let nodes = reserve_nodes(writer, bookmarks);
    let target = OutlineTarget {
        destinations,
        page_ids,
        page_height,
        margin,
    };
    write_level(writer, &nodes, root, &target)?;

    let (Some(first), Some(last)) = (nodes.first(), nodes.last()) else {
        return Ok(None);
    };
    writer.write(
        root,
        &Dict::typed("Outlines")
            .with("First", Object::Ref(first.id))
            .with("Last", Object::Ref(last.id))
            .with("Count", visible_count(&nodes))
            .into(),
    )?;
    Ok(Some(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PdfVersion;

    fn bookmark(title: &str, page: Option<usize>, children: Vec<Bookmark>, open: bool) -> Bookmark {
        Bookmark {
            title: title.to_string(),
            page,
            children,
            open,
            ..Bookmark::default()
        }
    }

    fn body(writer: &ObjectWriter) -> String {
        String::from_utf8_lossy(writer.body()).into_owned()
    }

    #[test]
    fn first_destination_declaration_wins() {
        let mut first = Page::default();
        first.destinations.push(("intro".to_string(), Pt::from_i32(100)));
        let mut second = Page::default();
        second.destinations.push(("intro".to_string(), Pt::from_i32(300)));
        second.destinations.push(("end".to_string(), Pt::from_i32(72)));
        let dests = Destinations::from_pages(&[first, second]);
        assert_eq!(dests.get("intro"), Some((0, Pt::from_i32(100))));
        assert_eq!(dests.get("end"), Some((1, Pt::from_i32(72))));
        assert!(!dests.contains("missing"));
    }

    #[test]
    fn name_tree_is_sorted_and_flipped() {
        let mut page = Page::default();
        page.destinations.push(("zeta".to_string(), Pt::from_i32(100)));
        page.destinations.push(("alpha".to_string(), Pt::from_i32(200)));
        let dests = Destinations::from_pages(&[page]);
        let mut writer = ObjectWriter::new(PdfVersion::Pdf17);
        let page_id = writer.reserve();
        let id = write_named_destinations(&mut writer, &dests, &[page_id], Pt::from_i32(842))
            .unwrap()
            .unwrap();
        assert_eq!(id, 2);
        let text = body(&writer);
        let alpha = text.find("(alpha) [1 0 R /XYZ null 642 null]").unwrap();
        let zeta = text.find("(zeta) [1 0 R /XYZ null 742 null]").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn closed_nodes_report_negative_counts() {
        let tree = vec![
            bookmark(
                "Chapter",
                Some(2),
                vec![bookmark("A", Some(1), vec![], false), bookmark("B", None, vec![], false)],
                false,
            ),
            bookmark("Appendix", Some(99), vec![], true),
        ];
        let mut writer = ObjectWriter::new(PdfVersion::Pdf17);
        let pages = [writer.reserve(), writer.reserve()];
        let root = write_outlines(
            &mut writer,
            &tree,
            &Destinations::default(),
            &pages,
            Pt::from_i32(842),
            Pt::from_i32(72),
        )
        .unwrap()
        .unwrap();
        assert_eq!(root, 3);
        let text = body(&writer);
        assert!(text.contains("/Count -2"));
        assert!(text.contains("/Type /Outlines /First 4 0 R /Last 7 0 R /Count 2"));
        // page 99 clamps to the last page, default y is the top margin
        assert!(text.contains("/Title (Appendix) /Parent 3 0 R /Dest [2 0 R /XYZ null 770 null] /Prev 4 0 R"));
    }

    #[test]
    fn open_counts_include_descendants() {
        let tree = vec![bookmark(
            "Root",
            None,
            vec![bookmark("Child", None, vec![bookmark("Leaf", None, vec![], false)], true)],
            true,
        )];
        let mut writer = ObjectWriter::new(PdfVersion::Pdf17);
        let page = writer.reserve();
        write_outlines(
            &mut writer,
            &tree,
            &Destinations::default(),
            &[page],
            Pt::from_i32(842),
            Pt::from_i32(72),
        )
        .unwrap();
        let text = body(&writer);
        assert!(text.contains("/Type /Outlines /First 3 0 R /Last 3 0 R /Count 3"));
    }
}
