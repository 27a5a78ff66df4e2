//! Address resolution for the three COLLADA link kinds.
//!
//! Targets are registered while parsing; links are recorded as pending and
//! resolved in a single pass once the whole document is known, so forward
//! references are legal.
//!
//! - **URL**: `#id` looked up in the global id table.
//! - **SID**: `anchor/sid/sid.member` or `anchor/sid(i)(j)`, where `anchor`
//!   is a global id or `.` for the link owner's declared parent id; every
//!   following segment is found by breadth-first search below the previous.
//! - **FX**: a bare sid looked up in the FX symbol table of the link's scope,
//!   then of each enclosing FX scope.

use std::collections::{HashMap, VecDeque};

use super::types::{Element, ElementId};

/// Row stride used by `(i)(j)` accessors (4x4 matrices).
const ARRAY_ROW_STRIDE: usize = 4;

/// Handle of a link in the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinkId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    Url,
    Sid,
    Fx,
}

/// Which part of the target's data a SID link addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SidAccessor {
    /// The whole value.
    #[default]
    Whole,
    /// A named component (`.X`, `.ANGLE`, ...) at the given offset.
    Member(usize),
    /// An array element (`(i)` or `(i)(j)`) at the given offset.
    Array(usize),
}

impl SidAccessor {
    /// Data offset addressed by the accessor, if it is not the whole value.
    pub fn offset(self) -> Option<usize> {
        match self {
            SidAccessor::Whole => None,
            SidAccessor::Member(o) | SidAccessor::Array(o) => Some(o),
        }
    }
}

/// A deferred reference.
#[derive(Clone, Debug)]
pub struct Link {
    pub kind: LinkKind,
    pub url: String,
    /// FX links: the scope where the search starts.
    pub scope: Option<ElementId>,
    /// SID links: id substituted for a leading `.`.
    pub parent_id: Option<String>,
    pub target: Option<ElementId>,
    pub accessor: SidAccessor,
}

/// Global id table plus the list of pending links.
#[derive(Clone, Debug, Default)]
pub struct AddressResolver {
    ids: HashMap<String, ElementId>,
    links: Vec<Link>,
    resolved: bool,
}

/// Map a member accessor name to its data offset.
pub fn member_offset(member: &str) -> Option<usize> {
    Some(match member {
        "X" | "R" | "S" | "U" => 0,
        "Y" | "G" | "T" | "V" => 1,
        "Z" | "B" | "P" => 2,
        "W" | "A" | "Q" | "ANGLE" => 3,
        _ => return None,
    })
}

/// Split the trailing accessor off the last path segment.
fn split_accessor(segment: &str) -> (&str, SidAccessor) {
    if let Some(open) = segment.find('(') {
        let (sid, rest) = segment.split_at(open);
        let indices: Vec<usize> = rest
            .split(|c| c == '(' || c == ')')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        let offset = match indices.as_slice() {
            [i] => *i,
            [i, j, ..] => i * ARRAY_ROW_STRIDE + j,
            [] => {
                log::warn!("Invalid array accessor in SID segment '{}'", segment);
                return (sid, SidAccessor::Whole);
            }
        };
        return (sid, SidAccessor::Array(offset));
    }
    if let Some((sid, member)) = segment.rsplit_once('.') {
        if let Some(offset) = member_offset(member) {
            return (sid, SidAccessor::Member(offset));
        }
    }
    (segment, SidAccessor::Whole)
}

/// Breadth-first search for `sid` below `root` (excluding `root` itself).
fn find_scoped_child(elements: &[Element], root: ElementId, sid: &str) -> Option<ElementId> {
    let mut queue: VecDeque<ElementId> = elements[root.index()].scoped_children.iter().copied().collect();
    while let Some(current) = queue.pop_front() {
        let element = &elements[current.index()];
        if element.sid.as_deref() == Some(sid) {
            return Some(current);
        }
        queue.extend(element.scoped_children.iter().copied());
    }
    None
}

impl AddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a global id. Duplicates are reported and the first one is kept.
    pub fn register_url_target(&mut self, id: &str, element: ElementId) -> bool {
        if let Some(existing) = self.ids.get(id) {
            log::error!(
                "Duplicate id '{}' (elements {} and {}), keeping the first",
                id,
                existing.0,
                element.0
            );
            return false;
        }
        self.ids.insert(id.to_string(), element);
        true
    }

    /// Record `child` in the FX symbol table of `scope` under `sid`.
    pub fn register_fx_target(elements: &mut [Element], scope: ElementId, sid: &str, child: ElementId) {
        let table = &mut elements[scope.index()].fx_children;
        if table.contains_key(sid) {
            log::warn!("Duplicate FX sid '{}' in one scope, keeping the first", sid);
            return;
        }
        table.insert(sid.to_string(), child);
    }

    /// Record `child` as a scoped child of `parent`.
    pub fn register_sid_target(elements: &mut [Element], parent: ElementId, child: ElementId) {
        elements[parent.index()].scoped_children.push(child);
    }

    pub fn create_link(
        &mut self,
        kind: LinkKind,
        url: &str,
        scope: Option<ElementId>,
        parent_id: Option<String>,
    ) -> LinkId {
        let handle = LinkId(self.links.len() as u32);
        self.links.push(Link {
            kind,
            url: url.trim().to_string(),
            scope,
            parent_id,
            target: None,
            accessor: SidAccessor::Whole,
        });
        handle
    }

    pub fn create_url_link(&mut self, url: &str) -> LinkId {
        self.create_link(LinkKind::Url, url, None, None)
    }

    pub fn link(&self, link: LinkId) -> &Link {
        &self.links[link.0 as usize]
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Look up a global id (a leading `#` is ignored).
    pub fn resolve_url(&self, url: &str) -> Option<ElementId> {
        let id = url.trim().trim_start_matches('#');
        self.ids.get(id).copied()
    }

    /// Walk `scope -> fx_parent -> ...` looking for `sid`.
    pub fn resolve_fx(elements: &[Element], scope: ElementId, sid: &str) -> Option<ElementId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            let element = &elements[s.index()];
            if let Some(found) = element.fx_children.get(sid) {
                return Some(*found);
            }
            current = element.fx_parent;
        }
        None
    }

    /// Resolve a SID path anchored at a global id (or `.` -> `parent_id`).
    pub fn resolve_sid(
        &self,
        elements: &[Element],
        path: &str,
        parent_id: Option<&str>,
    ) -> Option<(ElementId, SidAccessor)> {
        let segments: Vec<&str> = path.split('/').collect();
        let anchor = segments[0];
        let anchor_id = if anchor == "." {
            match parent_id {
                Some(id) => id,
                None => {
                    log::warn!("SID path '{}' is relative but its owner has no parent id", path);
                    return None;
                }
            }
        } else {
            anchor
        };

        let Some(root) = self.resolve_url(anchor_id) else {
            log::warn!("SID path '{}': anchor id '{}' not found", path, anchor_id);
            return None;
        };
        self.walk_sid_segments(elements, root, &segments[1..], path)
    }

    /// Resolve a path of scoped ids against several candidate roots in order.
    ///
    /// A root matches the first segment itself when its own sid equals it;
    /// otherwise the first segment is searched below the root.
    pub fn resolve_sid_from_roots(
        &self,
        elements: &[Element],
        roots: &[ElementId],
        path: &str,
    ) -> Option<(ElementId, SidAccessor)> {
        let segments: Vec<&str> = path.split('/').collect();
        for &root in roots {
            let (first, _) = split_accessor(segments[0]);
            if segments.len() == 1 && elements[root.index()].sid.as_deref() == Some(first) {
                let (_, accessor) = split_accessor(segments[0]);
                return Some((root, accessor));
            }
            if let Some(found) = self.walk_sid_segments_quiet(elements, root, &segments) {
                return Some(found);
            }
        }
        None
    }

    fn walk_sid_segments(
        &self,
        elements: &[Element],
        root: ElementId,
        segments: &[&str],
        path: &str,
    ) -> Option<(ElementId, SidAccessor)> {
        let mut current = root;
        let mut accessor = SidAccessor::Whole;
        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            let (sid, acc) = if last { split_accessor(segment) } else { (*segment, SidAccessor::Whole) };
            match find_scoped_child(elements, current, sid) {
                Some(found) => current = found,
                None => {
                    log::warn!("SID path '{}': segment '{}' not found", path, sid);
                    return None;
                }
            }
            accessor = acc;
        }
        Some((current, accessor))
    }

    fn walk_sid_segments_quiet(
        &self,
        elements: &[Element],
        root: ElementId,
        segments: &[&str],
    ) -> Option<(ElementId, SidAccessor)> {
        let mut current = root;
        let mut accessor = SidAccessor::Whole;
        for (i, segment) in segments.iter().enumerate() {
            let (sid, acc) = if i + 1 == segments.len() {
                split_accessor(segment)
            } else {
                (*segment, SidAccessor::Whole)
            };
            current = find_scoped_child(elements, current, sid)?;
            accessor = acc;
        }
        Some((current, accessor))
    }

    /// Resolve every pending link. Unresolved links are reported and keep an
    /// empty target; this never fails.
    pub fn resolve_all(&mut self, elements: &[Element]) {
        let mut unresolved = 0usize;
        for i in 0..self.links.len() {
            let (target, accessor) = {
                let link = &self.links[i];
                match link.kind {
                    LinkKind::Url => {
                        let target = self.resolve_url(&link.url);
                        if target.is_none() {
                            log::warn!("Unresolved URL link '{}'", link.url);
                        }
                        (target, SidAccessor::Whole)
                    }
                    LinkKind::Fx => {
                        let target = link
                            .scope
                            .and_then(|scope| Self::resolve_fx(elements, scope, &link.url));
                        if target.is_none() {
                            log::warn!("Unresolved FX link '{}'", link.url);
                        }
                        (target, SidAccessor::Whole)
                    }
                    LinkKind::Sid => {
                        match self.resolve_sid(elements, &link.url, link.parent_id.as_deref()) {
                            Some((t, a)) => (Some(t), a),
                            None => (None, SidAccessor::Whole),
                        }
                    }
                }
            };
            if target.is_none() {
                unresolved += 1;
            }
            let link = &mut self.links[i];
            link.target = target;
            link.accessor = accessor;
        }
        self.resolved = true;
        log::debug!(
            "Resolved {} links ({} unresolved), {} ids registered",
            self.links.len(),
            unresolved,
            self.ids.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::types::{ElementKind, Image};

    fn element(id: Option<&str>, sid: Option<&str>) -> Element {
        let mut e = Element::new(ElementKind::Image(Image::default()));
        e.id = id.map(str::to_string);
        e.sid = sid.map(str::to_string);
        e
    }

    /// node(id=root) -> a(sid=a) -> b(sid=b); root -> c(sid=c)
    fn build() -> (Vec<Element>, AddressResolver) {
        let mut elements = vec![
            element(Some("root"), None),
            element(None, Some("a")),
            element(None, Some("b")),
            element(None, Some("c")),
        ];
        let mut resolver = AddressResolver::new();
        resolver.register_url_target("root", ElementId(0));
        AddressResolver::register_sid_target(&mut elements, ElementId(0), ElementId(1));
        AddressResolver::register_sid_target(&mut elements, ElementId(1), ElementId(2));
        AddressResolver::register_sid_target(&mut elements, ElementId(0), ElementId(3));
        (elements, resolver)
    }

    #[test]
    fn test_url_resolution() {
        let (elements, mut resolver) = build();
        let ok = resolver.create_url_link("#root");
        let missing = resolver.create_url_link("#nope");
        resolver.resolve_all(&elements);

        assert_eq!(resolver.link(ok).target, Some(ElementId(0)));
        assert_eq!(resolver.link(missing).target, None);
        assert!(resolver.is_resolved());
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let mut resolver = AddressResolver::new();
        assert!(resolver.register_url_target("x", ElementId(0)));
        assert!(!resolver.register_url_target("x", ElementId(1)));
        assert_eq!(resolver.resolve_url("x"), Some(ElementId(0)));
    }

    #[test]
    fn test_sid_nested_search() {
        let (elements, resolver) = build();
        // b is found breadth-first below a
        let (target, accessor) = resolver.resolve_sid(&elements, "root/b", None).unwrap();
        assert_eq!(target, ElementId(2));
        assert_eq!(accessor, SidAccessor::Whole);

        let (target, _) = resolver.resolve_sid(&elements, "root/a/b", None).unwrap();
        assert_eq!(target, ElementId(2));

        assert!(resolver.resolve_sid(&elements, "root/c/b", None).is_none());
    }

    #[test]
    fn test_sid_member_and_array_accessors() {
        let (elements, resolver) = build();
        let (_, accessor) = resolver.resolve_sid(&elements, "root/c.Y", None).unwrap();
        assert_eq!(accessor, SidAccessor::Member(1));

        let (_, accessor) = resolver.resolve_sid(&elements, "root/c.ANGLE", None).unwrap();
        assert_eq!(accessor, SidAccessor::Member(3));

        let (_, accessor) = resolver.resolve_sid(&elements, "root/c(2)", None).unwrap();
        assert_eq!(accessor, SidAccessor::Array(2));

        let (_, accessor) = resolver.resolve_sid(&elements, "root/c(1)(3)", None).unwrap();
        assert_eq!(accessor, SidAccessor::Array(7));
    }

    #[test]
    fn test_dot_anchor_matches_explicit_parent() {
        let (elements, resolver) = build();
        for path in ["a", "b", "a/b", "c.Z", "c(1)(2)"] {
            let relative = resolver.resolve_sid(&elements, &format!("./{path}"), Some("root"));
            let explicit = resolver.resolve_sid(&elements, &format!("root/{path}"), None);
            assert_eq!(relative, explicit, "path {path}");
            assert!(relative.is_some());
        }
    }

    #[test]
    fn test_sid_from_roots_tries_in_order() {
        let (elements, resolver) = build();
        // The first root (c) has no children, the second (root) finds b.
        let found = resolver.resolve_sid_from_roots(&elements, &[ElementId(3), ElementId(0)], "b");
        assert_eq!(found.map(|f| f.0), Some(ElementId(2)));

        // A root matches itself when its sid equals the path.
        let found = resolver.resolve_sid_from_roots(&elements, &[ElementId(1)], "a");
        assert_eq!(found.map(|f| f.0), Some(ElementId(1)));
    }

    #[test]
    fn test_fx_walks_scope_chain() {
        let mut elements = vec![element(None, None), element(None, None), element(None, Some("p"))];
        elements[1].fx_parent = Some(ElementId(0));
        AddressResolver::register_fx_target(&mut elements, ElementId(0), "p", ElementId(2));

        assert_eq!(AddressResolver::resolve_fx(&elements, ElementId(1), "p"), Some(ElementId(2)));
        assert_eq!(AddressResolver::resolve_fx(&elements, ElementId(1), "q"), None);
    }

    #[test]
    fn test_unknown_member_is_part_of_sid() {
        assert_eq!(split_accessor("rotate.001"), ("rotate.001", SidAccessor::Whole));
        assert_eq!(split_accessor("translate.X"), ("translate", SidAccessor::Member(0)));
    }
}
