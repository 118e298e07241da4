//! Structural insertion of a member into a class body.

use tracing::debug;

use crate::ast::ClassBody;
use crate::error::{StructuralViolation, SyncError};
use crate::tree::{NodeId, SyntaxKind, SyntaxTree};

/// Inserts the detached `member` as the last declaration of `body`, one member per
/// line, directly ahead of the closing brace.
///
/// The closing brace is resolved before anything is touched, so a body without one
/// fails with no change to the tree.
pub fn insert_member(
    tree: &mut SyntaxTree,
    body: ClassBody,
    member: NodeId,
    indent_unit: &str,
) -> Result<(), SyncError> {
    let anchor = body
        .r_brace(tree)
        .ok_or(StructuralViolation::MissingClosingBrace)?;

    let newline = line_terminator(tree, body);
    let closing_indent = body
        .l_brace(tree)
        .map(|brace| tree.line_indent(brace))
        .unwrap_or_default();
    let member_indent = body
        .declarations(tree)
        .last()
        .filter(|&decl| starts_line(tree, decl))
        .map(|decl| tree.line_indent(decl))
        .unwrap_or_else(|| format!("{}{}", closing_indent, indent_unit));

    if body.declarations(tree).next().is_none() {
        clear_placeholder_whitespace(tree, body);
    }

    let before_close = tree.prev_sibling(anchor);
    let line_break = before_close.filter(|&ws| is_line_break(tree, ws));
    let member_ws = tree.alloc_leaf(SyntaxKind::Whitespace, format!("{}{}", newline, member_indent));

    match line_break {
        Some(ws) => {
            tree.insert_before(ws, member_ws)?;
            tree.insert_before(ws, member)?;
        }
        None => {
            if let Some(ws) = before_close.filter(|&n| tree.kind(n) == SyntaxKind::Whitespace) {
                tree.detach(ws);
            }
            let closing_ws = tree.alloc_leaf(SyntaxKind::Whitespace, format!("{}{}", newline, closing_indent));
            tree.insert_before(anchor, member_ws)?;
            tree.insert_before(anchor, member)?;
            tree.insert_before(anchor, closing_ws)?;
        }
    }

    debug!("Inserted member at index {:?}", tree.child_index(member));
    Ok(())
}

/// Drops whitespace between the braces of a body holding nothing else, so the first
/// member does not end up next to a stray blank line.
fn clear_placeholder_whitespace(tree: &mut SyntaxTree, body: ClassBody) {
    let inner: Vec<NodeId> = tree
        .children(body.syntax())
        .iter()
        .copied()
        .filter(|&c| !matches!(tree.kind(c), SyntaxKind::LBrace | SyntaxKind::RBrace))
        .collect();
    if inner.iter().all(|&c| tree.kind(c) == SyntaxKind::Whitespace) {
        for ws in inner {
            tree.detach(ws);
        }
    }
}

/// `\r\n` when the body, or failing that the file, already breaks lines that way.
fn line_terminator(tree: &SyntaxTree, body: ClassBody) -> &'static str {
    let first_break = |id: NodeId| {
        tree.leaves(id)
            .filter(|&leaf| tree.kind(leaf) == SyntaxKind::Whitespace)
            .filter_map(|leaf| tree.text(leaf))
            .find(|text| text.contains('\n'))
    };
    match first_break(body.syntax()).or_else(|| first_break(tree.root())) {
        Some(text) if text.contains("\r\n") => "\r\n",
        _ => "\n",
    }
}

fn is_line_break(tree: &SyntaxTree, node: NodeId) -> bool {
    tree.kind(node) == SyntaxKind::Whitespace && tree.text(node).is_some_and(|t| t.contains('\n'))
}

fn starts_line(tree: &SyntaxTree, node: NodeId) -> bool {
    tree.prev_sibling(node)
        .is_some_and(|prev| is_line_break(tree, prev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ClassDecl;
    use crate::parser::{parse_file, parse_member};

    fn first_body(tree: &SyntaxTree) -> ClassBody {
        let class = ClassDecl::cast(tree, tree.children(tree.root())[0]).unwrap();
        class.body(tree).unwrap()
    }

    fn member(tree: &mut SyntaxTree, text: &str) -> NodeId {
        let (scratch, id) = parse_member(text).unwrap();
        tree.graft(&scratch, id)
    }

    #[test]
    fn test_insert_into_empty_body_with_placeholder() {
        let mut tree = parse_file("class P {\n}").unwrap();
        let body = first_body(&tree);
        let m = member(&mut tree, "val a = 1");
        insert_member(&mut tree, body, m, "    ").unwrap();
        assert_eq!(tree.to_string(), "class P {\n    val a = 1\n}");
    }

    #[test]
    fn test_insert_into_single_line_empty_body() {
        for src in ["class P {}", "class P { }"] {
            let mut tree = parse_file(src).unwrap();
            let body = first_body(&tree);
            let m = member(&mut tree, "val a = 1");
            insert_member(&mut tree, body, m, "  ").unwrap();
            assert_eq!(tree.to_string(), "class P {\n  val a = 1\n}");
        }
    }

    #[test]
    fn test_insert_after_existing_members() {
        let mut tree = parse_file("class P {\n\tval a = 1\n\n\tval b = 2\n}\n").unwrap();
        let body = first_body(&tree);
        let m = member(&mut tree, "val c = 3");
        insert_member(&mut tree, body, m, "    ").unwrap();
        // Indentation is copied from the last member, not from the configured unit
        assert_eq!(tree.to_string(), "class P {\n\tval a = 1\n\n\tval b = 2\n\tval c = 3\n}\n");

        let names: Vec<_> = body.properties(&tree).filter_map(|p| p.name(&tree)).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_new_member_precedes_closing_brace() {
        let mut tree = parse_file("class P {\n    val a = 1 // keep\n}").unwrap();
        let body = first_body(&tree);
        let m = member(&mut tree, "val b = 2");
        insert_member(&mut tree, body, m, "    ").unwrap();
        let significant: Vec<_> = tree
            .children(body.syntax())
            .iter()
            .copied()
            .filter(|&c| !tree.kind(c).is_trivia())
            .collect();
        let n = significant.len();
        assert_eq!(significant[n - 2], m);
        assert_eq!(tree.kind(significant[n - 1]), SyntaxKind::RBrace);
        assert_eq!(tree.to_string(), "class P {\n    val a = 1 // keep\n    val b = 2\n}");
    }

    #[test]
    fn test_nested_indent() {
        let src = "class P {\n    val proxy = object : X {\n    }\n}";
        let mut tree = parse_file(src).unwrap();
        let body = tree
            .descendants(tree.root())
            .filter_map(|n| ClassBody::cast(&tree, n))
            .nth(1)
            .unwrap();
        let m = member(&mut tree, "val a = 1");
        insert_member(&mut tree, body, m, "    ").unwrap();
        assert_eq!(
            tree.to_string(),
            "class P {\n    val proxy = object : X {\n        val a = 1\n    }\n}"
        );
    }

    #[test]
    fn test_crlf_line_endings_are_kept() {
        let src = "class P {\r\n    val proxy = object : X {\r\n    }\r\n}\r\n";
        let mut tree = parse_file(src).unwrap();
        let body = tree
            .descendants(tree.root())
            .filter_map(|n| ClassBody::cast(&tree, n))
            .nth(1)
            .unwrap();
        let m = member(&mut tree, "val a = 1");
        insert_member(&mut tree, body, m, "    ").unwrap();
        assert_eq!(
            tree.to_string(),
            "class P {\r\n    val proxy = object : X {\r\n        val a = 1\r\n    }\r\n}\r\n"
        );

        // A single-line body takes the terminator from the rest of the file
        let mut tree = parse_file("class P {\r\n    val proxy = object : X {}\r\n}\r\n").unwrap();
        let body = tree
            .descendants(tree.root())
            .filter_map(|n| ClassBody::cast(&tree, n))
            .nth(1)
            .unwrap();
        let m = member(&mut tree, "val a = 1");
        insert_member(&mut tree, body, m, "    ").unwrap();
        assert_eq!(
            tree.to_string(),
            "class P {\r\n    val proxy = object : X {\r\n        val a = 1\r\n    }\r\n}\r\n"
        );
    }

    #[test]
    fn test_comment_only_body_keeps_comment() {
        let mut tree = parse_file("class P {\n    // members\n}").unwrap();
        let body = first_body(&tree);
        let m = member(&mut tree, "val a = 1");
        insert_member(&mut tree, body, m, "    ").unwrap();
        assert_eq!(tree.to_string(), "class P {\n    // members\n    val a = 1\n}");
    }

    #[test]
    fn test_missing_closing_brace_leaves_tree_untouched() {
        let mut tree = SyntaxTree::new();
        let class = tree.alloc_node(SyntaxKind::Class);
        let body_id = tree.alloc_node(SyntaxKind::ClassBody);
        let open = tree.alloc_leaf(SyntaxKind::LBrace, "{");
        let ws = tree.alloc_leaf(SyntaxKind::Whitespace, " ");
        let root = tree.root();
        tree.append_child(root, class).unwrap();
        tree.append_child(class, body_id).unwrap();
        tree.append_child(body_id, open).unwrap();
        tree.append_child(body_id, ws).unwrap();
        let before = tree.to_string();

        let body = ClassBody::cast(&tree, body_id).unwrap();
        let m = member(&mut tree, "val a = 1");
        let err = insert_member(&mut tree, body, m, "    ").unwrap_err();
        assert_eq!(err, SyncError::from(StructuralViolation::MissingClosingBrace));
        assert_eq!(tree.to_string(), before);
        assert_eq!(tree.parent(m), None);
    }
}
