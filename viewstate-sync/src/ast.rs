//! Typed views over [`SyntaxTree`] nodes.
//!
//! A handle can only be obtained through `cast`, which checks the node kind, so code
//! holding a `PropertyDecl` never has to re-check what it points at.

use crate::tree::{NodeId, SyntaxKind, SyntaxTree};

macro_rules! ast_node {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NodeId);

        impl $name {
            pub fn cast(tree: &SyntaxTree, id: NodeId) -> Option<Self> {
                (tree.kind(id) == SyntaxKind::$kind).then_some(Self(id))
            }

            pub fn syntax(self) -> NodeId {
                self.0
            }
        }
    };
}

ast_node!(
    /// `class` or `interface` declaration.
    ClassDecl => Class
);
ast_node!(
    /// Brace-delimited member list of a class or object.
    ClassBody => ClassBody
);
ast_node!(
    /// `val` / `var` declaration.
    PropertyDecl => Property
);
ast_node!(
    /// `object : T { ... }` used as an expression.
    ObjectLiteral => ObjectLiteral
);
ast_node!(ObjectDecl => ObjectDeclaration);

impl ClassDecl {
    pub fn name(self, tree: &SyntaxTree) -> Option<&str> {
        tree.name_of(self.0)
    }

    pub fn body(self, tree: &SyntaxTree) -> Option<ClassBody> {
        tree.first_child_of_kind(self.0, SyntaxKind::ClassBody)
            .and_then(|id| ClassBody::cast(tree, id))
    }
}

impl ClassBody {
    /// Member declarations in document order, trivia and braces excluded.
    pub fn declarations(self, tree: &SyntaxTree) -> impl Iterator<Item = NodeId> + '_ {
        tree.children(self.0)
            .iter()
            .copied()
            .filter(move |&c| tree.kind(c).is_declaration())
    }

    pub fn properties(self, tree: &SyntaxTree) -> impl Iterator<Item = PropertyDecl> + '_ {
        tree.children(self.0)
            .iter()
            .filter_map(move |&c| PropertyDecl::cast(tree, c))
    }

    pub fn l_brace(self, tree: &SyntaxTree) -> Option<NodeId> {
        tree.first_child_of_kind(self.0, SyntaxKind::LBrace)
    }

    /// The closing brace, which the parser always places as the last child.
    pub fn r_brace(self, tree: &SyntaxTree) -> Option<NodeId> {
        tree.children(self.0)
            .last()
            .copied()
            .filter(|&c| tree.kind(c) == SyntaxKind::RBrace)
    }
}

impl PropertyDecl {
    pub fn name(self, tree: &SyntaxTree) -> Option<&str> {
        tree.name_of(self.0)
    }

    /// The identifier leaf carrying the property name.
    pub fn name_token(self, tree: &SyntaxTree) -> Option<NodeId> {
        tree.first_child_of_kind(self.0, SyntaxKind::Identifier)
    }

    pub fn object_literal(self, tree: &SyntaxTree) -> Option<ObjectLiteral> {
        tree.first_child_of_kind(self.0, SyntaxKind::ObjectLiteral)
            .and_then(|id| ObjectLiteral::cast(tree, id))
    }
}

impl ObjectLiteral {
    pub fn declaration(self, tree: &SyntaxTree) -> Option<ObjectDecl> {
        tree.first_child_of_kind(self.0, SyntaxKind::ObjectDeclaration)
            .and_then(|id| ObjectDecl::cast(tree, id))
    }
}

impl ObjectDecl {
    pub fn body(self, tree: &SyntaxTree) -> Option<ClassBody> {
        tree.first_child_of_kind(self.0, SyntaxKind::ClassBody)
            .and_then(|id| ClassBody::cast(tree, id))
    }
}
