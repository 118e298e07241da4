//! Construction of the delegated proxy member.

use tracing::debug;

use crate::ast::PropertyDecl;
use crate::config::{render_template, SyncConfig};
use crate::error::{FactoryError, SyncError};
use crate::parser::parse_member;
use crate::tree::{NodeId, SyntaxTree};

/// Turns a textual template into a new, detached node inside `tree`.
pub trait NodeFactory {
    fn create_member(
        &self,
        tree: &mut SyntaxTree,
        template: &str,
        name: &str,
    ) -> Result<NodeId, FactoryError>;
}

/// Substitutes the name into the template and parses the result as a member.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateFactory;

impl NodeFactory for TemplateFactory {
    fn create_member(
        &self,
        tree: &mut SyntaxTree,
        template: &str,
        name: &str,
    ) -> Result<NodeId, FactoryError> {
        let source_text = render_template(template, name);
        let (scratch, member) = parse_member(&source_text).map_err(|error| FactoryError::Parse {
            source_text: source_text.clone(),
            error,
        })?;
        Ok(tree.graft(&scratch, member))
    }
}

/// Builds `override val <name> by owner.delegateFor("<name>")` (or the configured
/// template) as a detached property node.
///
/// `name` comes from an existing declaration, so it is not validated again.
pub fn build_delegated_property(
    tree: &mut SyntaxTree,
    factory: &dyn NodeFactory,
    config: &SyncConfig,
    name: &str,
) -> Result<PropertyDecl, SyncError> {
    let member = factory.create_member(tree, &config.delegate_template, name)?;
    debug!("Synthesized member: {}", tree.render(member));
    PropertyDecl::cast(tree, member).ok_or_else(|| {
        FactoryError::NotAProperty {
            source_text: tree.render(member),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SyntaxKind;

    #[test]
    fn test_build_delegated_property() {
        let mut tree = SyntaxTree::new();
        let prop = build_delegated_property(&mut tree, &TemplateFactory, &SyncConfig::default(), "loading")
            .unwrap();
        assert_eq!(prop.name(&tree), Some("loading"));
        assert_eq!(tree.parent(prop.syntax()), None);
        assert_eq!(
            tree.render(prop.syntax()),
            "override val loading by owner.delegateFor(\"loading\")"
        );
        // Nothing was attached to the file
        assert_eq!(tree.to_string(), "");
    }

    #[test]
    fn test_template_that_is_not_a_property() {
        let config = SyncConfig {
            delegate_template: "fun {name}() = Unit".to_string(),
            ..SyncConfig::default()
        };
        let mut tree = SyntaxTree::new();
        let err = build_delegated_property(&mut tree, &TemplateFactory, &config, "loading").unwrap_err();
        assert_eq!(
            err,
            SyncError::Factory(FactoryError::NotAProperty {
                source_text: "fun loading() = Unit".to_string()
            })
        );
    }

    #[test]
    fn test_template_that_does_not_parse() {
        let config = SyncConfig {
            delegate_template: "val {name} = \"unterminated".to_string(),
            ..SyncConfig::default()
        };
        let mut tree = SyntaxTree::new();
        let err = build_delegated_property(&mut tree, &TemplateFactory, &config, "a").unwrap_err();
        assert!(matches!(err, SyncError::Factory(FactoryError::Parse { .. })));
    }

    #[test]
    fn test_backticked_name_keeps_plain_key() {
        let mut tree = SyntaxTree::new();
        let prop = build_delegated_property(&mut tree, &TemplateFactory, &SyncConfig::default(), "`is`")
            .unwrap();
        assert_eq!(
            tree.render(prop.syntax()),
            "override val `is` by owner.delegateFor(\"is\")"
        );
    }

    struct FixedFactory;

    impl NodeFactory for FixedFactory {
        fn create_member(
            &self,
            tree: &mut SyntaxTree,
            _template: &str,
            name: &str,
        ) -> Result<NodeId, FactoryError> {
            let prop = tree.alloc_node(SyntaxKind::Property);
            let kw = tree.alloc_leaf(SyntaxKind::Keyword, "val");
            let ws = tree.alloc_leaf(SyntaxKind::Whitespace, " ");
            let ident = tree.alloc_leaf(SyntaxKind::Identifier, name);
            for leaf in [kw, ws, ident] {
                tree.append_child(prop, leaf).expect("fresh leaf");
            }
            Ok(prop)
        }
    }

    #[test]
    fn test_custom_factory() {
        let mut tree = SyntaxTree::new();
        let prop = build_delegated_property(&mut tree, &FixedFactory, &SyncConfig::default(), "x").unwrap();
        assert_eq!(tree.render(prop.syntax()), "val x");
    }
}
