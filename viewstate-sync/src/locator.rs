//! Pure lookups over the tree: is the action available at a caret, and which proxy
//! body should receive the mirrored property.
//!
//! Every scan is bounded to the structural region the presenter convention expects
//! and resolves ties by taking the first match in document order.

use tracing::debug;

use crate::ast::{ClassBody, ClassDecl, PropertyDecl};
use crate::config::SyncConfig;
use crate::error::{LocateError, StructuralViolation};
use crate::tree::{NodeId, SyntaxTree};

/// Where a mirrored property has to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub body: ClassBody,
    pub property_name: String,
}

/// Walks leaf → property → class body → class and checks the class is the state class.
pub fn enclosing_state_property(
    tree: &SyntaxTree,
    caret: NodeId,
    config: &SyncConfig,
) -> Option<PropertyDecl> {
    if !tree.kind(caret).is_leaf() {
        return None;
    }
    let property = PropertyDecl::cast(tree, tree.parent(caret)?)?;
    let body = ClassBody::cast(tree, tree.parent(property.syntax())?)?;
    let class = ClassDecl::cast(tree, tree.parent(body.syntax())?)?;
    (class.name(tree)? == config.state_class).then_some(property)
}

/// Availability predicate for the caret leaf.
pub fn is_applicable(tree: &SyntaxTree, caret: NodeId, config: &SyncConfig) -> bool {
    enclosing_state_property(tree, caret, config).is_some()
}

/// First top-level class whose name contains `marker`.
pub fn find_presenter_class(tree: &SyntaxTree, marker: &str) -> Option<ClassDecl> {
    tree.children(tree.root())
        .iter()
        .filter_map(|&c| ClassDecl::cast(tree, c))
        .find(|class| class.name(tree).is_some_and(|name| name.contains(marker)))
}

/// First property of the class body named exactly `name`.
pub fn find_proxy_property(tree: &SyntaxTree, class: ClassDecl, name: &str) -> Option<PropertyDecl> {
    class
        .body(tree)?
        .properties(tree)
        .find(|p| p.name(tree) == Some(name))
}

/// Resolves the member list of the proxy object that should mirror `property_name`.
pub fn locate_targets(
    tree: &SyntaxTree,
    property_name: &str,
    config: &SyncConfig,
) -> Result<ProxyTarget, LocateError> {
    let presenter = find_presenter_class(tree, &config.presenter_marker).ok_or_else(|| {
        LocateError::NoPresenterClass {
            marker: config.presenter_marker.clone(),
        }
    })?;
    let class_name = presenter.name(tree).unwrap_or_default().to_string();
    debug!("Presenter class: {}", class_name);

    let proxy = find_proxy_property(tree, presenter, &config.proxy_property).ok_or_else(|| {
        LocateError::NoProxyProperty {
            class: class_name.clone(),
            property: config.proxy_property.clone(),
        }
    })?;

    let literal = proxy
        .object_literal(tree)
        .ok_or_else(|| StructuralViolation::MissingObjectLiteral {
            property: config.proxy_property.clone(),
        })?;

    let body = literal
        .declaration(tree)
        .and_then(|decl| decl.body(tree))
        .ok_or_else(|| StructuralViolation::MissingBody {
            property: config.proxy_property.clone(),
        })?;

    debug!(
        "Proxy body for '{}' found in {}.{}",
        property_name, class_name, config.proxy_property
    );
    Ok(ProxyTarget {
        body,
        property_name: property_name.to_string(),
    })
}

/// Whether the body already declares a property called `name` (exact match).
pub fn has_member(tree: &SyntaxTree, body: ClassBody, name: &str) -> bool {
    body.properties(tree).any(|p| p.name(tree) == Some(name))
}

/// Every property declared directly in a state class body, in document order.
pub fn state_properties(tree: &SyntaxTree, config: &SyncConfig) -> Vec<PropertyDecl> {
    tree.descendants(tree.root())
        .filter_map(|n| ClassDecl::cast(tree, n))
        .filter(|class| class.name(tree) == Some(config.state_class.as_str()))
        .filter_map(|class| class.body(tree))
        .flat_map(|body| body.properties(tree).collect::<Vec<_>>())
        .collect()
}

/// Name leaf of the first state property called `name`, usable as a caret.
pub fn find_state_property(tree: &SyntaxTree, name: &str, config: &SyncConfig) -> Option<NodeId> {
    state_properties(tree, config)
        .into_iter()
        .find(|p| p.name(tree) == Some(name))
        .and_then(|p| p.name_token(tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::tree::SyntaxKind;

    const CONTRACT: &str = r#"interface FeedContract {
    class State {
        val loading: Boolean = false
        val items: List<Item> = emptyList()
    }
}

class FeedPresenter : BasePresenter<FeedContract.State>() {
    val viewStateProxy = object : ViewStateProxy {
        override val loading by owner.delegateFor("loading")
    }
}
"#;

    fn config() -> SyncConfig {
        SyncConfig::default()
    }

    fn leaf_with_text(tree: &SyntaxTree, text: &str) -> NodeId {
        tree.leaves(tree.root())
            .find(|&l| tree.text(l) == Some(text))
            .unwrap()
    }

    #[test]
    fn test_applicable_on_state_property_name() {
        let tree = parse_file(CONTRACT).unwrap();
        let caret = leaf_with_text(&tree, "items");
        assert!(is_applicable(&tree, caret, &config()));
        let prop = enclosing_state_property(&tree, caret, &config()).unwrap();
        assert_eq!(prop.name(&tree), Some("items"));
    }

    #[test]
    fn test_applicable_on_val_keyword() {
        let tree = parse_file(CONTRACT).unwrap();
        let caret = leaf_with_text(&tree, "val");
        assert_eq!(tree.kind(caret), SyntaxKind::Keyword);
        assert!(is_applicable(&tree, caret, &config()));
    }

    #[test]
    fn test_not_applicable_inside_initializer() {
        let tree = parse_file(CONTRACT).unwrap();
        // `emptyList` lives in an Expression node, one level too deep
        let caret = leaf_with_text(&tree, "emptyList");
        assert!(!is_applicable(&tree, caret, &config()));
    }

    #[test]
    fn test_not_applicable_outside_state() {
        let tree = parse_file(CONTRACT).unwrap();
        let caret = leaf_with_text(&tree, "viewStateProxy");
        assert!(!is_applicable(&tree, caret, &config()));
        assert!(!is_applicable(&tree, tree.root(), &config()));
    }

    #[test]
    fn test_state_name_must_match_exactly() {
        for name in ["ViewState", "state", "StateHolder"] {
            let src = format!("class {} {{\n    val loading = false\n}}", name);
            let tree = parse_file(&src).unwrap();
            let caret = leaf_with_text(&tree, "loading");
            assert!(!is_applicable(&tree, caret, &config()), "{}", name);
        }
    }

    #[test]
    fn test_locate_targets() {
        let tree = parse_file(CONTRACT).unwrap();
        let target = locate_targets(&tree, "items", &config()).unwrap();
        assert_eq!(target.property_name, "items");
        assert!(has_member(&tree, target.body, "loading"));
        assert!(!has_member(&tree, target.body, "items"));
        assert!(!has_member(&tree, target.body, "Loading"));
    }

    #[test]
    fn test_first_presenter_wins() {
        let src = "class APresenter {\n    val viewStateProxy = object : P {\n        override val a by owner.delegateFor(\"a\")\n    }\n}\nclass BPresenter {\n    val viewStateProxy = object : P {\n    }\n}\n";
        let tree = parse_file(src).unwrap();
        let target = locate_targets(&tree, "x", &config()).unwrap();
        assert!(has_member(&tree, target.body, "a"));
    }

    #[test]
    fn test_missing_presenter() {
        let tree = parse_file("class State {\n    val a = 1\n}\n").unwrap();
        assert_eq!(
            locate_targets(&tree, "a", &config()),
            Err(LocateError::NoPresenterClass {
                marker: "Presenter".to_string()
            })
        );
    }

    #[test]
    fn test_missing_proxy_property() {
        let tree = parse_file("class FeedPresenter {\n    val other = 1\n}\n").unwrap();
        assert_eq!(
            locate_targets(&tree, "a", &config()),
            Err(LocateError::NoProxyProperty {
                class: "FeedPresenter".to_string(),
                property: "viewStateProxy".to_string(),
            })
        );
    }

    #[test]
    fn test_proxy_without_object_literal() {
        let tree = parse_file("class FeedPresenter {\n    val viewStateProxy = createProxy()\n}\n").unwrap();
        assert_eq!(
            locate_targets(&tree, "a", &config()),
            Err(LocateError::Structural(StructuralViolation::MissingObjectLiteral {
                property: "viewStateProxy".to_string()
            }))
        );
    }

    #[test]
    fn test_proxy_object_without_body() {
        let tree = parse_file("class FeedPresenter {\n    val viewStateProxy = object : ViewStateProxy\n}\n").unwrap();
        assert_eq!(
            locate_targets(&tree, "a", &config()),
            Err(LocateError::Structural(StructuralViolation::MissingBody {
                property: "viewStateProxy".to_string()
            }))
        );
    }

    #[test]
    fn test_state_properties_and_lookup() {
        let tree = parse_file(CONTRACT).unwrap();
        let names: Vec<_> = state_properties(&tree, &config())
            .into_iter()
            .filter_map(|p| p.name(&tree))
            .collect();
        assert_eq!(names, vec!["loading", "items"]);

        let caret = find_state_property(&tree, "items", &config()).unwrap();
        assert_eq!(tree.text(caret), Some("items"));
        assert!(find_state_property(&tree, "missing", &config()).is_none());
    }
}
