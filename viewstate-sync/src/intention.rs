//! The "add to ViewStateProxy" action and the host-side pieces it runs in: the
//! document it edits and the write scope guarding every mutation.

use std::ops::{Deref, DerefMut};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{LocateError, SyncError};
use crate::locator::{
    enclosing_state_property, find_state_property, has_member, is_applicable, locate_targets,
    state_properties,
};
use crate::mutator::insert_member;
use crate::parser::{parse_file, ParseError};
use crate::synth::{build_delegated_property, NodeFactory, TemplateFactory};
use crate::tree::{NodeId, SyntaxTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Label data shown in the host's action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
    pub text: String,
    pub family_name: String,
    pub priority: Priority,
}

/// A caret-triggered source transformation.
pub trait Intention {
    fn presentation(&self) -> Presentation;

    /// Must be cheap and never fail.
    fn is_available(&self, tree: &SyntaxTree, caret: NodeId) -> bool;

    /// Runs inside an already acquired write scope.
    fn invoke(&self, scope: &mut WriteAction<'_>, caret: NodeId) -> Result<SyncOutcome, SyncError>;
}

/// Successful results of an invocation; only `Inserted` changes the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Inserted { property: String, member: NodeId },
    AlreadyMirrored { property: String },
    NoProxyProperty { class: String },
}

impl SyncOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, SyncOutcome::Inserted { .. })
    }
}

/// Mirrors a `State` property into the presenter's `viewStateProxy` object.
pub struct MirrorPropertyIntention<F: NodeFactory = TemplateFactory> {
    config: SyncConfig,
    factory: F,
}

impl MirrorPropertyIntention {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_factory(config, TemplateFactory)
    }
}

impl<F: NodeFactory> MirrorPropertyIntention<F> {
    pub fn with_factory(config: SyncConfig, factory: F) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl<F: NodeFactory> Intention for MirrorPropertyIntention<F> {
    fn presentation(&self) -> Presentation {
        Presentation {
            text: format!("Add property to {}", self.config.proxy_property),
            family_name: "Presenter view state".to_string(),
            priority: Priority::High,
        }
    }

    fn is_available(&self, tree: &SyntaxTree, caret: NodeId) -> bool {
        is_applicable(tree, caret, &self.config)
    }

    fn invoke(&self, scope: &mut WriteAction<'_>, caret: NodeId) -> Result<SyncOutcome, SyncError> {
        let tree: &mut SyntaxTree = scope;

        let property = enclosing_state_property(tree, caret, &self.config)
            .ok_or(SyncError::NotApplicable)?;
        let name = property
            .name(tree)
            .ok_or(SyncError::NotApplicable)?
            .to_string();

        let target = match locate_targets(tree, &name, &self.config) {
            Ok(target) => target,
            Err(LocateError::NoProxyProperty { class, property }) => {
                debug!("{} has no {}; nothing to do", class, property);
                return Ok(SyncOutcome::NoProxyProperty { class });
            }
            Err(err) => {
                if matches!(err, LocateError::Structural(_)) {
                    warn!("Presenter shape not recognised: {}", err);
                }
                return Err(err.into());
            }
        };

        if has_member(tree, target.body, &name) {
            debug!("'{}' is already mirrored", name);
            return Ok(SyncOutcome::AlreadyMirrored { property: name });
        }

        let member = build_delegated_property(tree, &self.factory, &self.config, &name)?;
        insert_member(tree, target.body, member.syntax(), &self.config.indent_unit)?;
        info!("Mirrored '{}' into {}", name, self.config.proxy_property);

        Ok(SyncOutcome::Inserted {
            property: name,
            member: member.syntax(),
        })
    }
}

/// An editable source file.
#[derive(Debug, Clone)]
pub struct Document {
    tree: SyntaxTree,
    modification_count: u64,
}

impl Document {
    pub fn new(tree: SyntaxTree) -> Self {
        Self {
            tree,
            modification_count: 0,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parse_file(text).map(Self::new)
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    pub fn text(&self) -> String {
        self.tree.to_string()
    }

    /// Number of committed write scopes that changed the tree.
    pub fn modification_count(&self) -> u64 {
        self.modification_count
    }

    /// Acquires exclusive write access. Changes are kept only if the scope is
    /// committed; dropping it restores the tree as it was at acquisition.
    pub fn write(&mut self) -> WriteAction<'_> {
        let snapshot = self.tree.clone();
        let start_revision = self.tree.revision();
        WriteAction {
            document: self,
            snapshot: Some(snapshot),
            start_revision,
        }
    }

    /// Runs an intention in its own write scope, committing only on success.
    pub fn run(&mut self, intention: &dyn Intention, caret: NodeId) -> Result<SyncOutcome, SyncError> {
        let mut scope = self.write();
        let outcome = intention.invoke(&mut scope, caret)?;
        scope.commit();
        Ok(outcome)
    }
}

/// Exclusive, scoped mutation access to a [`Document`].
pub struct WriteAction<'a> {
    document: &'a mut Document,
    snapshot: Option<SyntaxTree>,
    start_revision: u64,
}

impl WriteAction<'_> {
    /// Keeps the changes made in this scope. Returns whether anything changed.
    pub fn commit(mut self) -> bool {
        self.snapshot = None;
        let changed = self.document.tree.revision() != self.start_revision;
        if changed {
            self.document.modification_count += 1;
        }
        changed
    }
}

impl Deref for WriteAction<'_> {
    type Target = SyntaxTree;

    fn deref(&self) -> &SyntaxTree {
        &self.document.tree
    }
}

impl DerefMut for WriteAction<'_> {
    fn deref_mut(&mut self) -> &mut SyntaxTree {
        &mut self.document.tree
    }
}

impl Drop for WriteAction<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            if self.document.tree.revision() != self.start_revision {
                debug!("Write scope released without commit; rolling back");
                self.document.tree = snapshot;
            }
        }
    }
}

/// Mirrors every state property, in document order, each in its own write scope.
///
/// Stops at the first error; earlier insertions stay committed.
pub fn sync_all<F: NodeFactory>(
    document: &mut Document,
    intention: &MirrorPropertyIntention<F>,
) -> Result<Vec<SyncOutcome>, SyncError> {
    let mut names: Vec<String> = Vec::new();
    for property in state_properties(document.tree(), intention.config()) {
        if let Some(name) = property.name(document.tree()) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }

    let mut outcomes = Vec::with_capacity(names.len());
    for name in names {
        let Some(caret) = find_state_property(document.tree(), &name, intention.config()) else {
            continue;
        };
        outcomes.push(document.run(intention, caret)?);
    }
    Ok(outcomes)
}

/// Names of state properties that have no member in the proxy object yet.
pub fn missing_mirrors(tree: &SyntaxTree, config: &SyncConfig) -> Result<Vec<String>, LocateError> {
    let mut missing: Vec<String> = Vec::new();
    for property in state_properties(tree, config) {
        let Some(name) = property.name(tree) else {
            continue;
        };
        let target = locate_targets(tree, name, config)?;
        if !has_member(tree, target.body, name) && !missing.iter().any(|m| m == name) {
            missing.push(name.to_string());
        }
    }
    Ok(missing)
}
