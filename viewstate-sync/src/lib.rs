pub mod ast;
pub mod config;
pub mod diff;
pub mod error;
pub mod intention;
pub mod lexer;
pub mod locator;
pub mod mutator;
pub mod parser;
pub mod state;
pub mod synth;
pub mod tree;


pub use config::SyncConfig;
pub use diff::{generate_unified_diff, print_diff, DiffStats};
pub use error::{FactoryError, LocateError, StructuralViolation, SyncError};
pub use intention::{
    missing_mirrors, sync_all, Document, Intention, MirrorPropertyIntention, Presentation,
    Priority, SyncOutcome, WriteAction,
};
pub use parser::{parse_file, ParseError};
pub use tree::{NodeId, SyntaxKind, SyntaxTree};
