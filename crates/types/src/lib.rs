//! # Nodeflow Types
//!
//! Shared data definitions for the nodeflow runtime: the node arena built from
//! a declarative model document, the environment table attached to it, and the
//! [`ActionResult`] value every executed action hands back to the interpreter.
//!
//! Nothing in this crate executes anything. The engine crate consumes these
//! types; hosts use them to load and inspect models before handing them over.

pub mod model;
pub mod node;
pub mod result;

pub use model::{EnvironmentTable, Model, ModelError, Section};
pub use node::{Node, NodeId};
pub use result::ActionResult;
