//! # tree-types
//!
//! Treesystem data model for the 0k-Tree zero-knowledge cloud sync core.
//!
//! This crate provides the passive entities shared by every other 0k-Tree crate:
//! - [`NodeId`], [`CloudNodeId`], [`OperationId`] - local identity types
//! - [`UserId`], [`TreeId`], [`CloudId`], [`DirPrefix`] - namespace and cloud identity
//! - [`Node`], [`Trunk`], [`Anchor`], [`ShareList`] - the node graph
//! - [`CloudNode`], [`CloudPath`], [`CloudLocator`] - the shadow index of server-only state
//! - [`NormalizedName`] - the sibling-name comparison rule
//! - [`TreeError`] - the error taxonomy
//!
//! Nodes never hold references to each other. Every relationship (parent,
//! pointee, anchor owner) is an identifier that is resolved through a
//! transaction by `tree-core`.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cloud;
mod error;
mod ids;
mod name;
mod node;
mod path;
mod user;

pub use cloud::{CloudFileExtension, CloudLocator, CloudNode, CloudNodeState, CloudPath, Region};
pub use error::{TreeError, TreeResult};
pub use ids::{CloudId, CloudNodeId, DirPrefix, NodeId, OperationId, TreeId, UserId};
pub use name::{split_extension, NormalizedName};
pub use node::{
    unix_now, Anchor, EncryptionKey, Node, NodeKind, Permissions, ShareList, Trunk,
    ENCRYPTION_KEY_SIZE,
};
pub use path::TreesystemPath;
pub use user::User;
