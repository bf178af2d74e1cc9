//! Connection layer (internal)
//!
//! This module handles the transport, call correlation, inbound dispatch and
//! the tree of remote objects.
//!
//! **Note**: This module is exposed publicly only for integration testing purposes.
//! The types and APIs in this module are considered internal implementation details
//! and may change without notice. User code should not depend on these types directly.

#[doc(hidden)]
pub mod channel;
#[doc(hidden)]
pub mod channel_owner;
#[doc(hidden)]
pub mod connection;
#[doc(hidden)]
pub mod message;
#[doc(hidden)]
pub mod object_factory;
#[doc(hidden)]
pub mod object_tree;
#[doc(hidden)]
pub mod transport;
