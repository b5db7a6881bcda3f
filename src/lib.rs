//! robolink — Rust client for the RoboDK simulator's TCP API.
//!
//! This library provides the core components for driving a RoboDK
//! instance over its local TCP protocol:
//!
//! - `client` - connection lifecycle and the full operation surface
//! - `protocol` - wire framing primitives and status decoding
//! - `geometry` - pose and joint value types
//! - `matrix` - growable column-major buffer for batched transfers
//! - `items` - opaque item handles and protocol constants
//! - `launcher` - starting the simulator when it is not running
//!
//! # Usage
//!
//! ```ignore
//! use robolink::{Client, ClientConfig, ItemType, Pose};
//!
//! let mut rdk = Client::connect_or_start(ClientConfig::default()).await?;
//! let robot = rdk.item_of_type("UR10", ItemType::Robot).await?;
//! rdk.move_joints(robot, Pose::translation(200.0, 0.0, 500.0), true).await?;
//! ```
//!
//! One client drives one connection and one request at a time; for
//! concurrent multi-robot control, open one client per robot.

pub mod client;
pub mod error;
pub mod geometry;
pub mod items;
pub mod launcher;
pub mod matrix;
pub mod protocol;

pub use client::{Client, ClientConfig, ProgramUpdate, Target, VersionInfo, DEFAULT_PORT};
pub use error::{LinkError, Result};
pub use geometry::{Joints, Pose, MAX_DOF};
pub use items::{Item, ItemType, Projection, RunMode};
pub use matrix::Matrix2D;
