//! Move orchestration against the remote motion queue.
//!
//! The simulator executes accepted move commands asynchronously and
//! exposes no request identifiers, so ordering between moves is
//! established entirely by the client: every move first performs a
//! wait-until-idle exchange for the robot, and a blocking move performs
//! one more after the command's status has been decoded.
//!
//! A move target is exactly one of a target item, a joint vector, or a
//! pose. The wire encoding is positional: a one-of-three discriminator,
//! then the joint array slot, then the handle slot, with zero/empty
//! placeholders for the slots the chosen variant does not use.

use std::time::Duration;

use crate::client::Client;
use crate::error::Result;
use crate::geometry::{Joints, Pose};
use crate::items::Item;
use crate::protocol::Channel;

/// Default budget for a robot to finish its current movement.
const WAIT_MOVE_TIMEOUT: Duration = Duration::from_secs(300);

/// Target of a move command: one of the three mutually exclusive forms
/// the protocol can address.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A target item in the station.
    Item(Item),
    /// An explicit joint configuration.
    Joints(Joints),
    /// A cartesian pose (active tool with respect to the active frame).
    Pose(Pose),
}

impl Target {
    /// Wire discriminator for this variant.
    fn tag(&self) -> i32 {
        match self {
            Target::Joints(_) => 1,
            Target::Pose(_) => 2,
            Target::Item(_) => 3,
        }
    }

    /// Encode discriminator, joint-array slot and handle slot. Unused
    /// slots are filled with their empty wire form (count-0 array, null
    /// handle); a pose travels in the array slot as its 16 values.
    async fn send(&self, channel: &mut Channel) -> Result<()> {
        channel.send_int(self.tag()).await?;
        match self {
            Target::Item(item) => {
                channel.send_array(&[]).await?;
                channel.send_item(*item).await?;
            }
            Target::Joints(joints) => {
                channel.send_array(joints.as_slice()).await?;
                channel.send_item(Item::NULL).await?;
            }
            Target::Pose(pose) => {
                channel.send_array(&pose.to_col_major()).await?;
                channel.send_item(Item::NULL).await?;
            }
        }
        Ok(())
    }
}

impl From<Item> for Target {
    fn from(item: Item) -> Self {
        Target::Item(item)
    }
}

impl From<Joints> for Target {
    fn from(joints: Joints) -> Self {
        Target::Joints(joints)
    }
}

impl From<Pose> for Target {
    fn from(pose: Pose) -> Self {
        Target::Pose(pose)
    }
}

/// Interpolation mode of a point-to-point move, as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveKind {
    Joint = 1,
    Linear = 2,
}

impl Client {
    /// Joint move to a target. With `blocking` the call returns only once
    /// the robot reports idle again; otherwise it returns as soon as the
    /// command is queued.
    pub async fn move_joints(
        &mut self,
        robot: Item,
        target: impl Into<Target>,
        blocking: bool,
    ) -> Result<()> {
        self.move_any(robot, MoveKind::Joint, target.into(), blocking)
            .await
    }

    /// Linear move to a target.
    pub async fn move_linear(
        &mut self,
        robot: Item,
        target: impl Into<Target>,
        blocking: bool,
    ) -> Result<()> {
        self.move_any(robot, MoveKind::Linear, target.into(), blocking)
            .await
    }

    /// Circular move through an intermediate target to a final target.
    pub async fn move_circular(
        &mut self,
        robot: Item,
        intermediate: impl Into<Target>,
        target: impl Into<Target>,
        blocking: bool,
    ) -> Result<()> {
        self.wait_move(robot).await?;
        let channel = self.begin("MoveC").await?;
        channel.send_int(3).await?;
        intermediate.into().send(channel).await?;
        target.into().send(channel).await?;
        channel.send_item(robot).await?;
        self.finish().await?;
        if blocking {
            self.wait_move(robot).await?;
        }
        Ok(())
    }

    async fn move_any(
        &mut self,
        robot: Item,
        kind: MoveKind,
        target: Target,
        blocking: bool,
    ) -> Result<()> {
        self.wait_move(robot).await?;
        let channel = self.begin("MoveX").await?;
        channel.send_int(kind as i32).await?;
        target.send(channel).await?;
        channel.send_item(robot).await?;
        self.finish().await?;
        if blocking {
            self.wait_move(robot).await?;
        }
        Ok(())
    }

    /// Block until the robot finishes its current movement (up to five
    /// minutes; use [`Client::wait_move_for`] for a different budget).
    pub async fn wait_move(&mut self, robot: Item) -> Result<()> {
        self.wait_move_for(robot, WAIT_MOVE_TIMEOUT).await
    }

    /// Block until the robot finishes its current movement, waiting at
    /// most `timeout`.
    ///
    /// The exchange acknowledges immediately with a first status; the
    /// second status arrives only once the motion queue reports the item
    /// idle, so that receive runs under the caller's budget instead of
    /// the ordinary per-receive timeout.
    pub async fn wait_move_for(&mut self, robot: Item, timeout: Duration) -> Result<()> {
        let channel = self.begin("WaitMove").await?;
        channel.send_item(robot).await?;
        self.finish().await?;
        self.finish_slow(timeout).await
    }
}
