//! Per-item operations: tree edits, poses, joints, kinematics, program
//! management and robot-driver control.
//!
//! A handful of verbs take their parameters in a surprising order
//! (`S_Thetas` and `S_Home` send the joint array before the handle,
//! `S_Frame`/`S_Tool` send the pose first, `S_ZoneData` sends the value
//! first). The order is the wire contract; keep it.

use std::time::Duration;

use crate::client::{Client, LONG_TIMEOUT};
use crate::error::Result;
use crate::geometry::{Joints, Pose};
use crate::items::{Item, ItemType};
use crate::matrix::Matrix2D;

/// Result of a program update pass ([`Client::update_program`]).
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramUpdate {
    /// Number of instructions that verified correctly.
    pub valid_instructions: f64,
    /// Estimated cycle time, in seconds.
    pub program_time: f64,
    /// Estimated travel distance, in millimeters.
    pub travel_distance: f64,
    /// 1.0 when the whole path is feasible, the feasible ratio otherwise.
    pub valid_ratio: f64,
    /// Human-readable summary from the simulator.
    pub message: String,
}

impl Client {
    /// Query the type of an item (the wire never carries the tag, so this
    /// is the only way to learn it). Returns a re-tagged copy.
    pub async fn item_type(&mut self, item: Item) -> Result<Item> {
        let channel = self.begin("G_Item_Type").await?;
        channel.send_item(item).await?;
        let tag = channel.recv_int().await?;
        self.finish().await?;
        Ok(Item::new(item.id(), ItemType::from_i32(tag)))
    }

    /// Delete an item (and its children) from the station. The handle is
    /// consumed: the remote object no longer exists afterwards.
    pub async fn remove(&mut self, item: Item) -> Result<()> {
        let channel = self.begin("Remove").await?;
        channel.send_item(item).await?;
        self.finish().await
    }

    /// Attach an item to a new parent, keeping its relative pose.
    pub async fn set_parent(&mut self, item: Item, parent: Item) -> Result<()> {
        let channel = self.begin("S_Parent").await?;
        channel.send_item(item).await?;
        channel.send_item(parent).await?;
        self.finish().await
    }

    /// Attach an item to a new parent, keeping its absolute position.
    pub async fn set_parent_static(&mut self, item: Item, parent: Item) -> Result<()> {
        let channel = self.begin("S_Parent_Static").await?;
        channel.send_item(item).await?;
        channel.send_item(parent).await?;
        self.finish().await
    }

    /// Direct children of an item.
    pub async fn children(&mut self, item: Item) -> Result<Vec<Item>> {
        let channel = self.begin("G_Childs").await?;
        channel.send_item(item).await?;
        let count = channel.recv_int().await?;
        let mut children = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            children.push(channel.recv_item().await?);
        }
        self.finish().await?;
        Ok(children)
    }

    /// Whether the item is shown in the tree and 3D view.
    pub async fn visible(&mut self, item: Item) -> Result<bool> {
        let channel = self.begin("G_Visible").await?;
        channel.send_item(item).await?;
        let visible = channel.recv_int().await?;
        self.finish().await?;
        Ok(visible != 0)
    }

    /// Show or hide an item; `visible_frame` controls the attached frame
    /// (use -1 to leave it unchanged).
    pub async fn set_visible(&mut self, item: Item, visible: bool, visible_frame: i32) -> Result<()> {
        let channel = self.begin("S_Visible").await?;
        channel.send_item(item).await?;
        channel.send_int(visible as i32).await?;
        channel.send_int(visible_frame).await?;
        self.finish().await
    }

    /// Name of an item as shown in the tree.
    pub async fn name(&mut self, item: Item) -> Result<String> {
        let channel = self.begin("G_Name").await?;
        channel.send_item(item).await?;
        let name = channel.recv_line().await?;
        self.finish().await?;
        Ok(name)
    }

    /// Rename an item.
    pub async fn set_name(&mut self, item: Item, name: &str) -> Result<()> {
        let channel = self.begin("S_Name").await?;
        channel.send_item(item).await?;
        channel.send_line(name).await?;
        self.finish().await
    }

    /// Pose of an item relative to its parent.
    pub async fn pose(&mut self, item: Item) -> Result<Pose> {
        let channel = self.begin("G_Hlocal").await?;
        channel.send_item(item).await?;
        let pose = channel.recv_pose().await?;
        self.finish().await?;
        Ok(pose)
    }

    /// Set the pose of an item relative to its parent.
    pub async fn set_pose(&mut self, item: Item, pose: &Pose) -> Result<()> {
        let channel = self.begin("S_Hlocal").await?;
        channel.send_item(item).await?;
        channel.send_pose(pose).await?;
        self.finish().await
    }

    /// Pose of an item relative to the station origin.
    pub async fn pose_abs(&mut self, item: Item) -> Result<Pose> {
        let channel = self.begin("G_Hlocal_Abs").await?;
        channel.send_item(item).await?;
        let pose = channel.recv_pose().await?;
        self.finish().await?;
        Ok(pose)
    }

    /// Set the pose of an item relative to the station origin.
    pub async fn set_pose_abs(&mut self, item: Item, pose: &Pose) -> Result<()> {
        let channel = self.begin("S_Hlocal_Abs").await?;
        channel.send_item(item).await?;
        channel.send_pose(pose).await?;
        self.finish().await
    }

    /// Active reference frame pose of a robot.
    pub async fn pose_frame(&mut self, robot: Item) -> Result<Pose> {
        let channel = self.begin("G_Frame").await?;
        channel.send_item(robot).await?;
        let pose = channel.recv_pose().await?;
        self.finish().await?;
        Ok(pose)
    }

    /// Set a robot's reference frame from a pose.
    pub async fn set_pose_frame(&mut self, robot: Item, frame: &Pose) -> Result<()> {
        let channel = self.begin("S_Frame").await?;
        channel.send_pose(frame).await?;
        channel.send_item(robot).await?;
        self.finish().await
    }

    /// Link a robot's reference frame to a frame item.
    pub async fn set_pose_frame_item(&mut self, robot: Item, frame: Item) -> Result<()> {
        let channel = self.begin("S_Frame_ptr").await?;
        channel.send_item(frame).await?;
        channel.send_item(robot).await?;
        self.finish().await
    }

    /// Active tool pose (TCP) of a robot.
    pub async fn pose_tool(&mut self, robot: Item) -> Result<Pose> {
        let channel = self.begin("G_Tool").await?;
        channel.send_item(robot).await?;
        let pose = channel.recv_pose().await?;
        self.finish().await?;
        Ok(pose)
    }

    /// Set a robot's TCP from a pose.
    pub async fn set_pose_tool(&mut self, robot: Item, tool: &Pose) -> Result<()> {
        let channel = self.begin("S_Tool").await?;
        channel.send_pose(tool).await?;
        channel.send_item(robot).await?;
        self.finish().await
    }

    /// Link a robot's tool to a tool item.
    pub async fn set_pose_tool_item(&mut self, robot: Item, tool: Item) -> Result<()> {
        let channel = self.begin("S_Tool_ptr").await?;
        channel.send_item(tool).await?;
        channel.send_item(robot).await?;
        self.finish().await
    }

    /// Add an empty tool to a robot from a TCP pose.
    pub async fn add_tool(&mut self, robot: Item, tcp: &Pose, name: &str) -> Result<Item> {
        let channel = self.begin("AddToolEmpty").await?;
        channel.send_item(robot).await?;
        channel.send_pose(tcp).await?;
        channel.send_line(name).await?;
        let tool = channel.recv_item().await?;
        self.finish().await?;
        Ok(tool)
    }

    /// Current joints of a robot, or the stored joints of a target.
    pub async fn joints(&mut self, item: Item) -> Result<Joints> {
        let channel = self.begin("G_Thetas").await?;
        channel.send_item(item).await?;
        let values = channel.recv_array().await?;
        self.finish().await?;
        Ok(Joints::from(values))
    }

    /// Set the joints of a robot or target. Array goes first on the wire.
    pub async fn set_joints(&mut self, item: Item, joints: &Joints) -> Result<()> {
        let channel = self.begin("S_Thetas").await?;
        channel.send_array(joints.as_slice()).await?;
        channel.send_item(item).await?;
        self.finish().await
    }

    /// Home joints of a robot.
    pub async fn joints_home(&mut self, robot: Item) -> Result<Joints> {
        let channel = self.begin("G_Home").await?;
        channel.send_item(robot).await?;
        let values = channel.recv_array().await?;
        self.finish().await?;
        Ok(Joints::from(values))
    }

    /// Set the home joints of a robot.
    pub async fn set_joints_home(&mut self, robot: Item, joints: &Joints) -> Result<()> {
        let channel = self.begin("S_Home").await?;
        channel.send_array(joints.as_slice()).await?;
        channel.send_item(robot).await?;
        self.finish().await
    }

    /// Lower and upper joint limits of a robot.
    pub async fn joint_limits(&mut self, robot: Item) -> Result<(Joints, Joints)> {
        let channel = self.begin("G_RobLimits").await?;
        channel.send_item(robot).await?;
        let lower = channel.recv_array().await?;
        let upper = channel.recv_array().await?;
        // Joint type marker, scaled by 1000 on the wire; unused here.
        let _joints_type = channel.recv_int().await?;
        self.finish().await?;
        Ok((Joints::from(lower), Joints::from(upper)))
    }

    /// Forward kinematics: flange pose with respect to the robot base for
    /// the given joints.
    pub async fn solve_fk(&mut self, robot: Item, joints: &Joints) -> Result<Pose> {
        let channel = self.begin("G_FK").await?;
        channel.send_array(joints.as_slice()).await?;
        channel.send_item(robot).await?;
        let pose = channel.recv_pose().await?;
        self.finish().await?;
        Ok(pose)
    }

    /// Inverse kinematics: the joint solution closest to the current
    /// configuration. Empty when the pose is not reachable.
    pub async fn solve_ik(&mut self, robot: Item, pose: &Pose) -> Result<Joints> {
        let channel = self.begin("G_IK").await?;
        channel.send_pose(pose).await?;
        channel.send_item(robot).await?;
        let values = channel.recv_array().await?;
        self.finish().await?;
        Ok(Joints::from(values))
    }

    /// Inverse kinematics, all solutions, one per column.
    pub async fn solve_ik_all(&mut self, robot: Item, pose: &Pose) -> Result<Matrix2D> {
        let channel = self.begin("G_IK_cmpl").await?;
        channel.send_pose(pose).await?;
        channel.send_item(robot).await?;
        let solutions = channel.recv_matrix().await?;
        self.finish().await?;
        Ok(solutions)
    }

    /// Connect to the real robot through its driver. Pass an empty IP to
    /// use the one configured in the simulator.
    pub async fn connect_robot(&mut self, robot: Item, robot_ip: &str) -> Result<bool> {
        let channel = self.begin("Connect").await?;
        channel.send_item(robot).await?;
        channel.send_line(robot_ip).await?;
        let status = channel.recv_int().await?;
        self.finish().await?;
        Ok(status != 0)
    }

    /// Disconnect from the real robot.
    pub async fn disconnect_robot(&mut self, robot: Item) -> Result<bool> {
        let channel = self.begin("Disconnect").await?;
        channel.send_item(robot).await?;
        let status = channel.recv_int().await?;
        self.finish().await?;
        Ok(status != 0)
    }

    /// Whether a robot or program is currently running (moving or busy).
    pub async fn is_busy(&mut self, item: Item) -> Result<bool> {
        let channel = self.begin("IsBusy").await?;
        channel.send_item(item).await?;
        let busy = channel.recv_int().await?;
        self.finish().await?;
        Ok(busy > 0)
    }

    /// Stop a robot or program.
    pub async fn stop(&mut self, item: Item) -> Result<()> {
        let channel = self.begin("Stop").await?;
        channel.send_item(item).await?;
        self.finish().await
    }

    /// Set robot speeds and accelerations; pass -1.0 to leave a value
    /// unchanged. Order: linear speed (mm/s), linear acceleration
    /// (mm/s^2), joint speed (deg/s), joint acceleration (deg/s^2).
    pub async fn set_speed(
        &mut self,
        robot: Item,
        linear_speed: f64,
        linear_accel: f64,
        joint_speed: f64,
        joint_accel: f64,
    ) -> Result<()> {
        let channel = self.begin("S_Speed4").await?;
        channel.send_item(robot).await?;
        channel
            .send_array(&[linear_speed, linear_accel, joint_speed, joint_accel])
            .await?;
        self.finish().await
    }

    /// Set the rounding (zone data) for robot movements; -1.0 for fine
    /// (accurate) movements.
    pub async fn set_rounding(&mut self, robot: Item, rounding: f64) -> Result<()> {
        let channel = self.begin("S_ZoneData").await?;
        channel.send_int((rounding * 1000.0) as i32).await?;
        channel.send_item(robot).await?;
        self.finish().await
    }

    /// Generate a program file from a program item.
    pub async fn make_program(&mut self, program: Item, path: &str) -> Result<bool> {
        let channel = self.begin("MakeProg").await?;
        channel.send_item(program).await?;
        channel.send_line(path).await?;
        let status = channel.recv_int().await?;
        let _generation_log = channel.recv_line().await?;
        self.finish().await?;
        Ok(status > 1)
    }

    /// Append a move instruction to a program, addressing a target item.
    /// `linear` selects linear interpolation over joint interpolation.
    pub async fn add_move_instruction(
        &mut self,
        program: Item,
        target: Item,
        linear: bool,
    ) -> Result<()> {
        let channel = self.begin("Add_INSMOVE").await?;
        channel.send_item(target).await?;
        channel.send_item(program).await?;
        channel.send_int(if linear { 2 } else { 1 }).await?;
        self.finish().await
    }

    /// Start a program (non-blocking; poll with [`Client::is_busy`]).
    /// Returns the number of instructions that passed the quick check run
    /// before execution.
    pub async fn run_program_item(&mut self, program: Item) -> Result<i32> {
        let channel = self.begin("RunProg").await?;
        channel.send_item(program).await?;
        let instructions = channel.recv_int().await?;
        self.finish().await?;
        Ok(instructions)
    }

    /// Verify a program against the robot and path constraints,
    /// optionally with collision checking. Long-running: the receive uses
    /// the caller's `timeout` budget.
    pub async fn update_program(
        &mut self,
        program: Item,
        collision_check: bool,
        timeout: Duration,
        mm_step: f64,
        deg_step: f64,
    ) -> Result<ProgramUpdate> {
        let channel = self.begin("Update2").await?;
        channel.send_item(program).await?;
        channel
            .send_array(&[collision_check as i32 as f64, mm_step, deg_step])
            .await?;
        let saved = channel.set_timeout(timeout);
        let result = channel.recv_array().await;
        channel.set_timeout(saved);
        let values = result?;
        let message = channel.recv_line().await?;
        self.finish().await?;
        Ok(ProgramUpdate {
            valid_instructions: values.first().copied().unwrap_or(0.0),
            program_time: values.get(1).copied().unwrap_or(0.0),
            travel_distance: values.get(2).copied().unwrap_or(0.0),
            valid_ratio: values.get(3).copied().unwrap_or(0.0),
            message,
        })
    }

    /// Check a joint movement for collisions. Returns the number of
    /// colliding pairs (0 means the move is collision-free).
    pub async fn move_test(
        &mut self,
        robot: Item,
        from: &Joints,
        to: &Joints,
        min_step_deg: f64,
    ) -> Result<i32> {
        let channel = self.begin("CollisionMove").await?;
        channel.send_item(robot).await?;
        channel.send_array(from.as_slice()).await?;
        channel.send_array(to.as_slice()).await?;
        channel.send_int((min_step_deg * 1000.0) as i32).await?;
        let saved = channel.set_timeout(LONG_TIMEOUT);
        let result = channel.recv_int().await;
        channel.set_timeout(saved);
        let collisions = result?;
        self.finish().await?;
        Ok(collisions)
    }
}
