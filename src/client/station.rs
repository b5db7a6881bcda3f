//! Station-level operations: item lookup, scene edits, program execution
//! and global settings.
//!
//! Each method is one dispatcher exchange: verb line, fixed parameter
//! sends, fixed result receives, trailing status decode. Field order is
//! part of the wire contract and must not be rearranged.

use crate::client::{Client, LONG_TIMEOUT};
use crate::error::Result;
use crate::items::{Item, ItemType, Projection, RunMode};
use crate::matrix::Matrix2D;

/// Simulator build information reported by [`Client::version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub application: String,
    pub bits: i32,
    pub version: String,
    pub build_date: String,
}

impl Client {
    /// Application name, architecture and build of the connected simulator.
    pub async fn version(&mut self) -> Result<VersionInfo> {
        let channel = self.begin("Version").await?;
        let application = channel.recv_line().await?;
        let bits = channel.recv_int().await?;
        let version = channel.recv_line().await?;
        let build_date = channel.recv_line().await?;
        self.finish().await?;
        Ok(VersionInfo {
            application,
            bits,
            version,
            build_date,
        })
    }

    /// Look an item up by name, any type. The returned handle is invalid
    /// (`!is_valid()`) when nothing matched.
    pub async fn item(&mut self, name: &str) -> Result<Item> {
        let channel = self.begin("G_Item").await?;
        channel.send_line(name).await?;
        let item = channel.recv_item().await?;
        self.finish().await?;
        Ok(item)
    }

    /// Look an item up by name, restricted to one type.
    pub async fn item_of_type(&mut self, name: &str, item_type: ItemType) -> Result<Item> {
        let channel = self.begin("G_Item2").await?;
        channel.send_line(name).await?;
        channel.send_int(item_type.to_i32()).await?;
        let item = channel.recv_item().await?;
        self.finish().await?;
        Ok(item)
    }

    /// Names of all items in the open station, optionally filtered by
    /// type.
    pub async fn item_names(&mut self, filter: Option<ItemType>) -> Result<Vec<String>> {
        let channel = match filter {
            None => self.begin("G_List_Items").await?,
            Some(item_type) => {
                let channel = self.begin("G_List_Items_Type").await?;
                channel.send_int(item_type.to_i32()).await?;
                channel
            }
        };
        let count = channel.recv_int().await?;
        let mut names = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            names.push(channel.recv_line().await?);
        }
        self.finish().await?;
        Ok(names)
    }

    /// Handles of all items in the open station, optionally filtered by
    /// type.
    pub async fn items(&mut self, filter: Option<ItemType>) -> Result<Vec<Item>> {
        let channel = match filter {
            None => self.begin("G_List_Items_ptr").await?,
            Some(item_type) => {
                let channel = self.begin("G_List_Items_Type_ptr").await?;
                channel.send_int(item_type.to_i32()).await?;
                channel
            }
        };
        let count = channel.recv_int().await?;
        let mut items = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            items.push(channel.recv_item().await?);
        }
        self.finish().await?;
        Ok(items)
    }

    /// Pop up an item picker in the simulator UI and wait for the user's
    /// choice. Blocks until the user picks or cancels (invalid handle).
    pub async fn pick_item(&mut self, message: &str, filter: Option<ItemType>) -> Result<Item> {
        let filter = filter.unwrap_or(ItemType::Unknown);
        let channel = self.begin("PickItem").await?;
        channel.send_line(message).await?;
        channel.send_int(filter.to_i32()).await?;
        let saved = channel.set_timeout(LONG_TIMEOUT);
        let result = channel.recv_item().await;
        channel.set_timeout(saved);
        let item = result?;
        self.finish().await?;
        Ok(item)
    }

    /// Load a file (station, object, robot, ...) into the station,
    /// optionally attached to a parent item.
    pub async fn load_file(&mut self, path: &str, parent: Option<Item>) -> Result<Item> {
        let channel = self.begin("Add").await?;
        channel.send_line(path).await?;
        channel.send_item(parent.unwrap_or(Item::NULL)).await?;
        let saved = channel.set_timeout(LONG_TIMEOUT);
        let result = channel.recv_item().await;
        channel.set_timeout(saved);
        let item = result?;
        self.finish().await?;
        Ok(item)
    }

    /// Save an item to a file; pass `None` to save the open station.
    pub async fn save(&mut self, path: &str, item: Option<Item>) -> Result<()> {
        let channel = self.begin("Save").await?;
        channel.send_line(path).await?;
        channel.send_item(item.unwrap_or(Item::NULL)).await?;
        self.finish().await
    }

    /// Add a new empty station.
    pub async fn add_station(&mut self) -> Result<Item> {
        let channel = self.begin("NewStation").await?;
        let item = channel.recv_item().await?;
        self.finish().await?;
        Ok(item)
    }

    /// Close the open station without prompting to save.
    pub async fn close_station(&mut self) -> Result<()> {
        let channel = self.begin("Remove").await?;
        channel.send_item(Item::NULL).await?;
        self.finish().await
    }

    /// Add a target under a parent frame, associated with a robot.
    pub async fn add_target(
        &mut self,
        name: &str,
        parent: Option<Item>,
        robot: Option<Item>,
    ) -> Result<Item> {
        let channel = self.begin("Add_TARGET").await?;
        channel.send_line(name).await?;
        channel.send_item(parent.unwrap_or(Item::NULL)).await?;
        channel.send_item(robot.unwrap_or(Item::NULL)).await?;
        let item = channel.recv_item().await?;
        self.finish().await?;
        Ok(item)
    }

    /// Add a reference frame.
    pub async fn add_frame(&mut self, name: &str, parent: Option<Item>) -> Result<Item> {
        let channel = self.begin("Add_FRAME").await?;
        channel.send_line(name).await?;
        channel.send_item(parent.unwrap_or(Item::NULL)).await?;
        let item = channel.recv_item().await?;
        self.finish().await?;
        Ok(item)
    }

    /// Add an empty program linked to a robot.
    pub async fn add_program(&mut self, name: &str, robot: Option<Item>) -> Result<Item> {
        let channel = self.begin("Add_PROG").await?;
        channel.send_line(name).await?;
        channel.send_item(robot.unwrap_or(Item::NULL)).await?;
        let item = channel.recv_item().await?;
        self.finish().await?;
        Ok(item)
    }

    /// Add a list of points to an object (or a new object). Points are a
    /// 3xN matrix, or 6xN to carry per-point ijk normals.
    pub async fn add_points(
        &mut self,
        points: &Matrix2D,
        reference: Option<Item>,
        add_to_ref: bool,
        projection: Projection,
    ) -> Result<Item> {
        let channel = self.begin("AddPoints").await?;
        channel.send_matrix(points).await?;
        channel.send_item(reference.unwrap_or(Item::NULL)).await?;
        channel.send_int(add_to_ref as i32).await?;
        channel.send_int(projection.to_i32()).await?;
        let item = channel.recv_item().await?;
        self.finish().await?;
        Ok(item)
    }

    /// Project points onto an object's surface. Input and output are
    /// matrices of equal shape.
    pub async fn project_points(
        &mut self,
        points: &Matrix2D,
        object: Item,
        projection: Projection,
    ) -> Result<Matrix2D> {
        let channel = self.begin("ProjectPoints").await?;
        channel.send_matrix(points).await?;
        channel.send_item(object).await?;
        channel.send_int(projection.to_i32()).await?;
        let projected = channel.recv_matrix().await?;
        self.finish().await?;
        Ok(projected)
    }

    /// The station currently visible.
    pub async fn active_station(&mut self) -> Result<Item> {
        let channel = self.begin("G_ActiveStn").await?;
        let item = channel.recv_item().await?;
        self.finish().await?;
        Ok(item)
    }

    /// Make a previously loaded station the visible one.
    pub async fn set_active_station(&mut self, station: Item) -> Result<()> {
        let channel = self.begin("S_ActiveStn").await?;
        channel.send_item(station).await?;
        self.finish().await
    }

    /// Run a program by name (with parameters if any) in simulate mode
    /// and add the call to the program output.
    pub async fn run_program(&mut self, function_with_params: &str) -> Result<i32> {
        self.run_code(function_with_params, true).await
    }

    /// Add raw code (or a function call) to the program output.
    pub async fn run_code(&mut self, code: &str, is_function_call: bool) -> Result<i32> {
        let channel = self.begin("RunCode").await?;
        channel.send_int(is_function_call as i32).await?;
        channel.send_line(code).await?;
        let prog_status = channel.recv_int().await?;
        self.finish().await?;
        Ok(prog_status)
    }

    /// Show a message (or a comment) in the program output.
    pub async fn run_message(&mut self, message: &str, is_comment: bool) -> Result<()> {
        let channel = self.begin("RunMessage").await?;
        channel.send_int(is_comment as i32).await?;
        channel.send_line(message).await?;
        self.finish().await
    }

    /// Render the scene. Rendering stays off afterwards unless
    /// `always_render` is set.
    pub async fn render(&mut self, always_render: bool) -> Result<()> {
        let channel = self.begin("Render").await?;
        channel.send_int(!always_render as i32).await?;
        self.finish().await
    }

    /// Update the screen, repositioning robots and links according to
    /// previously set values.
    pub async fn refresh(&mut self) -> Result<()> {
        let channel = self.begin("Refresh").await?;
        channel.send_int(0).await?;
        self.finish().await
    }

    /// Set the simulation speed ratio (1.0 is real time).
    pub async fn set_simulation_speed(&mut self, speed: f64) -> Result<()> {
        let channel = self.begin("SimulateSpeed").await?;
        channel.send_int((speed * 1000.0) as i32).await?;
        self.finish().await
    }

    /// Current simulation speed ratio.
    pub async fn simulation_speed(&mut self) -> Result<f64> {
        let channel = self.begin("GetSimulateSpeed").await?;
        let speed = channel.recv_int().await?;
        self.finish().await?;
        Ok(f64::from(speed) / 1000.0)
    }

    /// Set how motion requests execute (simulate, validate, generate
    /// program, or drive the real robot).
    pub async fn set_run_mode(&mut self, mode: RunMode) -> Result<()> {
        let channel = self.begin("S_RunMode").await?;
        channel.send_int(mode.to_i32()).await?;
        self.finish().await
    }

    /// Current run mode. Falls back to `Simulate` for values this client
    /// does not know.
    pub async fn run_mode(&mut self) -> Result<RunMode> {
        let channel = self.begin("G_RunMode").await?;
        let mode = channel.recv_int().await?;
        self.finish().await?;
        Ok(RunMode::from_i32(mode).unwrap_or(RunMode::Simulate))
    }

    /// Read a station parameter. Returns `None` when the parameter is not
    /// set (the server answers with an `UNKNOWN `-prefixed line).
    pub async fn param(&mut self, name: &str) -> Result<Option<String>> {
        let channel = self.begin("G_Param").await?;
        channel.send_line(name).await?;
        let value = channel.recv_line().await?;
        self.finish().await?;
        if value.starts_with("UNKNOWN ") {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Set (or create) a station parameter.
    pub async fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        let channel = self.begin("S_Param").await?;
        channel.send_line(name).await?;
        channel.send_line(value).await?;
        self.finish().await
    }

    /// All station parameters as name/value pairs.
    pub async fn params(&mut self) -> Result<Vec<(String, String)>> {
        let channel = self.begin("G_Params").await?;
        let count = channel.recv_int().await?;
        let mut params = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            let name = channel.recv_line().await?;
            let value = channel.recv_line().await?;
            params.push((name, value));
        }
        self.finish().await?;
        Ok(params)
    }

    /// Send a named command to change a simulator setting or trigger an
    /// event, returning the simulator's answer.
    pub async fn command(&mut self, name: &str, value: &str) -> Result<String> {
        let channel = self.begin("SCMD").await?;
        channel.send_line(name).await?;
        channel.send_line(value).await?;
        let answer = channel.recv_line().await?;
        self.finish().await?;
        Ok(answer)
    }

    /// Show a message in the simulator: as a blocking popup (waits for
    /// the user to dismiss it) or in the status bar.
    pub async fn show_message(&mut self, message: &str, popup: bool) -> Result<()> {
        if popup {
            let channel = self.begin("ShowMessage").await?;
            channel.send_line(message).await?;
            self.finish_slow(LONG_TIMEOUT).await
        } else {
            let channel = self.begin("ShowMessageStatus").await?;
            channel.send_line(message).await?;
            self.finish().await
        }
    }

    /// Show or raise the simulator window.
    pub async fn show(&mut self) -> Result<()> {
        self.begin("RAISE").await?;
        self.finish().await
    }

    /// Hide the simulator window.
    pub async fn hide(&mut self) -> Result<()> {
        self.begin("HIDE").await?;
        self.finish().await
    }

    /// Close the simulator window and end the process, then drop the
    /// connection.
    pub async fn quit(&mut self) -> Result<()> {
        self.begin("QUIT").await?;
        self.finish().await?;
        self.disconnect();
        self.process_id = None;
        Ok(())
    }

    /// Number of object pairs currently in collision.
    pub async fn collisions(&mut self) -> Result<i32> {
        let channel = self.begin("Collisions").await?;
        let count = channel.recv_int().await?;
        self.finish().await?;
        Ok(count)
    }

    /// Whether two specific items collide (1) or not (0).
    pub async fn collision(&mut self, item_a: Item, item_b: Item) -> Result<bool> {
        let channel = self.begin("Collided").await?;
        channel.send_item(item_a).await?;
        channel.send_item(item_b).await?;
        let collided = channel.recv_int().await?;
        self.finish().await?;
        Ok(collided > 0)
    }

    /// Turn collision checking on or off ([`crate::items::COLLISION_ON`] /
    /// [`crate::items::COLLISION_OFF`]); returns the number of colliding
    /// pairs.
    pub async fn set_collision_checking(&mut self, state: i32) -> Result<i32> {
        let channel = self.begin("Collision_SetState").await?;
        channel.send_int(state).await?;
        let count = channel.recv_int().await?;
        self.finish().await?;
        Ok(count)
    }

    /// Measure a point with a connected laser tracker, searching around
    /// `estimate` (station coordinates, mm). Returns `None` when the
    /// tracker saw nothing (the server answers with a zero point).
    pub async fn laser_tracker_measure(
        &mut self,
        estimate: [f64; 3],
        search: bool,
    ) -> Result<Option<[f64; 3]>> {
        let channel = self.begin("MeasLT").await?;
        channel.send_xyz(&estimate).await?;
        channel.send_int(search as i32).await?;
        let measured = channel.recv_xyz().await?;
        self.finish().await?;
        let [x, y, z] = measured;
        if x * x + y * y + z * z < 1e-4 {
            return Ok(None);
        }
        Ok(Some(measured))
    }

    /// The item under a 2D screen coordinate, plus the 3D station point it
    /// projects to.
    pub async fn cursor_xyz(&mut self, x: i32, y: i32) -> Result<(Item, [f64; 3])> {
        let channel = self.begin("Proj2d3d").await?;
        channel.send_int(x).await?;
        channel.send_int(y).await?;
        let _selection = channel.recv_int().await?;
        let item = channel.recv_item().await?;
        let point = channel.recv_xyz().await?;
        self.finish().await?;
        Ok((item, point))
    }

    /// Whether one object is fully inside another.
    pub async fn is_inside(&mut self, inner: Item, outer: Item) -> Result<bool> {
        let channel = self.begin("IsInside").await?;
        channel.send_item(inner).await?;
        channel.send_item(outer).await?;
        let inside = channel.recv_int().await?;
        self.finish().await?;
        Ok(inside > 0)
    }
}
