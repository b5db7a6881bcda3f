//! Opaque item handles and the fixed integer taxonomies of the protocol.
//!
//! An [`Item`] is a reference to an object living inside the simulator
//! (robot, frame, target, program, ...). The client never dereferences the
//! identifier; it is only ever echoed back to the server as an argument.
//! The underlying object is owned by the simulator — dropping an `Item`
//! releases nothing remotely.

/// Type tag of a simulator item.
///
/// The tag travels on the wire as a plain integer. Handles received from
/// the server carry no tag (the protocol transmits the identifier only), so
/// they are tagged [`ItemType::Unknown`] until queried with
/// `Client::item_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    /// Tag not transmitted or not yet queried.
    Unknown,
    Station,
    Robot,
    Frame,
    Tool,
    Object,
    Target,
    Program,
    Instruction,
    ProgramPython,
    Machining,
    BallbarValidation,
    Calibration,
}

impl ItemType {
    /// Wire value of this tag.
    pub fn to_i32(self) -> i32 {
        match self {
            ItemType::Unknown => -1,
            ItemType::Station => 1,
            ItemType::Robot => 2,
            ItemType::Frame => 3,
            ItemType::Tool => 4,
            ItemType::Object => 5,
            ItemType::Target => 6,
            ItemType::Program => 8,
            ItemType::Instruction => 9,
            ItemType::ProgramPython => 10,
            ItemType::Machining => 11,
            ItemType::BallbarValidation => 12,
            ItemType::Calibration => 13,
        }
    }

    /// Decode a wire value. Unassigned values map to `Unknown`.
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => ItemType::Station,
            2 => ItemType::Robot,
            3 => ItemType::Frame,
            4 => ItemType::Tool,
            5 => ItemType::Object,
            6 => ItemType::Target,
            8 => ItemType::Program,
            9 => ItemType::Instruction,
            10 => ItemType::ProgramPython,
            11 => ItemType::Machining,
            12 => ItemType::BallbarValidation,
            13 => ItemType::Calibration,
            _ => ItemType::Unknown,
        }
    }
}

/// Opaque reference to an object inside the simulator.
///
/// Equality compares identifiers only: two handles to the same remote
/// object are equal even if one carries a queried type tag and the other
/// does not.
#[derive(Debug, Clone, Copy)]
pub struct Item {
    id: u64,
    item_type: ItemType,
}

impl Item {
    /// The null handle (id 0), used to encode absent optional items.
    pub const NULL: Item = Item {
        id: 0,
        item_type: ItemType::Unknown,
    };

    /// Handle from a raw identifier. The identifier is only meaningful to
    /// the simulator that issued it; this is mainly useful for replaying
    /// handles received earlier and for test doubles.
    pub fn new(id: u64, item_type: ItemType) -> Self {
        Self { id, item_type }
    }

    /// Remote identifier. Only meaningful to the simulator.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Locally known type tag. `Unknown` until queried.
    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// Whether this handle references an existing object (id 0 means the
    /// server had nothing to return, e.g. a failed lookup).
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Item {}

/// Execution behavior of the simulator for motion requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Simulate the movement (default).
    Simulate,
    /// Quickly validate the path without simulating.
    QuickValidate,
    /// Generate the robot program.
    MakeRobotProgram,
    /// Move the connected real robot.
    RunRealRobot,
}

impl RunMode {
    pub fn to_i32(self) -> i32 {
        match self {
            RunMode::Simulate => 1,
            RunMode::QuickValidate => 2,
            RunMode::MakeRobotProgram => 3,
            RunMode::RunRealRobot => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(RunMode::Simulate),
            2 => Some(RunMode::QuickValidate),
            3 => Some(RunMode::MakeRobotProgram),
            4 => Some(RunMode::RunRealRobot),
            _ => None,
        }
    }
}

/// Collision checking state (`Collision_SetState`).
pub const COLLISION_OFF: i32 = 0;
/// Collision checking state (`Collision_SetState`).
pub const COLLISION_ON: i32 = 1;

/// Point/curve projection behavior for `add_points`/`project_points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// No projection, keep the given coordinates.
    None,
    /// Project to the closest surface point.
    Closest,
    /// Project along the point normal.
    AlongNormal,
    /// Project along the Z axis.
    AlongZ,
    /// Project along the normal, recalculating the surface normal.
    AlongNormalRecalc,
}

impl Projection {
    pub fn to_i32(self) -> i32 {
        match self {
            Projection::None => 0,
            Projection::Closest => 1,
            Projection::AlongNormal => 2,
            Projection::AlongZ => 3,
            Projection::AlongNormalRecalc => 4,
        }
    }
}
