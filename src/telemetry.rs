//! Telemetry node table (§6.6): a flat, statically-defined set of named,
//! typed nodes with per-role access bits and read/write dispatch.
//!
//! Grounded on the ThingSet data-object registration pattern in
//! `data_objects.cpp` (`THINGSET_ADD_ITEM_FLOAT(id, name, &value, decimals,
//! access, subset)`). This module implements the node table and the
//! read/write/commit dispatch only; wire framing (CAN/serial) is out of
//! scope per the governing spec.

/// Per-role read/write permission bits, mirroring `THINGSET_USR_R` /
/// `THINGSET_EXP_RW` / `THINGSET_ANY_R` etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access(u8);

impl Access {
    pub const USER_READ: Access = Access(0b0000_0001);
    pub const USER_WRITE: Access = Access(0b0000_0010);
    pub const EXPERT_READ: Access = Access(0b0000_0100);
    pub const EXPERT_WRITE: Access = Access(0b0000_1000);
    pub const MAKER_READ: Access = Access(0b0001_0000);
    pub const MAKER_WRITE: Access = Access(0b0010_0000);

    pub const ANY_READ: Access = Access(Self::USER_READ.0 | Self::EXPERT_READ.0 | Self::MAKER_READ.0);
    pub const ANY_RW: Access = Access(Self::ANY_READ.0 | Self::USER_WRITE.0 | Self::EXPERT_WRITE.0 | Self::MAKER_WRITE.0);

    pub const fn combine(self, other: Access) -> Access {
        Access(self.0 | other.0)
    }

    pub const fn allows(self, required: Access) -> bool {
        self.0 & required.0 == required.0
    }
}

/// Which role is asking, for the dispatch functions below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Expert,
    Maker,
}

impl Role {
    const fn read_bit(self) -> Access {
        match self {
            Role::User => Access::USER_READ,
            Role::Expert => Access::EXPERT_READ,
            Role::Maker => Access::MAKER_READ,
        }
    }

    const fn write_bit(self) -> Access {
        match self {
            Role::User => Access::USER_WRITE,
            Role::Expert => Access::EXPERT_WRITE,
            Role::Maker => Access::MAKER_WRITE,
        }
    }
}

/// A node's runtime value. Floats carry their ThingSet-style decimal
/// precision alongside, purely as a display hint — the stored value is
/// always full `f32` precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    U16(u16),
    U32(u32),
    I16(i16),
    F32(f32),
}

/// One row of the node table: a stable id, a human-readable name, the
/// access bits, and the node's current value.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub id: u16,
    pub name: &'static str,
    pub access: Access,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    NotFound,
    AccessDenied,
    TypeMismatch,
}

/// An in-memory, fixed-capacity node table. Populated by the context layer
/// from the live component state each slow tick; a read/write call never
/// allocates.
pub struct NodeTable<const N: usize> {
    nodes: heapless::Vec<Node, N>,
}

impl<const N: usize> NodeTable<N> {
    pub fn new() -> Self {
        Self { nodes: heapless::Vec::new() }
    }

    /// Panics (at build time, in practice, since callers register a fixed
    /// set once at startup) if the table is already full.
    pub fn register(&mut self, id: u16, name: &'static str, access: Access, value: Value) {
        self.nodes.push(Node { id, name, access, value }).ok().expect("telemetry node table capacity exceeded");
    }

    pub fn set(&mut self, id: u16, value: Value) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.value = value;
        }
    }

    pub fn read(&self, role: Role, id: u16) -> Result<Value, TelemetryError> {
        let node = self.nodes.iter().find(|n| n.id == id).ok_or(TelemetryError::NotFound)?;
        if !node.access.allows(role.read_bit()) {
            return Err(TelemetryError::AccessDenied);
        }
        Ok(node.value)
    }

    pub fn write(&mut self, role: Role, id: u16, value: Value) -> Result<(), TelemetryError> {
        let node = self.nodes.iter_mut().find(|n| n.id == id).ok_or(TelemetryError::NotFound)?;
        if !node.access.allows(role.write_bit()) {
            return Err(TelemetryError::AccessDenied);
        }
        if core::mem::discriminant(&node.value) != core::mem::discriminant(&value) {
            return Err(TelemetryError::TypeMismatch);
        }
        node.value = value;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }
}

impl<const N: usize> Default for NodeTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> NodeTable<4> {
        let mut t = NodeTable::new();
        t.register(0x531, "rVoltage_V", Access::ANY_READ, Value::F32(12.8));
        t.register(0x5A0, "sNominalCapacity_Ah", Access::ANY_RW, Value::F32(100.0));
        t.register(0x650, "rState", Access::EXPERT_READ, Value::U16(1));
        t
    }

    #[test]
    fn user_can_read_public_node() {
        let t = sample_table();
        assert_eq!(t.read(Role::User, 0x531), Ok(Value::F32(12.8)));
    }

    #[test]
    fn user_cannot_read_expert_only_node() {
        let t = sample_table();
        assert_eq!(t.read(Role::User, 0x650), Err(TelemetryError::AccessDenied));
    }

    #[test]
    fn expert_can_read_expert_only_node() {
        let t = sample_table();
        assert_eq!(t.read(Role::Expert, 0x650), Ok(Value::U16(1)));
    }

    #[test]
    fn write_rejects_type_mismatch() {
        let mut t = sample_table();
        assert_eq!(t.write(Role::User, 0x5A0, Value::Bool(true)), Err(TelemetryError::TypeMismatch));
    }

    #[test]
    fn write_rejects_read_only_node() {
        let mut t = sample_table();
        assert_eq!(t.write(Role::User, 0x531, Value::F32(13.0)), Err(TelemetryError::AccessDenied));
    }

    #[test]
    fn write_updates_writable_node() {
        let mut t = sample_table();
        t.write(Role::User, 0x5A0, Value::F32(120.0)).unwrap();
        assert_eq!(t.read(Role::User, 0x5A0), Ok(Value::F32(120.0)));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let t = sample_table();
        assert_eq!(t.read(Role::Maker, 0xFFFF), Err(TelemetryError::NotFound));
    }
}
