use std::{collections::BTreeSet, fmt};

/// Broadcast group on the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Room {
    /// Viewers of one asset.
    Asset(String),
    /// Viewers of every asset.
    All,
}

impl fmt::Display for Room {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Room::Asset(id) => write!(f, "asset:{id}"),
            Room::All => f.write_str("all-assets"),
        }
    }
}

/// Rooms one connection has joined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSubscription {
    pub assets: BTreeSet<String>,
    pub all: bool,
}

impl ClientSubscription {
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && !self.all
    }

    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.assets.iter().cloned().map(Room::Asset).collect();
        if self.all {
            rooms.push(Room::All);
        }
        rooms
    }
}
