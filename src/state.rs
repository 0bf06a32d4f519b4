use serde::{de::DeserializeOwned, Serialize};

use crate::error::{MemoryError, Result};

/// Save-state support. `restore_state` either installs the whole snapshot
/// or returns an error with the component untouched.
pub trait SaveState {
    type State;

    fn get_state(&self) -> Self::State;
    fn restore_state(&mut self, state: Self::State) -> Result<()>;
}

/// JSON encoding for snapshot types.
pub trait Snapshot: Serialize + DeserializeOwned {
    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Missing or mistyped fields are reported as `InvalidSnapshot`.
    fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MemoryError::InvalidSnapshot(e.to_string()))
    }
}
