use std::time::SystemTime;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Timestamp(SystemTime);

impl Timestamp {
    pub fn now() -> Self {
        Self(SystemTime::now())
    }

    pub fn into_inner(self) -> SystemTime {
        self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        Self(time)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.0
    }
}

impl std::ops::Deref for Timestamp {
    type Target = SystemTime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_now() {
        let timestamp = Timestamp::now();
        assert!(timestamp.0.elapsed().unwrap().as_secs() < 1);
    }

    #[test]
    fn test_timestamp_from_system_time() {
        let system_time = SystemTime::now();
        let timestamp = Timestamp::from(system_time);
        assert_eq!(timestamp.0, system_time);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let timestamp = Timestamp::now();
        let serialized = serde_json::to_string(&timestamp).unwrap();
        let deserialized: Timestamp = serde_json::from_str(&serialized).unwrap();
        assert_eq!(timestamp, deserialized);
    }

    #[test]
    fn test_timestamp_deref() {
        let timestamp = Timestamp::now();
        let system_time = *timestamp;
        assert_eq!(timestamp.0, system_time);
    }
}
